//! Key press routing
//!
//! Maps a newly pressed key plus the Fn modifier and controller state to a
//! [`KeyAction`]. Reset, Stop, Start/Pause and the jog mode keys behave the
//! same with or without Fn; the macro keys switch between direct controller
//! functions (Fn held) and numbered macros.
//!
//! SPDX-License-Identifier: GPL-3.0

use crate::command::{realtime, Command};
use crate::config::CommandConfig;
use crate::probe::ProbeState;
use crate::protocol::KeyCode;
use crate::state::{JogMode, RunState};

/// Controller function bound to a macro key while Fn is held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    FeedOverridePlus,
    FeedOverrideMinus,
    SpindleOverridePlus,
    SpindleOverrideMinus,
    HomeAll,
    SafeZ,
    SetWorkZero,
    ToggleSpindle,
    ProbeZ,
}

impl ControlAction {
    /// Command for actions that need no session state
    pub fn fixed_command(self, commands: &CommandConfig) -> Option<Command> {
        let command = match self {
            ControlAction::FeedOverridePlus => Command::Realtime(realtime::FEED_OVERRIDE_PLUS),
            ControlAction::FeedOverrideMinus => Command::Realtime(realtime::FEED_OVERRIDE_MINUS),
            ControlAction::SpindleOverridePlus => {
                Command::Realtime(realtime::SPINDLE_OVERRIDE_PLUS)
            }
            ControlAction::SpindleOverrideMinus => {
                Command::Realtime(realtime::SPINDLE_OVERRIDE_MINUS)
            }
            ControlAction::HomeAll => Command::line("$H"),
            ControlAction::SafeZ => Command::line(commands.safe_z.clone()),
            ControlAction::SetWorkZero => Command::line("G10 L20 P0 X0 Y0"),
            ControlAction::ToggleSpindle | ControlAction::ProbeZ => return None,
        };
        Some(command)
    }
}

/// What a key press means right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Clear the probe workflow and soft-reset the controller
    Reset,
    /// Delegate to the run-state Stop handler
    Stop,
    /// Delegate to the run-state Start/Pause handler
    StartPause,
    /// Switch jog mode, dropping pending jog
    SetJogMode(JogMode),
    /// Fn + macro key
    Control(ControlAction),
    /// Run a numbered macro
    RunMacro(u8),
    /// Nothing to do, with the reason for the log
    Ignored(&'static str),
}

/// Inputs to routing besides the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteContext {
    pub function_key_held: bool,
    pub run_state: RunState,
    pub probe_state: ProbeState,
}

/// Route a newly pressed key
pub fn route(key: KeyCode, ctx: &RouteContext) -> KeyAction {
    match key {
        KeyCode::Reset => KeyAction::Reset,
        KeyCode::Stop => KeyAction::Stop,
        KeyCode::StartPause => KeyAction::StartPause,
        KeyCode::Continuous => KeyAction::SetJogMode(JogMode::Continuous),
        KeyCode::Step => KeyAction::SetJogMode(JogMode::Step),
        KeyCode::Fn => KeyAction::Ignored("modifier key"),
        KeyCode::Unknown(_) => KeyAction::Ignored("unknown key"),
        macro_key if ctx.function_key_held => route_function(macro_key, ctx),
        macro_key => route_macro(macro_key, ctx),
    }
}

fn route_function(key: KeyCode, ctx: &RouteContext) -> KeyAction {
    let action = match key {
        KeyCode::M1FeedPlus => ControlAction::FeedOverridePlus,
        KeyCode::M2FeedMinus => ControlAction::FeedOverrideMinus,
        KeyCode::M3SpindlePlus => ControlAction::SpindleOverridePlus,
        KeyCode::M4SpindleMinus => ControlAction::SpindleOverrideMinus,
        KeyCode::M5MachineHome => ControlAction::HomeAll,
        KeyCode::M6SafeZ => ControlAction::SafeZ,
        KeyCode::M7WorkHome => ControlAction::SetWorkZero,
        KeyCode::M8SpindleOnOff => ControlAction::ToggleSpindle,
        KeyCode::M9ProbeZ if ctx.probe_state.is_active() => {
            return KeyAction::Ignored("probe already running");
        }
        KeyCode::M9ProbeZ if ctx.run_state != RunState::Idle => {
            return KeyAction::Ignored("probing only starts while idle");
        }
        KeyCode::M9ProbeZ => ControlAction::ProbeZ,
        _ => return KeyAction::Ignored("no function-key action"),
    };
    KeyAction::Control(action)
}

fn route_macro(key: KeyCode, ctx: &RouteContext) -> KeyAction {
    let Some(number) = key.macro_number() else {
        return KeyAction::Ignored("not a macro key");
    };

    match ctx.run_state {
        RunState::Idle | RunState::Hold => KeyAction::RunMacro(number),
        _ => KeyAction::Ignored("macros only run while idle or held"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(function_key_held: bool, run_state: RunState) -> RouteContext {
        RouteContext {
            function_key_held,
            run_state,
            probe_state: ProbeState::NoProbe,
        }
    }

    #[test]
    fn test_fixed_keys_ignore_modifier() {
        for held in [false, true] {
            let c = ctx(held, RunState::Cycle);
            assert_eq!(route(KeyCode::Reset, &c), KeyAction::Reset);
            assert_eq!(route(KeyCode::Stop, &c), KeyAction::Stop);
            assert_eq!(route(KeyCode::StartPause, &c), KeyAction::StartPause);
            assert_eq!(
                route(KeyCode::Continuous, &c),
                KeyAction::SetJogMode(JogMode::Continuous)
            );
            assert_eq!(route(KeyCode::Step, &c), KeyAction::SetJogMode(JogMode::Step));
        }
    }

    #[test]
    fn test_function_mapping() {
        let c = ctx(true, RunState::Idle);
        let expected = [
            (KeyCode::M1FeedPlus, ControlAction::FeedOverridePlus),
            (KeyCode::M2FeedMinus, ControlAction::FeedOverrideMinus),
            (KeyCode::M3SpindlePlus, ControlAction::SpindleOverridePlus),
            (KeyCode::M4SpindleMinus, ControlAction::SpindleOverrideMinus),
            (KeyCode::M5MachineHome, ControlAction::HomeAll),
            (KeyCode::M6SafeZ, ControlAction::SafeZ),
            (KeyCode::M7WorkHome, ControlAction::SetWorkZero),
            (KeyCode::M8SpindleOnOff, ControlAction::ToggleSpindle),
            (KeyCode::M9ProbeZ, ControlAction::ProbeZ),
        ];
        for (key, action) in expected {
            assert_eq!(route(key, &c), KeyAction::Control(action));
        }
        assert!(matches!(route(KeyCode::M10, &c), KeyAction::Ignored(_)));
    }

    #[test]
    fn test_probe_key_requires_idle_workflow() {
        let c = RouteContext {
            function_key_held: true,
            run_state: RunState::Idle,
            probe_state: ProbeState::MovedToProbeLocation,
        };
        assert!(matches!(route(KeyCode::M9ProbeZ, &c), KeyAction::Ignored(_)));
    }

    #[test]
    fn test_probe_key_requires_idle_machine() {
        for state in [
            RunState::Cycle,
            RunState::Hold,
            RunState::Jog,
            RunState::Homing,
            RunState::Alarm,
        ] {
            let action = route(KeyCode::M9ProbeZ, &ctx(true, state));
            assert!(matches!(action, KeyAction::Ignored(_)), "{:?}", state);
        }
        // the other function keys stay available mid-job
        assert_eq!(
            route(KeyCode::M1FeedPlus, &ctx(true, RunState::Cycle)),
            KeyAction::Control(ControlAction::FeedOverridePlus)
        );
    }

    #[test]
    fn test_macros_gated_by_run_state() {
        assert_eq!(route(KeyCode::M3SpindlePlus, &ctx(false, RunState::Idle)), KeyAction::RunMacro(3));
        assert_eq!(route(KeyCode::M10, &ctx(false, RunState::Hold)), KeyAction::RunMacro(10));

        for state in [RunState::Cycle, RunState::Jog, RunState::Homing, RunState::Alarm] {
            assert!(matches!(
                route(KeyCode::M1FeedPlus, &ctx(false, state)),
                KeyAction::Ignored(_)
            ));
        }
    }

    #[test]
    fn test_modifier_and_unknown_keys() {
        let c = ctx(false, RunState::Idle);
        assert!(matches!(route(KeyCode::Fn, &c), KeyAction::Ignored(_)));
        assert!(matches!(route(KeyCode::Unknown(0x33), &c), KeyAction::Ignored(_)));
    }

    #[test]
    fn test_fixed_commands() {
        let commands = CommandConfig::default();
        assert_eq!(
            ControlAction::FeedOverridePlus.fixed_command(&commands),
            Some(Command::Realtime(0x91))
        );
        assert_eq!(
            ControlAction::SpindleOverrideMinus.fixed_command(&commands),
            Some(Command::Realtime(0x9B))
        );
        assert_eq!(ControlAction::HomeAll.fixed_command(&commands), Some(Command::line("$H")));
        assert_eq!(
            ControlAction::SafeZ.fixed_command(&commands),
            Some(Command::line("G53 G0 Z0"))
        );
        assert_eq!(
            ControlAction::SetWorkZero.fixed_command(&commands),
            Some(Command::line("G10 L20 P0 X0 Y0"))
        );
        assert_eq!(ControlAction::ToggleSpindle.fixed_command(&commands), None);
    }
}
