//! Start/Pause and Stop interpretation against the controller run state
//!
//! The run state comes from status updates; this module only reads it.
//!
//! SPDX-License-Identifier: GPL-3.0

use crate::command::Command;
use crate::probe::ProbeState;
use crate::state::RunState;

/// Outcome of a Start/Pause press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPauseAction {
    Send(Command),
    /// Let the waiting probe workflow continue
    AdvanceProbe,
    Nothing,
}

/// Start/Pause: hold a moving machine, resume a held one, clear an alarm
pub fn start_pause(run_state: RunState, probe_state: ProbeState) -> StartPauseAction {
    match run_state {
        RunState::Cycle | RunState::Jog | RunState::Homing => {
            StartPauseAction::Send(Command::feed_hold())
        }
        RunState::Hold => StartPauseAction::Send(Command::cycle_start()),
        RunState::Alarm => StartPauseAction::Send(Command::line("$x")),
        RunState::Idle if probe_state.awaits_continuation() => StartPauseAction::AdvanceProbe,
        RunState::Idle => StartPauseAction::Nothing,
    }
}

/// Stop: hold motion, soft-reset a homing cycle
///
/// Aborting a running probe workflow is the caller's job and happens first.
pub fn stop(run_state: RunState) -> Option<Command> {
    match run_state {
        RunState::Cycle | RunState::Jog => Some(Command::feed_hold()),
        RunState::Homing => Some(Command::soft_reset()),
        RunState::Idle | RunState::Hold | RunState::Alarm => {
            tracing::warn!(state = ?run_state, "Stop has no action in this state");
            None
        }
    }
}
