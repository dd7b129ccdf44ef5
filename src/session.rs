//! Per-pendant engine
//!
//! A [`PendantSession`] owns everything one mounted pendant needs: the
//! operator state, the last controller status, the probe workflow and the
//! display encoder. Every entry point runs to completion and none of them
//! block; commands leave through the [`CommandSink`] and display packets
//! through the [`FeatureReportSink`].
//!
//! SPDX-License-Identifier: GPL-3.0

use std::sync::Arc;

use crate::command::{Command, CommandSink};
use crate::config::Config;
use crate::display::{DisplayEncoder, FeatureReportSink, ReportType};
use crate::jog;
use crate::machine::{self, StartPauseAction};
use crate::probe::{ProbeSlot, ProbeState, ProbeWorkflow, ToolLengthProbe};
use crate::protocol::{InputReport, KeyCode};
use crate::router::{self, ControlAction, KeyAction, RouteContext};
use crate::state::{JogMode, MachineStatus, PendantState, SpindleDirection};

/// Engine state for one mounted pendant
pub struct PendantSession {
    config: Arc<Config>,
    state: PendantState,
    status: MachineStatus,
    probe: Box<dyn ProbeWorkflow>,
    probe_slot: ProbeSlot,
    display: DisplayEncoder,
    commands: CommandSink,
    feature: Box<dyn FeatureReportSink + Send>,
}

impl PendantSession {
    /// Create a session with the default tool-length probe workflow
    pub fn new(
        config: Arc<Config>,
        commands: CommandSink,
        feature: Box<dyn FeatureReportSink + Send>,
    ) -> Self {
        let probe = Box::new(ToolLengthProbe::new(config.probe.clone()));
        Self::with_probe(config, commands, feature, probe)
    }

    /// Create a session with a custom probe workflow
    ///
    /// The initial display report is sent right away.
    pub fn with_probe(
        config: Arc<Config>,
        commands: CommandSink,
        feature: Box<dyn FeatureReportSink + Send>,
        probe: Box<dyn ProbeWorkflow>,
    ) -> Self {
        let mut session = Self {
            config,
            state: PendantState::new(),
            status: MachineStatus::default(),
            probe,
            probe_slot: ProbeSlot::default(),
            display: DisplayEncoder::new(),
            commands,
            feature,
        };
        session.request_display_refresh();
        session
    }

    pub fn state(&self) -> &PendantState {
        &self.state
    }

    pub fn status(&self) -> &MachineStatus {
        &self.status
    }

    pub fn probe_state(&self) -> ProbeState {
        self.probe.state()
    }

    pub fn probe_slot(&self) -> &ProbeSlot {
        &self.probe_slot
    }

    pub fn display(&self) -> &DisplayEncoder {
        &self.display
    }

    // ========================================================================
    // Inbound events
    // ========================================================================

    /// Raw input report from the pendant
    ///
    /// Malformed reports are dropped without touching any state.
    pub fn on_report(&mut self, bytes: &[u8]) {
        let report = match InputReport::parse(bytes) {
            Ok(report) => report,
            Err(e) => {
                tracing::trace!(error = %e, len = bytes.len(), "Dropping malformed report");
                return;
            }
        };

        // Held keys drive the pendant's own key LEDs, so they always refresh
        let mut refresh = report.keycode1 != 0;

        let change = self.state.apply_report(&report);
        if change.any() {
            self.stop_continuous();
        }
        if change.axis_changed {
            tracing::debug!(axis = ?self.state.selected_axis, "Axis selection changed");
            refresh = true;
        }
        if change.feed_changed {
            tracing::debug!(feed = ?self.state.selected_feed, "Feed selection changed");
        }

        self.state.function_key_held = report.is_key_held(KeyCode::Fn);
        self.process_keys(&report);

        if refresh {
            self.request_display_refresh();
        }
    }

    /// New status snapshot from the controller
    pub fn on_status(&mut self, status: MachineStatus) {
        self.status = status;

        if self.status.spindle_on && self.status.spindle_direction != SpindleDirection::None {
            self.state.last_spindle_direction = self.status.spindle_direction;
        }

        if self.status.new_probe_result {
            let commands = self.probe.on_new_result(&self.status, &mut self.probe_slot);
            self.send_all(commands);
        }

        self.request_display_refresh();
    }

    /// Periodic jog tick
    pub fn on_command_tick(&mut self) {
        let commands = jog::tick(&mut self.state, &self.config.jog);
        self.send_all(commands);
    }

    /// Periodic display refresh tick
    pub fn on_display_tick(&mut self) {
        self.request_display_refresh();
    }

    /// Feature report completion from the transport
    pub fn on_feature_report_complete(&mut self, report_id: u8, report_type: ReportType, len: usize) {
        self.display
            .on_complete(report_id, report_type, len, self.feature.as_mut());
    }

    // ========================================================================
    // Key handling
    // ========================================================================

    fn process_keys(&mut self, report: &InputReport) {
        let previous = self.state.held_keys;
        let current = [report.keycode1, report.keycode2];

        for code in previous {
            if code != 0 && !current.contains(&code) {
                tracing::debug!(keycode = format!("0x{:02X}", code), "Key released");
            }
        }

        // one press per report, keycode1 first; Fn is only a modifier
        let fn_code = KeyCode::Fn.raw();
        let pressed = current
            .into_iter()
            .find(|&code| code != 0 && code != fn_code && !previous.contains(&code))
            .and_then(KeyCode::from_raw);

        self.state.held_keys = current;

        if let Some(key) = pressed {
            tracing::debug!(
                keycode = format!("0x{:02X}", key.raw()),
                key = ?key,
                function = self.state.function_key_held,
                "Key pressed"
            );
            self.handle_key(key);
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        let ctx = RouteContext {
            function_key_held: self.state.function_key_held,
            run_state: self.status.run_state,
            probe_state: self.probe.state(),
        };

        match router::route(key, &ctx) {
            KeyAction::Reset => {
                let commands = self.probe.abort(&self.status, &mut self.probe_slot);
                self.send_all(commands);
                self.commands.send(Command::line("$Bye"));
            }
            KeyAction::Stop => {
                if self.probe.state().is_active() {
                    let commands = self.probe.abort(&self.status, &mut self.probe_slot);
                    self.send_all(commands);
                }
                if let Some(command) = machine::stop(self.status.run_state) {
                    self.commands.send(command);
                }
                self.stop_continuous();
            }
            KeyAction::StartPause => {
                match machine::start_pause(self.status.run_state, self.probe.state()) {
                    StartPauseAction::Send(command) => self.commands.send(command),
                    StartPauseAction::AdvanceProbe => {
                        let commands = self.probe.advance(&self.status, &mut self.probe_slot);
                        self.send_all(commands);
                    }
                    StartPauseAction::Nothing => {
                        tracing::debug!(state = ?self.status.run_state, "Start/Pause has no action");
                    }
                }
            }
            KeyAction::SetJogMode(mode) => self.set_jog_mode(mode),
            KeyAction::Control(action) => self.control(action),
            KeyAction::RunMacro(number) => {
                let line = format!("{}{}", self.config.commands.macro_prefix, number);
                self.commands.send(Command::line(line));
            }
            KeyAction::Ignored(reason) => {
                tracing::debug!(key = ?key, reason, "Key ignored");
            }
        }
    }

    fn set_jog_mode(&mut self, mode: JogMode) {
        self.state.jog_accumulator = 0;
        self.stop_continuous();
        self.state.jog_mode = mode;
        tracing::debug!(mode = ?mode, "Jog mode set");
    }

    fn control(&mut self, action: ControlAction) {
        match action {
            ControlAction::ToggleSpindle => self.toggle_spindle(),
            ControlAction::ProbeZ => {
                let commands = self.probe.begin(&self.status, &mut self.probe_slot);
                self.send_all(commands);
            }
            other => {
                if let Some(command) = other.fixed_command(&self.config.commands) {
                    self.commands.send(command);
                }
            }
        }
    }

    /// Spindle off, or back on in the direction it last ran
    fn toggle_spindle(&mut self) {
        if self.status.spindle_on {
            if self.status.spindle_direction != SpindleDirection::None {
                self.state.last_spindle_direction = self.status.spindle_direction;
            }
            self.commands.send(Command::line("M5"));
            return;
        }

        let line = match self.state.last_spindle_direction {
            SpindleDirection::Ccw => "M4",
            SpindleDirection::Cw | SpindleDirection::None => "M3",
        };
        self.commands.send(Command::line(line));
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn stop_continuous(&mut self) {
        if let Some(command) = jog::stop_continuous(&mut self.state) {
            self.commands.send(command);
        }
    }

    fn send_all(&self, commands: Vec<Command>) {
        for command in commands {
            self.commands.send(command);
        }
    }

    fn request_display_refresh(&mut self) {
        self.display.refresh(
            &self.state,
            &self.status,
            &self.config,
            self.feature.as_mut(),
        );
    }
}

impl Drop for PendantSession {
    fn drop(&mut self) {
        self.stop_continuous();
    }
}

// ============================================================================
// Tests
// ============================================================================
