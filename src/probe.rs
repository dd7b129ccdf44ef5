//! Probe workflow collaborator
//!
//! The session drives a probe workflow at four points (begin, advance,
//! new result, abort) and always passes the latest status snapshot and the
//! session's [`ProbeSlot`]. Calls never overlap.
//!
//! [`ToolLengthProbe`] is the default workflow: it measures a reference
//! tool on a fixed tool setter, waits for the tool change, measures the new
//! tool and applies the difference as a tool length offset.
//!
//! SPDX-License-Identifier: GPL-3.0

use crate::command::Command;
use crate::config::ProbeConfig;
use crate::protocol::Axis;
use crate::state::MachineStatus;

/// Workflow progress as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeState {
    /// No workflow running
    #[default]
    NoProbe,
    /// At the tool setter, waiting for Start
    MovedToProbeLocation,
    /// Probing the reference tool
    ProbingExisting,
    /// Reference measured, waiting for the tool change and Start
    ProbeExistingComplete,
    /// Probing the new tool
    ProbingNew,
}

impl ProbeState {
    /// Whether Start/Pause should advance the workflow
    pub fn awaits_continuation(self) -> bool {
        matches!(
            self,
            ProbeState::MovedToProbeLocation | ProbeState::ProbeExistingComplete
        )
    }

    pub fn is_active(self) -> bool {
        self != ProbeState::NoProbe
    }
}

/// Probe results kept for the session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeSlot {
    /// Z contact of the reference tool
    pub reference_z: Option<f64>,
    /// Tool length offset applied after the last completed sequence
    pub tool_offset: Option<f64>,
}

/// Entry points the session calls into
pub trait ProbeWorkflow: Send {
    /// Current workflow state
    fn state(&self) -> ProbeState;

    /// Start the sequence (probe-Z key while idle)
    fn begin(&mut self, status: &MachineStatus, slot: &mut ProbeSlot) -> Vec<Command>;

    /// Continue after the operator pressed Start
    fn advance(&mut self, status: &MachineStatus, slot: &mut ProbeSlot) -> Vec<Command>;

    /// Consume a new probe result from the controller
    fn on_new_result(&mut self, status: &MachineStatus, slot: &mut ProbeSlot) -> Vec<Command>;

    /// Abort and undo any mode changes the workflow made
    fn abort(&mut self, status: &MachineStatus, slot: &mut ProbeSlot) -> Vec<Command>;
}

/// Tool-length measuring workflow on a fixed tool setter
#[derive(Debug, Clone)]
pub struct ToolLengthProbe {
    config: ProbeConfig,
    state: ProbeState,
    /// Distance mode to restore once probing is over
    restore_relative: bool,
    /// Whether G91 has been issued by this workflow
    changed_distance_mode: bool,
}

impl ToolLengthProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            state: ProbeState::NoProbe,
            restore_relative: false,
            changed_distance_mode: false,
        }
    }

    fn distance_mode(relative: bool) -> Command {
        Command::line(if relative { "G91" } else { "G90" })
    }

    fn probe_move(&self) -> Command {
        Command::line(format!(
            "G38.2 Z-{:.3} F{:.0}",
            self.config.max_travel, self.config.feed
        ))
    }

    fn retract(&self) -> Command {
        Command::line(format!("G0 Z{:.3}", self.config.retract))
    }

    /// Leave probing: back to the saved distance mode
    fn finish(&mut self, commands: &mut Vec<Command>) {
        if self.changed_distance_mode {
            commands.push(Self::distance_mode(self.restore_relative));
        }
        self.changed_distance_mode = false;
        self.state = ProbeState::NoProbe;
    }

    fn start_probing(&mut self, next: ProbeState) -> Vec<Command> {
        self.state = next;
        self.changed_distance_mode = true;
        vec![Self::distance_mode(true), self.probe_move()]
    }
}

impl ProbeWorkflow for ToolLengthProbe {
    fn state(&self) -> ProbeState {
        self.state
    }

    fn begin(&mut self, status: &MachineStatus, _slot: &mut ProbeSlot) -> Vec<Command> {
        if self.state.is_active() {
            tracing::warn!(state = ?self.state, "Probe already running, ignoring begin");
            return Vec::new();
        }

        self.restore_relative = status.is_relative_mode;
        self.changed_distance_mode = false;
        self.state = ProbeState::MovedToProbeLocation;

        let mut commands = Vec::new();
        if let Some([x, y]) = self.config.location {
            commands.push(Command::line(format!("G53 G0 Z{:.3}", self.config.safe_z)));
            commands.push(Command::line(format!("G53 G0 X{:.3} Y{:.3}", x, y)));
        }

        tracing::info!(
            relative = self.restore_relative,
            "Probe started, press Start to probe the reference tool"
        );
        commands
    }

    fn advance(&mut self, _status: &MachineStatus, _slot: &mut ProbeSlot) -> Vec<Command> {
        match self.state {
            ProbeState::MovedToProbeLocation => {
                tracing::info!("Probing reference tool");
                self.start_probing(ProbeState::ProbingExisting)
            }
            ProbeState::ProbeExistingComplete => {
                tracing::info!("Probing new tool");
                self.start_probing(ProbeState::ProbingNew)
            }
            other => {
                tracing::debug!(state = ?other, "Probe not waiting for continuation");
                Vec::new()
            }
        }
    }

    fn on_new_result(&mut self, status: &MachineStatus, slot: &mut ProbeSlot) -> Vec<Command> {
        let probing = matches!(
            self.state,
            ProbeState::ProbingExisting | ProbeState::ProbingNew
        );
        if !probing {
            tracing::debug!(state = ?self.state, "Ignoring probe result outside a probe move");
            return Vec::new();
        }

        if !status.probe_succeeded {
            tracing::warn!("Probe made no contact, aborting tool length measurement");
            return self.abort(status, slot);
        }

        let contact_z = status.probe_position[Axis::Z.index()];
        let mut commands = vec![self.retract()];

        match self.state {
            ProbeState::ProbingExisting => {
                slot.reference_z = Some(contact_z);
                self.state = ProbeState::ProbeExistingComplete;
                tracing::info!(
                    reference_z = contact_z,
                    "Reference tool measured, change tool and press Start"
                );
            }
            _ => {
                // reference_z is always set when ProbingNew was reached
                let offset = contact_z - slot.reference_z.unwrap_or(contact_z);
                slot.tool_offset = Some(offset);
                commands.push(Command::line(format!("G43.1 Z{:.3}", offset)));
                tracing::info!(offset, "Tool length offset applied");
                self.finish(&mut commands);
            }
        }

        commands
    }

    fn abort(&mut self, _status: &MachineStatus, _slot: &mut ProbeSlot) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.state.is_active() {
            tracing::info!(state = ?self.state, "Probe aborted");
            self.finish(&mut commands);
        }
        commands
    }
}
