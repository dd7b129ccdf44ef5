//! Mounted pendants and engine event dispatch
//!
//! The [`DeviceTable`] is the single owner of every [`PendantSession`].
//! Sessions are created on mount and dropped on unmount, which stops any
//! continuous jog they still have running. Mounting an identifier that is
//! already present replaces the old session.
//!
//! SPDX-License-Identifier: GPL-3.0

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::command::CommandSink;
use crate::config::Config;
use crate::display::{FeatureReportSink, ReportType};
use crate::session::PendantSession;
use crate::state::MachineStatus;

/// Stable identifier of a mounted pendant (hidraw node path)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Everything the engine task reacts to
pub enum EngineEvent {
    /// A pendant receiver appeared
    Mounted {
        device: DeviceId,
        sink: Box<dyn FeatureReportSink + Send>,
    },
    /// A pendant receiver went away
    Unmounted { device: DeviceId },
    /// Raw input report
    Report { device: DeviceId, data: Vec<u8> },
    /// Feature report transfer finished
    FeatureReportComplete {
        device: DeviceId,
        report_id: u8,
        report_type: ReportType,
        len: usize,
    },
    /// New controller status, shared by all pendants
    Status(MachineStatus),
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::Mounted { device, .. } => {
                f.debug_struct("Mounted").field("device", device).finish()
            }
            EngineEvent::Unmounted { device } => {
                f.debug_struct("Unmounted").field("device", device).finish()
            }
            EngineEvent::Report { device, data } => f
                .debug_struct("Report")
                .field("device", device)
                .field("data", data)
                .finish(),
            EngineEvent::FeatureReportComplete {
                device,
                report_id,
                report_type,
                len,
            } => f
                .debug_struct("FeatureReportComplete")
                .field("device", device)
                .field("report_id", report_id)
                .field("report_type", report_type)
                .field("len", len)
                .finish(),
            EngineEvent::Status(status) => f.debug_tuple("Status").field(status).finish(),
        }
    }
}

/// Owned collection of pendant sessions
pub struct DeviceTable {
    config: Arc<Config>,
    commands: CommandSink,
    sessions: HashMap<DeviceId, PendantSession>,
    /// Latest controller status, handed to newly mounted pendants
    last_status: Option<MachineStatus>,
}

impl DeviceTable {
    pub fn new(config: Arc<Config>, commands: CommandSink) -> Self {
        Self {
            config,
            commands,
            sessions: HashMap::new(),
            last_status: None,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, device: &DeviceId) -> bool {
        self.sessions.contains_key(device)
    }

    pub fn session(&self, device: &DeviceId) -> Option<&PendantSession> {
        self.sessions.get(device)
    }

    /// Create a session for a newly mounted pendant
    pub fn mount(&mut self, device: DeviceId, sink: Box<dyn FeatureReportSink + Send>) {
        if let Some(old) = self.sessions.remove(&device) {
            tracing::warn!(device = %device, "Duplicate mount, replacing session");
            drop(old);
        }

        let mut session = PendantSession::new(self.config.clone(), self.commands.clone(), sink);
        if let Some(status) = &self.last_status {
            let mut status = status.clone();
            status.new_probe_result = false;
            session.on_status(status);
        }

        tracing::info!(device = %device, "Pendant mounted");
        self.sessions.insert(device, session);
    }

    /// Drop the session of a removed pendant
    pub fn unmount(&mut self, device: &DeviceId) -> bool {
        match self.sessions.remove(device) {
            Some(_) => {
                tracing::info!(device = %device, "Pendant unmounted");
                true
            }
            None => {
                tracing::debug!(device = %device, "Unmount for unknown device");
                false
            }
        }
    }

    /// Drop every session
    pub fn clear(&mut self) {
        for (device, _) in self.sessions.drain() {
            tracing::info!(device = %device, "Pendant session closed");
        }
    }

    /// Route one event to the session(s) it concerns
    pub fn dispatch(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Mounted { device, sink } => self.mount(device, sink),
            EngineEvent::Unmounted { device } => {
                self.unmount(&device);
            }
            EngineEvent::Report { device, data } => match self.sessions.get_mut(&device) {
                Some(session) => session.on_report(&data),
                None => tracing::trace!(device = %device, "Report from unmounted device"),
            },
            EngineEvent::FeatureReportComplete {
                device,
                report_id,
                report_type,
                len,
            } => {
                if let Some(session) = self.sessions.get_mut(&device) {
                    session.on_feature_report_complete(report_id, report_type, len);
                }
            }
            EngineEvent::Status(status) => {
                for session in self.sessions.values_mut() {
                    session.on_status(status.clone());
                }
                self.last_status = Some(status);
            }
        }
    }

    /// Jog tick for every pendant
    pub fn on_command_tick(&mut self) {
        for session in self.sessions.values_mut() {
            session.on_command_tick();
        }
    }

    /// Display refresh tick for every pendant
    pub fn on_display_tick(&mut self) {
        for session in self.sessions.values_mut() {
            session.on_display_tick();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
