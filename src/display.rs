//! Pendant LCD rendering and flow-controlled transmission
//!
//! A render fills the whole 24-byte [`DisplayReport`] before the first
//! packet leaves. Packets then go out one at a time: the next packet is
//! only sent from the completion of the previous one, so at most one
//! feature report is in flight per pendant.
//!
//! SPDX-License-Identifier: GPL-3.0

use crate::config::Config;
use crate::protocol::{
    indicator, DisplayReport, DISPLAY_PACKET_COUNT, DISPLAY_PACKET_LEN, DISPLAY_REPORT_ID,
};
use crate::state::{JogMode, MachineStatus, PendantState};

/// HID report type as used by feature report transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Input = 1,
    Output = 2,
    Feature = 3,
}

/// Outbound feature report transport
///
/// Completions are delivered later through
/// [`DisplayEncoder::on_complete`], never from inside `set_report`.
pub trait FeatureReportSink {
    /// Queue one packet; `false` if the transport refused it outright
    fn set_report(&mut self, report_id: u8, report_type: ReportType, data: &[u8]) -> bool;
}

/// Renders pendant/machine state and paces the packet stream
#[derive(Debug, Default)]
pub struct DisplayEncoder {
    report: DisplayReport,
    /// Index of the packet whose completion we are waiting for
    in_flight: Option<usize>,
}

impl DisplayEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last rendered report
    pub fn report(&self) -> &DisplayReport {
        &self.report
    }

    /// Whether a multi-packet send is in progress
    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Fill the report from the current state
    pub fn render(&mut self, state: &PendantState, status: &MachineStatus, config: &Config) {
        let offset = state.display_axis_offset;
        for slot in 0..3 {
            self.report.set_coordinate(slot, status.position[offset + slot]);
        }

        self.report.set_mode(match state.jog_mode {
            JogMode::Step => indicator::MODE_STEP,
            JogMode::Continuous => indicator::MODE_CONTINUOUS,
        });
        self.report
            .set_work_coordinates(config.display.show_work_coordinates);

        let feed_rate = state
            .selected_axis
            .map(|axis| config.jog.axis_feed_rates[axis.index()])
            .unwrap_or(0);
        self.report
            .set_feed_rate(u16::try_from(feed_rate).unwrap_or(u16::MAX));
        self.report.set_spindle_speed(status.spindle_speed);
    }

    /// Render and start sending, unless a send is already in flight
    ///
    /// Returns whether a new send was started. A dropped request is picked
    /// up by the next refresh tick.
    pub fn refresh(
        &mut self,
        state: &PendantState,
        status: &MachineStatus,
        config: &Config,
        sink: &mut dyn FeatureReportSink,
    ) -> bool {
        if let Some(packet) = self.in_flight {
            tracing::debug!(packet, "Display send in flight, dropping refresh");
            return false;
        }

        self.render(state, status, config);
        self.send_packet(0, sink)
    }

    /// Feature report completion from the transport
    pub fn on_complete(
        &mut self,
        report_id: u8,
        report_type: ReportType,
        len: usize,
        sink: &mut dyn FeatureReportSink,
    ) {
        let Some(packet) = self.in_flight else {
            tracing::debug!(report_id, "Completion without a display send in flight");
            return;
        };

        if len != DISPLAY_PACKET_LEN {
            tracing::warn!(
                packet,
                report_id = format!("0x{:02X}", report_id),
                report_type = ?report_type,
                len,
                "Display packet failed, aborting render"
            );
            self.in_flight = None;
            return;
        }

        let next = packet + 1;
        if next < DISPLAY_PACKET_COUNT {
            self.send_packet(next, sink);
        } else {
            tracing::trace!("Display report sent");
            self.in_flight = None;
        }
    }

    fn send_packet(&mut self, index: usize, sink: &mut dyn FeatureReportSink) -> bool {
        let Some(packet) = self.report.packet(index) else {
            self.in_flight = None;
            return false;
        };

        if sink.set_report(DISPLAY_REPORT_ID, ReportType::Feature, &packet) {
            self.in_flight = Some(index);
            true
        } else {
            tracing::warn!(packet = index, "Transport refused display packet");
            self.in_flight = None;
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
