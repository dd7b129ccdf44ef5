//! Pendant session state and the controller status mirror
//!
//! SPDX-License-Identifier: GPL-3.0

use crate::protocol::{Axis, FeedSelection, InputReport, AXIS_COUNT};

/// Jog behaviour selected with the Continuous / Step keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JogMode {
    /// Wheel detents move a fixed distance each
    #[default]
    Step,
    /// Wheel drives a sustained velocity
    Continuous,
}

/// Spindle rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpindleDirection {
    #[default]
    None,
    Cw,
    Ccw,
}

/// Controller run state as reported by status updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Hold,
    Cycle,
    Jog,
    Homing,
    Alarm,
}

/// Snapshot of the controller state, replaced wholesale on every update
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MachineStatus {
    /// Position per axis (X, Y, Z, A, B, C)
    pub position: [f64; AXIS_COUNT],
    /// Spindle speed (RPM)
    pub spindle_speed: u16,
    /// Whether the spindle is running
    pub spindle_on: bool,
    /// Direction of the running spindle
    pub spindle_direction: SpindleDirection,
    /// G91 distance mode active
    pub is_relative_mode: bool,
    /// G20 units active
    pub is_inch_mode: bool,
    /// Controller run state
    pub run_state: RunState,
    /// Last probe trigger position
    pub probe_position: [f64; AXIS_COUNT],
    /// Whether the last probe cycle made contact
    pub probe_succeeded: bool,
    /// A probe result arrived since the previous update (one-shot)
    pub new_probe_result: bool,
}

/// What a selection update changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionChange {
    pub feed_changed: bool,
    pub axis_changed: bool,
}

impl SelectionChange {
    pub fn any(&self) -> bool {
        self.feed_changed || self.axis_changed
    }
}

/// Operator intent tracked across reports
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PendantState {
    /// Axis rotary switch
    pub selected_axis: Option<Axis>,
    /// Feed/step rotary switch
    pub selected_feed: Option<FeedSelection>,
    /// Wheel detents accumulated since the last command tick
    pub jog_accumulator: i32,
    /// Step or continuous jog
    pub jog_mode: JogMode,
    /// Fn key held in the latest report
    pub function_key_held: bool,
    /// Axis of the running continuous jog
    pub continuous_axis: Option<Axis>,
    /// Direction of the running continuous jog (true = positive)
    pub continuous_direction: bool,
    /// Direction to use when the spindle is switched back on
    pub last_spindle_direction: SpindleDirection,
    /// First of the three coordinates shown on the display (0 or 3)
    pub display_axis_offset: usize,
    /// Keys held in the previous report
    pub held_keys: [u8; 2],
}

impl PendantState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a report's wheel delta and selector positions into the state
    ///
    /// The accumulator always takes the delta. Any selection change clears
    /// it; the caller is responsible for stopping continuous motion.
    pub fn apply_report(&mut self, report: &InputReport) -> SelectionChange {
        let mut change = SelectionChange::default();

        self.jog_accumulator = self.jog_accumulator.saturating_add(report.jog_delta as i32);

        let feed = report.feed();
        if feed != self.selected_feed {
            self.selected_feed = feed;
            self.jog_accumulator = 0;
            change.feed_changed = true;
        }

        let axis = report.axis();
        if axis != self.selected_axis {
            self.selected_axis = axis;
            self.display_axis_offset = Self::axis_offset(axis);
            self.jog_accumulator = 0;
            change.axis_changed = true;
        }

        change
    }

    /// Offset of the coordinate triple that contains the axis
    pub fn axis_offset(axis: Option<Axis>) -> usize {
        match axis {
            Some(Axis::A) | Some(Axis::B) | Some(Axis::C) => 3,
            _ => 0,
        }
    }

    /// Consume the accumulated wheel delta
    pub fn take_jog(&mut self) -> i32 {
        std::mem::take(&mut self.jog_accumulator)
    }

    /// Whether a continuous jog is in progress
    pub fn is_continuous_active(&self) -> bool {
        self.continuous_axis.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
