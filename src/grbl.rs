//! GRBL status collaborator
//!
//! Turns the controller's text output into [`MachineStatus`] snapshots.
//! Three kinds of lines matter:
//!
//! - `<Idle|MPos:0.000,0.000,0.000|FS:0,0|WCO:...>` status reports, each of
//!   which yields a snapshot
//! - `[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]` parser state, which
//!   updates unit, distance mode and spindle state
//! - `[PRB:0.000,0.000,-1.234:1]` probe results, flagged on the next snapshot
//!
//! Everything else (`ok`, `error:n`, `ALARM:n`, welcome banner) is ignored.
//!
//! SPDX-License-Identifier: GPL-3.0

use crate::protocol::AXIS_COUNT;
use crate::state::{MachineStatus, RunState, SpindleDirection};

/// Running view of the controller assembled from its output
#[derive(Debug, Clone, Default)]
pub struct GrblStatusParser {
    status: MachineStatus,
    /// Last reported work coordinate offset; GRBL only sends it now and then
    wco: [f64; AXIS_COUNT],
    show_work_coordinates: bool,
    pending_probe: bool,
}

impl GrblStatusParser {
    pub fn new(show_work_coordinates: bool) -> Self {
        Self {
            show_work_coordinates,
            ..Self::default()
        }
    }

    /// Current view without consuming the probe flag
    pub fn status(&self) -> &MachineStatus {
        &self.status
    }

    /// Feed one line of controller output
    ///
    /// Returns a snapshot for status reports. A pending probe result is
    /// flagged on exactly one snapshot.
    pub fn feed_line(&mut self, line: &str) -> Option<MachineStatus> {
        let line = line.trim();

        if let Some(body) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
            self.parse_status_report(body);
            let mut snapshot = self.status.clone();
            snapshot.new_probe_result = std::mem::take(&mut self.pending_probe);
            return Some(snapshot);
        }

        if let Some(body) = line.strip_prefix("[GC:").and_then(|l| l.strip_suffix(']')) {
            self.parse_parser_state(body);
        } else if let Some(body) = line.strip_prefix("[PRB:").and_then(|l| l.strip_suffix(']')) {
            self.parse_probe(body);
        } else if line.starts_with("ALARM:") || line.starts_with("error:") {
            tracing::warn!(line, "Controller reported a problem");
        }

        None
    }

    // ========================================================================
    // Status report
    // ========================================================================

    fn parse_status_report(&mut self, body: &str) {
        let mut fields = body.split('|');

        if let Some(state) = fields.next() {
            match parse_run_state(state) {
                Some(run_state) => self.status.run_state = run_state,
                None => tracing::debug!(state, "Unknown controller state"),
            }
        }

        let mut mpos = None;
        let mut wpos = None;
        let mut overrides_reported = false;
        let mut accessories = "";

        for field in fields {
            let Some((name, value)) = field.split_once(':') else {
                continue;
            };
            match name {
                "MPos" => mpos = parse_axes(value),
                "WPos" => wpos = parse_axes(value),
                "WCO" => {
                    if let Some(wco) = parse_axes(value) {
                        self.wco = wco;
                    }
                }
                "FS" => {
                    if let Some(speed) = value.split(',').nth(1) {
                        self.status.spindle_speed = parse_speed(speed);
                    }
                }
                "Ov" => overrides_reported = true,
                "A" => accessories = value,
                _ => {}
            }
        }

        // Machine and work positions differ by the work coordinate offset
        let position = match (mpos, wpos) {
            (Some(m), _) if !self.show_work_coordinates => Some(m),
            (Some(m), _) => Some(std::array::from_fn(|i| m[i] - self.wco[i])),
            (None, Some(w)) if self.show_work_coordinates => Some(w),
            (None, Some(w)) => Some(std::array::from_fn(|i| w[i] + self.wco[i])),
            (None, None) => None,
        };
        if let Some(position) = position {
            self.status.position = position;
        }

        // Accessory state is only present alongside overrides; no A: then
        // means no accessory is on
        if overrides_reported || !accessories.is_empty() {
            self.apply_accessories(accessories);
        }
    }

    fn apply_accessories(&mut self, accessories: &str) {
        let direction = if accessories.contains('S') {
            SpindleDirection::Cw
        } else if accessories.contains('C') {
            SpindleDirection::Ccw
        } else {
            SpindleDirection::None
        };
        self.status.spindle_on = direction != SpindleDirection::None;
        self.status.spindle_direction = direction;
    }

    // ========================================================================
    // Parser state and probe
    // ========================================================================

    fn parse_parser_state(&mut self, body: &str) {
        for word in body.split_whitespace() {
            match word {
                "G20" => self.status.is_inch_mode = true,
                "G21" => self.status.is_inch_mode = false,
                "G90" => self.status.is_relative_mode = false,
                "G91" => self.status.is_relative_mode = true,
                "M3" => self.set_spindle(SpindleDirection::Cw),
                "M4" => self.set_spindle(SpindleDirection::Ccw),
                "M5" => self.set_spindle(SpindleDirection::None),
                _ => {}
            }
        }
    }

    fn set_spindle(&mut self, direction: SpindleDirection) {
        self.status.spindle_on = direction != SpindleDirection::None;
        self.status.spindle_direction = direction;
    }

    fn parse_probe(&mut self, body: &str) {
        let Some((coords, success)) = body.rsplit_once(':') else {
            tracing::debug!(body, "Malformed probe result");
            return;
        };
        let Some(position) = parse_axes(coords) else {
            tracing::debug!(body, "Malformed probe position");
            return;
        };

        self.status.probe_position = position;
        self.status.probe_succeeded = success.trim() == "1";
        self.pending_probe = true;
        tracing::info!(
            z = position[2],
            success = self.status.probe_succeeded,
            "Probe result received"
        );
    }
}

/// Map a GRBL state name (with optional `:n` sub-state) to a run state
fn parse_run_state(state: &str) -> Option<RunState> {
    let name = state.split(':').next().unwrap_or(state);
    let run_state = match name {
        "Idle" | "Check" | "Sleep" => RunState::Idle,
        "Run" => RunState::Cycle,
        "Hold" | "Door" => RunState::Hold,
        "Jog" => RunState::Jog,
        "Home" => RunState::Homing,
        "Alarm" => RunState::Alarm,
        _ => return None,
    };
    Some(run_state)
}

/// Comma separated axis values; missing axes are zero
fn parse_axes(value: &str) -> Option<[f64; AXIS_COUNT]> {
    let coords: Vec<f64> = value
        .split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .collect();

    if coords.len() < 3 {
        return None;
    }

    let mut axes = [0.0; AXIS_COUNT];
    for (axis, value) in axes.iter_mut().zip(coords) {
        *axis = value;
    }
    Some(axes)
}

fn parse_speed(value: &str) -> u16 {
    let speed = value.trim().parse::<f64>().unwrap_or(0.0);
    speed.clamp(0.0, u16::MAX as f64) as u16
}

// ============================================================================
// Tests
// ============================================================================
