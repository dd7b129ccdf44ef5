//! Wheel jog command generation
//!
//! Runs on the command tick, not per report. Step mode turns the detents
//! accumulated since the last tick into one relative jog. Continuous mode
//! queues one tick's worth of travel at a share of the axis feed rate on
//! every tick the wheel keeps turning, and cancels the queued motion once
//! the wheel stops; it only runs when enabled in the configuration.
//!
//! SPDX-License-Identifier: GPL-3.0

use crate::command::Command;
use crate::config::JogConfig;
use crate::protocol::Axis;
use crate::state::{JogMode, PendantState};

/// Format a GRBL relative jog
fn jog_line(axis: Axis, distance: f64, feed: u32) -> Command {
    Command::line(format!("$J=G91 {}{:.3} F{}", axis.letter(), distance, feed))
}

/// Relative move for `jog` detents at the selected step size
///
/// `None` when there is nothing to move or no usable axis/step selection.
pub fn step_command(state: &PendantState, jog: i32, config: &JogConfig) -> Option<Command> {
    if jog == 0 {
        return None;
    }
    let axis = state.selected_axis?;
    let step = state.selected_feed?.step_size()?;
    let feed = config.axis_feed_rates[axis.index()];

    Some(jog_line(axis, jog as f64 * step, feed))
}

/// Cancel the running continuous jog, if any
pub fn stop_continuous(state: &mut PendantState) -> Option<Command> {
    let axis = state.continuous_axis.take()?;
    tracing::debug!(axis = %axis, "Stopping continuous jog");
    Some(Command::jog_cancel())
}

/// One command tick; the accumulator is always consumed
pub fn tick(state: &mut PendantState, config: &JogConfig) -> Vec<Command> {
    let jog = state.take_jog();

    match state.jog_mode {
        JogMode::Step => step_command(state, jog, config).into_iter().collect(),
        JogMode::Continuous if config.continuous_enabled => continuous_tick(state, jog, config),
        JogMode::Continuous => {
            if jog != 0 {
                tracing::trace!(jog, "Continuous jogging disabled, discarding wheel movement");
            }
            Vec::new()
        }
    }
}

fn continuous_tick(state: &mut PendantState, jog: i32, config: &JogConfig) -> Vec<Command> {
    let percent = state.selected_feed.and_then(|f| f.continuous_percent());
    let target = match (state.selected_axis, percent) {
        (Some(axis), Some(percent)) if jog.unsigned_abs() >= config.continuous_threshold => {
            Some((axis, jog > 0, percent))
        }
        _ => None,
    };

    let mut commands = Vec::new();
    let Some((axis, positive, percent)) = target else {
        commands.extend(stop_continuous(state));
        return commands;
    };

    let running = state.continuous_axis == Some(axis) && state.continuous_direction == positive;
    if !running {
        commands.extend(stop_continuous(state));
    }

    let feed = scaled_feed(config.axis_feed_rates[axis.index()], percent);
    let length = segment_length(feed, config);
    if feed == 0 || length <= 0.0 {
        tracing::trace!(axis = %axis, feed, "Continuous jog has no speed");
        commands.extend(stop_continuous(state));
        return commands;
    }

    // Segments queue in the controller's planner, so motion keeps going
    // for as long as the wheel does and ends with the cancel
    let distance = if positive { length } else { -length };
    commands.push(jog_line(axis, distance, feed));

    if !running {
        tracing::debug!(axis = %axis, positive, feed, "Continuous jog started");
    }
    state.continuous_axis = Some(axis);
    state.continuous_direction = positive;

    commands
}

/// Axis feed scaled by a continuous speed percentage
fn scaled_feed(axis_feed: u32, percent: u32) -> u32 {
    let feed = u64::from(axis_feed) * u64::from(percent) / 100;
    u32::try_from(feed).unwrap_or(u32::MAX)
}

/// Distance covered at `feed` during one command tick, capped by the config
fn segment_length(feed: u32, config: &JogConfig) -> f64 {
    let per_tick = f64::from(feed) * config.command_interval_ms as f64 / 60_000.0;
    per_tick.min(config.continuous_distance)
}
