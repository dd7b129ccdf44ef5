//! End-to-end pendant scenarios through the public API
//!
//! SPDX-License-Identifier: GPL-3.0

use std::sync::{Arc, Mutex};

use whb04b6d::display::{FeatureReportSink, ReportType};
use whb04b6d::protocol::{keycode, InputReport, DISPLAY_REPORT_ID, SEED};
use whb04b6d::{
    Command, CommandReceiver, CommandSink, Config, GrblStatusParser, PendantSession, RunState,
};

type PacketLog = Arc<Mutex<Vec<Vec<u8>>>>;

struct LoggingSink(PacketLog);

impl FeatureReportSink for LoggingSink {
    fn set_report(&mut self, _report_id: u8, _report_type: ReportType, data: &[u8]) -> bool {
        self.0.lock().unwrap().push(data.to_vec());
        true
    }
}

struct Bench {
    session: PendantSession,
    commands: CommandReceiver,
    packets: PacketLog,
    grbl: GrblStatusParser,
}

impl Bench {
    fn new() -> Self {
        let (sink, commands) = CommandSink::channel();
        let packets = PacketLog::default();
        let session = PendantSession::new(
            Arc::new(Config::default()),
            sink,
            Box::new(LoggingSink(packets.clone())),
        );
        let mut bench = Self {
            session,
            commands,
            packets,
            grbl: GrblStatusParser::new(true),
        };
        bench.complete_display();
        bench
    }

    fn send(&mut self, k1: u8, k2: u8, feed: u8, axis: u8, jog: i8) {
        let bytes = InputReport::new(0x37, k1, k2, feed, axis, jog).to_bytes();
        self.session.on_report(&bytes);
    }

    fn controller(&mut self, line: &str) {
        if let Some(status) = self.grbl.feed_line(line) {
            self.session.on_status(status);
        }
    }

    fn complete_display(&mut self) {
        while self.session.display().is_sending() {
            self.session
                .on_feature_report_complete(DISPLAY_REPORT_ID, ReportType::Feature, 8);
        }
        self.packets.lock().unwrap().clear();
    }

    fn commands(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            out.push(command);
        }
        out
    }

    fn packets(&self) -> Vec<Vec<u8>> {
        self.packets.lock().unwrap().clone()
    }
}

#[test]
fn wheel_on_x_at_finest_step() {
    let mut bench = Bench::new();
    bench.send(0, 0, 0x0D, 0x11, 0);

    let random = 0x37;
    let raw = [0x04, random, 0, 0, 0x0D, 0x11, 5, random & SEED];
    for _ in 0..3 {
        bench.session.on_report(&raw);
    }
    assert_eq!(bench.session.state().jog_accumulator, 15);

    bench.session.on_command_tick();
    assert_eq!(bench.commands(), vec![Command::line("$J=G91 X0.015 F6000")]);
    assert_eq!(bench.session.state().jog_accumulator, 0);
}

#[test]
fn bad_reports_are_noise() {
    let mut bench = Bench::new();
    bench.send(0, 0, 0x0E, 0x12, 2);
    let before = bench.session.state().clone();

    for random in 0..=255u8 {
        let good = InputReport::expected_checksum(random, keycode::RESET);
        let bad = good.wrapping_add(1);
        bench
            .session
            .on_report(&[0x04, random, keycode::RESET, 0, 0x0E, 0x12, 9, bad]);
    }
    bench.session.on_report(&[0x04, 0x37, 0, 0, 0x0E, 0x12, 9]);
    bench.session.on_report(&[0x03, 0x37, 0, 0, 0x0E, 0x12, 9, 0x37 & SEED]);

    assert_eq!(bench.session.state(), &before);
    assert!(bench.commands().is_empty());
}

#[test]
fn stop_during_cycle_holds() {
    let mut bench = Bench::new();
    bench.controller("<Run|MPos:0.000,0.000,0.000|FS:1000,0>");
    assert_eq!(bench.session.status().run_state, RunState::Cycle);

    bench.send(keycode::STOP, 0, 0x0D, 0x11, 0);
    assert_eq!(bench.commands(), vec![Command::Realtime(b'!')]);
}

#[test]
fn stop_during_homing_soft_resets() {
    let mut bench = Bench::new();
    bench.controller("<Home|MPos:0.000,0.000,0.000|FS:0,0>");
    bench.send(keycode::STOP, 0, 0x0D, 0x11, 0);
    assert_eq!(bench.commands(), vec![Command::Realtime(0x18)]);
}

#[test]
fn macros_wait_for_idle() {
    let mut bench = Bench::new();
    bench.controller("<Run|MPos:0.000,0.000,0.000|FS:1000,0>");
    bench.send(keycode::M6_SAFE_Z, 0, 0x0D, 0x11, 0);
    bench.send(0, 0, 0x0D, 0x11, 0);
    assert!(bench.commands().is_empty());

    bench.controller("<Idle|MPos:0.000,0.000,0.000|FS:0,0>");
    bench.send(keycode::M6_SAFE_Z, 0, 0x0D, 0x11, 0);
    assert_eq!(bench.commands(), vec![Command::line("$Macros/Run=6")]);
}

#[test]
fn short_completion_restarts_on_next_tick() {
    let mut bench = Bench::new();

    bench.session.on_display_tick();
    bench
        .session
        .on_feature_report_complete(DISPLAY_REPORT_ID, ReportType::Feature, 8);
    bench
        .session
        .on_feature_report_complete(DISPLAY_REPORT_ID, ReportType::Feature, 5);
    let aborted = bench.packets();
    assert_eq!(aborted.len(), 2);
    assert!(!bench.session.display().is_sending());

    bench.session.on_display_tick();
    let packets = bench.packets();
    assert_eq!(packets.len(), 3);
    assert_eq!(packets[2], packets[0]);
}

#[test]
fn tool_length_probe_through_controller_output() {
    let mut bench = Bench::new();
    bench.controller("<Idle|MPos:0.000,0.000,0.000|FS:0,0>");

    bench.send(keycode::FN, 0, 0x0D, 0x11, 0);
    bench.send(keycode::FN, keycode::M9_PROBE_Z, 0x0D, 0x11, 0);
    bench.send(0, 0, 0x0D, 0x11, 0);
    bench.send(keycode::START_PAUSE, 0, 0x0D, 0x11, 0);
    bench.send(0, 0, 0x0D, 0x11, 0);
    assert_eq!(
        bench.commands(),
        vec![Command::line("G91"), Command::line("G38.2 Z-50.000 F100")]
    );

    bench.controller("[PRB:0.000,0.000,-20.000:1]");
    bench.controller("<Idle|MPos:0.000,0.000,-20.000|FS:0,0>");
    assert_eq!(bench.commands(), vec![Command::line("G0 Z2.000")]);

    // a repeated status must not replay the probe result
    bench.controller("<Idle|MPos:0.000,0.000,-18.000|FS:0,0>");
    assert!(bench.commands().is_empty());

    bench.send(keycode::START_PAUSE, 0, 0x0D, 0x11, 0);
    bench.send(0, 0, 0x0D, 0x11, 0);
    bench.commands();

    bench.controller("[PRB:0.000,0.000,-21.250:1]");
    bench.controller("<Idle|MPos:0.000,0.000,-21.250|FS:0,0>");
    assert_eq!(
        bench.commands(),
        vec![
            Command::line("G0 Z2.000"),
            Command::line("G43.1 Z-1.250"),
            Command::line("G90"),
        ]
    );
    assert_eq!(bench.session.probe_slot().tool_offset, Some(-1.25));
}

#[test]
fn display_shows_work_position() {
    let mut bench = Bench::new();
    bench.controller("<Idle|MPos:10.000,5.000,-1.000|FS:0,6000|WCO:2.000,1.000,-3.000>");
    bench.complete_display();

    bench.session.on_display_tick();
    bench.complete_display();

    let report = bench.session.display().report();
    assert!((report.coordinate(0) - 8.0).abs() < 1e-4);
    assert!((report.coordinate(1) - 4.0).abs() < 1e-4);
    assert!((report.coordinate(2) - 2.0).abs() < 1e-4);
}
