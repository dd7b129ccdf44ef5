//! Report-to-command and display render latency
//!
//! SPDX-License-Identifier: GPL-3.0

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use whb04b6d::display::{DisplayEncoder, FeatureReportSink, ReportType};
use whb04b6d::protocol::{keycode, InputReport};
use whb04b6d::{CommandSink, Config, MachineStatus, PendantSession, PendantState};

struct NullSink;

impl FeatureReportSink for NullSink {
    fn set_report(&mut self, _report_id: u8, _report_type: ReportType, _data: &[u8]) -> bool {
        true
    }
}

fn bench_decode(c: &mut Criterion) {
    let bytes = InputReport::new(0x5A, keycode::STOP, 0, 0x0D, 0x11, 3).to_bytes();
    c.bench_function("decode_input_report", |b| {
        b.iter(|| InputReport::parse(black_box(&bytes)))
    });
}

fn bench_render(c: &mut Criterion) {
    let config = Config::default();
    let state = PendantState::default();
    let status = MachineStatus {
        position: [-965.2345, 12.5, 3.0, 0.0, 0.0, 0.0],
        spindle_speed: 12000,
        ..MachineStatus::default()
    };
    let mut encoder = DisplayEncoder::new();

    c.bench_function("render_display_report", |b| {
        b.iter(|| encoder.render(black_box(&state), black_box(&status), &config))
    });
}

fn bench_report_to_command(c: &mut Criterion) {
    let (sink, mut rx) = CommandSink::channel();
    let mut session = PendantSession::new(Arc::new(Config::default()), sink, Box::new(NullSink));
    let wheel = InputReport::new(0x5A, 0, 0, 0x0D, 0x11, 2).to_bytes();
    session.on_report(&wheel);

    c.bench_function("wheel_report_and_tick", |b| {
        b.iter(|| {
            session.on_report(black_box(&wheel));
            session.on_command_tick();
            while rx.try_recv().is_ok() {}
        })
    });
}

criterion_group!(benches, bench_decode, bench_render, bench_report_to_command);
criterion_main!(benches);
