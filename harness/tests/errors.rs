// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::fs;

use common::{BlinkerDut, scratch_path};
use remora_harness::{
    ConfigError, DEFAULT_TRACE_DEPTH, DutModel, Harness, HarnessConfig,
    HarnessError, ModelError, SimContext, Stimulus, Waveform, WaveformError,
    WaveformOptions,
};

fn clocked(clock_port: &str, clock_period: u64) -> HarnessConfig {
    HarnessConfig {
        total_steps: 10,
        stimulus: Stimulus::Clocked {
            clock_port: clock_port.to_string(),
            clock_period,
            reset: None,
        },
        output_path: scratch_path("errors_scratch.vcd"),
        trace_depth: DEFAULT_TRACE_DEPTH,
    }
}

#[test]
fn rejects_odd_clock_period() {
    let error = Harness::new(clocked("i_clk", 7)).unwrap_err();
    assert!(matches!(
        error,
        HarnessError::Config {
            source: ConfigError::InvalidClockPeriod { period: 7 }
        }
    ));
}

#[test]
fn rejects_zero_clock_period() {
    let error = Harness::new(clocked("i_clk", 0)).unwrap_err();
    assert!(matches!(
        error,
        HarnessError::Config {
            source: ConfigError::InvalidClockPeriod { period: 0 }
        }
    ));
}

#[test]
fn rejects_empty_clock_port() {
    let error = Harness::new(clocked("", 10)).unwrap_err();
    assert!(matches!(
        error,
        HarnessError::Config {
            source: ConfigError::EmptyPortName { kind: "clock" }
        }
    ));
}

#[test]
fn rejects_empty_output_path() {
    let mut config = clocked("i_clk", 10);
    config.output_path = "".into();
    let error = Harness::new(config).unwrap_err();
    assert!(matches!(
        error,
        HarnessError::Config {
            source: ConfigError::EmptyOutputPath
        }
    ));
}

#[test]
fn unknown_clock_port_fails_at_the_first_step() {
    let output = scratch_path("unknown_port.vcd");
    let mut config = clocked("i_clock_typo", 10);
    config.output_path = output.clone();

    let mut ctx = SimContext::with_tracing();
    let mut model = BlinkerDut::new();
    let error = Harness::new(config)
        .expect("config is structurally valid")
        .run(&mut ctx, &mut model)
        .unwrap_err();
    assert!(matches!(
        error,
        HarnessError::Drive {
            time: 0,
            source: ModelError::NoSuchPort { .. }
        }
    ));

    // the file was created before the failure and must still be closed
    assert!(output.is_file());
    let _ = fs::remove_file(&output);
}

#[test]
fn output_into_missing_directory_is_reported() {
    let mut config = clocked("i_clk", 10);
    config.output_path = scratch_path("missing_directory").join("out.vcd");

    let mut ctx = SimContext::with_tracing();
    let mut model = BlinkerDut::new();
    let error = Harness::new(config)
        .expect("config is structurally valid")
        .run(&mut ctx, &mut model)
        .unwrap_err();
    assert!(matches!(
        error,
        HarnessError::Trace {
            source: WaveformError::Create { .. }
        }
    ));
}

#[test]
fn tracing_must_be_enabled_before_opening_a_waveform() {
    let mut config = clocked("i_clk", 10);
    config.output_path = scratch_path("tracing_disabled.vcd");

    let mut ctx = SimContext::new();
    let mut model = BlinkerDut::new();
    let error = Harness::new(config)
        .expect("config is structurally valid")
        .run(&mut ctx, &mut model)
        .unwrap_err();
    assert!(matches!(
        error,
        HarnessError::Trace {
            source: WaveformError::TracingDisabled
        }
    ));
}

#[test]
fn waveform_rejects_non_monotonic_timestamps() {
    let output = scratch_path("non_monotonic.vcd");
    let ctx = SimContext::with_tracing();
    let mut model = BlinkerDut::new();
    let mut waveform = Waveform::create(
        &ctx,
        &model,
        &output,
        &WaveformOptions::default(),
    )
    .expect("waveform should open");

    model.eval();
    waveform.dump(&model, 5).expect("first dump should succeed");
    let error = waveform.dump(&model, 5).unwrap_err();
    assert!(matches!(
        error,
        WaveformError::NonMonotonic {
            last: 5,
            attempted: 5
        }
    ));
    let error = waveform.dump(&model, 4).unwrap_err();
    assert!(matches!(
        error,
        WaveformError::NonMonotonic {
            last: 5,
            attempted: 4
        }
    ));
    // and a later timestamp still works
    waveform.dump(&model, 6).expect("monotonic dump should succeed");

    waveform.close().expect("close should succeed");
    let _ = fs::remove_file(&output);
}

#[test]
fn driving_an_output_port_is_rejected() {
    let mut model = BlinkerDut::new();
    let error = model.pin("o_led", 1).unwrap_err();
    assert!(matches!(error, ModelError::NotAnInput { .. }));
}

#[test]
fn overwide_pin_value_is_rejected() {
    let mut model = BlinkerDut::new();
    let error = model.pin("i_clk", 2).unwrap_err();
    assert!(matches!(
        error,
        ModelError::ValueTooWide {
            width: 1,
            value: 2,
            ..
        }
    ));
}
