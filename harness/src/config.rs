// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Bench configuration: what to drive, for how long, and where to record.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use snafu::{ensure, whatever, ResultExt, Snafu, Whatever};

use crate::trace::DEFAULT_TRACE_DEPTH;

/// Input schedule applied to the model over a bench run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stimulus {
    /// Drive nothing: evaluate and record the model each step with its inputs
    /// left wherever they are. Combinational designs and self-clocking
    /// testbench tops are benched this way.
    Free,

    /// Toggle a clock input on a fixed period, optionally holding a reset
    /// input at the start of the run.
    Clocked {
        /// Name of the clock input port.
        clock_port: String,

        /// Full clock period in time steps. Must be even and nonzero: the
        /// clock starts low and toggles every half period.
        clock_period: u64,

        /// Optional power-on reset schedule.
        reset: Option<ResetSchedule>,
    },
}

/// Active-high reset held over the opening steps of a bench run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetSchedule {
    /// Name of the reset input port.
    pub reset_port: String,

    /// Last time step at which reset is asserted. The port reads 1 at every
    /// step up to and including this time and 0 at every step after it, so
    /// the run contains exactly one deassertion edge.
    pub deassert_time: u64,
}

/// Everything a bench run needs besides the model itself.
///
/// Can be built in code or loaded from a TOML file shaped like:
///
/// ```toml
/// [harness]
/// total_steps = 100000
/// output = "one_led_nominal_timing_tb.vcd"
///
/// [harness.clock]
/// port = "i_clk"
/// period = 10
///
/// [harness.reset]
/// port = "i_rst"
/// deassert_time = 100
/// ```
///
/// Leaving out `[harness.clock]` selects [`Stimulus::Free`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// How many time steps to simulate. Each step evaluates the model once
    /// and records one waveform sample.
    pub total_steps: u64,

    /// Input schedule for the run.
    pub stimulus: Stimulus,

    /// Where to write the VCD waveform.
    pub output_path: Utf8PathBuf,

    /// Hierarchy depth to record, counting the top module as level 1.
    pub trace_depth: u32,
}

/// A structurally invalid [`HarnessConfig`].
#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display(
        "Clock period must be a nonzero even number of time steps, got {period}"
    ))]
    InvalidClockPeriod { period: u64 },
    #[snafu(display("The {kind} port name must not be empty"))]
    EmptyPortName { kind: &'static str },
    #[snafu(display("The waveform output path must not be empty"))]
    EmptyOutputPath,
    #[snafu(display(
        "Trace depth must be at least 1 so the top module scope is recorded"
    ))]
    ZeroTraceDepth,
}

impl HarnessConfig {
    /// Checks the structural invariants that make a config runnable at all.
    /// [`Harness::new`](crate::driver::Harness::new) calls this for you.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Stimulus::Clocked {
            clock_port,
            clock_period,
            reset,
        } = &self.stimulus
        {
            ensure!(
                !clock_port.is_empty(),
                EmptyPortNameSnafu { kind: "clock" }
            );
            ensure!(
                *clock_period != 0 && clock_period % 2 == 0,
                InvalidClockPeriodSnafu {
                    period: *clock_period
                }
            );
            if let Some(reset) = reset {
                ensure!(
                    !reset.reset_port.is_empty(),
                    EmptyPortNameSnafu { kind: "reset" }
                );
            }
        }
        ensure!(!self.output_path.as_str().is_empty(), EmptyOutputPathSnafu);
        ensure!(self.trace_depth >= 1, ZeroTraceDepthSnafu);
        Ok(())
    }

    /// Reads a bench configuration from the TOML file at `path`.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, Whatever> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).whatever_context(format!(
            "Failed to read bench configuration at {}",
            path
        ))?;
        Self::from_toml_str(&contents).whatever_context(format!(
            "Invalid bench configuration at {}",
            path
        ))
    }

    /// Parses a bench configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, Whatever> {
        let value: toml::Value = toml::from_str(contents)
            .whatever_context("Failed to parse bench configuration as TOML")?;
        Self::from_toml(&value)
    }

    /// Extracts a bench configuration from an already-parsed TOML document
    /// containing a `[harness]` table.
    pub fn from_toml(value: &toml::Value) -> Result<Self, Whatever> {
        let Some(harness) = value.get("harness") else {
            whatever!("Missing [harness] table in bench configuration");
        };

        let Some(total_steps) = harness
            .get("total_steps")
            .and_then(|steps| steps.as_integer())
        else {
            whatever!("Missing integer `total_steps` under [harness]");
        };
        if total_steps < 0 {
            whatever!("`total_steps` must not be negative, got {}", total_steps);
        }

        let Some(output) =
            harness.get("output").and_then(|output| output.as_str())
        else {
            whatever!("Missing string `output` under [harness]");
        };

        let trace_depth = match harness.get("trace_depth") {
            None => DEFAULT_TRACE_DEPTH,
            Some(depth) => {
                let Some(depth) = depth.as_integer() else {
                    whatever!("`trace_depth` under [harness] must be an integer");
                };
                if depth < 1 || depth > i64::from(u32::MAX) {
                    whatever!(
                        "`trace_depth` under [harness] is out of range: {}",
                        depth
                    );
                }
                depth as u32
            }
        };

        let reset = match harness.get("reset") {
            None => None,
            Some(reset) => {
                let Some(port) =
                    reset.get("port").and_then(|port| port.as_str())
                else {
                    whatever!("Missing string `port` under [harness.reset]");
                };
                let Some(deassert_time) = reset
                    .get("deassert_time")
                    .and_then(|time| time.as_integer())
                else {
                    whatever!(
                        "Missing integer `deassert_time` under [harness.reset]"
                    );
                };
                if deassert_time < 0 {
                    whatever!(
                        "`deassert_time` must not be negative, got {}",
                        deassert_time
                    );
                }
                Some(ResetSchedule {
                    reset_port: port.to_string(),
                    deassert_time: deassert_time as u64,
                })
            }
        };

        let stimulus = match harness.get("clock") {
            None => {
                if reset.is_some() {
                    whatever!("[harness.reset] requires a [harness.clock] table");
                }
                Stimulus::Free
            }
            Some(clock) => {
                let Some(port) =
                    clock.get("port").and_then(|port| port.as_str())
                else {
                    whatever!("Missing string `port` under [harness.clock]");
                };
                let Some(period) =
                    clock.get("period").and_then(|period| period.as_integer())
                else {
                    whatever!("Missing integer `period` under [harness.clock]");
                };
                if period < 0 {
                    whatever!("`period` must not be negative, got {}", period);
                }
                Stimulus::Clocked {
                    clock_port: port.to_string(),
                    clock_period: period as u64,
                    reset,
                }
            }
        };

        let config = Self {
            total_steps: total_steps as u64,
            stimulus,
            output_path: Utf8PathBuf::from(output),
            trace_depth,
        };
        config
            .validate()
            .whatever_context("Invalid bench configuration")?;
        Ok(config)
    }
}
