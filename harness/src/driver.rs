// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The bench driver: stimulus scheduling around an eval/dump loop.

use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use snafu::{ResultExt, Snafu};

use crate::{
    config::{ConfigError, HarnessConfig, Stimulus},
    context::SimContext,
    model::{DutModel, ModelError},
    trace::{Waveform, WaveformError, WaveformOptions},
};

/// Optional configuration for creating a [`Harness`]. Usually, you can just
/// use [`HarnessOptions::default()`].
#[derive(Debug, Default)]
pub struct HarnessOptions {
    /// Whether to use the log crate.
    pub log: bool,
}

impl HarnessOptions {
    /// The same as the [`Default`] implementation except that the log crate is
    /// used.
    pub fn default_logging() -> Self {
        Self { log: true }
    }
}

/// What a completed bench run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Time steps simulated.
    pub steps: u64,

    /// Timestamped samples recorded, always equal to `steps`.
    pub samples: u64,

    /// Where the waveform was written.
    pub output_path: Utf8PathBuf,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Bench run error.
#[derive(Debug, Snafu)]
pub enum HarnessError {
    #[snafu(display("Invalid bench configuration"))]
    Config { source: ConfigError },
    #[snafu(display("Failed to record the waveform"))]
    Trace { source: WaveformError },
    #[snafu(display("Failed to drive stimulus at time {time}"))]
    Drive { time: u64, source: ModelError },
}

/// Drives a model through a scripted stimulus schedule while recording a
/// waveform.
#[derive(Debug)]
pub struct Harness {
    config: HarnessConfig,
    options: HarnessOptions,
}

impl Harness {
    /// Creates a harness for `config`, rejecting structurally invalid
    /// configurations up front rather than partway through a run.
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        Self::with_options(config, HarnessOptions::default())
    }

    /// The same as [`Harness::new`] with control over [`HarnessOptions`].
    pub fn with_options(
        config: HarnessConfig,
        options: HarnessOptions,
    ) -> Result<Self, HarnessError> {
        config.validate().context(ConfigSnafu)?;
        Ok(Self { config, options })
    }

    /// The configuration this harness runs.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs the bench to completion.
    ///
    /// Each of the `total_steps` iterations drives the scheduled stimulus for
    /// the current time, calls [`DutModel::eval`], records one waveform
    /// sample, and advances `ctx` by one time step. The waveform therefore
    /// holds exactly `total_steps` samples at times `t..t + total_steps`
    /// where `t` is the context's starting time. The file is flushed and
    /// closed on both success and error.
    pub fn run<M: DutModel>(
        &self,
        ctx: &mut SimContext,
        model: &mut M,
    ) -> Result<RunSummary, HarnessError> {
        let start = Instant::now();

        if self.options.log {
            log::info!(
                "Opening waveform {} for model {}",
                self.config.output_path,
                model.top_name()
            );
        }
        let waveform_options = WaveformOptions {
            depth: self.config.trace_depth,
            ..Default::default()
        };
        let mut waveform = Waveform::create(
            ctx,
            model,
            &self.config.output_path,
            &waveform_options,
        )
        .context(TraceSnafu)?;

        for _ in 0..self.config.total_steps {
            let time = ctx.time();
            self.drive(model, time).context(DriveSnafu { time })?;
            model.eval();
            waveform.dump(model, time).context(TraceSnafu)?;
            ctx.advance(1);
        }

        let samples = waveform.samples();
        waveform.close().context(TraceSnafu)?;

        if self.options.log {
            log::info!(
                "Recorded {} samples to {}",
                samples,
                self.config.output_path
            );
        }

        Ok(RunSummary {
            steps: self.config.total_steps,
            samples,
            output_path: self.config.output_path.clone(),
            elapsed: start.elapsed(),
        })
    }

    fn drive<M: DutModel>(
        &self,
        model: &mut M,
        time: u64,
    ) -> Result<(), ModelError> {
        match &self.config.stimulus {
            Stimulus::Free => Ok(()),
            Stimulus::Clocked {
                clock_port,
                clock_period,
                reset,
            } => {
                model
                    .pin(clock_port, clock_level(time, *clock_period) as u64)?;
                if let Some(schedule) = reset {
                    model.pin(
                        &schedule.reset_port,
                        reset_level(time, schedule.deassert_time) as u64,
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// Clock level at `time` for a full period of `period` steps: low for the
/// first half period, then toggling every half period.
fn clock_level(time: u64, period: u64) -> bool {
    (time / (period / 2)) % 2 == 1
}

/// Reset level at `time`: asserted through `deassert_time` inclusive.
fn reset_level(time: u64, deassert_time: u64) -> bool {
    time <= deassert_time
}
