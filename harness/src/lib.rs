// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! This crate implements the bench harness runtime for driving compiled
//! hardware models: scripted clock and reset schedules around an eval/dump
//! loop, with deterministic VCD recording.
//!
//! Models reach the harness through the [`DutModel`] trait, so the driver is
//! pure Rust and needs no hardware toolchain. The `remora-verilator` crate
//! supplies the Verilator-backed implementation of the trait.

pub mod config;
pub mod context;
pub mod driver;
pub mod model;
pub mod trace;

pub use config::{ConfigError, HarnessConfig, ResetSchedule, Stimulus};
pub use context::SimContext;
pub use driver::{Harness, HarnessError, HarnessOptions, RunSummary};
pub use model::{DutModel, ModelError, PortDirection, TracePoint};
pub use trace::{DEFAULT_TRACE_DEPTH, Waveform, WaveformError, WaveformOptions};
