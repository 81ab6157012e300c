// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Simulation-wide state threaded through a bench run.

/// Simulation time and tracing state for a single simulation.
///
/// Verilator keeps the equivalent state in process-wide globals, which makes
/// back-to-back simulations in one process interfere with each other. Here it
/// is an explicit value: create one per bench run and pass it to
/// [`Harness::run`](crate::driver::Harness::run).
#[derive(Debug, Default, Clone)]
pub struct SimContext {
    time: u64,
    tracing: bool,
}

impl SimContext {
    /// A context at time zero with tracing disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context at time zero with tracing enabled, for when you know you want
    /// a waveform.
    pub fn with_tracing() -> Self {
        Self {
            time: 0,
            tracing: true,
        }
    }

    /// The current simulation time in time steps.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Advances simulation time by `steps` time steps.
    pub fn advance(&mut self, steps: u64) {
        self.time += steps;
    }

    /// Permits waveform recording on this context. [`Waveform`] refuses to
    /// open until this has been called, mirroring `Verilated::traceEverOn`.
    ///
    /// [`Waveform`]: crate::trace::Waveform
    pub fn enable_tracing(&mut self) {
        self.tracing = true;
    }

    /// Whether waveform recording is permitted.
    pub fn tracing_enabled(&self) -> bool {
        self.tracing
    }
}
