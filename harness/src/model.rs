// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The interface between the harness driver and a compiled hardware model.

use std::fmt;

use snafu::Snafu;

/// <https://www.digikey.com/en/maker/blogs/2024/verilog-ports-part-7-of-our-verilog-journey>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
    Inout,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
            PortDirection::Inout => "inout",
        }
        .fmt(f)
    }
}

/// One named signal a model exposes for waveform recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePoint {
    /// Scope path below the top module. Empty for top-level ports.
    pub scope: Vec<String>,
    /// Signal name within its scope.
    pub name: String,
    /// Width in bits, between 1 and 64.
    pub width: u32,
    /// Direction relative to the scope declaring the signal. Internal
    /// registers are recorded as outputs of their scope.
    pub direction: PortDirection,
}

impl TracePoint {
    /// A top-level port of the model.
    pub fn port(
        name: impl Into<String>,
        width: u32,
        direction: PortDirection,
    ) -> Self {
        Self {
            scope: vec![],
            name: name.into(),
            width,
            direction,
        }
    }

    /// A signal nested under `scope`, given as the path of instance names
    /// below the top module.
    pub fn scoped(
        scope: &[&str],
        name: impl Into<String>,
        width: u32,
        direction: PortDirection,
    ) -> Self {
        Self {
            scope: scope.iter().map(|part| part.to_string()).collect(),
            name: name.into(),
            width,
            direction,
        }
    }

    /// Hierarchy depth of this signal, counting the top module as level 1.
    pub fn depth(&self) -> u32 {
        self.scope.len() as u32 + 1
    }

    /// Bit mask selecting the low `width` bits of a 64-bit value.
    pub fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }
}

/// Runtime port access error.
#[derive(Debug, Snafu)]
pub enum ModelError {
    #[snafu(display(
        "Port {port} not found on model {top_module}: did you forget to specify it when constructing the model?"
    ))]
    NoSuchPort { top_module: String, port: String },
    #[snafu(display(
        "Port {port} on model {top_module} is {width} bits wide, so the value {value:#x} does not fit"
    ))]
    ValueTooWide {
        top_module: String,
        port: String,
        width: u32,
        value: u64,
    },
    #[snafu(display(
        "Port {port} on model {top_module} is an {direction} port, but was driven as an input"
    ))]
    NotAnInput {
        top_module: String,
        port: String,
        direction: PortDirection,
    },
}

/// A compiled hardware model the harness can drive.
///
/// `remora-verilator` implements this for models built through Verilator;
/// tests implement it by hand for pure-Rust stand-ins. The driver only ever
/// talks to a model through this trait, so a bench runs identically on both.
pub trait DutModel {
    /// The source-level name of the top module, used as the root scope in
    /// waveforms.
    fn top_name(&self) -> &str;

    /// Every signal this model can record, in declaration order. The slice
    /// must not change over the model's lifetime.
    fn trace_points(&self) -> &[TracePoint];

    /// Recomputes outputs from the current input values. Equivalent to the
    /// Verilator `eval` method.
    fn eval(&mut self);

    /// The current value of the trace point at `index` in
    /// [`trace_points`](DutModel::trace_points) order, zero-extended to 64
    /// bits.
    ///
    /// # Panics
    ///
    /// May panic if `index` is out of bounds.
    fn peek_point(&self, index: usize) -> u64;

    /// Drives the top-level input `port` to `value`.
    fn pin(&mut self, port: &str, value: u64) -> Result<(), ModelError>;

    /// The current value of the top-level port named `port`.
    fn peek(&self, port: &str) -> Result<u64, ModelError> {
        let index = self
            .trace_points()
            .iter()
            .position(|point| point.scope.is_empty() && point.name == port)
            .ok_or_else(|| ModelError::NoSuchPort {
                top_module: self.top_name().to_string(),
                port: port.to_string(),
            })?;
        Ok(self.peek_point(index) & self.trace_points()[index].mask())
    }
}
