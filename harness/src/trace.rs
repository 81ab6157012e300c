// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! VCD recording for bench runs.
//!
//! Unlike the tracer Verilator compiles into a model, this writer lives
//! entirely on the Rust side: it reads the model through
//! [`DutModel::peek_point`] and emits VCD through the `vcd` crate. The header
//! carries no dates or version strings, so two runs of the same bench produce
//! byte-identical files.

use std::{
    cell::RefCell,
    fs,
    io::{self, Write},
    rc::Rc,
};

use camino::{Utf8Path, Utf8PathBuf};
use snafu::{ensure, ResultExt, Snafu};
use vcd::{IdCode, SimulationCommand, TimescaleUnit, Value};

use crate::{
    context::SimContext,
    model::{DutModel, TracePoint},
};

/// Hierarchy depth that in practice records every signal.
pub const DEFAULT_TRACE_DEPTH: u32 = 99;

/// Optional configuration for creating a [`Waveform`]. Usually, you can just
/// use [`WaveformOptions::default()`].
pub struct WaveformOptions {
    /// Hierarchy depth to record, counting the top module as level 1. Signals
    /// nested deeper than this many levels are left out of the dump.
    pub depth: u32,

    /// Timescale declared in the file header.
    pub timescale: (u32, TimescaleUnit),
}

impl Default for WaveformOptions {
    fn default() -> Self {
        Self {
            depth: DEFAULT_TRACE_DEPTH,
            timescale: (1, TimescaleUnit::NS),
        }
    }
}

/// Waveform recording error.
#[derive(Debug, Snafu)]
pub enum WaveformError {
    #[snafu(display("Failed to create waveform file {path}"))]
    Create { path: Utf8PathBuf, source: io::Error },
    #[snafu(display("Failed to write waveform file {path}"))]
    Write { path: Utf8PathBuf, source: io::Error },
    #[snafu(display(
        "Waveform timestamps must strictly increase: tried to dump time {attempted} after time {last}"
    ))]
    NonMonotonic { last: u64, attempted: u64 },
    #[snafu(display(
        "Tracing is not enabled on the simulation context: call SimContext::enable_tracing first"
    ))]
    TracingDisabled,
    #[snafu(display(
        "Model changed shape mid-dump: {registered} trace points were registered but the model now exposes {actual}"
    ))]
    ModelChanged { registered: usize, actual: usize },
}

/// Buffered file handle shared between the VCD writer and [`Waveform`] itself,
/// which needs to flush behind the writer's back on close and drop.
#[derive(Clone)]
struct SharedFile(Rc<RefCell<io::BufWriter<fs::File>>>);

impl io::Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

struct RegisteredPoint {
    /// Index into the model's trace point slice.
    index: usize,
    id: IdCode,
    width: u32,
    mask: u64,
    last: u64,
}

/// Scopes must be declared contiguously in a VCD header, so registration
/// buckets the points into a tree first.
#[derive(Default)]
struct ScopeTree {
    vars: Vec<usize>,
    children: Vec<(String, ScopeTree)>,
}

impl ScopeTree {
    fn insert(&mut self, scope: &[String], index: usize) {
        match scope.split_first() {
            None => self.vars.push(index),
            Some((head, rest)) => {
                let position = match self
                    .children
                    .iter()
                    .position(|(name, _)| name == head)
                {
                    Some(position) => position,
                    None => {
                        self.children.push((head.clone(), ScopeTree::default()));
                        self.children.len() - 1
                    }
                };
                self.children[position].1.insert(rest, index);
            }
        }
    }
}

/// A VCD dump in progress.
///
/// Created against a model, which fixes the set of recorded signals, and then
/// fed one [`Waveform::dump`] per time step. The dump is closed when dropped,
/// but [`Waveform::close`] reports the I/O errors that dropping has to
/// swallow.
pub struct Waveform {
    path: Utf8PathBuf,
    writer: vcd::Writer<SharedFile>,
    sink: SharedFile,
    points: Vec<RegisteredPoint>,
    model_point_count: usize,
    last_timestamp: Option<u64>,
    samples: u64,
    closed: bool,
}

impl Waveform {
    /// Opens a waveform file at `path` and declares every trace point of
    /// `model` no deeper than `options.depth`.
    ///
    /// Fails if `ctx` has not had tracing enabled or if the file cannot be
    /// created, for example because the parent directory does not exist.
    pub fn create<M: DutModel>(
        ctx: &SimContext,
        model: &M,
        path: impl AsRef<Utf8Path>,
        options: &WaveformOptions,
    ) -> Result<Self, WaveformError> {
        ensure!(ctx.tracing_enabled(), TracingDisabledSnafu);

        let path = path.as_ref().to_owned();
        let file = fs::File::create(&path)
            .context(CreateSnafu { path: path.clone() })?;
        let sink = SharedFile(Rc::new(RefCell::new(io::BufWriter::new(file))));
        let mut writer = vcd::Writer::new(sink.clone());

        let trace_points = model.trace_points();
        let mut tree = ScopeTree::default();
        for (index, point) in trace_points.iter().enumerate() {
            if point.depth() <= options.depth {
                tree.insert(&point.scope, index);
            }
        }

        let mut points = vec![];
        let (timescale, unit) = options.timescale;
        write_header(
            &mut writer,
            model.top_name(),
            timescale,
            unit,
            &tree,
            trace_points,
            &mut points,
        )
        .context(WriteSnafu { path: path.clone() })?;

        Ok(Self {
            path,
            writer,
            sink,
            points,
            model_point_count: trace_points.len(),
            last_timestamp: None,
            samples: 0,
            closed: false,
        })
    }

    /// Records one sample of every registered trace point at `timestamp`.
    ///
    /// The first dump snapshots all signals under `$dumpvars`; later dumps
    /// only write signals whose value changed, which is what makes VCD files
    /// compact. Every dump writes the timestamp, so the number of samples in
    /// the file always equals the number of calls.
    pub fn dump<M: DutModel>(
        &mut self,
        model: &M,
        timestamp: u64,
    ) -> Result<(), WaveformError> {
        let actual = model.trace_points().len();
        ensure!(
            actual == self.model_point_count,
            ModelChangedSnafu {
                registered: self.model_point_count,
                actual
            }
        );
        if let Some(last) = self.last_timestamp {
            ensure!(
                timestamp > last,
                NonMonotonicSnafu {
                    last,
                    attempted: timestamp
                }
            );
        }

        let first = self.last_timestamp.is_none();
        self.write_sample(model, timestamp, first)
            .context(WriteSnafu {
                path: self.path.clone(),
            })?;

        self.last_timestamp = Some(timestamp);
        self.samples += 1;
        Ok(())
    }

    fn write_sample<M: DutModel>(
        &mut self,
        model: &M,
        timestamp: u64,
        first: bool,
    ) -> io::Result<()> {
        self.writer.timestamp(timestamp)?;
        if first {
            self.writer.begin(SimulationCommand::Dumpvars)?;
        }
        for slot in 0..self.points.len() {
            let value =
                model.peek_point(self.points[slot].index) & self.points[slot].mask;
            if first || value != self.points[slot].last {
                let id = self.points[slot].id;
                let width = self.points[slot].width;
                if width == 1 {
                    self.writer.change_scalar(id, bit_at(value, 0))?;
                } else {
                    let bits = (0..width)
                        .rev()
                        .map(|bit| bit_at(value, bit))
                        .collect::<Vec<_>>();
                    self.writer.change_vector(id, &bits)?;
                }
                self.points[slot].last = value;
            }
        }
        if first {
            self.writer.end()?;
        }
        Ok(())
    }

    /// Flushes buffered output to disk without closing the dump.
    pub fn flush(&mut self) -> Result<(), WaveformError> {
        self.sink.flush().context(WriteSnafu {
            path: self.path.clone(),
        })
    }

    /// Closes the dump, flushing buffered output. The dump is also closed
    /// when dropped, but only `close` reports I/O errors.
    pub fn close(mut self) -> Result<(), WaveformError> {
        self.closed = true;
        self.sink.flush().context(WriteSnafu {
            path: self.path.clone(),
        })
    }

    /// The file this waveform writes to.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// How many timestamped samples have been dumped so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// How many trace points were registered in the header. Signals filtered
    /// out by the depth limit are not counted.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

impl Drop for Waveform {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.sink.flush();
        }
    }
}

fn write_header(
    writer: &mut vcd::Writer<SharedFile>,
    top_name: &str,
    timescale: u32,
    unit: TimescaleUnit,
    tree: &ScopeTree,
    trace_points: &[TracePoint],
    points: &mut Vec<RegisteredPoint>,
) -> io::Result<()> {
    writer.timescale(timescale, unit)?;
    writer.add_module(top_name)?;
    declare_scope(writer, tree, trace_points, points)?;
    writer.upscope()?;
    writer.enddefinitions()
}

fn declare_scope(
    writer: &mut vcd::Writer<SharedFile>,
    node: &ScopeTree,
    trace_points: &[TracePoint],
    points: &mut Vec<RegisteredPoint>,
) -> io::Result<()> {
    for &index in &node.vars {
        let point = &trace_points[index];
        let id = writer.add_wire(point.width, &point.name)?;
        points.push(RegisteredPoint {
            index,
            id,
            width: point.width,
            mask: point.mask(),
            last: 0,
        });
    }
    for (name, child) in &node.children {
        writer.add_module(name)?;
        declare_scope(writer, child, trace_points, points)?;
        writer.upscope()?;
    }
    Ok(())
}

fn bit_at(value: u64, bit: u32) -> Value {
    if (value >> bit) & 1 == 1 {
        Value::V1
    } else {
        Value::V0
    }
}
