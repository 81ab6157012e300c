// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! A pure-Rust stand-in model and VCD read-back helpers shared by the
//! harness integration tests.

#![allow(dead_code)]

use std::{env, fs, io, process};

use camino::{Utf8Path, Utf8PathBuf};
use remora_harness::{DutModel, ModelError, PortDirection, TracePoint};
use vcd::{Command, IdCode, ScopeItem, Value};

pub fn init_logging() {
    if env::var("RUST_LOG").is_ok() {
        let _ = env_logger::try_init();
    }
}

/// A file path under the system temporary directory that is unique to this
/// test process and `name`.
pub fn scratch_path(name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir())
        .expect("temporary directory should be UTF-8")
        .join(format!("remora-{}-{}", process::id(), name))
}

/// Behavioral stand-in for a Verilated blinker: an 8-bit counter that
/// increments on every clock rising edge while out of reset and drives its
/// LED output from counter bit 2.
pub struct BlinkerDut {
    points: Vec<TracePoint>,
    values: Vec<u64>,
    prev_clock: bool,
    pub eval_count: u64,
}

impl BlinkerDut {
    pub fn new() -> Self {
        Self {
            points: vec![
                TracePoint::port("i_clk", 1, PortDirection::Input),
                TracePoint::port("i_rst", 1, PortDirection::Input),
                TracePoint::port("o_led", 1, PortDirection::Output),
                TracePoint::scoped(
                    &["blink"],
                    "r_count",
                    8,
                    PortDirection::Output,
                ),
            ],
            values: vec![0; 4],
            prev_clock: false,
            eval_count: 0,
        }
    }
}

impl DutModel for BlinkerDut {
    fn top_name(&self) -> &str {
        "led"
    }

    fn trace_points(&self) -> &[TracePoint] {
        &self.points
    }

    fn eval(&mut self) {
        self.eval_count += 1;
        let clock = self.values[0] != 0;
        if clock && !self.prev_clock {
            if self.values[1] != 0 {
                self.values[3] = 0;
            } else {
                self.values[3] = (self.values[3] + 1) & 0xff;
            }
        }
        self.values[2] = (self.values[3] >> 2) & 1;
        self.prev_clock = clock;
    }

    fn peek_point(&self, index: usize) -> u64 {
        self.values[index]
    }

    fn pin(&mut self, port: &str, value: u64) -> Result<(), ModelError> {
        let index = self
            .points
            .iter()
            .position(|point| point.scope.is_empty() && point.name == port)
            .ok_or_else(|| ModelError::NoSuchPort {
                top_module: "led".to_string(),
                port: port.to_string(),
            })?;
        let point = &self.points[index];
        if point.direction != PortDirection::Input {
            return Err(ModelError::NotAnInput {
                top_module: "led".to_string(),
                port: port.to_string(),
                direction: point.direction,
            });
        }
        if value & !point.mask() != 0 {
            return Err(ModelError::ValueTooWide {
                top_module: "led".to_string(),
                port: port.to_string(),
                width: point.width,
                value,
            });
        }
        self.values[index] = value;
        Ok(())
    }
}

/// Everything the tests need out of a VCD file.
pub struct Recorded {
    pub header: vcd::Header,
    /// Every `#` timestamp in file order.
    pub timestamps: Vec<u64>,
    /// Value changes as (timestamp, code, value), with vectors folded into
    /// integers MSB first.
    pub changes: Vec<(u64, IdCode, u64)>,
}

pub fn read_vcd(path: &Utf8Path) -> io::Result<Recorded> {
    let mut parser =
        vcd::Parser::new(io::BufReader::new(fs::File::open(path)?));
    let header = parser.parse_header()?;

    let mut timestamps = vec![];
    let mut changes = vec![];
    let mut now = 0;
    for command in &mut parser {
        match command? {
            Command::Timestamp(timestamp) => {
                now = timestamp;
                timestamps.push(timestamp);
            }
            Command::ChangeScalar(code, value) => {
                changes.push((now, code, scalar_bit(value)));
            }
            Command::ChangeVector(code, values) => {
                let folded = values.iter().fold(0u64, |folded, &value| {
                    (folded << 1) | scalar_bit(value)
                });
                changes.push((now, code, folded));
            }
            _ => {}
        }
    }

    Ok(Recorded {
        header,
        timestamps,
        changes,
    })
}

fn scalar_bit(value: Value) -> u64 {
    match value {
        Value::V1 => 1,
        _ => 0,
    }
}

/// Looks up the id code of the variable at `path`, given as scope names from
/// the top module down followed by the variable name.
pub fn find_var(header: &vcd::Header, path: &[&str]) -> Option<IdCode> {
    fn search(items: &[ScopeItem], path: &[&str]) -> Option<IdCode> {
        let (head, rest) = path.split_first()?;
        for item in items {
            match item {
                ScopeItem::Scope(scope) if scope.identifier == *head => {
                    if let Some(code) = search(&scope.children, rest) {
                        return Some(code);
                    }
                }
                ScopeItem::Var(var)
                    if rest.is_empty() && var.reference == *head =>
                {
                    return Some(var.code);
                }
                _ => {}
            }
        }
        None
    }
    search(&header.items, path)
}

/// The (timestamp, value) history of one variable.
pub fn changes_for(recorded: &Recorded, code: IdCode) -> Vec<(u64, u64)> {
    recorded
        .changes
        .iter()
        .filter(|(_, candidate, _)| *candidate == code)
        .map(|&(timestamp, _, value)| (timestamp, value))
        .collect()
}
