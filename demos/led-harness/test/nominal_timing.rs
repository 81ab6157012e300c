// Copyright (C) 2024 Ethan Uppal.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3 of the License only.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

//! Clocked run with reset sequencing, configured by `nominal_timing.toml`:
//! 100000 steps of a period-10 clock with reset held through t = 100, into
//! `one_led_nominal_timing_tb.vcd`.

use std::env;

use demo_led_harness::{led_runtime, LED_PORTS, LED_SOURCE};
use remora::harness::{Harness, HarnessConfig, SimContext};
use snafu::{ResultExt, Whatever};

#[snafu::report]
fn main() -> Result<(), Whatever> {
    if env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let config = HarnessConfig::load("nominal_timing.toml")?;

    let mut runtime = led_runtime("artifacts")?;
    let mut model = runtime.create_model("led", LED_SOURCE, LED_PORTS)?;

    let mut ctx = SimContext::with_tracing();
    let summary = Harness::new(config)
        .whatever_context("Invalid bench configuration")?
        .run(&mut ctx, &mut model)
        .whatever_context("Bench failed")?;

    println!(
        "Recorded {} samples over {} steps to {} in {:.2?}",
        summary.samples, summary.steps, summary.output_path, summary.elapsed
    );

    Ok(())
}
