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

//! Shared fixture description for the LED bench binaries and tests. Paths are
//! relative to this crate's directory, so run the binaries from
//! `demos/led-harness/`.

use remora::verilator::{
    PortDirection, VerilatorRuntime, VerilatorRuntimeOptions,
};
use snafu::Whatever;

pub const LED_SOURCE: &str = "rtl/led.sv";

pub const LED_PORTS: &[(&str, usize, usize, PortDirection)] = &[
    ("i_clk", 0, 0, PortDirection::Input),
    ("i_rst", 0, 0, PortDirection::Input),
    ("o_led", 0, 0, PortDirection::Output),
];

/// A runtime over the LED fixture, building into `artifact_directory`.
pub fn led_runtime(
    artifact_directory: &str,
) -> Result<VerilatorRuntime, Whatever> {
    VerilatorRuntime::new(
        artifact_directory.as_ref(),
        &[LED_SOURCE.as_ref()],
        &[],
        VerilatorRuntimeOptions::default_logging(),
    )
}
