// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Validation failures the runtime reports before ever invoking verilator,
//! so these run on machines without verilator installed.

use std::{env, fs, process};

use camino::Utf8PathBuf;
use remora_verilator::{
    PortDirection, VerilatorRuntime, VerilatorRuntimeOptions,
};
use snafu::{whatever, Report, ResultExt, Whatever};

fn init_logging() {
    if env::var("RUST_LOG").is_ok() {
        let _ = env_logger::try_init();
    }
}

fn scratch_path(name: &str) -> Utf8PathBuf {
    let mut path = Utf8PathBuf::from_path_buf(env::temp_dir())
        .unwrap_or_else(|path| panic!("Non-UTF-8 temp dir: {}", path.display()));
    path.push(format!("remora-verilator-{}-{}", process::id(), name));
    path
}

/// Writes a trivial module so runtime construction has a real file to
/// validate against.
fn write_stub_module(name: &str) -> Result<Utf8PathBuf, Whatever> {
    let path = scratch_path(name);
    fs::write(&path, "module stub(input i_x, output o_y);\n    assign o_y = i_x;\nendmodule\n")
        .whatever_context(format!("Failed to write {path}"))?;
    Ok(path)
}

fn report(error: Whatever) -> String {
    Report::from_error(error).to_string()
}

#[test]
fn missing_source_files_are_rejected_up_front() -> Result<(), Whatever> {
    init_logging();

    let missing = scratch_path("no-such-file.sv");
    let Err(error) = VerilatorRuntime::new(
        scratch_path("artifacts-missing-source").as_path(),
        &[missing.as_path()],
        &[],
        VerilatorRuntimeOptions::default(),
    ) else {
        whatever!("Runtime accepted a nonexistent source file");
    };
    assert!(report(error).contains("does not exist"));

    Ok(())
}

#[test]
fn model_source_must_be_registered_with_the_runtime() -> Result<(), Whatever> {
    init_logging();

    let registered = write_stub_module("registered.sv")?;
    let unregistered = scratch_path("unregistered.sv");
    let mut runtime = VerilatorRuntime::new(
        scratch_path("artifacts-unregistered").as_path(),
        &[registered.as_path()],
        &[],
        VerilatorRuntimeOptions::default(),
    )?;

    let Err(error) = runtime.create_model(
        "stub",
        unregistered.as_str(),
        &[("i_x", 0, 0, PortDirection::Input)],
    ) else {
        whatever!("Runtime accepted a source file it was never given");
    };
    assert!(report(error).contains("was not provided to the runtime"));

    Ok(())
}

#[test]
fn reversed_port_bounds_are_rejected() -> Result<(), Whatever> {
    init_logging();

    let source = write_stub_module("reversed-bounds.sv")?;
    let mut runtime = VerilatorRuntime::new(
        scratch_path("artifacts-reversed-bounds").as_path(),
        &[source.as_path()],
        &[],
        VerilatorRuntimeOptions::default(),
    )?;

    let Err(error) = runtime.create_model(
        "stub",
        source.as_str(),
        &[("i_x", 0, 3, PortDirection::Input)],
    ) else {
        whatever!("Runtime accepted a port with high bit below low bit");
    };
    assert!(report(error).contains("high bit less than the low bit"));

    Ok(())
}

#[test]
fn ports_wider_than_64_bits_are_rejected() -> Result<(), Whatever> {
    init_logging();

    let source = write_stub_module("overwide-port.sv")?;
    let mut runtime = VerilatorRuntime::new(
        scratch_path("artifacts-overwide-port").as_path(),
        &[source.as_path()],
        &[],
        VerilatorRuntimeOptions::default(),
    )?;

    let Err(error) = runtime.create_model(
        "stub",
        source.as_str(),
        &[("i_x", 64, 0, PortDirection::Input)],
    ) else {
        whatever!("Runtime accepted a 65-bit port");
    };
    assert!(report(error).contains("greater than 64 bits"));

    Ok(())
}

#[test]
fn escaped_module_names_are_rejected() -> Result<(), Whatever> {
    init_logging();

    let source = write_stub_module("escaped-name.sv")?;
    let mut runtime = VerilatorRuntime::new(
        scratch_path("artifacts-escaped-name").as_path(),
        &[source.as_path()],
        &[],
        VerilatorRuntimeOptions::default(),
    )?;

    let Err(error) = runtime.create_model(
        "\\top level",
        source.as_str(),
        &[("i_x", 0, 0, PortDirection::Input)],
    ) else {
        whatever!("Runtime accepted an escaped module name");
    };
    assert!(report(error).contains("Escaped module names"));

    Ok(())
}
