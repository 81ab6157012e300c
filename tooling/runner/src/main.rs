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

use std::{
    env::{self, current_dir},
    ffi::{OsStr, OsString},
    fs,
    process::{Command, Output},
    sync::mpsc,
    thread::available_parallelism,
    time::Duration,
};

use argh::FromArgs;
use camino::{Utf8Path, Utf8PathBuf};
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use remora_harness::{Harness, HarnessConfig, RunSummary, SimContext};
use remora_verilator::{
    PortDirection, VerilatorRuntime, VerilatorRuntimeOptions,
};
use snafu::{whatever, Report, ResultExt, Whatever};
use threadpool::ThreadPool;

const DEFAULT_MANIFEST_NAME: &str = "bench.toml";
const DEFAULT_ARTIFACTS_DIRECTORY: &str = "artifacts";

/// Build and run remora benches described by a bench.toml manifest
#[derive(FromArgs)]
struct RemoraRunnerCommand {
    #[argh(subcommand)]
    subcommand: Subcommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    Run(RunSubcommand),
    Lint(LintSubcommand),
    Check(CheckSubcommand),
}

/// build, instantiate, and run every bench matching the pattern
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
struct RunSubcommand {
    /// substring of bench names to run
    #[argh(positional, default = "String::new()")]
    bench_pattern: String,
}

/// lint every bench's sources with `verilator --lint-only`
#[derive(FromArgs)]
#[argh(subcommand, name = "lint")]
struct LintSubcommand {}

/// check that every bench's configuration and sources are well-formed
#[derive(FromArgs)]
#[argh(subcommand, name = "check")]
struct CheckSubcommand {}

/// One `[[bench]]` entry from the manifest, with source globs expanded.
#[derive(Debug)]
struct BenchSpec {
    name: String,
    config: Utf8PathBuf,
    top: String,
    source: Utf8PathBuf,
    sources: Vec<Utf8PathBuf>,
    includes: Vec<Utf8PathBuf>,
    ports: Vec<(String, usize, usize, PortDirection)>,
}

/// The parsed manifest: the `[runner]` table plus every `[[bench]]` entry.
#[derive(Debug)]
struct Manifest {
    artifact_directory: Utf8PathBuf,
    /// The verilator executable every bench is built and linted with.
    verilator_executable: OsString,
    benches: Vec<BenchSpec>,
}

fn run_shell_command(
    command: &mut Command,
    spinner: Option<(&str, &str)>,
) -> Result<Output, Whatever> {
    let spinner_opt = if let Some((loading_message, loaded_message)) = spinner {
        let spinner = ProgressBar::new_spinner()
            .with_message(loading_message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some((spinner, loaded_message))
    } else {
        None
    };
    let program = command.get_program().to_string_lossy().to_string();
    let output = command
        .output()
        .whatever_context(format!("Invocation of `{}` failed", program))?;

    if !output.status.success() {
        whatever!(
            "Invocation of {} failed with {}\n\n--- STDOUT ---\n{}\n\n--- STDERR ---\n{}",
            program,
            output.status,
            String::from_utf8(output.stdout).unwrap_or_default(),
            String::from_utf8(output.stderr).unwrap_or_default()
        );
    }

    if let Some((spinner, loaded_message)) = spinner_opt {
        spinner.finish_with_message(loaded_message.to_string());
    }

    Ok(output)
}

fn parse_ports(
    model: &toml::Value,
    bench_name: &str,
) -> Result<Vec<(String, usize, usize, PortDirection)>, Whatever> {
    let Some(port_entries) =
        model.get("ports").and_then(|ports| ports.as_array())
    else {
        whatever!("Missing `ports` array in bench {}", bench_name);
    };

    let mut ports = vec![];
    for entry in port_entries {
        let Some(entry) = entry.as_array() else {
            whatever!(
                "Malformed port in bench {} (expected [name, msb, lsb, direction])",
                bench_name
            );
        };
        let (Some(port), Some(high), Some(low), Some(direction)) = (
            entry.first().and_then(|port| port.as_str()),
            entry.get(1).and_then(|high| high.as_integer()),
            entry.get(2).and_then(|low| low.as_integer()),
            entry.get(3).and_then(|direction| direction.as_str()),
        ) else {
            whatever!(
                "Malformed port in bench {} (expected [name, msb, lsb, direction])",
                bench_name
            );
        };
        if high < 0 || low < 0 {
            whatever!(
                "Port {} in bench {} has negative bit bounds",
                port,
                bench_name
            );
        }
        let direction = match direction {
            "input" => PortDirection::Input,
            "output" => PortDirection::Output,
            "inout" => PortDirection::Inout,
            other => whatever!(
                "Unknown direction {} for port {} in bench {} (expected input, output, or inout)",
                other,
                port,
                bench_name
            ),
        };
        ports.push((port.to_string(), high as usize, low as usize, direction));
    }

    Ok(ports)
}

fn parse_manifest(manifest: &toml::Value) -> Result<Manifest, Whatever> {
    let artifact_directory = Utf8PathBuf::from(
        manifest
            .get("runner")
            .and_then(|runner| runner.get("artifacts"))
            .and_then(|artifacts| artifacts.as_str())
            .unwrap_or(DEFAULT_ARTIFACTS_DIRECTORY),
    );
    let verilator_executable = manifest
        .get("runner")
        .and_then(|runner| runner.get("verilator"))
        .and_then(|executable| executable.as_str())
        .map(OsString::from)
        .unwrap_or_else(|| {
            VerilatorRuntimeOptions::default().verilator_executable
        });

    let Some(bench_entries) =
        manifest.get("bench").and_then(|bench| bench.as_array())
    else {
        whatever!(
            "Missing [[bench]] entries in {}",
            DEFAULT_MANIFEST_NAME
        );
    };

    let mut benches = vec![];
    for bench in bench_entries {
        let Some(name) = bench.get("name").and_then(|name| name.as_str())
        else {
            whatever!("Missing `name` string in a [[bench]] entry");
        };
        let Some(config) = bench.get("config").and_then(|config| config.as_str())
        else {
            whatever!("Missing `config` string in bench {}", name);
        };
        let Some(model) = bench.get("model") else {
            whatever!("Missing [bench.model] table in bench {}", name);
        };
        let Some(top) = model.get("top").and_then(|top| top.as_str()) else {
            whatever!("Missing `top` string in bench {}", name);
        };
        let Some(source) = model.get("source").and_then(|source| source.as_str())
        else {
            whatever!("Missing `source` string in bench {}", name);
        };
        let Some(source_patterns) =
            model.get("sources").and_then(|sources| sources.as_array())
        else {
            whatever!("Missing `sources` array in bench {}", name);
        };

        let mut sources = vec![];
        for pattern in source_patterns {
            let Some(pattern) = pattern.as_str() else {
                whatever!("Non-string source pattern in bench {}", name);
            };
            for path in glob::glob(pattern).whatever_context(format!(
                "Invalid source pattern {} in bench {}",
                pattern, name
            ))? {
                let path = path.whatever_context(format!(
                    "Failed to expand source pattern {} in bench {}",
                    pattern, name
                ))?;
                let path = Utf8PathBuf::from_path_buf(path)
                    .map_err(|_| "?")
                    .whatever_context(format!(
                        "Failed to parse a source path as UTF-8 in bench {}",
                        name
                    ))?;
                sources.push(path);
            }
        }

        let includes = model
            .get("includes")
            .and_then(|includes| includes.as_array())
            .map(|includes| {
                includes
                    .iter()
                    .filter_map(|include| include.as_str())
                    .map(Utf8PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        benches.push(BenchSpec {
            name: name.to_string(),
            config: Utf8PathBuf::from(config),
            top: top.to_string(),
            source: Utf8PathBuf::from(source),
            sources,
            includes,
            ports: parse_ports(model, name)?,
        });
    }

    Ok(Manifest {
        artifact_directory,
        verilator_executable,
        benches,
    })
}

fn run_bench(
    artifact_directory: &Utf8Path,
    verilator_executable: &OsStr,
    bench: &BenchSpec,
) -> Result<RunSummary, Whatever> {
    let config = HarnessConfig::load(&bench.config)?;

    let sources: Vec<&Utf8Path> =
        bench.sources.iter().map(Utf8PathBuf::as_path).collect();
    let includes: Vec<&Utf8Path> =
        bench.includes.iter().map(Utf8PathBuf::as_path).collect();
    let mut runtime = VerilatorRuntime::new(
        artifact_directory,
        &sources,
        &includes,
        VerilatorRuntimeOptions {
            verilator_executable: verilator_executable.to_owned(),
            ..Default::default()
        },
    )?;

    let ports: Vec<(&str, usize, usize, PortDirection)> = bench
        .ports
        .iter()
        .map(|(port, high, low, direction)| {
            (port.as_str(), *high, *low, *direction)
        })
        .collect();
    let mut model = runtime
        .create_model(&bench.top, bench.source.as_str(), &ports)
        .whatever_context(format!(
            "Failed to build the model for bench {}",
            bench.name
        ))?;

    let mut ctx = SimContext::with_tracing();
    Harness::new(config)
        .whatever_context("Invalid bench configuration")?
        .run(&mut ctx, &mut model)
        .whatever_context(format!("Bench {} failed while running", bench.name))
}

fn run(manifest: Manifest, options: RunSubcommand) -> Result<(), Whatever> {
    let Manifest {
        artifact_directory,
        verilator_executable,
        benches,
    } = manifest;
    let selected: Vec<BenchSpec> = benches
        .into_iter()
        .filter(|bench| bench.name.contains(&options.bench_pattern))
        .collect();

    let worker_count = available_parallelism()
        .map(|value| value.get())
        .unwrap_or(1);
    let pool = ThreadPool::new(worker_count);

    let bench_count = selected.len();
    println!(
        "{} {} bench{} [{}] across {} thread{}",
        "     STARTING".bold().bright_cyan(),
        bench_count,
        if bench_count == 1 { "" } else { "es" },
        if options.bench_pattern.is_empty() {
            "*".to_string()
        } else {
            format!("*{}*", options.bench_pattern)
        },
        worker_count,
        if worker_count == 1 { "" } else { "s" },
    );

    let (tx, rx) = mpsc::channel();

    for bench in selected {
        let tx = tx.clone();
        let artifact_directory = artifact_directory.clone();
        let verilator_executable = verilator_executable.clone();
        pool.execute(move || {
            let result = match run_bench(
                &artifact_directory,
                &verilator_executable,
                &bench,
            ) {
                Ok(summary) => Ok(format!(
                    "         {} [{}] ({} samples in {:.2?})",
                    "PASS".bold().bright_green(),
                    bench.name,
                    summary.samples,
                    summary.elapsed
                )),
                Err(error) => Err(format!(
                    "        {} [{}]\n{}",
                    "FAIL".bold().bright_red(),
                    bench.name,
                    Report::from_error(error)
                )),
            };
            let _ = tx.send(result);
        });
    }

    let mut failures = 0;
    for _ in 0..bench_count {
        match rx.recv() {
            Ok(result) => match result {
                Ok(success) => println!("{}", success),
                Err(failure) => {
                    failures += 1;
                    println!("{}", failure);
                }
            },
            Err(error) => {
                println!(
                    "      {} [<unknown bench>]: {}",
                    "CLOSED".bold().on_bright_yellow(),
                    error
                );
            }
        }
    }

    println!(
        "{} with {} failure{}",
        "     FINISHED".bold().bright_cyan(),
        failures,
        if failures == 1 { "" } else { "s" },
    );

    if failures > 0 {
        whatever!("Exiting due to failure(s)");
    }

    Ok(())
}

/// Lints with the same executable the benches are built with, so a manifest
/// pinning a specific `verilator` gets consistent diagnostics.
fn lint_command(verilator_executable: &OsStr, bench: &BenchSpec) -> Command {
    let mut command = Command::new(verilator_executable);
    command.args(["--lint-only", "-sv", "-Wall"]);
    for include in &bench.includes {
        command.arg(format!("-I{}", include));
    }
    command.args(bench.sources.iter().map(|source| source.as_str()));
    command
}

fn lint(
    verilator_executable: &OsStr,
    benches: &[BenchSpec],
) -> Result<(), Whatever> {
    for bench in benches {
        let mut command = lint_command(verilator_executable, bench);

        let loading_message = format!("Linting bench {}", bench.name);
        let loaded_message = format!("Linted bench {}", bench.name);
        run_shell_command(
            &mut command,
            Some((&loading_message, &loaded_message)),
        )
        .whatever_context(format!("Lint failed for bench {}", bench.name))?;
    }

    Ok(())
}

fn check(benches: &[BenchSpec]) -> Result<(), Whatever> {
    for bench in benches {
        HarnessConfig::load(&bench.config).whatever_context(format!(
            "Bench {} has an invalid harness configuration",
            bench.name
        ))?;

        if !bench.source.is_file() {
            whatever!(
                "Bench {} names missing source file {}",
                bench.name,
                bench.source
            );
        }
        if bench.sources.is_empty() {
            whatever!(
                "Bench {}'s source patterns match no files",
                bench.name
            );
        }
        for include in &bench.includes {
            if !include.is_dir() {
                whatever!(
                    "Bench {} names missing include directory {}",
                    bench.name,
                    include
                );
            }
        }
    }

    println!("Everything looks good!");
    Ok(())
}

#[snafu::report]
fn main() -> Result<(), Whatever> {
    let command: RemoraRunnerCommand = argh::from_env();

    if env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let current_directory = Utf8PathBuf::from_path_buf(
        current_dir()
            .whatever_context("Failed to determine current directory")?,
    )
    .map_err(|_| "?")
    .whatever_context("Failed to parse current directory as UTF-8")?;

    let manifest_path = current_directory.join(DEFAULT_MANIFEST_NAME);

    let manifest_contents = fs::read_to_string(&manifest_path)
        .whatever_context(format!(
            "Failed to read {} in current directory",
            DEFAULT_MANIFEST_NAME
        ))?;

    let manifest: toml::Value = toml::from_str(&manifest_contents)
        .whatever_context(format!(
            "Failed to parse {} in current directory",
            DEFAULT_MANIFEST_NAME
        ))?;

    let manifest = parse_manifest(&manifest)?;

    match command.subcommand {
        Subcommand::Run(run_subcommand) => run(manifest, run_subcommand),
        Subcommand::Lint(_lint_subcommand) => {
            lint(&manifest.verilator_executable, &manifest.benches)
        }
        Subcommand::Check(_check_subcommand) => check(&manifest.benches),
    }
}
