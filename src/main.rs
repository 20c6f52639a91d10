//! gmon-profile main module.
//!
//! This program reads gmon files written by programs built with `-pg`
//! and aggregates them into a flat profile grouped by source file and a call
//! graph, or converts them for tools like `callgrind_annotate` or `qcachegrind`.
//!
//! Function names and source files come from a symbol listing of the profiled
//! binary:
//!     `nm --defined-only --print-size --line-numbers <ELF file> > symbols.txt`

#![forbid(unsafe_code)]

mod cli;

use std::io;
use std::path::{Path, PathBuf};

use gmon_profile::error::Result;
use gmon_profile::{batch, config, filebuf, global, gmon, report, symbols};

fn main() {
    let app = cli::application();
    global::set_verbose(app.verbose);
    init_logger();
    if let Err(err) = execute(app.cmd) {
        if err.is_internal() {
            eprintln!("Internal error (please report): {:#}", err);
        } else {
            eprintln!("Error: {:#}", err);
        }
        std::process::exit(config::FAILURE);
    }
}

/// Initializes the logger writing to stderr, `RUST_LOG` defaults to `info`.
fn init_logger() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Dispatches CLI commands.
fn execute(cmd: cli::Command) -> Result<()> {
    match cmd {
        cli::Command::Report {
            gmon,
            symbols,
            target,
            format,
            output,
        } => aggregate(&gmon, &symbols, &target.layout(), &format, output),

        cli::Command::Dump { gmon: path, target } => {
            let data = gmon::read(&path, &target.layout())?;
            print!("{}", data);
            Ok(())
        }
    }
}

/// Aggregates the gmon files and writes the report.
fn aggregate(
    paths: &[PathBuf],
    symbols_path: &Path,
    layout: &gmon::Layout,
    format: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let table = symbols::nm::read(symbols_path)?;
    let (profile, failures) = batch::run(paths, layout, &table).into_profile(&table)?;
    for (path, err) in &failures {
        eprintln!("Warning: skipped {:?}: {:#}", path, err);
    }

    match output {
        None => report::write(&profile, format, io::stdout().lock()),
        Some(path) => report::write(&profile, format, filebuf::open_w(&path)?),
    }
}
