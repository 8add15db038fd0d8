//! Config tooling for patch runs.
//!
//! A real run needs the instrumented suite linked in, so the binary's job is
//! the part that exists before any test executes: checking and inspecting
//! the persisted run configuration.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use patchkit::exit_codes;
use patchkit::io::config::load_config;

#[derive(Parser)]
#[command(
    name = "patchkit",
    version,
    about = "Shared-execution test kit for validating candidate patches"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a run config for well-formedness.
    Validate {
        /// Path to the run config.
        #[arg(short, long, default_value = "patchkit.toml")]
        config: PathBuf,
    },
    /// Print a summary of a run config.
    Inspect {
        /// Path to the run config.
        #[arg(short, long, default_value = "patchkit.toml")]
        config: PathBuf,
    },
}

fn main() {
    patchkit::logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Validate { config } => cmd_validate(&config),
        Command::Inspect { config } => cmd_inspect(&config),
    }
}

fn cmd_validate(path: &Path) -> Result<()> {
    let cfg = load_config(path)?;
    println!(
        "ok: {} patches, {} tests",
        cfg.patch_count,
        cfg.tests.len()
    );
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let cfg = load_config(path)?;
    let eligible = cfg.tree_eligible.iter().filter(|e| **e).count();
    println!(
        "{} patches ({} tree-eligible), test selection {}",
        cfg.patch_count,
        eligible,
        if cfg.use_test_selection { "on" } else { "off" }
    );
    for (idx, test) in cfg.tests.iter().enumerate() {
        println!(
            "[{idx}] {}::{} (timeout {}s)",
            test.class, test.method, test.timeout_secs
        );
    }
    Ok(())
}
