//! funcspec CLI
//!
//! Reads a module in JSON form, runs function specialization over it and
//! writes the transformed module.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use funcspec_core::{
    run_specialization, DefaultCostModel, DefaultInlineEstimator, Module, SpecializerConfig,
};
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// The module as JSON, readable by this tool again
    Json,
    /// LLVM-like textual IR
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "funcspec")]
#[command(version)]
#[command(about = "Specialize functions on constant arguments")]
#[command(long_about = "
funcspec clones functions whose call sites pass constant arguments, once per
distinct set of constants, and redirects those calls to the clones. Originals
left without callers are removed.

Options given on the command line override the config file.
")]
struct Cli {
    /// Module to specialize (JSON)
    input: PathBuf,

    /// Where to write the transformed module [default: stdout]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Specializer config file (YAML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format of the transformed module
    #[arg(long, value_enum, default_value_t = Emit::Json)]
    emit: Emit,

    /// Write the specialization report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Specialize regardless of score and function size
    #[arg(long)]
    force: bool,

    /// Clone budget per candidate function
    #[arg(long)]
    max_clones: Option<u32>,

    /// Minimum function size worth cloning
    #[arg(long)]
    min_function_size: Option<i64>,

    /// Maximum number of specializer runs
    #[arg(long)]
    iterations: Option<u32>,

    /// Also specialize on integer, float and struct constants
    #[arg(long)]
    literal_constants: bool,

    /// Allow specializing on addresses of mutable globals
    #[arg(long)]
    on_address: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn load_config(&self) -> Result<SpecializerConfig> {
        let mut config = match &self.config {
            Some(path) => SpecializerConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SpecializerConfig::default(),
        };
        config.force_specialization |= self.force;
        config.specialize_literal_constants |= self.literal_constants;
        config.specialize_on_address |= self.on_address;
        if let Some(n) = self.max_clones {
            config.max_clones = n;
        }
        if let Some(n) = self.min_function_size {
            config.min_function_size = n;
        }
        if let Some(n) = self.iterations {
            config.max_iterations = n;
        }
        config.validate().context("Invalid specializer configuration")?;
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    debug!("Using config {:?}", config);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let mut module = Module::from_json(&source)
        .with_context(|| format!("Failed to parse module {}", cli.input.display()))?;

    let report = run_specialization(
        &mut module,
        &config,
        &DefaultCostModel,
        &DefaultInlineEstimator::default(),
    );

    let rendered = match cli.emit {
        Emit::Json => module.to_json().context("Failed to serialize module")?,
        Emit::Text => module.to_string(),
    };
    match &cli.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    eprintln!(
        "{}: {} clone(s) created, {} function(s) removed, {} constant(s) promoted",
        module.name,
        report.clones_created,
        report.functions_removed.len(),
        report.promoted_constants
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(&cli)
}
