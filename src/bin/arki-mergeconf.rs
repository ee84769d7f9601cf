use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use arki_server::config::{load_config, ServerConfig};
use arki_server::datasets::{pipeline, MergeOptions, SourceLoader};
use arki_server::error::ConfigError;
use arki_server::observability::logging::{self, LogTarget};
use arki_server::ExecEngine;

/// Read dataset configuration from the given directories or config files,
/// merge them and output the merged config file to standard output.
#[derive(Parser)]
#[command(name = "arki-mergeconf", version, about)]
struct Cli {
    /// Write the output to the given file instead of standard output
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Extract extra information from the datasets (such as bounding box)
    /// and include it in the configuration
    #[arg(long)]
    extra: bool,

    /// Ignore error and duplicates datasets
    #[arg(long)]
    ignore_system_datasets: bool,

    /// Restrict operations to only those datasets that allow one of the
    /// given (comma separated) names
    #[arg(long, value_name = "NAMES")]
    restrict: Option<String>,

    /// Merge configuration from the given file (can be given more than
    /// once, `-` reads standard input)
    #[arg(short = 'C', long = "config", value_name = "FILE")]
    config: Vec<String>,

    /// Settings file locating the archive engine tools
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Datasets, configuration files or remote urls
    sources: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(if cli.verbose { "debug" } else { "warn" }, LogTarget::Stderr);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(ConfigError::Validation(failures)) = e.downcast_ref::<ConfigError>() {
                for failure in failures.iter() {
                    eprintln!("{}", failure);
                }
            }
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => load_config(path).with_context(|| format!("cannot load settings from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    let engine = ExecEngine::new(&settings.engine);

    let opts = MergeOptions {
        configs: cli.config,
        sources: cli.sources,
        restrict: cli.restrict,
        ignore_system_datasets: cli.ignore_system_datasets,
        extra: cli.extra,
    };

    let mut cfg = pipeline::load(&opts, &SourceLoader::new()).await?;
    pipeline::check(&mut cfg, &opts, &engine)?;

    let text = cfg.to_string();
    match &cli.output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))?
        }
        None => print!("{}", text),
    }
    Ok(())
}
