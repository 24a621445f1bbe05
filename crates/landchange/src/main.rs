//! Landchange operator tool
//!
//! Inspects job configurations without running them:
//! - `check` validates a job file and reports what the graph would produce
//! - `queries` prints the per-band spec queries for a specs endpoint

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use landchange::{minbox, spec_queries, JobConfig};
use landchange_logging::{init_logging, LogConfig};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(name = "landchange", about = "Land change product graph tools")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a job configuration and summarise the product graph
    Check {
        /// Job configuration file (TOML)
        config: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print per-band chip spec queries as JSON
    Queries {
        /// Chip specs endpoint
        #[arg(env = "LANDCHANGE_SPECS_URL", default_value = landchange_protocol::defaults::DEFAULT_SPECS_URL)]
        specs_url: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "landchange",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {:#}", err);
            None
        }
    };

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Check { config, json } => check(&config, json),
        Commands::Queries { specs_url } => {
            let queries = spec_queries(&specs_url)?;
            println!("{}", serde_json::to_string_pretty(&queries)?);
            Ok(())
        }
    }
}

fn check(path: &Path, as_json: bool) -> Result<()> {
    let config = JobConfig::load(path)
        .with_context(|| format!("Failed to load job config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid job config {}", path.display()))?;
    debug!("Validated job config {}", path.display());

    let derived = config.derived_products();
    let per_product = config.join_cardinality();
    let chip_box = minbox(config.chip_ids.iter().copied());

    if as_json {
        let summary = json!({
            "config": config,
            "chip_box": chip_box,
            "join_cardinality": derived
                .iter()
                .map(|p| (p.as_str(), per_product))
                .collect::<std::collections::BTreeMap<_, _>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Job config: {}", path.display());
    println!("  acquired:            {}", config.acquired);
    println!("  chips:               {}", config.chip_ids.len());
    println!(
        "  products:            {}",
        config
            .products
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  product dates:       {}", config.product_dates.join(", "));
    println!("  partitions:          {} initial, {} product", config.initial_partitions, config.product_partitions);
    println!("  specs url:           {}", config.specs_url);
    println!("  chips url:           {}", config.chips_url);
    match config.clip_box {
        Some(b) => println!("  clip box:            ulx={} uly={} lrx={} lry={}", b.ulx, b.uly, b.lrx, b.lry),
        None => println!("  clip box:            none"),
    }
    if let Some(b) = chip_box {
        println!("  chip id extent:      ulx={} uly={} lrx={} lry={}", b.ulx, b.uly, b.lrx, b.lry);
    }
    for product in &derived {
        println!(
            "  {:<20} {} chips x {} dates = {} records (one pixel per chip)",
            format!("{}:", product),
            config.chip_ids.len(),
            config.product_dates.len(),
            per_product
        );
    }
    Ok(())
}
