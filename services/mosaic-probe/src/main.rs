//! Mosaic probe.
//!
//! Builds a mosaic from a YAML description, runs the queries it lists and
//! prints a JSON report on stdout. Logs go to stderr.

mod config_loader;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use grid_mosaic::{BuiltMosaic, InterpolationConfig, QueryResult, RawHandle, STATUS_OK};
use serde::Serialize;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "mosaic-probe")]
#[command(about = "Build a grid mosaic from YAML and sample it")]
struct Args {
    /// Mosaic description file path
    #[arg(short, long, env = "MOSAIC_DESCRIPTION")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Pretty-print the report
    #[arg(long)]
    pretty: bool,

    /// Exit with a failure status if any query fails
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Serialize)]
struct GridSummary {
    name: String,
    handle: RawHandle,
    dims: Vec<usize>,
    data_type: String,
    masked: bool,
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    mosaic: RawHandle,
    ndims: usize,
    grids: Vec<GridSummary>,
    contacts: usize,
    results: Vec<QueryResult>,
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn summarize(built: &BuiltMosaic, results: Vec<QueryResult>) -> Result<ProbeReport> {
    let ctx = &built.context;
    let grids = built
        .grids
        .iter()
        .map(|(name, named)| {
            let grid = ctx.grid(named.grid)?;
            Ok(GridSummary {
                name: name.clone(),
                handle: named.grid.to_raw(),
                dims: grid.dims().to_vec(),
                data_type: grid.data_type().to_string(),
                masked: grid.mask().is_some(),
            })
        })
        .collect::<grid_mosaic::Result<Vec<_>>>()?;

    Ok(ProbeReport {
        mosaic: built.mosaic.to_raw(),
        ndims: ctx.ndims(built.mosaic)?,
        grids,
        contacts: ctx.ncontacts(built.mosaic)?,
        results,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let mut description = config_loader::load_description(&args.config)?;
    if description.interpolation.is_none() {
        let config = InterpolationConfig::from_env();
        config.validate().context("Invalid interpolation settings in environment")?;
        description.interpolation = Some(config);
    }
    info!(
        config = %args.config.display(),
        ndims = description.ndims,
        grids = description.grids.len(),
        "Building mosaic"
    );

    let built = description.build().context("Failed to build mosaic")?;
    let results = built.run_queries(&description.queries);
    let failed = results.iter().filter(|r| r.status != STATUS_OK).count();
    if failed > 0 {
        warn!(failed, total = results.len(), "Some queries failed");
    }

    let report = summarize(&built, results)?;
    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);

    if args.strict && failed > 0 {
        anyhow::bail!("{} of {} queries failed", failed, report.results.len());
    }
    Ok(())
}
