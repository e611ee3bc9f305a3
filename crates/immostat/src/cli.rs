//! `immostat` command line.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use immostat_engine::config::{BandBounds, CodeNormalization, GeoScope, PipelineConfig, PriceBand};
use immostat_engine::query::{DepartmentSelector, QueryEngine, QueryFilter};
use immostat_engine::source::{RecordSource, SourceOptions};
use immostat_geo::centroid::DepartmentCentroids;
use immostat_geo::feature::read_feature_collection;
use immostat_io::local_fs::LocalFileSystem;
use immostat_storage::SnapshotStore;
use immostat_types::record::PropertyType;

#[derive(Parser, Debug)]
#[command(name = "immostat", about = "Clean, aggregate and query DVF real-estate transactions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and publish a new snapshot from a (possibly gzipped) CSV export.
    Build(BuildArgs),
    /// Query the current snapshot and print the response as JSON.
    Query(QueryArgs),
    /// Print per-department centroids of a GeoJSON feature collection.
    Centroids(CentroidsArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scope {
    /// Whole country, wide price band.
    National,
    /// A set of departments (Île-de-France unless `--departments` is given),
    /// tight price band.
    Regional,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Normalize {
    Keep,
    Collapse,
}

/// An inclusive `MIN:MAX` pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

pub fn parse_range(s: &str) -> Result<Range, String> {
    let (min, max) = s
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got '{}'", s))?;
    let min: f64 = min.trim().parse().map_err(|_| format!("invalid minimum '{}'", min))?;
    let max: f64 = max.trim().parse().map_err(|_| format!("invalid maximum '{}'", max))?;
    if min.is_nan() || max.is_nan() || min > max {
        return Err(format!("minimum {} exceeds maximum {}", min, max));
    }
    Ok(Range { min, max })
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Input CSV, plain or gzip-compressed.
    #[arg(long)]
    pub input: String,

    /// Snapshot store directory.
    #[arg(long)]
    pub store: String,

    #[arg(long, value_enum, default_value_t = Scope::National)]
    pub scope: Scope,

    /// Comma-separated department codes to keep.
    #[arg(long, value_delimiter = ',')]
    pub departments: Vec<String>,

    /// Plausible price per m², as MIN:MAX. Defaults to the scope's band.
    #[arg(long, value_parser = parse_range)]
    pub band: Option<Range>,

    /// Keep rows whose price per m² equals a band edge.
    #[arg(long)]
    pub inclusive_band: bool,

    /// Arrondissement codes of Paris, Lyon and Marseille.
    #[arg(long, value_enum, default_value_t = Normalize::Keep)]
    pub normalize: Normalize,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, default_value_t = ',')]
    pub delimiter: char,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[arg(long)]
    pub store: String,

    /// Department code, or `all`.
    #[arg(long, default_value = "all")]
    pub department: String,

    /// Comma-separated property types. Defaults to all.
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,

    #[arg(long)]
    pub start: Option<String>,

    #[arg(long)]
    pub end: Option<String>,

    /// Price per m² range, as MIN:MAX.
    #[arg(long, value_parser = parse_range)]
    pub price: Option<Range>,

    #[arg(long, default_value_t = immostat_engine::query::filter::DEFAULT_MIN_SALES)]
    pub min_sales: u64,

    #[arg(long, default_value_t = immostat_engine::query::filter::DEFAULT_RANKING_MIN_SALES)]
    pub ranking_min_sales: u64,

    /// Minimum sales (inclusive) for the top-price KPI. Defaults to the
    /// first ranked municipality.
    #[arg(long)]
    pub kpi_min_sales: Option<u64>,

    #[arg(long, default_value_t = immostat_engine::query::filter::DEFAULT_TOP_N)]
    pub top: usize,

    #[arg(long, default_value_t = immostat_engine::query::filter::DEFAULT_BINS)]
    pub bins: usize,

    /// GeoJSON municipalities, used to centre the map view.
    #[arg(long)]
    pub geojson: Option<PathBuf>,

    /// Print the available filter values instead of running a query.
    #[arg(long)]
    pub options: bool,
}

#[derive(Args, Debug)]
pub struct CentroidsArgs {
    #[arg(long)]
    pub geojson: PathBuf,
}

pub fn pipeline_config(args: &BuildArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = match args.scope {
        Scope::National => PipelineConfig::national(),
        Scope::Regional if args.departments.is_empty() => PipelineConfig::ile_de_france(),
        Scope::Regional => PipelineConfig::regional(args.departments.iter().cloned()),
    };
    if args.scope == Scope::National && !args.departments.is_empty() {
        config.scope = GeoScope::departments(args.departments.iter().cloned());
    }
    if let Some(band) = args.band {
        config.price_band = PriceBand::exclusive(band.min, band.max);
    }
    if args.inclusive_band {
        config.price_band.bounds = BandBounds::Inclusive;
    }
    config.normalization = match args.normalize {
        Normalize::Keep => CodeNormalization::KeepAsIs,
        Normalize::Collapse => CodeNormalization::CollapseToParent,
    };
    if let Some(n) = args.batch_size {
        config.batch_size = n;
    }
    if let Some(n) = args.workers {
        config.workers = n;
    }
    config.validate()?;
    Ok(config)
}

pub fn query_filter(args: &QueryArgs) -> anyhow::Result<QueryFilter> {
    let property_types: BTreeSet<PropertyType> = if args.types.is_empty() {
        PropertyType::ALL.into_iter().collect()
    } else {
        args.types
            .iter()
            .map(|t| PropertyType::parse(t).with_context(|| format!("unknown property type '{}'", t)))
            .collect::<anyhow::Result<_>>()?
    };
    Ok(QueryFilter {
        department: DepartmentSelector::parse(&args.department),
        property_types,
        start: args.start.clone(),
        end: args.end.clone(),
        price_min: args.price.map(|r| r.min),
        price_max: args.price.map(|r| r.max),
        min_sales: args.min_sales,
        ranking_min_sales: args.ranking_min_sales,
        kpi_min_sales: args.kpi_min_sales,
        top_n: args.top,
        bins: args.bins,
    })
}

fn load_centroids(path: &Path) -> anyhow::Result<DepartmentCentroids> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let features = read_feature_collection(std::io::BufReader::new(file))?;
    Ok(DepartmentCentroids::resolve(&features))
}

async fn build(args: BuildArgs) -> anyhow::Result<String> {
    let config = Arc::new(pipeline_config(&args)?);
    if !args.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character");
    }
    let options = SourceOptions {
        batch_size: config.batch_size,
        delimiter: args.delimiter as u8,
    };
    let source = RecordSource::open(&LocalFileSystem, &args.input, &options)
        .with_context(|| format!("opening {}", args.input))?;
    let store = SnapshotStore::open_local(&args.store)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling build");
            on_interrupt.cancel();
        }
    });
    let result = store.build(source, config, cancel).await;
    watcher.abort();

    let (generation, report) = result?;
    info!(generation, store = %args.store, "snapshot ready");
    Ok(serde_json::to_string_pretty(&json!({
        "generation": generation,
        "report": report,
    }))?)
}

fn query(args: QueryArgs) -> anyhow::Result<String> {
    let store = SnapshotStore::open_local(&args.store)?;
    let snapshot = store
        .current()?
        .with_context(|| format!("no snapshot published in {}", args.store))?;
    let mut engine = QueryEngine::new(snapshot);
    if args.options {
        return Ok(serde_json::to_string_pretty(&engine.options())?);
    }
    if let Some(path) = &args.geojson {
        engine = engine.with_centroids(load_centroids(path)?);
    }
    let response = engine.run(&query_filter(&args)?);
    Ok(serde_json::to_string_pretty(&*response)?)
}

fn centroids(args: CentroidsArgs) -> anyhow::Result<String> {
    let centroids = load_centroids(&args.geojson)?;
    Ok(serde_json::to_string_pretty(&centroids)?)
}

/// Execute `cli` and return what should be printed.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    match cli.command {
        Command::Build(args) => build(args).await,
        Command::Query(args) => query(args),
        Command::Centroids(args) => centroids(args),
    }
}
