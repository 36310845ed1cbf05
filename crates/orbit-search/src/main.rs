//! Frame-of-interest search binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orbit_media::{CameraFeed, Cropper, MediaConfig, SampledVideo};
use orbit_oracle::{GuardConfig, GuardedOracle, VlmClient, VlmClientConfig};
use orbit_search::{
    load_results, write_json, Dataset, EntryResult, QueryEntry, SearchConfig, SearchOrchestrator,
};

/// Find the frames of multi-camera videos that satisfy a temporal specification.
#[derive(Parser, Debug)]
#[command(name = "orbit-search", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "ORBIT_METRICS_ADDR", global = true)]
    metrics_addr: Option<SocketAddr>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the search over every entry of a dataset.
    Run {
        /// Dataset layout of the input file.
        #[arg(long, value_enum, env = "ORBIT_DATASET", default_value = "generic")]
        dataset: Dataset,

        /// Dataset JSON file.
        #[arg(long)]
        input: PathBuf,

        /// Results JSON file, rewritten after every entry.
        #[arg(long)]
        output: PathBuf,

        /// Local VLM server index: uses http://localhost:800<N>/v1.
        #[arg(long, env = "ORBIT_DEVICE")]
        device: Option<u32>,

        /// Stop after this many entries.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Crop each result's video to its frames of interest.
    Crop {
        #[arg(long, value_enum, env = "ORBIT_DATASET", default_value = "generic")]
        dataset: Dataset,

        /// Results JSON file written by `run`.
        #[arg(long)]
        results: PathBuf,

        /// Output directory for clips and the index.
        #[arg(long)]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        orbit_search::metrics::init_metrics(addr)?;
        info!("Serving metrics on {}", addr);
    }

    match cli.command {
        Command::Run {
            dataset,
            input,
            output,
            device,
            limit,
        } => run(dataset, input, output, device, limit).await,
        Command::Crop {
            dataset,
            results,
            out_dir,
        } => crop(dataset, results, out_dir).await,
    }
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("orbit=info".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn run(
    dataset: Dataset,
    input: PathBuf,
    output: PathBuf,
    device: Option<u32>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let config = SearchConfig::from_env();
    let media = MediaConfig::from_env();
    let mut vlm_config = VlmClientConfig::from_env();
    if let Some(device) = device {
        vlm_config = vlm_config.with_device(device);
    }
    info!("Search config: {:?}", config);

    let client = VlmClient::new(vlm_config).context("creating VLM client")?;
    if !client.health_check().await? {
        warn!(
            "VLM server at {} is not serving {}",
            client.config().api_base,
            client.config().model
        );
    }
    let oracle = GuardedOracle::new(client, GuardConfig::from_env());
    let orchestrator = SearchOrchestrator::new(oracle, config)?;

    let mut entries = dataset
        .load_entries(&input)
        .with_context(|| format!("loading {}", input.display()))?;
    if let Some(limit) = limit {
        entries.truncate(limit);
    }

    let total = entries.len();
    let mut results: Vec<EntryResult> = Vec::with_capacity(total);
    for (i, entry) in entries.into_iter().enumerate() {
        info!(
            video_id = %entry.video_id,
            "Entry {}/{}: {}",
            i + 1,
            total,
            entry.question
        );

        match search_entry(&orchestrator, &entry, &media).await {
            Ok(result) => {
                results.push(result);
                write_json(&output, &results)?;
            }
            Err(e) => error!(video_id = %entry.video_id, "Search failed: {:#}", e),
        }
    }

    info!(
        completed = results.len(),
        total,
        output = %output.display(),
        "Dataset run complete"
    );
    Ok(())
}

async fn search_entry(
    orchestrator: &SearchOrchestrator<GuardedOracle<VlmClient>>,
    entry: &QueryEntry,
    media: &MediaConfig,
) -> anyhow::Result<EntryResult> {
    let sample_rate = orchestrator.config().sample_rate;

    let mut feeds: Vec<CameraFeed> = Vec::with_capacity(entry.video_paths.len());
    for path in &entry.video_paths {
        let sampled = SampledVideo::extract_temp(path, sample_rate, media)
            .await
            .with_context(|| format!("sampling {}", path.display()))?;
        feeds.push(sampled.into_feed());
    }

    let run = orchestrator
        .run(&entry.proposition, &entry.specification, feeds)
        .await?;
    info!(report = ?run.report, "Search report");

    Ok(EntryResult::new(entry.clone(), run.output))
}

async fn crop(dataset: Dataset, results: PathBuf, out_dir: PathBuf) -> anyhow::Result<()> {
    let results = load_results(&results)
        .with_context(|| format!("loading {}", results.display()))?;
    let cropper = Cropper::new(MediaConfig::from_env());

    let records = dataset.postprocess(&results, &out_dir, &cropper).await?;
    info!(
        cropped = records.len(),
        out_dir = %out_dir.display(),
        "Crop complete"
    );
    Ok(())
}
