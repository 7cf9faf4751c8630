//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the UrjaBandhu daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::signal;
use tracing::info;
use urja_api::{spawn_api_server, ApiServer, ApiState};
use urja_common::config::AppConfig;
use urja_common::logging::init_tracing;
use urja_metrics::{new_registry, DaemonMetrics, PipelineMetrics};
use urja_pipeline::{
    export_series, AggregateMetrics, AnomalyRecord, DataSource, EnergySample, ExportFormat,
    Pipeline, SourcedSamples, Synthesizer, TimeRange,
};

const DEFAULT_CONFIG_PATH: &str = "configs/urjad.toml";

#[derive(Debug, Parser)]
#[command(author, version, about = "UrjaBandhu energy data daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the HTTP API until interrupted")]
    Serve {
        #[arg(long, value_name = "ADDR", help = "Override the configured listen address")]
        listen: Option<SocketAddr>,
    },
    #[command(about = "Write a synthetic series as JSON or CSV")]
    Export {
        #[arg(long, default_value = "24h", help = "One of 1h, 6h, 24h, 7d, 30d")]
        range: TimeRange,
        #[arg(long, default_value = "json", help = "json or csv")]
        format: ExportFormat,
        #[arg(long, value_name = "FILE", help = "Write to FILE instead of stdout")]
        output: Option<PathBuf>,
        #[arg(long, help = "Seed for reproducible output")]
        seed: Option<u64>,
    },
    #[command(about = "Print metrics and anomalies for a synthetic series")]
    Analyze {
        #[arg(long, default_value = "24h", help = "One of 1h, 6h, 24h, 7d, 30d")]
        range: TimeRange,
        #[arg(long, help = "Seed for reproducible output")]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG_PATH));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();
    let config = loaded.config;

    match cli.command.unwrap_or(Commands::Serve { listen: None }) {
        Commands::Serve { listen } => {
            init_tracing("urjad", &config.logging)?;
            match &loaded.source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("no configuration file found; running with defaults"),
            }
            run_daemon(config, listen, load_duration.as_secs_f64()).await?
        }
        Commands::Export {
            range,
            format,
            output,
            seed,
        } => {
            let samples = synthesize(&config, range, seed)?;
            let rendered = export_series(&samples, format)?;
            match output {
                Some(path) => fs::write(&path, rendered)
                    .with_context(|| format!("failed to write export to {}", path.display()))?,
                None => io::stdout()
                    .write_all(rendered.as_bytes())
                    .context("failed to write export to stdout")?,
            }
        }
        Commands::Analyze { range, seed } => {
            let samples = synthesize(&config, range, seed)?;
            let pipeline = Pipeline::from_config(&config.aggregation, &config.detection);
            let report = pipeline.analyze(SourcedSamples {
                samples,
                source: DataSource::Synthetic,
            });
            let summary = AnalysisSummary {
                range,
                data_source: report.data_source,
                sample_count: report.samples.len(),
                metrics: &report.metrics,
                anomalies: &report.anomalies,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisSummary<'a> {
    range: TimeRange,
    data_source: DataSource,
    sample_count: usize,
    metrics: &'a AggregateMetrics,
    anomalies: &'a [AnomalyRecord],
}

fn synthesize(
    config: &AppConfig,
    range: TimeRange,
    seed: Option<u64>,
) -> Result<Vec<EnergySample>> {
    let synthesizer = Synthesizer::new(&config.synthesis)?;
    let mut rng = match seed.or(config.synthesis.random_seed) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Ok(synthesizer.generate_series(range, &mut rng))
}

async fn run_daemon(
    config: AppConfig,
    listen: Option<SocketAddr>,
    config_load_seconds: f64,
) -> Result<()> {
    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.observe_config_load(config_load_seconds);
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) { "debug" } else { "release" },
    );

    let mut state = ApiState::from_config(&config)?;
    let registry = if config.metrics.enabled {
        state = state.with_metrics(PipelineMetrics::new(registry.clone())?);
        Some(registry)
    } else {
        info!("metrics endpoint disabled by configuration");
        None
    };

    let mut api_server: Option<ApiServer> = None;
    if config.api.enabled {
        let addr = listen.unwrap_or(config.api.listen);
        let server = spawn_api_server(Arc::new(state), registry, addr)
            .with_context(|| format!("failed to start api server on {addr}"))?;
        info!(address = %server.addr(), "api server started");
        api_server = Some(server);
    } else {
        info!("api server disabled by configuration");
    }

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = api_server {
        server.shutdown().await?;
    }

    Ok(())
}
