use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use railsync::config::{Profiles, RuntimeConfig, ServerConfig, StorageBackend};
use std::path::PathBuf;

/// Track-work notification sync and train location streaming
#[derive(Parser)]
#[command(name = "railsync")]
#[command(version)]
#[command(about = "Synchronise track-work notifications and stream train locations from the rail live interface", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to ./railsync.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Live interface base URL
    #[arg(short = 'u', long, value_name = "URL")]
    live_interface_url: Option<String>,

    /// Comma-separated deployment profiles, e.g. "prd" or "tst,beta"
    #[arg(long, value_name = "LIST")]
    profiles: Option<String>,

    /// Which workloads to run
    #[arg(long, value_enum, default_value_t = Workload::All)]
    only: Workload,

    /// GeoJSON track geometry used by the proximity filter
    #[arg(long, value_name = "FILE")]
    track_geometry: Option<PathBuf>,

    /// Status endpoint port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Data directory for the filesystem storage backend
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Run one sync cycle and one location tick, then exit
    #[arg(long)]
    once: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Workload {
    All,
    TrackWork,
    TrainLocations,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("railsync")
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        let config = resolve_config(&cli)?;
        if cli.once {
            railsync::run_once(config).await
        } else {
            railsync::run_with_config(config).await
        }
    })
}

/// File (or discovered defaults), then environment, then command line.
fn resolve_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::load_or_default().context("Failed to load configuration")?,
    };

    if let Some(url) = &cli.live_interface_url {
        config.live_interface.url = url.clone();
    }

    if let Some(raw) = &cli.profiles {
        config.publish.profiles = Profiles::parse(raw).names().to_vec();
    }

    match cli.only {
        Workload::All => {}
        Workload::TrackWork => config.train_locations.enabled = false,
        Workload::TrainLocations => config.track_work.enabled = false,
    }

    if let Some(path) = &cli.track_geometry {
        config.train_locations.track.geometry_path = Some(path.to_string_lossy().into_owned());
    }

    if let Some(port) = cli.port {
        config
            .server
            .get_or_insert_with(ServerConfig::default)
            .listen_addr = format!("0.0.0.0:{}", port);
    }

    if let Some(dir) = &cli.output {
        anyhow::ensure!(
            config.storage.backend == StorageBackend::Fs,
            "--output needs the fs storage backend, but '{}' is configured",
            config.storage.backend
        );
        config.storage.fs.get_or_insert_with(Default::default).path =
            dir.to_string_lossy().into_owned();
    }

    if let Some(level) = &cli.log_level {
        config
            .server
            .get_or_insert_with(ServerConfig::default)
            .log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}
