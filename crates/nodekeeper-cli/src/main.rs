//! nodekeeper - inference node control loop
//!
//! Usage:
//!   nodekeeper status             # Aggregated node status
//!   nodekeeper diagnose           # Find out why a node is stuck
//!   nodekeeper repair             # Fix what diagnose found
//!   nodekeeper versions           # Compare running and published versions
//!   nodekeeper update             # Apply image updates

mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nodekeeper_core::adapters::{ComposeCli, HttpChainRpc, HttpControlApi, HttpEngineProbe};
use nodekeeper_core::config::{ConfigStore, KeeperConfig};
use nodekeeper_core::diagnose::Diagnostician;
use nodekeeper_core::install::HttpDownloader;
use nodekeeper_core::poll::CancellationToken;
use nodekeeper_core::release::GithubReleases;
use nodekeeper_core::repair::{RepairExecutor, plan_steps};
use nodekeeper_core::rollout::RolloutOrchestrator;
use nodekeeper_core::status::StatusAggregator;
use nodekeeper_core::topology::Service;
use nodekeeper_core::versions::{HttpVersionManifest, VersionDiffEngine, VersionReport};

/// Exit status after a forced interrupt (128 + SIGINT)
const INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "nodekeeper")]
#[command(about = "Diagnose, repair and update an inference node", long_about = None)]
struct Cli {
    /// Path to nodekeeper.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show aggregated node status
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Diagnose a stuck deployment without changing anything
    Diagnose {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Diagnose and repair a stuck deployment
    Repair {
        /// Print the steps without running them
        #[arg(long)]
        dry_run: bool,

        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Compare running and latest published versions
    Versions {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Update service images
    ///
    /// Updating mlnode takes the node out of scheduling until the model is
    /// loaded again; other services are updated in place.
    Update {
        /// Only show what would be updated
        #[arg(long)]
        check: bool,

        /// Restrict the update to these services (compose names)
        #[arg(long = "service", value_name = "NAME")]
        services: Vec<String>,

        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nodekeeper=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("interrupt received; stopping at the next safe point (Ctrl-C again to quit)");
        on_interrupt.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt; exiting immediately");
            std::process::exit(INTERRUPTED);
        }
    });

    match cli.command {
        Commands::Status { format } => run_status(&config, format).await,
        Commands::Diagnose { format } => run_diagnose(&config, format).await,
        Commands::Repair { dry_run, format } => run_repair(&config, dry_run, format, cancel).await,
        Commands::Versions { format } => run_versions(&config, format).await,
        Commands::Update {
            check,
            services,
            format,
        } => run_update(&config, check, &services, format, cancel).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<KeeperConfig> {
    let store = match path {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_location()?,
    };
    let config = store.load()?;
    info!(path = %store.config_path().display(), "loaded config");
    Ok(config)
}

/// Live adapters built from configuration
struct Node {
    runtime: ComposeCli,
    control: HttpControlApi,
    chain: HttpChainRpc,
    engine: HttpEngineProbe,
}

impl Node {
    fn connect(config: &KeeperConfig) -> Result<Self> {
        let timeouts = &config.timeouts;
        Ok(Self {
            runtime: ComposeCli::new(
                config.paths.compose_file.clone(),
                config.paths.deploy_dir.clone(),
            ),
            control: HttpControlApi::new(&config.endpoints.control_api, timeouts.status_fetch())?,
            chain: HttpChainRpc::new(&config.endpoints.chain_rpc, timeouts.chain_fetch())?,
            engine: HttpEngineProbe::new(&config.endpoints.engine, timeouts.status_fetch())?,
        })
    }
}

async fn run_status(config: &KeeperConfig, format: OutputFormat) -> Result<()> {
    let node = Node::connect(config)?;
    let snapshot = StatusAggregator::new(&node.control, &node.chain, &node.engine, &config.timeouts)
        .collect()
        .await;

    match format {
        OutputFormat::Table => render::status(&snapshot),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }
    Ok(())
}

async fn run_diagnose(config: &KeeperConfig, format: OutputFormat) -> Result<()> {
    let node = Node::connect(config)?;
    let plan = Diagnostician::new(config, &node.runtime, Some(&node.chain))
        .run()
        .await;

    match format {
        OutputFormat::Table => render::plan(&plan, &plan_steps(&plan)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }
    Ok(())
}

async fn run_repair(
    config: &KeeperConfig,
    dry_run: bool,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<()> {
    let node = Node::connect(config)?;
    let plan = Diagnostician::new(config, &node.runtime, Some(&node.chain))
        .run()
        .await;
    let steps = plan_steps(&plan);

    if dry_run || steps.is_empty() {
        match format {
            OutputFormat::Table => render::plan(&plan, &steps),
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "plan": plan,
                    "steps": steps,
                }))?
            ),
        }
        return Ok(());
    }

    let releases = GithubReleases::new(&config.release, config.timeouts.metadata())?;
    let downloader = HttpDownloader::new(config.timeouts.download())?;
    let report = RepairExecutor::new(config, &node.runtime, &node.chain, &releases, &downloader)
        .with_cancellation(cancel)
        .run(&steps)
        .await
        .context("Repair aborted")?;

    match format {
        OutputFormat::Table => render::repair(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

async fn compute_versions(config: &KeeperConfig, node: &Node) -> Result<VersionReport> {
    let manifest =
        HttpVersionManifest::new(config.versions_manifest_url(), config.timeouts.metadata())?;
    let compose = std::fs::read_to_string(&config.paths.compose_file).with_context(|| {
        format!(
            "Failed to read compose file: {}",
            config.paths.compose_file.display()
        )
    })?;
    Ok(VersionDiffEngine::new(&manifest)
        .with_running_sources(Some(&node.chain), Some(&node.control))
        .compute(&compose)
        .await)
}

async fn run_versions(config: &KeeperConfig, format: OutputFormat) -> Result<()> {
    let node = Node::connect(config)?;
    let report = compute_versions(config, &node).await?;

    match format {
        OutputFormat::Table => render::versions(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.diffs)?),
    }
    Ok(())
}

fn parse_services(names: &[String]) -> Result<Vec<Service>> {
    names
        .iter()
        .map(|name| {
            Service::from_compose_name(name).ok_or_else(|| {
                let known: Vec<&str> = Service::ALL.iter().map(|s| s.compose_name()).collect();
                anyhow::anyhow!("Unknown service: {}. Known: {}", name, known.join(", "))
            })
        })
        .collect()
}

async fn run_update(
    config: &KeeperConfig,
    check: bool,
    services: &[String],
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<()> {
    let selected = parse_services(services)?;
    let node = Node::connect(config)?;
    let mut report = compute_versions(config, &node).await?;
    if !selected.is_empty() {
        report.diffs.retain(|d| selected.contains(&d.service));
    }

    let orchestrator = RolloutOrchestrator::new(config, &node.runtime, &node.control, &node.engine)
        .with_cancellation(cancel);
    let steps = orchestrator.plan(&report.diffs);

    if check || steps.is_empty() {
        match format {
            OutputFormat::Table => {
                render::versions(&report);
                render::rollout_steps(&steps);
            }
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "diffs": report.diffs,
                    "steps": steps,
                }))?
            ),
        }
        return Ok(());
    }

    let rollout = orchestrator.run(&steps).await.context("Update aborted")?;

    match format {
        OutputFormat::Table => render::rollout(&rollout),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rollout)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names_are_compose_names() {
        let parsed = parse_services(&["mlnode".to_string(), "proxy-ssl".to_string()])
            .expect("known services");
        assert_eq!(parsed, vec![Service::MlNode, Service::ProxySsl]);
    }

    #[test]
    fn unknown_service_lists_known_ones() {
        let err = parse_services(&["gpu".to_string()]).unwrap_err();
        assert!(err.to_string().contains("proxy-ssl"));
    }

    #[test]
    fn update_accepts_repeated_service_flags() {
        let cli = Cli::try_parse_from([
            "nodekeeper",
            "--config",
            "/etc/nodekeeper.toml",
            "update",
            "--check",
            "--service",
            "mlnode",
            "--service",
            "proxy",
        ])
        .expect("valid arguments");
        assert_eq!(cli.config, Some(PathBuf::from("/etc/nodekeeper.toml")));
        let Commands::Update {
            check, services, ..
        } = cli.command
        else {
            panic!("expected update command");
        };
        assert!(check);
        assert_eq!(services, vec!["mlnode", "proxy"]);
    }
}
