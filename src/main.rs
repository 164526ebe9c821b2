//! Converge - desired-state module installer
//!
//! Main entry point for the Converge CLI.

mod cli;
mod desired;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use converge_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};
use converge_core::{ContainerState, MemoryContainer};
use converge_registry::{FileSnapshotStore, ResourceRegistry};
use converge_runloop::Installer;

use cli::{Cli, Commands};
use desired::DesiredSet;

/// Initialize tracing with console output and, if configured, a daily log file.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let file_layer = match &logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("converge")
                .filename_suffix("log")
                .max_log_files(logging.max_files)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes on drop and must live for the whole program.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_or_default(path)?;
    let result = ConfigValidator::validate(&config);
    if !result.is_valid() {
        let messages: Vec<String> = result
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        return Err(format!("Invalid configuration: {}", messages.join("; ")).into());
    }
    Ok(config)
}

fn open_registry(config: &Config) -> ResourceRegistry {
    let store = FileSnapshotStore::new(&config.registry.storage_path);
    ResourceRegistry::open(Arc::new(store))
}

fn load_container(path: &Path) -> Result<MemoryContainer, Box<dyn std::error::Error>> {
    if !path.exists() {
        info!("No container state at {}, starting empty", path.display());
        return Ok(MemoryContainer::new());
    }
    let content = std::fs::read_to_string(path)?;
    let state: ContainerState = serde_json::from_str(&content)?;
    Ok(MemoryContainer::from_state(state))
}

fn save_container(path: &Path, container: &MemoryContainer) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(&container.to_state())?;
    std::fs::write(path, content)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config.logging)?;

    match cli.command {
        Commands::Apply {
            desired,
            scheme,
            state,
            timeout_secs,
        } => {
            let scheme = scheme.unwrap_or_else(|| config.registry.scheme.clone());
            let state = state.unwrap_or_else(|| config.container.state_path.clone());
            run_apply(&config, desired, &scheme, state, Duration::from_secs(timeout_secs)).await
        }
        Commands::Status { scheme } => run_status(&config, scheme.as_deref()),
    }
}

/// Register the desired set and wait for the container to converge.
async fn run_apply(
    config: &Config,
    desired: PathBuf,
    scheme: &str,
    state: PathBuf,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Converge v{}", env!("CARGO_PKG_VERSION"));
    let desired = DesiredSet::load(&desired)?;
    let registry = Arc::new(open_registry(config));
    let container = load_container(&state)?;

    let installer = Installer::new(
        Arc::new(container.clone()),
        registry.clone(),
        config.installer.clone(),
    );
    installer.start()?;

    let report = installer.register_resources(&desired.resources(), scheme);
    for (url, reason) in &report.rejected {
        warn!("Rejected {}: {}", url, reason);
    }
    info!(
        "Registered {} resources, {} withdrawn",
        report.accepted.len(),
        report.removed.len()
    );

    let settled = installer.wait_until_settled(timeout).await;
    installer.stop().await?;
    save_container(&state, &container)?;

    let counters = installer.counters().snapshot();
    println!(
        "{} tasks completed, {} failed, {} deferred in {} cycles",
        counters.tasks_completed, counters.tasks_failed, counters.tasks_deferred, counters.cycles
    );
    let container_state = container.to_state();
    for module in &container_state.modules {
        println!(
            "  module {} {} {:?}",
            module.symbolic_name, module.version, module.state
        );
    }
    for record in &container_state.configs {
        println!("  config {}", record.pid.composite());
    }

    if !report.rejected.is_empty() {
        return Err(format!("{} resources rejected", report.rejected.len()).into());
    }
    if !settled {
        return Err(format!("Not converged within {} seconds", timeout.as_secs()).into());
    }
    Ok(())
}

/// Print the registered groups.
fn run_status(config: &Config, scheme: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open_registry(config);
    let groups = registry.resources(scheme);
    if groups.is_empty() {
        println!("No resources registered");
        return Ok(());
    }

    for (entity_id, group) in &groups {
        let desired = group.desired().map(|r| r.url.as_str()).unwrap_or("-");
        println!("{} -> {}", entity_id, desired);
        for member in group.members() {
            println!(
                "  {} priority={} serial={}{}",
                member,
                member.priority,
                member.serial_number,
                if member.installable { "" } else { " (withdrawn)" }
            );
        }
    }
    Ok(())
}
