use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::storage::create_object_store;
use gateway::GatewayState;
use lifecycle::{
    LifecycleMetrics, LifecycleScheduler, ObjectStoreTierStore, ProviderTiers, TierStore,
    TransitionOutcome, rules_from_config,
};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "blobtier")]
#[command(about = "BlobTier - age-based storage class tiering for object stores")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<BlobTierCommands>,
}

#[derive(Subcommand)]
enum BlobTierCommands {
    #[command(flatten)]
    Common(CommonCommands),
    /// Run a single lifecycle cycle, print its summary and exit
    RunOnce,
}

impl Default for BlobTierCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

async fn run_once(scheduler: &LifecycleScheduler) -> Result<()> {
    let report = scheduler
        .run_cycle(Utc::now())
        .await
        .context("Lifecycle cycle failed")?;

    println!("Cycle {} on '{}'", report.cycle_id, report.container);
    println!("  Objects scanned: {}", report.objects_scanned);
    println!("  Transitions planned: {}", report.summary.planned);
    println!("  Applied: {}", report.summary.applied);
    println!("  Skipped (dry run): {}", report.summary.skipped);
    println!(
        "  Failed: {} (unavailable {}, not found {}, permission denied {})",
        report.summary.failed(),
        report.summary.store_unavailable,
        report.summary.object_not_found,
        report.summary.permission_denied
    );
    for result in &report.results {
        let outcome = match &result.outcome {
            TransitionOutcome::Applied => "applied".to_string(),
            TransitionOutcome::Skipped => "skipped".to_string(),
            TransitionOutcome::Failed { kind, message } => format!("failed ({kind}): {message}"),
        };
        println!(
            "  {} {} -> {} [{}] {}",
            result.transition.object.name,
            result.transition.from,
            result.transition.to,
            result.transition.reason.rule_name,
            outcome
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    // Handle commands that don't require starting the service
    let command = cli.command.unwrap_or_default();
    if let BlobTierCommands::Common(ref common_cmd) = command {
        if matches!(common_cmd, CommonCommands::Validate) {
            rules_from_config(&config.lifecycle.rules).context("Invalid lifecycle rule")?;
        }
        if utils::handle_common_command(common_cmd, &config).await? {
            return Ok(());
        }
    }

    utils::validate_config(&config)?;
    let rules = rules_from_config(&config.lifecycle.rules).context("Invalid lifecycle rule")?;

    let object_store =
        create_object_store(&config.storage).context("Failed to create object store")?;
    let store: Arc<dyn TierStore> = Arc::new(
        ObjectStoreTierStore::new(object_store)
            .with_provider_tiers(ProviderTiers::for_dsn(&config.storage.dsn)),
    );

    let scheduler = Arc::new(LifecycleScheduler::from_config(
        store.clone(),
        rules,
        &config.lifecycle,
        LifecycleMetrics::new(),
    ));

    if matches!(command, BlobTierCommands::RunOnce) {
        return run_once(&scheduler).await;
    }

    log::info!("Starting BlobTier");
    log::info!("  Storage DSN: {}", config.storage.dsn);
    log::info!("  Container: {}", config.lifecycle.container);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = if config.lifecycle.enabled {
        let scheduler = scheduler.clone();
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move { scheduler.run(shutdown).await }))
    } else {
        log::info!("Lifecycle scheduler is disabled (lifecycle.enabled = false)");
        None
    };

    let gateway_handle = if config.gateway.enabled {
        let gateway_config = config.gateway.clone();
        let state = GatewayState::new(
            store,
            config.lifecycle.container.clone(),
            config.gateway.public_base_url.clone(),
        );
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            gateway::serve(&gateway_config, state, shutdown).await
        }))
    } else {
        log::info!("Upload gateway is disabled (gateway.enabled = false)");
        None
    };

    if scheduler_handle.is_none() && gateway_handle.is_none() {
        log::warn!("Nothing to run: both the lifecycle scheduler and the gateway are disabled");
        return Ok(());
    }

    log::info!("BlobTier running, waiting for shutdown signal");
    wait_for_shutdown_signal().await?;
    log::info!("Received shutdown signal, stopping BlobTier");

    // In-flight cycles finish before the scheduler observes this
    let _ = shutdown_tx.send(true);

    if let Some(handle) = scheduler_handle {
        handle.await.context("Lifecycle scheduler task panicked")?;
    }
    if let Some(handle) = gateway_handle {
        handle.await.context("Upload gateway task panicked")??;
    }

    log::info!("BlobTier stopped");

    Ok(())
}
