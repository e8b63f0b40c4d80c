// =============================================================================
// Confluence Engine — Main Entry Point
// =============================================================================
//
// Loads and validates the engine configuration (a bad configuration stops the
// process before anything else starts), then runs its loops side by side:
// the read-only API server, the configuration watcher, the evaluation cycle,
// the periodic digest and the weekly report.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod classifier;
mod error;
mod evaluator;
mod indicators;
mod market_data;
mod notify;
mod runtime_config;
mod signals;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::evaluator::Collaborators;
use crate::market_data::JsonFileSource;
use crate::notify::{build_digest, build_weekly_report, LogNotifier, Notifier, WEEK_DAYS};
use crate::runtime_config::{ConfigHandle, EngineConfig};

const DEFAULT_CONFIG_PATH: &str = "engine_config.json";

/// Environment overrides applied on top of every loaded configuration.
fn apply_env_overrides(config: &mut EngineConfig) {
    if let Ok(syms) = std::env::var("CONFLUENCE_SYMBOLS") {
        let symbols: Vec<String> = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !symbols.is_empty() {
            config.symbols = symbols;
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::load(path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Confluence Engine — Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = PathBuf::from(
        std::env::var("CONFLUENCE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into()),
    );
    let config = load_config(&config_path)
        .with_context(|| format!("cannot start without a valid {}", config_path.display()))?;
    let handle = ConfigHandle::new(config)
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

    let snapshot = handle.snapshot();
    info!(
        symbols = ?snapshot.config.symbols,
        data_dir = %snapshot.config.data_dir,
        interval_secs = snapshot.config.evaluation_interval_secs,
        "Configuration loaded"
    );

    // ── 2. Build shared state & collaborators ────────────────────────────
    let state = Arc::new(AppState::new(handle));
    let source = Arc::new(JsonFileSource::new(&snapshot.config.data_dir));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let collaborators = Collaborators {
        market: source.clone(),
        news: source,
        notifier: notifier.clone(),
    };

    // ── 3. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("CONFLUENCE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 4. Configuration watcher ─────────────────────────────────────────
    let watch_state = state.clone();
    let watch_path = config_path.clone();
    tokio::spawn(async move {
        let mut last_modified = modified_at(&watch_path);
        loop {
            let poll = watch_state.config.snapshot().config.config_poll_secs;
            tokio::time::sleep(tokio::time::Duration::from_secs(poll)).await;

            let modified = modified_at(&watch_path);
            if modified == last_modified {
                continue;
            }
            last_modified = modified;

            let reloaded = load_config(&watch_path).and_then(|c| {
                watch_state.config.swap(c).map_err(anyhow::Error::from)
            });
            match reloaded {
                Ok(version) => {
                    watch_state.increment_version();
                    info!(version, "Configuration reload applied");
                }
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "Configuration reload rejected, keeping previous");
                    watch_state.push_error(format!("config reload rejected: {e:#}"), None);
                }
            }
        }
    });

    // ── 5. Evaluation loop ───────────────────────────────────────────────
    let eval_state = state.clone();
    tokio::spawn(async move {
        info!("Evaluation loop starting");
        loop {
            evaluator::run_cycle(eval_state.clone(), collaborators.clone()).await;
            let secs = eval_state.config.snapshot().config.evaluation_interval_secs;
            tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;
        }
    });

    // ── 6. Digest loop ───────────────────────────────────────────────────
    let digest_state = state.clone();
    let digest_notifier = notifier.clone();
    tokio::spawn(async move {
        loop {
            let hours = digest_state.config.snapshot().config.digest_interval_hours;
            tokio::time::sleep(tokio::time::Duration::from_secs(hours * 3600)).await;
            let digest = build_digest(&digest_state, chrono::Utc::now());
            if let Err(e) = digest_notifier.publish_digest(&digest) {
                warn!(error = %e, "Digest publication failed");
                digest_state.push_error(format!("digest publication failed: {e:#}"), None);
            }
        }
    });

    // ── 7. Weekly report loop ────────────────────────────────────────────
    let weekly_state = state.clone();
    tokio::spawn(async move {
        let week = tokio::time::Duration::from_secs(WEEK_DAYS as u64 * 24 * 3600);
        loop {
            tokio::time::sleep(week).await;
            let report = build_weekly_report(&weekly_state, chrono::Utc::now());
            if let Err(e) = notifier.publish_weekly(&report) {
                warn!(error = %e, "Weekly report publication failed");
                weekly_state.push_error(format!("weekly report publication failed: {e:#}"), None);
            }
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 8. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping");
    info!("Confluence Engine shut down complete.");
    Ok(())
}
