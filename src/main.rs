//! CareWatch - rule-based symptom analysis and outbreak surveillance.
//!
//! # API Endpoints
//!
//! - `POST /analyses` - Analyze a symptom report
//! - `GET /analyses` - List analyses (`?flagged=true` for the review queue)
//! - `GET /analyses/:id` - Fetch one analysis
//! - `POST /analyses/:id/rerun` - Re-analyze a stored report
//! - `GET /cases`, `POST /cases`, `PATCH /cases/:id` - Disease cases
//! - `POST /outbreaks/detect` - Run outbreak detection
//! - `GET /outbreaks`, `GET /outbreaks/:id` - Outbreaks
//! - `PATCH /outbreaks/:id/status` - Change outbreak status
//! - `POST /outbreaks/:id/actions` - Log an action
//! - `POST /outbreaks/:id/refresh` - Recompute statistics
//! - `GET /surveillance/summary` - Case counts
//! - `GET /symptoms`, `GET /syndromes`, `GET /syndromes/:name` - Rule catalog
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use carewatch::analysis::Analyzer;
use carewatch::api::{AppState, router};
use carewatch::config::AppConfig;
use carewatch::rules::RuleConfig;
use carewatch::storage::Storage;
use carewatch::surveillance::spawn_detection_poller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("carewatch=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;
    info!(
        port = config.port,
        db_url = %config.database_url,
        threshold = config.detection.threshold,
        window_days = config.detection.time_window_days,
        "Starting CareWatch server"
    );

    let rules = match &config.rules_path {
        Some(path) => {
            let rules = RuleConfig::from_json_file(path)?;
            info!(path = %path.display(), syndromes = rules.syndromes.len(), "Rules loaded");
            rules
        }
        None => {
            info!("Using built-in rules");
            RuleConfig::default()
        }
    };

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    match config.detection_interval {
        Some(every) => {
            spawn_detection_poller(storage.clone(), config.detection, every);
            info!(interval_secs = every.as_secs(), "Scheduled outbreak detection enabled");
        }
        None => info!("Scheduled outbreak detection disabled"),
    }

    let state = AppState {
        storage,
        analyzer: Analyzer::new(rules),
        detection: config.detection,
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "CareWatch is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
