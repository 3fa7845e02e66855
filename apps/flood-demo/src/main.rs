//! # Flood Demo
//!
//! Runs a burst of flood checks for one user and logs each decision.

use flood_core::FloodController;
use flood_core::domain::FloodPolicy;

mod config;
mod state;
mod telemetry;

use config::DemoConfig;
use telemetry::TelemetryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = DemoConfig::from_env()?;
    let policy = FloodPolicy::new(config.window, config.quota)?;

    tracing::info!(
        window_secs = config.window.as_secs(),
        quota = config.quota,
        store = ?config.store,
        "Starting flood control demo"
    );

    let store = state::build_store(config.store, config.sweep_interval).await?;
    let mut controller = FloodController::new(store, policy);
    if let Some(timeout) = config.check_timeout {
        controller = controller.with_timeout(timeout);
    }

    for attempt in 1..=config.requests {
        match controller.evaluate(config.user_id).await {
            Ok(verdict) if verdict.allowed => {
                tracing::info!(
                    attempt,
                    count = verdict.count,
                    remaining = verdict.remaining,
                    "Request allowed"
                );
            }
            Ok(verdict) => {
                tracing::info!(
                    attempt,
                    count = verdict.count,
                    retry_after_ms = verdict.reset_after.as_millis() as u64,
                    "Request denied"
                );
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "Error checking flood control");
                return Err(e.into());
            }
        }

        if !config.interval.is_zero() {
            tokio::time::sleep(config.interval).await;
        }
    }

    if let Some(record) = controller.snapshot(config.user_id).await? {
        tracing::info!(window = %serde_json::to_string(&record)?, "Final window");
    }

    Ok(())
}
