pub mod commands;
pub mod error;
pub mod feed;
pub mod state;

use commands::feed::{feed_snapshot, feed_status, start_feed, stop_feed};
use error::AppError;
use feed::types::StartFeedArgs;
use state::AppState;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

const SUMMARY_INTERVAL_MS: u64 = 5_000;

/// Runs one feed configured from the environment until Ctrl-C, logging a
/// periodic PnL summary.
pub async fn run() -> Result<(), AppError> {
    let state = AppState::new();
    let args = StartFeedArgs::from_env()?;
    let session = start_feed(&state, Some(args)).await?;
    info!(
        url = %session.url,
        reconnect_delay_ms = session.reconnect_delay_ms,
        poll_interval_ms = session.poll_interval_ms,
        series_capacity = session.series_capacity,
        "feed session started"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(SUMMARY_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let status = feed_status(&state);
                let snapshot = feed_snapshot(&state);
                info!(
                    state = ?status.state,
                    clients = snapshot.aggregate.clients,
                    realized = snapshot.aggregate.realized,
                    unrealized = snapshot.aggregate.unrealized,
                    trades = snapshot.store.trades.len(),
                    frames = snapshot.frames_received,
                    "feed summary"
                );
            }
        }
    }

    stop_feed(&state).await?;
    Ok(())
}
