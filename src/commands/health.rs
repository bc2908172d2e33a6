use crate::feed::types::{FeedConnectionState, FeedStatusSnapshot};
use crate::{error::AppError, state::AppState};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub feed: FeedConnectionState,
    pub connect_attempts: u64,
}

pub fn build_health_response(started_at: Instant, feed: &FeedStatusSnapshot) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_ms: started_at.elapsed().as_millis(),
        feed: feed.state,
        connect_attempts: feed.connect_attempts,
    }
}

pub async fn health(state: &AppState) -> Result<HealthResponse, AppError> {
    let feed = state.feed_status.read().clone();
    Ok(build_health_response(state.started_at, &feed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok_status_and_idle_feed() {
        let state = AppState::new();

        let response = health(&state).await.expect("health should succeed");

        assert_eq!(response.status, "ok");
        assert_eq!(response.feed, FeedConnectionState::Stopped);
        assert_eq!(response.connect_attempts, 0);
        assert!(response.uptime_ms <= 1_000);
    }

    #[test]
    fn health_mirrors_feed_status() {
        let mut status = FeedStatusSnapshot::stopped("ws://venue".to_string(), None);
        status.state = FeedConnectionState::Open;
        status.connect_attempts = 3;

        let response = build_health_response(Instant::now(), &status);

        assert_eq!(response.feed, FeedConnectionState::Open);
        assert_eq!(response.connect_attempts, 3);
    }
}
