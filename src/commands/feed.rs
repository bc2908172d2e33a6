use crate::error::AppError;
use crate::feed::pipeline::{run_feed, FeedSnapshot};
use crate::feed::protocol::OutboundRequest;
use crate::feed::types::{
    FeedConnectionState, FeedSession, FeedStatusSnapshot, FeedStopResult, StartFeedArgs,
};
use crate::feed::REQUEST_QUEUE_CAPACITY;
use crate::state::{AppState, FeedHandle};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Starts a feed with the given settings, replacing any feed already running.
pub async fn start_feed(
    state: &AppState,
    args: Option<StartFeedArgs>,
) -> Result<FeedSession, AppError> {
    let config = args.unwrap_or_default().normalize()?;

    let existing_handle = {
        let mut feed_slot = state.feed.lock().await;
        feed_slot.take()
    };
    if let Some(handle) = existing_handle {
        info!("replacing running feed");
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
    }

    let cancellation_token = CancellationToken::new();
    let task_token = cancellation_token.clone();
    let status_store = Arc::clone(&state.feed_status);
    let snapshot_tx = Arc::clone(&state.snapshot_tx);
    let (requests, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
    let runtime_config = config.clone();

    let join_handle = tokio::spawn(async move {
        run_feed(runtime_config, status_store, snapshot_tx, request_rx, task_token).await;
    });

    {
        let mut feed_slot = state.feed.lock().await;
        *feed_slot = Some(FeedHandle {
            cancellation_token,
            join_handle,
            requests,
        });
    }

    Ok(FeedSession::from_config(&config))
}

/// Tears the feed down. No reconnect or poll fires once this returns.
pub async fn stop_feed(state: &AppState) -> Result<FeedStopResult, AppError> {
    let existing_handle = {
        let mut feed_slot = state.feed.lock().await;
        feed_slot.take()
    };

    let stopped = if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
        true
    } else {
        false
    };

    {
        let mut writable = state.feed_status.write();
        let current = writable.clone();
        *writable = FeedStatusSnapshot {
            state: FeedConnectionState::Stopped,
            url: current.url,
            connect_attempts: current.connect_attempts,
            last_transport_error: current.last_transport_error,
            reason: Some("feed stopped by command".to_string()),
        };
    }

    Ok(FeedStopResult { stopped })
}

pub fn feed_status(state: &AppState) -> FeedStatusSnapshot {
    state.feed_status.read().clone()
}

pub fn feed_snapshot(state: &AppState) -> Arc<FeedSnapshot> {
    Arc::clone(&state.snapshot_tx.borrow())
}

/// Latest-wins view stream. Slow readers skip intermediate snapshots.
pub fn subscribe_snapshots(state: &AppState) -> watch::Receiver<Arc<FeedSnapshot>> {
    state.snapshot_tx.subscribe()
}

/// Queues a request for the live connection. Requests that reach the feed
/// while it is not open are dropped with a warning, never replayed.
pub async fn send_request(state: &AppState, request: OutboundRequest) -> Result<(), AppError> {
    request.validate()?;

    let sender = {
        let feed_slot = state.feed.lock().await;
        feed_slot
            .as_ref()
            .map(|handle| handle.requests.clone())
            .ok_or(AppError::FeedNotRunning)?
    };

    sender
        .send(request)
        .await
        .map_err(|_| AppError::FeedClosed)
}
