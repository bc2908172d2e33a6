use crate::feed::pipeline::FeedSnapshot;
use crate::feed::protocol::OutboundRequest;
use crate::feed::types::{ChartGeometry, FeedStatusSnapshot, DEFAULT_URL};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct FeedHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
    pub requests: mpsc::Sender<OutboundRequest>,
}

/// Owns at most one running feed. Callers reach the feed task only through
/// the request queue, the status store and the snapshot channel.
pub struct AppState {
    pub started_at: Instant,
    pub feed: Mutex<Option<FeedHandle>>,
    pub feed_status: Arc<RwLock<FeedStatusSnapshot>>,
    pub snapshot_tx: Arc<watch::Sender<Arc<FeedSnapshot>>>,
}

impl AppState {
    pub fn new() -> Self {
        let feed_status =
            FeedStatusSnapshot::stopped(DEFAULT_URL.to_string(), Some("feed idle".to_string()));
        let (snapshot_tx, _) = watch::channel(Arc::new(FeedSnapshot::empty(
            ChartGeometry::default(),
        )));

        Self {
            started_at: Instant::now(),
            feed: Mutex::new(None),
            feed_status: Arc::new(RwLock::new(feed_status)),
            snapshot_tx: Arc::new(snapshot_tx),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
