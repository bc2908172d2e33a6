use crate::error::AppError;
use crate::feed::chart::{build_chart, ChartFrame, ChartMetric};
use crate::feed::lifecycle::{ConnectionLifecycle, LifecycleAction};
use crate::feed::normalizer::RawFrame;
use crate::feed::protocol::{encode_request, OutboundRequest};
use crate::feed::router::{route_frame, RouteOutcome};
use crate::feed::series::{ClientSeries, PnlAggregate, SeriesAggregator};
use crate::feed::store::FeedStore;
use crate::feed::types::{
    ChartGeometry, ClientId, FeedConfig, FeedConnectionState, FeedStatusSnapshot,
};
use crate::feed::venue::{connect_feed_stream, FeedWsStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Read-only view handed to renderers. Rebuilt after every state-changing frame;
/// the series map and store slices are shared with the feed task, not copied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub store: FeedStore,
    pub aggregate: PnlAggregate,
    #[serde(serialize_with = "serialize_series")]
    pub series: Arc<BTreeMap<ClientId, ClientSeries>>,
    pub geometry: ChartGeometry,
    pub frames_received: u64,
    pub frames_discarded: u64,
}

impl FeedSnapshot {
    pub fn empty(geometry: ChartGeometry) -> Self {
        Self {
            store: FeedStore::default(),
            aggregate: PnlAggregate::default(),
            series: Arc::default(),
            geometry,
            frames_received: 0,
            frames_discarded: 0,
        }
    }

    pub fn chart(&self, metric: ChartMetric) -> ChartFrame {
        build_chart(&self.series, metric, &self.geometry)
    }
}

fn serialize_series<S>(
    series: &Arc<BTreeMap<ClientId, ClientSeries>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(series.len()))?;
    for entry in series.values() {
        seq.serialize_element(entry)?;
    }
    seq.end()
}

enum ConnectionEnd {
    Cancelled,
    Closed(String),
    Failed(String),
}

enum OpenEvent {
    Cancelled,
    Frame(Option<Result<Message, tungstenite::Error>>),
    PollTick,
    Request(Option<OutboundRequest>),
}

/// The single task that owns the socket, both timers, the store and the
/// aggregator. Nothing else mutates them.
struct FeedActor {
    config: FeedConfig,
    lifecycle: ConnectionLifecycle,
    store: FeedStore,
    aggregator: SeriesAggregator,
    frames_received: u64,
    frames_discarded: u64,
    last_transport_error: Option<String>,
    status_store: Arc<RwLock<FeedStatusSnapshot>>,
    snapshot_tx: Arc<watch::Sender<Arc<FeedSnapshot>>>,
    requests: mpsc::Receiver<OutboundRequest>,
    requests_open: bool,
    cancel_token: CancellationToken,
}

pub async fn run_feed(
    config: FeedConfig,
    status_store: Arc<RwLock<FeedStatusSnapshot>>,
    snapshot_tx: Arc<watch::Sender<Arc<FeedSnapshot>>>,
    requests: mpsc::Receiver<OutboundRequest>,
    cancel_token: CancellationToken,
) {
    let mut actor = FeedActor {
        lifecycle: ConnectionLifecycle::new(config.reconnect_delay(), config.poll_plan),
        aggregator: SeriesAggregator::new(config.series_capacity, config.palette.clone()),
        store: FeedStore::default(),
        frames_received: 0,
        frames_discarded: 0,
        last_transport_error: None,
        config,
        status_store,
        snapshot_tx,
        requests,
        requests_open: true,
        cancel_token,
    };
    actor.run().await;
}

impl FeedActor {
    async fn run(&mut self) {
        info!(url = %self.config.url, "starting feed");
        self.publish_snapshot();

        let mut action = self.lifecycle.start();
        while !self.cancel_token.is_cancelled() {
            action = match action {
                LifecycleAction::Connect => match self.connect().await {
                    None => break,
                    Some(Ok(stream)) => match self.drive_connection(stream).await {
                        ConnectionEnd::Cancelled => break,
                        ConnectionEnd::Closed(reason) => {
                            info!(%reason, "feed connection closed");
                            self.publish_status(FeedConnectionState::Closed, Some(reason));
                            self.lifecycle.on_closed()
                        }
                        ConnectionEnd::Failed(reason) => {
                            warn!(%reason, "feed connection failed");
                            self.last_transport_error = Some(reason.clone());
                            self.publish_status(FeedConnectionState::Closed, Some(reason));
                            self.lifecycle.on_closed()
                        }
                    },
                    Some(Err(error)) => {
                        let reason = format!("websocket connect error: {error}");
                        warn!(
                            %reason,
                            attempt = self.lifecycle.connect_attempts(),
                            "feed connect failed"
                        );
                        self.last_transport_error = Some(reason.clone());
                        self.publish_status(FeedConnectionState::Closed, Some(reason));
                        self.lifecycle.on_closed()
                    }
                },
                LifecycleAction::ScheduleReconnect(delay) => {
                    if !self.wait_for_reconnect(delay).await {
                        break;
                    }
                    self.lifecycle.on_reconnect_timer()
                }
                LifecycleAction::Nothing => break,
            };
        }

        self.lifecycle.teardown();
        self.publish_status(
            FeedConnectionState::Stopped,
            Some("feed stopped".to_string()),
        );
        info!(url = %self.config.url, "feed stopped");
    }

    /// `None` when cancelled mid-connect.
    async fn connect(&mut self) -> Option<Result<FeedWsStream, AppError>> {
        let attempt = self.lifecycle.connect_attempts();
        let reason = if attempt <= 1 {
            "opening websocket stream".to_string()
        } else {
            format!("reconnect attempt {}", attempt - 1)
        };
        self.publish_status(FeedConnectionState::Connecting, Some(reason));

        let url = self.config.url.clone();
        let connecting = connect_feed_stream(&url);
        tokio::pin!(connecting);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => return None,
                result = &mut connecting => return Some(result),
                request = self.requests.recv(), if self.requests_open => {
                    self.skip_request(request);
                }
            }
        }
    }

    /// Sleeps out the reconnect delay. Returns false if cancelled first.
    async fn wait_for_reconnect(&mut self, delay: Duration) -> bool {
        debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => return false,
                _ = &mut sleep => return true,
                request = self.requests.recv(), if self.requests_open => {
                    self.skip_request(request);
                }
            }
        }
    }

    fn skip_request(&mut self, request: Option<OutboundRequest>) {
        match request {
            Some(request) => {
                warn!(kind = request.kind(), "feed not open, send skipped");
            }
            None => self.requests_open = false,
        }
    }

    async fn drive_connection(&mut self, mut stream: FeedWsStream) -> ConnectionEnd {
        let handshake = self.lifecycle.on_open(&self.config.token);
        self.publish_status(
            FeedConnectionState::Open,
            Some("websocket connected".to_string()),
        );
        info!(url = %self.config.url, "feed connection open");

        for request in &handshake {
            if let Err(reason) = send_request(&mut stream, request).await {
                return ConnectionEnd::Failed(reason);
            }
        }

        let period = self.config.poll_interval();
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => OpenEvent::Cancelled,
                frame = stream.next() => OpenEvent::Frame(frame),
                _ = poll.tick() => OpenEvent::PollTick,
                request = self.requests.recv(), if self.requests_open => {
                    OpenEvent::Request(request)
                }
            };

            match event {
                OpenEvent::Cancelled => {
                    if let Err(error) = stream.close(None).await {
                        debug!(%error, "close frame not delivered");
                    }
                    return ConnectionEnd::Cancelled;
                }
                OpenEvent::Frame(None) => {
                    return ConnectionEnd::Closed("websocket stream ended".to_string());
                }
                OpenEvent::Frame(Some(Err(error))) => {
                    return ConnectionEnd::Failed(format!("websocket frame error: {error}"));
                }
                OpenEvent::Frame(Some(Ok(Message::Close(frame)))) => {
                    let reason = frame
                        .map(|frame| format!("closed by venue: {}", frame.reason))
                        .unwrap_or_else(|| "closed by venue".to_string());
                    return ConnectionEnd::Closed(reason);
                }
                OpenEvent::Frame(Some(Ok(message))) => {
                    let Some(raw) = RawFrame::from_message(message) else {
                        continue;
                    };
                    if let Some(request) = self.handle_frame(raw) {
                        if let Err(reason) = send_request(&mut stream, &request).await {
                            return ConnectionEnd::Failed(reason);
                        }
                    }
                }
                OpenEvent::PollTick => {
                    for request in self.lifecycle.on_poll_tick() {
                        if let Err(reason) = send_request(&mut stream, &request).await {
                            return ConnectionEnd::Failed(reason);
                        }
                    }
                }
                OpenEvent::Request(None) => self.requests_open = false,
                OpenEvent::Request(Some(request)) => {
                    if let Err(reason) = send_request(&mut stream, &request).await {
                        return ConnectionEnd::Failed(reason);
                    }
                }
            }
        }
    }

    /// Routes one data frame; returns a follow-up request when the frame
    /// calls for one.
    fn handle_frame(&mut self, raw: RawFrame) -> Option<OutboundRequest> {
        self.frames_received = self.frames_received.saturating_add(1);
        let outcome = route_frame(raw, &mut self.store, &mut self.aggregator, now_unix_ms());

        match outcome {
            RouteOutcome::Discarded => {
                self.frames_discarded = self.frames_discarded.saturating_add(1);
                self.publish_snapshot();
                None
            }
            RouteOutcome::Ignored { .. } => None,
            RouteOutcome::Applied | RouteOutcome::ProtocolError => {
                self.publish_snapshot();
                None
            }
            RouteOutcome::RefreshPnl => self.lifecycle.on_execution(),
            RouteOutcome::AuthRejected { message } => {
                let reason = match message {
                    Some(message) => format!("authentication rejected: {message}"),
                    None => "authentication rejected".to_string(),
                };
                self.publish_status(FeedConnectionState::Open, Some(reason));
                None
            }
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = FeedSnapshot {
            store: self.store.clone(),
            aggregate: self.aggregator.aggregate(),
            series: self.aggregator.shared_series(),
            geometry: self.config.chart,
            frames_received: self.frames_received,
            frames_discarded: self.frames_discarded,
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    fn publish_status(&self, state: FeedConnectionState, reason: Option<String>) {
        let snapshot = FeedStatusSnapshot {
            state,
            url: self.config.url.clone(),
            connect_attempts: self.lifecycle.connect_attempts(),
            last_transport_error: self.last_transport_error.clone(),
            reason,
        };
        *self.status_store.write() = snapshot;
    }
}

async fn send_request(stream: &mut FeedWsStream, request: &OutboundRequest) -> Result<(), String> {
    let payload = match encode_request(request) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(kind = request.kind(), %error, "failed to encode request");
            return Ok(());
        }
    };

    debug!(kind = request.kind(), "sending request");
    stream
        .send(Message::Text(payload))
        .await
        .map_err(|error| format!("websocket send error: {error}"))
}

pub(crate) fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
