use crate::feed::normalizer::{normalize_frame, NormalizedFrame, RawFrame};
use crate::feed::protocol::{decode_message, FeedMessage};
use crate::feed::series::SeriesAggregator;
use crate::feed::store::FeedStore;
use crate::feed::types::OrderBookSnapshot;
use tracing::{debug, info, warn};

/// What routing one frame did. None of these is fatal to the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Noise or undecodable input; no state touched.
    Discarded,
    /// Well-formed but carries nothing this client acts on.
    Ignored { kind: String },
    Applied,
    /// A fill happened; aggregate PnL should be re-pulled.
    RefreshPnl,
    /// The venue reported an error. The connection stays up.
    ProtocolError,
    AuthRejected { message: Option<String> },
}

pub fn route_frame(
    frame: RawFrame,
    store: &mut FeedStore,
    aggregator: &mut SeriesAggregator,
    now_ms: i64,
) -> RouteOutcome {
    let candidate = match normalize_frame(frame) {
        NormalizedFrame::Candidate(candidate) => candidate,
        NormalizedFrame::Discard(reason) => {
            debug!(%reason, "discarding frame");
            return RouteOutcome::Discarded;
        }
    };

    match decode_message(candidate) {
        Ok(message) => route_message(message, store, aggregator, now_ms),
        Err(error) => {
            warn!(%error, "failed to decode feed message");
            RouteOutcome::Discarded
        }
    }
}

pub fn route_message(
    message: FeedMessage,
    store: &mut FeedStore,
    aggregator: &mut SeriesAggregator,
    now_ms: i64,
) -> RouteOutcome {
    match message {
        FeedMessage::Welcome { message } => {
            info!(detail = message.as_deref().unwrap_or(""), "venue welcome");
            RouteOutcome::Ignored {
                kind: "welcome".to_string(),
            }
        }
        FeedMessage::AuthResponse {
            success: Some(false),
            message,
        } => {
            warn!(
                detail = message.as_deref().unwrap_or(""),
                "venue rejected authentication"
            );
            RouteOutcome::AuthRejected { message }
        }
        FeedMessage::AuthResponse { .. } => RouteOutcome::Ignored {
            kind: "auth_response".to_string(),
        },
        FeedMessage::AllPnl { clients, pushed } => {
            let aggregate = aggregator.record_snapshot(&clients, now_ms);
            debug!(
                pushed,
                clients = aggregate.clients,
                realized = aggregate.realized,
                unrealized = aggregate.unrealized,
                "pnl snapshot"
            );
            store.replace_pnl(clients);
            RouteOutcome::Applied
        }
        FeedMessage::OrderBookSnapshot { bids, asks } => {
            store.replace_order_book(OrderBookSnapshot { bids, asks });
            RouteOutcome::Applied
        }
        FeedMessage::TradeHistory { trades } => {
            store.replace_trades(trades);
            RouteOutcome::Applied
        }
        FeedMessage::Trade(trade) => {
            store.append_trade(trade);
            RouteOutcome::Applied
        }
        FeedMessage::Execution { order_id } => {
            debug!(?order_id, "execution reported");
            RouteOutcome::RefreshPnl
        }
        FeedMessage::Error { message } => {
            warn!(%message, "venue reported error");
            store.record_error(message);
            RouteOutcome::ProtocolError
        }
        FeedMessage::RealizedPnl { pnl } => {
            store.set_realized_pnl(pnl);
            RouteOutcome::Applied
        }
        FeedMessage::UnrealizedPnl { pnl } => {
            store.set_unrealized_pnl(pnl);
            RouteOutcome::Applied
        }
        FeedMessage::OpenOrdersCount { count } => {
            store.set_open_orders(count);
            RouteOutcome::Applied
        }
        FeedMessage::CommandAck(ack) => {
            if !ack.success {
                warn!(
                    kind = ?ack.kind,
                    detail = ack.message.as_deref().unwrap_or(""),
                    "command rejected"
                );
            }
            store.record_ack(ack);
            RouteOutcome::Applied
        }
        FeedMessage::Unrecognized { kind } => {
            debug!(%kind, "ignoring unrecognized message kind");
            RouteOutcome::Ignored { kind }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::ClientId;

    fn harness() -> (FeedStore, SeriesAggregator) {
        (
            FeedStore::default(),
            SeriesAggregator::new(600, vec!["red".to_string(), "blue".to_string()]),
        )
    }

    fn route_text(
        store: &mut FeedStore,
        aggregator: &mut SeriesAggregator,
        text: &str,
    ) -> RouteOutcome {
        route_frame(RawFrame::Text(text.to_string()), store, aggregator, 1_000)
    }

    #[test]
    fn pnl_store_matches_latest_snapshot_exactly() {
        let (mut store, mut aggregator) = harness();
        route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"all_pnl_response","clients":[{"client_id":1,"realized":1,"unrealized":2},{"client_id":2,"realized":3,"unrealized":4}]}"#,
        );
        let outcome = route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"all_pnl_push","clients":[{"client_id":"7","name":"Seven","realized":-1,"unrealized":0.5}]}"#,
        );

        assert_eq!(outcome, RouteOutcome::Applied);
        assert_eq!(store.pnl_by_client.len(), 1);
        assert_eq!(store.pnl_by_client[0].client_id, ClientId::new("7"));
        assert_eq!(store.pnl_by_client[0].unrealized, 0.5);
        assert_eq!(aggregator.aggregate().realized, -1.0);
        assert_eq!(aggregator.series().len(), 3);
    }

    #[test]
    fn mistyped_record_does_not_drop_the_snapshot() {
        let (mut store, mut aggregator) = harness();
        let outcome = route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"all_pnl_push","clients":[{"client_id":1,"realized":5,"unrealized":1},{"client_id":2,"name":42,"realized":1},{"client_id":3.0,"realized":1},"bad"]}"#,
        );

        assert_eq!(outcome, RouteOutcome::Applied);
        assert_eq!(store.pnl_by_client.len(), 3);
        assert_eq!(store.pnl_by_client[2].client_id, ClientId::new("3"));
        assert_eq!(aggregator.aggregate().realized, 7.0);
        assert_eq!(aggregator.series().len(), 3);
    }

    #[test]
    fn anonymous_records_do_not_share_a_series() {
        let (mut store, mut aggregator) = harness();
        route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"all_pnl_response","clients":[{"realized":1},{"realized":2},{"client_id":9,"realized":3}]}"#,
        );

        assert_eq!(store.pnl_by_client.len(), 3);
        assert_eq!(aggregator.aggregate().realized, 6.0);
        assert_eq!(aggregator.series().len(), 1);
        assert_eq!(aggregator.series()[&ClientId::new("9")].samples.len(), 1);
    }

    #[test]
    fn noise_frames_leave_state_untouched() {
        let (mut store, mut aggregator) = harness();
        for noise in ["", "keepalive", "{not json"] {
            assert_eq!(
                route_text(&mut store, &mut aggregator, noise),
                RouteOutcome::Discarded
            );
        }
        assert_eq!(store, FeedStore::default());
        assert!(aggregator.series().is_empty());
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        let (mut store, mut aggregator) = harness();
        let outcome = route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"heartbeat_v2","seq":4}"#,
        );

        assert_eq!(
            outcome,
            RouteOutcome::Ignored {
                kind: "heartbeat_v2".to_string()
            }
        );
        assert_eq!(store, FeedStore::default());
    }

    #[test]
    fn execution_requests_pnl_refresh_without_state_change() {
        let (mut store, mut aggregator) = harness();
        let outcome = route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"execution","order_id":12}"#,
        );

        assert_eq!(outcome, RouteOutcome::RefreshPnl);
        assert_eq!(store, FeedStore::default());
    }

    #[test]
    fn error_message_is_kept_for_display() {
        let (mut store, mut aggregator) = harness();
        let outcome = route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"error","message":"bad order"}"#,
        );

        assert_eq!(outcome, RouteOutcome::ProtocolError);
        assert_eq!(store.last_error.as_deref(), Some("bad order"));
    }

    #[test]
    fn trades_append_then_history_replaces() {
        let (mut store, mut aggregator) = harness();
        route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"trade","buy_order_id":1,"sell_order_id":2,"price":10.5,"quantity":3,"timestamp":100}"#,
        );
        route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"trade","buy_order_id":3,"sell_order_id":4,"price":10.6,"quantity":1,"timestamp":101}"#,
        );
        assert_eq!(store.trades.len(), 2);

        route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"trade_history_response"}"#,
        );
        assert!(store.trades.is_empty());
    }

    #[test]
    fn rejected_auth_is_surfaced() {
        let (mut store, mut aggregator) = harness();
        let outcome = route_text(
            &mut store,
            &mut aggregator,
            r#"{"type":"auth_response","success":false,"message":"bad token"}"#,
        );

        assert_eq!(
            outcome,
            RouteOutcome::AuthRejected {
                message: Some("bad token".to_string())
            }
        );
        assert_eq!(store, FeedStore::default());
    }

    #[test]
    fn binary_frames_route_like_text() {
        let (mut store, mut aggregator) = harness();
        let outcome = route_frame(
            RawFrame::Binary(br#" {"type":"open_orders_count_response","count":3} "#.to_vec()),
            &mut store,
            &mut aggregator,
            0,
        );

        assert_eq!(outcome, RouteOutcome::Applied);
        assert_eq!(store.account.open_orders, Some(3));
    }
}
