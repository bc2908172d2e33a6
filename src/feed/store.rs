use crate::feed::types::{AccountSummary, ClientPnl, CommandAck, OrderBookSnapshot, Trade};
use serde::Serialize;
use std::sync::Arc;

/// Latest authoritative venue state. Every slice is either replaced wholesale
/// by a snapshot message or, for trades, appended one at a time.
///
/// The list slices sit behind `Arc`, so cloning the store for a published
/// snapshot shares them until the next write.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStore {
    pub pnl_by_client: Arc<Vec<ClientPnl>>,
    pub order_book: Arc<OrderBookSnapshot>,
    pub trades: Arc<Vec<Trade>>,
    pub last_error: Option<String>,
    pub account: AccountSummary,
    pub last_ack: Option<CommandAck>,
}

impl FeedStore {
    pub fn replace_pnl(&mut self, clients: Vec<ClientPnl>) {
        self.pnl_by_client = Arc::new(clients);
    }

    pub fn replace_order_book(&mut self, order_book: OrderBookSnapshot) {
        self.order_book = Arc::new(order_book);
    }

    pub fn replace_trades(&mut self, trades: Vec<Trade>) {
        self.trades = Arc::new(trades);
    }

    pub fn append_trade(&mut self, trade: Trade) {
        Arc::make_mut(&mut self.trades).push(trade);
    }

    pub fn record_error(&mut self, message: String) {
        self.last_error = Some(message);
    }

    pub fn set_realized_pnl(&mut self, pnl: Option<f64>) {
        self.account.realized_pnl = pnl;
    }

    pub fn set_unrealized_pnl(&mut self, pnl: Option<f64>) {
        self.account.unrealized_pnl = pnl;
    }

    pub fn set_open_orders(&mut self, count: Option<u64>) {
        self.account.open_orders = count;
    }

    pub fn record_ack(&mut self, ack: CommandAck) {
        self.last_ack = Some(ack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{ClientId, OrderBookLevel};

    fn client(id: &str, realized: f64) -> ClientPnl {
        ClientPnl {
            client_id: ClientId::new(id),
            name: None,
            realized,
            unrealized: 0.0,
        }
    }

    fn trade(buy: u64, sell: u64) -> Trade {
        Trade {
            buy_order_id: buy,
            sell_order_id: sell,
            price: 100.0,
            quantity: 1.0,
            timestamp: 1,
        }
    }

    #[test]
    fn pnl_snapshots_replace_without_merging() {
        let mut store = FeedStore::default();
        store.replace_pnl(vec![client("a", 1.0), client("b", 2.0)]);
        store.replace_pnl(vec![client("c", 3.0)]);

        assert_eq!(*store.pnl_by_client, vec![client("c", 3.0)]);
    }

    #[test]
    fn history_replace_discards_appended_trades() {
        let mut store = FeedStore::default();
        store.append_trade(trade(1, 2));
        store.append_trade(trade(3, 4));
        assert_eq!(store.trades.len(), 2);

        store.replace_trades(vec![trade(9, 10)]);
        assert_eq!(*store.trades, vec![trade(9, 10)]);
    }

    #[test]
    fn clones_share_slices_until_written() {
        let mut store = FeedStore::default();
        store.replace_pnl(vec![client("a", 1.0)]);
        store.append_trade(trade(1, 2));

        let published = store.clone();
        assert!(Arc::ptr_eq(&published.pnl_by_client, &store.pnl_by_client));
        assert!(Arc::ptr_eq(&published.trades, &store.trades));

        store.append_trade(trade(3, 4));
        assert_eq!(published.trades.len(), 1);
        assert_eq!(store.trades.len(), 2);
        assert!(Arc::ptr_eq(&published.pnl_by_client, &store.pnl_by_client));
    }

    #[test]
    fn order_book_sides_replace_together() {
        let mut store = FeedStore::default();
        let level = OrderBookLevel {
            id: Some(1),
            price: 99.5,
            quantity: 3.0,
            ..OrderBookLevel::default()
        };
        store.replace_order_book(OrderBookSnapshot {
            bids: vec![level.clone()],
            asks: vec![level],
        });
        store.replace_order_book(OrderBookSnapshot::default());

        assert!(store.order_book.bids.is_empty());
        assert!(store.order_book.asks.is_empty());
    }
}
