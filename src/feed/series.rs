use crate::feed::types::{ClientId, ClientPnl, DEFAULT_PALETTE};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TimeSeriesSample {
    pub t: i64,
    pub realized: f64,
    pub unrealized: f64,
}

/// Fixed-capacity FIFO window. Once full, each push overwrites the oldest slot.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    values: Vec<T>,
    capacity: usize,
    cursor: usize,
}

impl<T: Copy> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// Returns the evicted element when the window was already full.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.values.len() < self.capacity {
            self.values.push(value);
            return None;
        }

        let evicted = std::mem::replace(&mut self.values[self.cursor], value);
        self.cursor = (self.cursor + 1) % self.capacity;
        Some(evicted)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.values[self.cursor..]
            .iter()
            .chain(self.values[..self.cursor].iter())
    }

    pub fn last(&self) -> Option<&T> {
        if self.values.is_empty() {
            return None;
        }
        let newest = (self.cursor + self.values.len() - 1) % self.values.len();
        self.values.get(newest)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().copied().collect()
    }
}

impl<T: Copy + Serialize> Serialize for RingBuffer<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for value in self.iter() {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSeries {
    pub client_id: ClientId,
    pub name: String,
    pub color: String,
    pub samples: RingBuffer<TimeSeriesSample>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlAggregate {
    pub realized: f64,
    pub unrealized: f64,
    pub clients: usize,
    pub sampled_at: Option<i64>,
}

/// Per-client rolling PnL windows plus the session's color assignments.
///
/// Colors are handed out from the palette in first-seen order and wrap once
/// it is exhausted. An assignment is never revisited, so a client keeps its
/// color across reconnects for as long as the aggregator lives.
#[derive(Debug, Clone)]
pub struct SeriesAggregator {
    capacity: usize,
    palette: Vec<String>,
    colors: HashMap<ClientId, String>,
    next_color: usize,
    series: Arc<BTreeMap<ClientId, ClientSeries>>,
    aggregate: PnlAggregate,
}

impl SeriesAggregator {
    pub fn new(capacity: usize, palette: Vec<String>) -> Self {
        let palette = if palette.is_empty() {
            DEFAULT_PALETTE.iter().map(|color| color.to_string()).collect()
        } else {
            palette
        };

        Self {
            capacity,
            palette,
            colors: HashMap::new(),
            next_color: 0,
            series: Arc::default(),
            aggregate: PnlAggregate::default(),
        }
    }

    /// Appends one sample per identified client and recomputes the aggregate
    /// over every record, including those without an id.
    pub fn record_snapshot(&mut self, clients: &[ClientPnl], now_ms: i64) -> PnlAggregate {
        let mut realized = 0.0;
        let mut unrealized = 0.0;

        for record in clients {
            realized += record.realized;
            unrealized += record.unrealized;

            if record.client_id.is_empty() {
                debug!(
                    name = record.name.as_deref(),
                    "pnl record without client id, not charted"
                );
                continue;
            }

            let color = self.assign_color(&record.client_id);
            let capacity = self.capacity;
            let entry = Arc::make_mut(&mut self.series)
                .entry(record.client_id.clone())
                .or_insert_with(|| ClientSeries {
                    client_id: record.client_id.clone(),
                    name: String::new(),
                    color,
                    samples: RingBuffer::new(capacity),
                });
            entry.name = record.display_name();
            entry.samples.push(TimeSeriesSample {
                t: now_ms,
                realized: record.realized,
                unrealized: record.unrealized,
            });
        }

        self.aggregate = PnlAggregate {
            realized,
            unrealized,
            clients: clients.len(),
            sampled_at: Some(now_ms),
        };
        self.aggregate
    }

    fn assign_color(&mut self, client_id: &ClientId) -> String {
        if let Some(color) = self.colors.get(client_id) {
            return color.clone();
        }

        let color = self.palette[self.next_color % self.palette.len()].clone();
        self.next_color = self.next_color.wrapping_add(1);
        self.colors.insert(client_id.clone(), color.clone());
        color
    }

    pub fn color(&self, client_id: &ClientId) -> Option<&str> {
        self.colors.get(client_id).map(String::as_str)
    }

    pub fn series(&self) -> &BTreeMap<ClientId, ClientSeries> {
        &self.series
    }

    /// Handle for a published snapshot. The next recorded snapshot copies the
    /// map before writing, so the handle stays frozen.
    pub fn shared_series(&self) -> Arc<BTreeMap<ClientId, ClientSeries>> {
        Arc::clone(&self.series)
    }

    pub fn aggregate(&self) -> PnlAggregate {
        self.aggregate
    }
}
