use crate::error::AppError;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_URL: &str = "ws://localhost:9001";
pub const DEFAULT_TOKEN: &str = "your_secret_token";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_POLL_ORDER_BOOK: bool = true;
pub const DEFAULT_POLL_TRADE_HISTORY: bool = true;
pub const DEFAULT_SERIES_CAPACITY: usize = 600;
pub const DEFAULT_PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];
pub const DEFAULT_CHART_WIDTH: f64 = 800.0;
pub const DEFAULT_CHART_HEIGHT: f64 = 240.0;
pub const DEFAULT_CHART_MARGIN_TOP: f64 = 16.0;
pub const DEFAULT_CHART_MARGIN_BOTTOM: f64 = 24.0;
pub const DEFAULT_CHART_PADDING_RATIO: f64 = 0.15;
pub const DEFAULT_CHART_FLAT_EPSILON: f64 = 0.001;
pub const DEFAULT_CHART_MICRO_SPAN: f64 = 0.05;
pub const DEFAULT_CHART_GRIDLINES: usize = 5;
pub const MIN_RECONNECT_DELAY_MS: u64 = 10;
pub const MAX_RECONNECT_DELAY_MS: u64 = 60_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const MIN_SERIES_CAPACITY: usize = 1;
pub const MAX_SERIES_CAPACITY: usize = 100_000;
pub const MIN_CHART_GRIDLINES: usize = 2;
pub const MAX_CHART_GRIDLINES: usize = 50;

pub const ENV_URL: &str = "PNL_FEED_URL";
pub const ENV_TOKEN: &str = "PNL_FEED_TOKEN";
pub const ENV_RECONNECT_DELAY_MS: &str = "PNL_FEED_RECONNECT_DELAY_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "PNL_FEED_POLL_INTERVAL_MS";
pub const ENV_SERIES_CAPACITY: &str = "PNL_FEED_SERIES_CAPACITY";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedConnectionState {
    Connecting,
    Open,
    Closed,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusSnapshot {
    pub state: FeedConnectionState,
    pub url: String,
    pub connect_attempts: u64,
    pub last_transport_error: Option<String>,
    pub reason: Option<String>,
}

impl FeedStatusSnapshot {
    pub fn stopped(url: String, reason: Option<String>) -> Self {
        Self {
            state: FeedConnectionState::Stopped,
            url,
            connect_attempts: 0,
            last_transport_error: None,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChartGeometryArgs {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub margin_top: Option<f64>,
    pub margin_bottom: Option<f64>,
    pub padding_ratio: Option<f64>,
    pub flat_epsilon: Option<f64>,
    pub micro_span: Option<f64>,
    pub gridlines: Option<usize>,
}

/// Canvas size and domain-shaping thresholds shared by every chart frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartGeometry {
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub padding_ratio: f64,
    pub flat_epsilon: f64,
    pub micro_span: f64,
    pub gridlines: usize,
}

impl Default for ChartGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_CHART_WIDTH,
            height: DEFAULT_CHART_HEIGHT,
            margin_top: DEFAULT_CHART_MARGIN_TOP,
            margin_bottom: DEFAULT_CHART_MARGIN_BOTTOM,
            padding_ratio: DEFAULT_CHART_PADDING_RATIO,
            flat_epsilon: DEFAULT_CHART_FLAT_EPSILON,
            micro_span: DEFAULT_CHART_MICRO_SPAN,
            gridlines: DEFAULT_CHART_GRIDLINES,
        }
    }
}

impl ChartGeometryArgs {
    pub fn normalize(self) -> Result<ChartGeometry, AppError> {
        let width = self.width.unwrap_or(DEFAULT_CHART_WIDTH);
        let height = self.height.unwrap_or(DEFAULT_CHART_HEIGHT);
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(AppError::InvalidArgument(
                "chart width/height must be finite and positive".to_string(),
            ));
        }

        let margin_top = self.margin_top.unwrap_or(DEFAULT_CHART_MARGIN_TOP);
        let margin_bottom = self.margin_bottom.unwrap_or(DEFAULT_CHART_MARGIN_BOTTOM);
        if !margin_top.is_finite()
            || !margin_bottom.is_finite()
            || margin_top < 0.0
            || margin_bottom < 0.0
            || margin_top + margin_bottom >= height
        {
            return Err(AppError::InvalidArgument(
                "chart margins must be non-negative and leave a drawable band".to_string(),
            ));
        }

        let padding_ratio = self.padding_ratio.unwrap_or(DEFAULT_CHART_PADDING_RATIO);
        if !padding_ratio.is_finite() || padding_ratio < 0.0 {
            return Err(AppError::InvalidArgument(
                "chart paddingRatio must be a finite non-negative number".to_string(),
            ));
        }

        let flat_epsilon = self.flat_epsilon.unwrap_or(DEFAULT_CHART_FLAT_EPSILON);
        if !flat_epsilon.is_finite() || flat_epsilon <= 0.0 {
            return Err(AppError::InvalidArgument(
                "chart flatEpsilon must be finite and positive".to_string(),
            ));
        }

        let micro_span = self.micro_span.unwrap_or(DEFAULT_CHART_MICRO_SPAN);
        if !micro_span.is_finite() || micro_span < 0.0 {
            return Err(AppError::InvalidArgument(
                "chart microSpan must be a finite non-negative number".to_string(),
            ));
        }

        let gridlines = self.gridlines.unwrap_or(DEFAULT_CHART_GRIDLINES);
        if !(MIN_CHART_GRIDLINES..=MAX_CHART_GRIDLINES).contains(&gridlines) {
            return Err(AppError::InvalidArgument(format!(
                "chart gridlines must be between {MIN_CHART_GRIDLINES} and {MAX_CHART_GRIDLINES}"
            )));
        }

        Ok(ChartGeometry {
            width,
            height,
            margin_top,
            margin_bottom,
            padding_ratio,
            flat_epsilon,
            micro_span,
            gridlines,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartFeedArgs {
    pub url: Option<String>,
    pub token: Option<String>,
    pub reconnect_delay_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub poll_order_book: Option<bool>,
    pub poll_trade_history: Option<bool>,
    pub series_capacity: Option<usize>,
    pub palette: Option<Vec<String>>,
    pub chart: Option<ChartGeometryArgs>,
}

/// Which slices the safety-net poll re-pulls besides aggregate PnL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollPlan {
    pub order_book: bool,
    pub trade_history: bool,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub token: String,
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_plan: PollPlan,
    pub series_capacity: usize,
    pub palette: Vec<String>,
    pub chart: ChartGeometry,
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl StartFeedArgs {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|raw| !raw.trim().is_empty());

        let reconnect_delay_ms = match value(ENV_RECONNECT_DELAY_MS) {
            Some(raw) => Some(raw.trim().parse::<u64>()?),
            None => None,
        };
        let poll_interval_ms = match value(ENV_POLL_INTERVAL_MS) {
            Some(raw) => Some(raw.trim().parse::<u64>()?),
            None => None,
        };
        let series_capacity = match value(ENV_SERIES_CAPACITY) {
            Some(raw) => Some(raw.trim().parse::<usize>()?),
            None => None,
        };

        Ok(Self {
            url: value(ENV_URL),
            token: value(ENV_TOKEN),
            reconnect_delay_ms,
            poll_interval_ms,
            series_capacity,
            ..Self::default()
        })
    }

    pub fn normalize(self) -> Result<FeedConfig, AppError> {
        let url = self
            .url
            .unwrap_or_else(|| DEFAULT_URL.to_string())
            .trim()
            .to_string();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) || url.len() <= "wss://".len()
        {
            return Err(AppError::InvalidArgument(
                "url must be a ws:// or wss:// address".to_string(),
            ));
        }

        let token = self
            .token
            .unwrap_or_else(|| DEFAULT_TOKEN.to_string())
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(AppError::InvalidArgument(
                "token must not be empty".to_string(),
            ));
        }

        let reconnect_delay_ms = self
            .reconnect_delay_ms
            .unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
        if !(MIN_RECONNECT_DELAY_MS..=MAX_RECONNECT_DELAY_MS).contains(&reconnect_delay_ms) {
            return Err(AppError::InvalidArgument(format!(
                "reconnectDelayMs must be between {MIN_RECONNECT_DELAY_MS} and {MAX_RECONNECT_DELAY_MS}"
            )));
        }

        let poll_interval_ms = self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll_interval_ms) {
            return Err(AppError::InvalidArgument(format!(
                "pollIntervalMs must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS}"
            )));
        }

        let poll_plan = PollPlan {
            order_book: self.poll_order_book.unwrap_or(DEFAULT_POLL_ORDER_BOOK),
            trade_history: self.poll_trade_history.unwrap_or(DEFAULT_POLL_TRADE_HISTORY),
        };

        let series_capacity = self.series_capacity.unwrap_or(DEFAULT_SERIES_CAPACITY);
        if !(MIN_SERIES_CAPACITY..=MAX_SERIES_CAPACITY).contains(&series_capacity) {
            return Err(AppError::InvalidArgument(format!(
                "seriesCapacity must be between {MIN_SERIES_CAPACITY} and {MAX_SERIES_CAPACITY}"
            )));
        }

        let palette = self
            .palette
            .unwrap_or_else(|| DEFAULT_PALETTE.iter().map(|color| color.to_string()).collect());
        if palette.is_empty() || palette.iter().any(|color| color.trim().is_empty()) {
            return Err(AppError::InvalidArgument(
                "palette must contain at least one non-blank color".to_string(),
            ));
        }

        let chart = self.chart.unwrap_or_default().normalize()?;

        Ok(FeedConfig {
            url,
            token,
            reconnect_delay_ms,
            poll_interval_ms,
            poll_plan,
            series_capacity,
            palette,
            chart,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSession {
    pub running: bool,
    pub url: String,
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_plan: PollPlan,
    pub series_capacity: usize,
}

impl FeedSession {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            running: true,
            url: config.url.clone(),
            reconnect_delay_ms: config.reconnect_delay_ms,
            poll_interval_ms: config.poll_interval_ms,
            poll_plan: config.poll_plan,
            series_capacity: config.series_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStopResult {
    pub stopped: bool,
}

/// Venue-assigned client identity. The wire carries it as either a number or a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Records with a missing or unusable id carry the empty id.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum IdWire {
            Unsigned(u64),
            Signed(i64),
            Float(f64),
            Text(String),
            Other(IgnoredAny),
        }

        Ok(match Option::<IdWire>::deserialize(deserializer)? {
            Some(IdWire::Unsigned(value)) => Self(value.to_string()),
            Some(IdWire::Signed(value)) => Self(value.to_string()),
            Some(IdWire::Float(value)) if value.is_finite() && value.fract() == 0.0 => {
                Self(format!("{value:.0}"))
            }
            Some(IdWire::Float(value)) => Self(value.to_string()),
            Some(IdWire::Text(value)) => Self(value),
            Some(IdWire::Other(_)) | None => Self::default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientPnl {
    pub client_id: ClientId,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient::f64_or_zero")]
    pub realized: f64,
    #[serde(deserialize_with = "lenient::f64_or_zero")]
    pub unrealized: f64,
}

impl ClientPnl {
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Client {}", self.client_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderBookLevel {
    #[serde(deserialize_with = "lenient::opt_u64")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient::f64_or_zero")]
    pub price: f64,
    #[serde(deserialize_with = "lenient::non_negative_f64")]
    pub quantity: f64,
    pub is_buy: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    pub status: Option<i64>,
}

impl OrderBookLevel {
    /// Stable list key: the venue order id, or the level's position on its side.
    pub fn render_key(&self, side: BookSide, index: usize) -> String {
        match (self.id, side) {
            (Some(id), _) => id.to_string(),
            (None, BookSide::Bid) => format!("b-{index}"),
            (None, BookSide::Ask) => format!("a-{index}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trade {
    #[serde(deserialize_with = "lenient::u64_or_zero")]
    pub buy_order_id: u64,
    #[serde(deserialize_with = "lenient::u64_or_zero")]
    pub sell_order_id: u64,
    #[serde(deserialize_with = "lenient::f64_or_zero")]
    pub price: f64,
    #[serde(deserialize_with = "lenient::non_negative_f64")]
    pub quantity: f64,
    #[serde(deserialize_with = "lenient::i64_or_zero")]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub realized_pnl: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub open_orders: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Submit,
    Cancel,
    Modify,
    OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    pub kind: CommandKind,
    pub success: bool,
    pub order_id: Option<u64>,
    pub status: Option<i64>,
    pub message: Option<String>,
}

/// Tolerant decoding: absent, `null` and unparsable values collapse to a default.
pub(crate) mod lenient {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};
    use tracing::debug;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberWire {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Text(String),
    }

    impl NumberWire {
        fn as_f64(&self) -> Option<f64> {
            let value = match self {
                Self::Unsigned(value) => *value as f64,
                Self::Signed(value) => *value as f64,
                Self::Float(value) => *value,
                Self::Text(value) => value.trim().parse::<f64>().ok()?,
            };
            value.is_finite().then_some(value)
        }

        fn as_u64(&self) -> Option<u64> {
            match self {
                Self::Unsigned(value) => Some(*value),
                Self::Signed(value) => u64::try_from(*value).ok(),
                Self::Float(value) if value.is_finite() && *value >= 0.0 => Some(*value as u64),
                Self::Float(_) => None,
                Self::Text(value) => value.trim().parse::<u64>().ok(),
            }
        }

        fn as_i64(&self) -> Option<i64> {
            match self {
                Self::Unsigned(value) => i64::try_from(*value).ok(),
                Self::Signed(value) => Some(*value),
                Self::Float(value) if value.is_finite() => Some(*value as i64),
                Self::Float(_) => None,
                Self::Text(value) => value.trim().parse::<i64>().ok(),
            }
        }
    }

    fn number<'de, D>(deserializer: D) -> Result<Option<NumberWire>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<NumberWire>::deserialize(deserializer)
    }

    pub fn f64_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(number(deserializer)?
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0))
    }

    pub fn non_negative_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(f64_or_zero(deserializer)?.max(0.0))
    }

    pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(number(deserializer)?.and_then(|value| value.as_f64()))
    }

    pub fn u64_or_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_u64(deserializer)?.unwrap_or(0))
    }

    pub fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(number(deserializer)?.and_then(|value| value.as_u64()))
    }

    pub fn i64_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_i64(deserializer)?.unwrap_or(0))
    }

    pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(number(deserializer)?.and_then(|value| value.as_i64()))
    }

    /// Strings pass through, numbers keep their printed form, anything else is `None`.
    pub fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum TextWire {
            Text(String),
            Unsigned(u64),
            Signed(i64),
            Float(f64),
            Other(IgnoredAny),
        }

        Ok(match Option::<TextWire>::deserialize(deserializer)? {
            Some(TextWire::Text(value)) => Some(value),
            Some(TextWire::Unsigned(value)) => Some(value.to_string()),
            Some(TextWire::Signed(value)) => Some(value.to_string()),
            Some(TextWire::Float(value)) => Some(value.to_string()),
            Some(TextWire::Other(_)) | None => None,
        })
    }

    /// Decodes a list entry by entry. Entries that do not fit `T` are
    /// skipped, and a value that is not a list yields an empty one.
    pub fn records<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Entry<R> {
            Valid(R),
            Invalid(IgnoredAny),
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ListWire<R> {
            List(Vec<Entry<R>>),
            Other(IgnoredAny),
        }

        let entries = match ListWire::<T>::deserialize(deserializer)? {
            ListWire::List(entries) => entries,
            ListWire::Other(_) => return Ok(Vec::new()),
        };

        let total = entries.len();
        let records: Vec<T> = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Valid(record) => Some(record),
                Entry::Invalid(_) => None,
            })
            .collect();
        if records.len() < total {
            debug!(skipped = total - records.len(), "skipping malformed list entries");
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse<T: serde::de::DeserializeOwned>(payload: &str) -> T {
        let mut bytes = payload.as_bytes().to_vec();
        simd_json::serde::from_slice(bytes.as_mut_slice()).expect("payload should decode")
    }

    #[test]
    fn normalizes_start_args_defaults() {
        let config = StartFeedArgs::default()
            .normalize()
            .expect("defaults should be valid");

        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.token, DEFAULT_TOKEN);
        assert_eq!(config.reconnect_delay_ms, DEFAULT_RECONNECT_DELAY_MS);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(config.poll_plan.order_book);
        assert!(config.poll_plan.trade_history);
        assert_eq!(config.series_capacity, DEFAULT_SERIES_CAPACITY);
        assert_eq!(config.palette.len(), DEFAULT_PALETTE.len());
        assert_eq!(config.chart, ChartGeometry::default());
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_non_websocket_url() {
        let result = StartFeedArgs {
            url: Some("http://localhost:9001".to_string()),
            ..StartFeedArgs::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn validates_reconnect_delay_range() {
        let result = StartFeedArgs {
            reconnect_delay_ms: Some(1),
            ..StartFeedArgs::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn validates_poll_interval_range() {
        let result = StartFeedArgs {
            poll_interval_ms: Some(10),
            ..StartFeedArgs::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_palette_and_zero_capacity() {
        let empty_palette = StartFeedArgs {
            palette: Some(Vec::new()),
            ..StartFeedArgs::default()
        }
        .normalize();
        let zero_capacity = StartFeedArgs {
            series_capacity: Some(0),
            ..StartFeedArgs::default()
        }
        .normalize();

        assert!(empty_palette.is_err());
        assert!(zero_capacity.is_err());
    }

    #[test]
    fn rejects_margins_that_consume_chart_height() {
        let result = ChartGeometryArgs {
            height: Some(40.0),
            margin_top: Some(20.0),
            margin_bottom: Some(20.0),
            ..ChartGeometryArgs::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn reads_args_from_environment_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_URL, "wss://venue.example/feed"),
            (ENV_TOKEN, "  "),
            (ENV_RECONNECT_DELAY_MS, "250"),
        ]);
        let args = StartFeedArgs::from_lookup(|key| env.get(key).map(|value| value.to_string()))
            .expect("lookup should parse");

        assert_eq!(args.url.as_deref(), Some("wss://venue.example/feed"));
        assert_eq!(args.token, None);
        assert_eq!(args.reconnect_delay_ms, Some(250));
        assert_eq!(args.poll_interval_ms, None);
    }

    #[test]
    fn rejects_unparsable_environment_numbers() {
        let result = StartFeedArgs::from_lookup(|key| {
            (key == ENV_POLL_INTERVAL_MS).then(|| "fast".to_string())
        });

        assert!(matches!(result, Err(AppError::ParseInt(_))));
    }

    #[test]
    fn decodes_client_pnl_with_numeric_or_string_ids() {
        let numeric: ClientPnl =
            parse(r#"{"client_id":7,"name":"alpha","realized":10,"unrealized":-2.5}"#);
        let textual: ClientPnl = parse(r#"{"client_id":"c-9","realized":"3.5"}"#);

        assert_eq!(numeric.client_id, ClientId::new("7"));
        assert_eq!(numeric.realized, 10.0);
        assert_eq!(numeric.unrealized, -2.5);
        assert_eq!(textual.client_id.as_str(), "c-9");
        assert_eq!(textual.realized, 3.5);
        assert_eq!(textual.unrealized, 0.0);
        assert_eq!(textual.display_name(), "Client c-9");
    }

    #[test]
    fn tolerates_float_ids_and_mistyped_names() {
        let integral: ClientPnl = parse(r#"{"client_id":1.0,"name":42,"realized":2}"#);
        let fractional: ClientPnl = parse(r#"{"client_id":2.5,"name":{"first":"x"}}"#);
        let shapeless: ClientPnl = parse(r#"{"client_id":true,"name":"gamma"}"#);

        assert_eq!(integral.client_id, ClientId::new("1"));
        assert_eq!(integral.name.as_deref(), Some("42"));
        assert_eq!(integral.realized, 2.0);
        assert_eq!(fractional.client_id, ClientId::new("2.5"));
        assert_eq!(fractional.name, None);
        assert!(shapeless.client_id.is_empty());
        assert_eq!(shapeless.display_name(), "gamma");
    }

    #[test]
    fn defaults_null_and_missing_numbers() {
        let level: OrderBookLevel = parse(r#"{"price":null,"quantity":-4}"#);
        let trade: Trade = parse(r#"{"buy_order_id":1,"price":101.5,"timestamp":1700000000}"#);

        assert_eq!(level.id, None);
        assert_eq!(level.price, 0.0);
        assert_eq!(level.quantity, 0.0);
        assert_eq!(level.render_key(BookSide::Ask, 3), "a-3");
        assert_eq!(trade.buy_order_id, 1);
        assert_eq!(trade.sell_order_id, 0);
        assert_eq!(trade.quantity, 0.0);
        assert_eq!(trade.timestamp, 1_700_000_000);
    }
}
