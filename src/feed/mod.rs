pub mod chart;
pub mod lifecycle;
pub mod normalizer;
pub mod pipeline;
pub mod protocol;
pub mod router;
pub mod series;
pub mod store;
pub mod types;
pub mod venue;

/// Bound on outbound requests queued for the feed task.
pub const REQUEST_QUEUE_CAPACITY: usize = 256;
