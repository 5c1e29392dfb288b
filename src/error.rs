use thiserror::Error;

use crate::types::Timestamp;

/// Error type for series merging, decoding and deduplication.
///
/// Cursors keep their terminal error and hand it out by reference on every query,
/// so the type is cheap to clone and comparable in tests.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The requested aggregate set cannot be served (static configuration error).
    #[error("unexpected result aggregate type {0}")]
    UnsupportedAggregate(String),

    #[error("unknown chunk encoding {0}")]
    UnknownEncoding(u8),

    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    /// A chunk carries none of the payloads the aggregate selector may decode.
    #[error("no valid chunk found")]
    NoUsableChunk,

    /// Storage partitions must never deliver a series without chunks.
    #[error("series has no chunks")]
    EmptySeries,

    #[error("{0}")]
    Misaligned(String),

    /// Error reported by the upstream fan-in over storage partitions.
    #[error("upstream series stream failed: {0}")]
    Upstream(String),

    #[error("Invalid time range: mint={mint}, maxt={maxt}")]
    InvalidTimeRange { mint: Timestamp, maxt: Timestamp },
}

