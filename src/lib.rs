#![doc = include_str!("../README.md")]
// Declare modules
pub mod aggregate;
pub mod bounded;
pub mod chunk;
pub mod chunk_series;
pub mod config;
pub mod cursor;
pub mod dedup;
pub mod encoding;
pub mod error;
pub mod group;
pub mod telemetry;
pub mod types;

/// Validated aggregate request.
pub use crate::aggregate::AggrRequest;
/// Chunk with alternative payloads, and the payload kinds it may carry.
pub use crate::chunk::{AggrChunk, AggrKind, Chunk, ChunkEncoding};
/// Grouped series and the capability every output series exposes.
pub use crate::chunk_series::{ChunkSeries, Series};
/// Options for one query.
pub use crate::config::QueryOptions;
/// The forward-only sample cursor.
pub use crate::cursor::SampleCursor;
/// Deduplicated logical series and the set producing them.
pub use crate::dedup::{DedupSeries, DedupSeriesSet};
/// Error type for merging and deduplication.
pub use crate::error::QueryError;
/// Partial series as delivered by storage partitions, and the set grouping them.
pub use crate::group::{GroupingSeriesSet, PartialSeries};
/// Structured event hook for observability.
pub use crate::telemetry::{QueryEvent, QueryEventListener};
/// Core data types.
pub use crate::types::{Label, LabelSet, Sample, TimeWindow, Timestamp, Value};

/// Builds the full pipeline over an upstream stream of partial series.
///
/// Partial series are grouped per label set, then replicas (label sets equal once
/// `options.replica_labels` are removed) are collapsed into one logical series each.
/// With no replica labels configured every grouped series passes through on its own.
pub fn select_series<I>(
    source: I,
    options: &QueryOptions,
) -> DedupSeriesSet<ChunkSeries, GroupingSeriesSet<I>>
where
    I: Iterator<Item = Result<PartialSeries, QueryError>>,
{
    DedupSeriesSet::new(GroupingSeriesSet::new(source, options), options)
}
