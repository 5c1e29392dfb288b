//! Groups runs of partial series sharing a label set into one series.

use std::sync::Arc;

use crate::chunk::{remove_exact_duplicates, sort_by_min_time, AggrChunk, AggrKind};
use crate::chunk_series::ChunkSeries;
use crate::config::QueryOptions;
use crate::error::QueryError;
use crate::telemetry::{query_metrics, QueryEvent, QueryEventListener};
use crate::types::{LabelSet, TimeWindow};

/// A label set and chunks as delivered by one storage partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSeries {
    pub labels: LabelSet,
    pub chunks: Vec<AggrChunk>,
}

impl PartialSeries {
    pub fn new(labels: LabelSet, chunks: Vec<AggrChunk>) -> Self {
        Self { labels, chunks }
    }
}

/// Wraps in-memory partial series as an infallible upstream stream.
pub fn series_source(
    series: Vec<PartialSeries>,
) -> impl Iterator<Item = Result<PartialSeries, QueryError>> {
    series.into_iter().map(Ok)
}

/// Turns a stream of partial series into grouped [`ChunkSeries`].
///
/// Partial series with the same label set must be contiguous in the input. Each run is
/// concatenated, sorted by chunk start time and cleared of exact duplicate chunks. Only the
/// current run is buffered; a run is emitted once the next label set (or the end of input)
/// has been seen.
pub struct GroupingSeriesSet<I> {
    source: I,
    peeked: Option<PartialSeries>,
    done: bool,
    window: TimeWindow,
    aggregates: Vec<AggrKind>,
    listener: Arc<dyn QueryEventListener>,
}

impl<I> GroupingSeriesSet<I>
where
    I: Iterator<Item = Result<PartialSeries, QueryError>>,
{
    pub fn new(source: I, options: &QueryOptions) -> Self {
        Self {
            source,
            peeked: None,
            done: false,
            window: options.window,
            aggregates: options.aggregates.clone(),
            listener: options.event_listener.clone(),
        }
    }

    fn fail(&mut self, error: QueryError) -> Option<Result<ChunkSeries, QueryError>> {
        self.done = true;
        self.peeked = None;
        query_metrics::record_upstream_error();
        self.listener.on_event(QueryEvent::UpstreamFailed {
            error: error.clone(),
        });
        Some(Err(error))
    }
}

impl<I> Iterator for GroupingSeriesSet<I>
where
    I: Iterator<Item = Result<PartialSeries, QueryError>>,
{
    type Item = Result<ChunkSeries, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let first = match self.peeked.take() {
            Some(p) => p,
            None => match self.source.next() {
                Some(Ok(p)) => p,
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    return None;
                }
            },
        };

        let PartialSeries { labels, mut chunks } = first;
        loop {
            match self.source.next() {
                Some(Ok(next)) if next.labels == labels => chunks.extend(next.chunks),
                Some(Ok(next)) => {
                    self.peeked = Some(next);
                    break;
                }
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        sort_by_min_time(&mut chunks);
        let removed = remove_exact_duplicates(&mut chunks);
        query_metrics::record_series_grouped(removed);
        if removed > 0 {
            self.listener.on_event(QueryEvent::DuplicateChunksRemoved {
                labels: labels.clone(),
                removed,
            });
        }
        Some(Ok(ChunkSeries::new(
            labels,
            chunks,
            self.window,
            &self.aggregates,
        )))
    }
}
