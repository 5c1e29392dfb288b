//! One logical series backed by a sorted list of chunks.

use crate::aggregate::{series_cursor, AggrRequest};
use crate::bounded::BoundedCursor;
use crate::chunk::{AggrChunk, AggrKind};
use crate::cursor::{ErrCursor, SampleCursor};
use crate::error::QueryError;
use crate::types::{LabelSet, Sample, TimeWindow, Timestamp};

/// A labelled series that can hand out fresh sample cursors.
pub trait Series {
    fn labels(&self) -> &LabelSet;
    fn cursor(&self) -> Box<dyn SampleCursor>;
}

/// Merges per-chunk cursors, sorted by chunk start time, into one strictly increasing cursor.
///
/// Adjacent chunks may overlap. When a chunk runs out, the next one is sought past the last
/// emitted timestamp, so overlapping samples are dropped.
pub struct ChunkSeriesCursor {
    chunks: Vec<Box<dyn SampleCursor>>,
    i: usize,
    last: Option<Timestamp>,
    exhausted: bool,
}

impl ChunkSeriesCursor {
    pub fn new(chunks: Vec<Box<dyn SampleCursor>>) -> Result<Self, QueryError> {
        if chunks.is_empty() {
            return Err(QueryError::EmptySeries);
        }
        Ok(Self {
            chunks,
            i: 0,
            last: None,
            exhausted: false,
        })
    }

    fn emit(&mut self) -> bool {
        self.last = Some(self.chunks[self.i].current().t);
        true
    }
}

/// [`ChunkSeriesCursor`] over `chunks`, or a cursor reporting [`QueryError::EmptySeries`].
pub fn merge_chunks(chunks: Vec<Box<dyn SampleCursor>>) -> Box<dyn SampleCursor> {
    match ChunkSeriesCursor::new(chunks) {
        Ok(c) => Box::new(c),
        Err(e) => ErrCursor::boxed(e),
    }
}

impl SampleCursor for ChunkSeriesCursor {
    fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if self.chunks[self.i].advance() {
            return self.emit();
        }
        loop {
            if self.chunks[self.i].error().is_some() || self.i + 1 >= self.chunks.len() {
                self.exhausted = true;
                return false;
            }
            self.i += 1;
            let found = match self.last {
                None => self.chunks[self.i].advance(),
                Some(t) => match t.checked_add(1) {
                    Some(next) => self.chunks[self.i].seek(next),
                    None => false,
                },
            };
            if found {
                return self.emit();
            }
        }
    }

    // Chunks are expected to be cut down to the query range already, so hopping
    // across them buys little; advance until `t` is reached.
    fn seek(&mut self, t: Timestamp) -> bool {
        if self.exhausted {
            return false;
        }
        if matches!(self.last, Some(last) if last >= t) {
            return true;
        }
        while self.advance() {
            if self.current().t >= t {
                return true;
            }
        }
        false
    }

    fn current(&self) -> Sample {
        self.chunks[self.i].current()
    }

    fn error(&self) -> Option<&QueryError> {
        self.chunks[self.i].error()
    }
}

/// A grouped series: label set plus chunks sorted by start time and free of exact duplicates.
#[derive(Debug, Clone)]
pub struct ChunkSeries {
    labels: LabelSet,
    chunks: Vec<AggrChunk>,
    window: TimeWindow,
    request: Result<AggrRequest, QueryError>,
}

impl ChunkSeries {
    pub fn new(
        labels: LabelSet,
        chunks: Vec<AggrChunk>,
        window: TimeWindow,
        aggregates: &[AggrKind],
    ) -> Self {
        Self {
            labels,
            chunks,
            window,
            request: AggrRequest::from_kinds(aggregates),
        }
    }

    pub fn chunks(&self) -> &[AggrChunk] {
        &self.chunks
    }
}

impl Series for ChunkSeries {
    fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// An unresolvable aggregate request still yields a cursor, one that reports the error.
    fn cursor(&self) -> Box<dyn SampleCursor> {
        match &self.request {
            Ok(request) => Box::new(BoundedCursor::new(
                series_cursor(&self.chunks, *request),
                self.window,
            )),
            Err(e) => ErrCursor::boxed(e.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{expand, SliceCursor};
    use crate::encoding::xor_aggr_chunk;

    fn boxed(pairs: &[(Timestamp, f64)]) -> Box<dyn SampleCursor> {
        Box::new(SliceCursor::from_pairs(pairs))
    }

    fn timestamps(samples: Vec<Sample>) -> Vec<Timestamp> {
        samples.into_iter().map(|s| s.t).collect()
    }

    #[test]
    fn overlapping_chunks_are_strictly_increasing() {
        let mut c = ChunkSeriesCursor::new(vec![
            boxed(&[(1, 1.0), (2, 2.0), (3, 3.0)]),
            boxed(&[(2, 2.0), (3, 3.0), (4, 4.0)]),
            boxed(&[(4, 4.0), (6, 6.0)]),
        ])
        .unwrap();
        assert_eq!(timestamps(expand(&mut c).unwrap()), vec![1, 2, 3, 4, 6]);
    }

    #[test]
    fn fully_covered_chunk_does_not_end_the_series() {
        let mut c = ChunkSeriesCursor::new(vec![
            boxed(&[(1, 1.0), (5, 5.0)]),
            boxed(&[(2, 2.0), (3, 3.0)]),
            boxed(&[]),
            boxed(&[(7, 7.0)]),
        ])
        .unwrap();
        assert_eq!(timestamps(expand(&mut c).unwrap()), vec![1, 5, 7]);
    }

    #[test]
    fn seek_advances_across_chunks() {
        let mut c = ChunkSeriesCursor::new(vec![
            boxed(&[(1, 1.0), (2, 2.0)]),
            boxed(&[(10, 10.0), (20, 20.0)]),
        ])
        .unwrap();
        assert!(c.seek(15));
        assert_eq!(c.current(), Sample::new(20, 20.0));
        assert!(c.seek(3));
        assert_eq!(c.current().t, 20);
        assert!(!c.seek(21));
    }

    #[test]
    fn empty_chunk_list_is_an_error() {
        assert!(matches!(
            ChunkSeriesCursor::new(Vec::new()),
            Err(QueryError::EmptySeries)
        ));
        let mut c = merge_chunks(Vec::new());
        assert_eq!(expand(&mut c), Err(QueryError::EmptySeries));
    }

    #[test]
    fn error_stops_at_failing_chunk() {
        let mut c = ChunkSeriesCursor::new(vec![
            boxed(&[(1, 1.0)]),
            ErrCursor::boxed(QueryError::UnknownEncoding(3)),
            boxed(&[(5, 5.0)]),
        ])
        .unwrap();
        assert!(c.advance());
        assert!(!c.advance());
        assert_eq!(c.error(), Some(&QueryError::UnknownEncoding(3)));
        assert!(!c.advance());
    }

    #[test]
    fn chunk_series_applies_window_and_aggregate() {
        let chunk = xor_aggr_chunk(&[Sample::new(100, 5.0), Sample::new(200, 7.0)]).unwrap();
        let series = ChunkSeries::new(
            LabelSet::from_pairs(&[("job", "api")]),
            vec![chunk.clone()],
            TimeWindow::new(150, 250),
            &[AggrKind::Sum, AggrKind::Count],
        );
        assert_eq!(expand(&mut series.cursor()).unwrap(), vec![Sample::new(200, 7.0)]);

        let bad = ChunkSeries::new(
            LabelSet::from_pairs(&[("job", "api")]),
            vec![chunk],
            TimeWindow::default(),
            &[AggrKind::Raw],
        );
        assert!(matches!(
            expand(&mut bad.cursor()),
            Err(QueryError::UnsupportedAggregate(_))
        ));
    }
}
