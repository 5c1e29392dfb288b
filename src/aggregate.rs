//! Aggregate selection: picks or derives the payload each chunk is decoded from.

use crate::chunk::{AggrChunk, AggrKind, Chunk};
use crate::chunk_series::merge_chunks;
use crate::cursor::{ErrCursor, SampleCursor};
use crate::encoding::decode_chunk;
use crate::error::QueryError;
use crate::types::{Sample, Timestamp, Value};

/// A validated aggregate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggrRequest {
    /// One pre-aggregated kind, falling back to raw samples.
    Single(AggrKind),
    /// The `{sum, count}` pair, served as `sum / count`.
    Average,
}

impl AggrRequest {
    /// Resolves a requested aggregate list. Order within the average pair does not matter.
    pub fn from_kinds(kinds: &[AggrKind]) -> Result<Self, QueryError> {
        match kinds {
            [AggrKind::Raw] => Err(unsupported(kinds)),
            [kind] => Ok(AggrRequest::Single(*kind)),
            [AggrKind::Sum, AggrKind::Count] | [AggrKind::Count, AggrKind::Sum] => {
                Ok(AggrRequest::Average)
            }
            _ => Err(unsupported(kinds)),
        }
    }
}

fn unsupported(kinds: &[AggrKind]) -> QueryError {
    QueryError::UnsupportedAggregate(format!("{:?}", kinds))
}

/// Builds the unbounded cursor of one series for the given request.
///
/// Counter requests are stitched across all chunks by [`CounterCursor`]; everything else is
/// merged chunk by chunk.
pub fn series_cursor(chunks: &[AggrChunk], request: AggrRequest) -> Box<dyn SampleCursor> {
    match request {
        AggrRequest::Single(AggrKind::Counter) => {
            if chunks.is_empty() {
                return ErrCursor::boxed(QueryError::EmptySeries);
            }
            let cursors = chunks
                .iter()
                .map(|c| first_cursor(&[c.counter.as_ref(), c.raw.as_ref()]))
                .collect();
            Box::new(CounterCursor::new(cursors))
        }
        AggrRequest::Single(kind) => merge_chunks(
            chunks
                .iter()
                .map(|c| first_cursor(&[c.payload(kind), c.raw.as_ref()]))
                .collect(),
        ),
        AggrRequest::Average => merge_chunks(
            chunks
                .iter()
                .map(|c| match c.raw.as_ref() {
                    Some(raw) => first_cursor(&[Some(raw)]),
                    None => Box::new(AverageCursor::new(
                        first_cursor(&[c.count.as_ref()]),
                        first_cursor(&[c.sum.as_ref()]),
                    )),
                })
                .collect(),
        ),
    }
}

/// Decodes the first payload present among `candidates`.
///
/// A missing payload or a decode failure becomes a cursor that reports the error.
pub fn first_cursor(candidates: &[Option<&Chunk>]) -> Box<dyn SampleCursor> {
    match candidates.iter().flatten().next() {
        Some(chunk) => match decode_chunk(chunk) {
            Ok(cursor) => Box::new(cursor),
            Err(e) => ErrCursor::boxed(e),
        },
        None => ErrCursor::boxed(QueryError::NoUsableChunk),
    }
}

/// Emits `sum / count` per bucket from two aligned cursors.
pub struct AverageCursor {
    count: Box<dyn SampleCursor>,
    sum: Box<dyn SampleCursor>,
    cur: Sample,
    started: bool,
    exhausted: bool,
    err: Option<QueryError>,
}

impl AverageCursor {
    pub fn new(count: Box<dyn SampleCursor>, sum: Box<dyn SampleCursor>) -> Self {
        Self {
            count,
            sum,
            cur: Sample::default(),
            started: false,
            exhausted: false,
            err: None,
        }
    }

    fn fail(&mut self, msg: &str) -> bool {
        self.err = Some(QueryError::Misaligned(msg.to_string()));
        self.exhausted = true;
        false
    }
}

impl SampleCursor for AverageCursor {
    fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        let count_ok = self.count.advance();
        let sum_ok = self.sum.advance();
        if count_ok != sum_ok {
            return self.fail("sum and count iterator not aligned");
        }
        if !count_ok {
            self.exhausted = true;
            return false;
        }
        let c = self.count.current();
        let s = self.sum.current();
        if c.t != s.t {
            return self.fail("sum and count timestamps not aligned");
        }
        self.cur = Sample::new(c.t, s.v / c.v);
        self.started = true;
        true
    }

    fn seek(&mut self, t: Timestamp) -> bool {
        if self.exhausted {
            return false;
        }
        if self.started && self.cur.t >= t {
            return true;
        }
        while self.advance() {
            if self.cur.t >= t {
                return true;
            }
        }
        false
    }

    fn current(&self) -> Sample {
        self.cur
    }

    fn error(&self) -> Option<&QueryError> {
        self.count
            .error()
            .or_else(|| self.sum.error())
            .or(self.err.as_ref())
    }
}

/// Decides how much a counter grew between two consecutive readings.
pub trait CounterReset {
    fn increase(&self, prev: Value, cur: Value) -> Value;
}

/// A reading below its predecessor means the counter restarted from zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropToZeroReset;

impl CounterReset for DropToZeroReset {
    #[inline]
    fn increase(&self, prev: Value, cur: Value) -> Value {
        if cur >= prev {
            cur - prev
        } else {
            cur
        }
    }
}

/// Reconstructs one monotonic counter from per-chunk counter readings.
///
/// NaN readings are skipped. A reading at the same timestamp as the last emitted one only
/// replaces the last known raw value, which is how downsampled counter chunks carry the true
/// final value of their range.
pub struct CounterCursor<R: CounterReset = DropToZeroReset> {
    chunks: Vec<Box<dyn SampleCursor>>,
    i: usize,
    reset: R,
    started: bool,
    exhausted: bool,
    last_t: Timestamp,
    last_v: Value,
    total: Value,
}

impl CounterCursor<DropToZeroReset> {
    pub fn new(chunks: Vec<Box<dyn SampleCursor>>) -> Self {
        Self::with_reset(chunks, DropToZeroReset)
    }
}

impl<R: CounterReset> CounterCursor<R> {
    pub fn with_reset(chunks: Vec<Box<dyn SampleCursor>>, reset: R) -> Self {
        Self {
            chunks,
            i: 0,
            reset,
            started: false,
            exhausted: false,
            last_t: 0,
            last_v: 0.0,
            total: 0.0,
        }
    }
}

impl<R: CounterReset> SampleCursor for CounterCursor<R> {
    fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        while let Some(chunk) = self.chunks.get_mut(self.i) {
            if !chunk.advance() {
                if chunk.error().is_some() {
                    break;
                }
                self.i += 1;
                continue;
            }
            let s = chunk.current();
            if s.v.is_nan() {
                continue;
            }
            if !self.started {
                self.started = true;
                self.last_t = s.t;
                self.last_v = s.v;
                self.total = s.v;
                return true;
            }
            if s.t > self.last_t {
                self.total += self.reset.increase(self.last_v, s.v);
                self.last_t = s.t;
                self.last_v = s.v;
                return true;
            }
            if s.t == self.last_t {
                self.last_v = s.v;
            }
        }
        self.exhausted = true;
        false
    }

    fn seek(&mut self, t: Timestamp) -> bool {
        if self.exhausted {
            return false;
        }
        if self.started && self.last_t >= t {
            return true;
        }
        while self.advance() {
            if self.last_t >= t {
                return true;
            }
        }
        false
    }

    fn current(&self) -> Sample {
        Sample::new(self.last_t, self.total)
    }

    fn error(&self) -> Option<&QueryError> {
        self.chunks.get(self.i).and_then(|c| c.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkEncoding;
    use crate::cursor::{expand, SliceCursor};
    use crate::encoding::encode_xor_chunk;

    fn xor(pairs: &[(Timestamp, f64)]) -> Chunk {
        let samples: Vec<Sample> = pairs.iter().copied().map(Sample::from).collect();
        encode_xor_chunk(&samples).unwrap()
    }

    fn boxed(pairs: &[(Timestamp, f64)]) -> Box<dyn SampleCursor> {
        Box::new(SliceCursor::from_pairs(pairs))
    }

    fn pairs(samples: Vec<Sample>) -> Vec<(Timestamp, f64)> {
        samples.into_iter().map(|s| (s.t, s.v)).collect()
    }

    #[test]
    fn request_resolution() {
        assert_eq!(
            AggrRequest::from_kinds(&[AggrKind::Max]),
            Ok(AggrRequest::Single(AggrKind::Max))
        );
        assert_eq!(
            AggrRequest::from_kinds(&[AggrKind::Count, AggrKind::Sum]),
            Ok(AggrRequest::Average)
        );
        assert_eq!(
            AggrRequest::from_kinds(&[AggrKind::Sum, AggrKind::Count]),
            Ok(AggrRequest::Average)
        );
        for bad in [
            &[][..],
            &[AggrKind::Raw][..],
            &[AggrKind::Min, AggrKind::Max][..],
            &[AggrKind::Sum, AggrKind::Count, AggrKind::Min][..],
        ] {
            assert!(matches!(
                AggrRequest::from_kinds(bad),
                Err(QueryError::UnsupportedAggregate(_))
            ));
        }
    }

    #[test]
    fn single_kind_prefers_aggregate_then_falls_back_to_raw() {
        let mut downsampled = AggrChunk {
            min_time: 0,
            max_time: 10,
            ..Default::default()
        };
        downsampled.max = Some(xor(&[(10, 9.0)]));
        downsampled.raw = Some(xor(&[(0, 1.0), (10, 2.0)]));
        let raw_only = AggrChunk::raw(20, 30, xor(&[(20, 3.0), (30, 4.0)]));

        let mut c = series_cursor(&[downsampled, raw_only], AggrRequest::Single(AggrKind::Max));
        assert_eq!(
            pairs(expand(&mut c).unwrap()),
            vec![(10, 9.0), (20, 3.0), (30, 4.0)]
        );
    }

    #[test]
    fn average_divides_sum_by_count_when_raw_is_absent() {
        let mut chunk = AggrChunk {
            min_time: 0,
            max_time: 20,
            ..Default::default()
        };
        chunk.sum = Some(xor(&[(10, 20.0), (20, 9.0)]));
        chunk.count = Some(xor(&[(10, 4.0), (20, 3.0)]));
        let mut c = series_cursor(&[chunk], AggrRequest::Average);
        assert_eq!(pairs(expand(&mut c).unwrap()), vec![(10, 5.0), (20, 3.0)]);
    }

    #[test]
    fn average_uses_raw_when_present() {
        let mut chunk = AggrChunk::raw(0, 10, xor(&[(0, 1.0), (10, 3.0)]));
        chunk.sum = Some(xor(&[(10, 100.0)]));
        chunk.count = Some(xor(&[(10, 1.0)]));
        let mut c = series_cursor(&[chunk], AggrRequest::Average);
        assert_eq!(pairs(expand(&mut c).unwrap()), vec![(0, 1.0), (10, 3.0)]);
    }

    #[test]
    fn average_requires_both_sum_and_count() {
        let mut chunk = AggrChunk {
            min_time: 0,
            max_time: 10,
            ..Default::default()
        };
        chunk.sum = Some(xor(&[(10, 20.0)]));
        let mut c = series_cursor(&[chunk], AggrRequest::Average);
        assert_eq!(expand(&mut c), Err(QueryError::NoUsableChunk));
    }

    #[test]
    fn average_detects_misalignment() {
        let mut uneven = AverageCursor::new(boxed(&[(10, 1.0), (20, 1.0)]), boxed(&[(10, 5.0)]));
        assert!(uneven.advance());
        assert!(!uneven.advance());
        assert_eq!(
            uneven.error(),
            Some(&QueryError::Misaligned(
                "sum and count iterator not aligned".to_string()
            ))
        );

        let mut skewed = AverageCursor::new(boxed(&[(10, 1.0)]), boxed(&[(11, 5.0)]));
        assert!(!skewed.advance());
        assert_eq!(
            skewed.error(),
            Some(&QueryError::Misaligned(
                "sum and count timestamps not aligned".to_string()
            ))
        );
    }

    #[test]
    fn unknown_encoding_surfaces_through_selection() {
        let chunk = AggrChunk::raw(0, 10, Chunk::new(ChunkEncoding::Unknown(9), vec![0, 0]));
        let mut c = series_cursor(&[chunk], AggrRequest::Single(AggrKind::Sum));
        assert_eq!(expand(&mut c), Err(QueryError::UnknownEncoding(9)));
    }

    #[test]
    fn counter_accumulates_across_resets_and_chunks() {
        let mut c = CounterCursor::new(vec![
            boxed(&[(0, 1.0), (10, 5.0), (20, 2.0), (20, 3.0)]),
            boxed(&[(30, 1.0), (40, 4.0)]),
        ]);
        // 1 -> 5 (+4) -> reset to 2 (+2), true last value 3 at t=20,
        // then 1 < 3 is a reset (+1) and 4 (+3).
        assert_eq!(
            pairs(expand(&mut c).unwrap()),
            vec![(0, 1.0), (10, 5.0), (20, 7.0), (30, 8.0), (40, 11.0)]
        );
    }

    #[test]
    fn counter_skips_nan_and_overlapping_samples() {
        let mut c = CounterCursor::new(vec![
            boxed(&[(0, 1.0), (10, f64::NAN), (20, 3.0)]),
            boxed(&[(15, 2.5), (30, 6.0)]),
        ]);
        assert_eq!(
            pairs(expand(&mut c).unwrap()),
            vec![(0, 1.0), (20, 3.0), (30, 6.0)]
        );
    }

    #[test]
    fn counter_reset_rule_is_replaceable() {
        struct NeverReset;
        impl CounterReset for NeverReset {
            fn increase(&self, prev: Value, cur: Value) -> Value {
                cur - prev
            }
        }
        let mut c = CounterCursor::with_reset(vec![boxed(&[(0, 5.0), (10, 2.0)])], NeverReset);
        assert_eq!(pairs(expand(&mut c).unwrap()), vec![(0, 5.0), (10, 2.0)]);
    }

    #[test]
    fn counter_seek_and_error_propagation() {
        let mut c = CounterCursor::new(vec![
            boxed(&[(0, 1.0), (10, 2.0)]),
            ErrCursor::boxed(QueryError::NoUsableChunk),
        ]);
        assert!(c.seek(5));
        assert_eq!(c.current(), Sample::new(10, 2.0));
        assert!(!c.advance());
        assert_eq!(c.error(), Some(&QueryError::NoUsableChunk));

        let mut empty = series_cursor(&[], AggrRequest::Single(AggrKind::Counter));
        assert_eq!(expand(&mut empty), Err(QueryError::EmptySeries));
    }
}
