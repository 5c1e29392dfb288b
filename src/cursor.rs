//! The forward-only sample cursor every layer of the engine is built from.

use crate::error::QueryError;
use crate::types::{Sample, Timestamp, STALE_MARKER};

/// Stateful forward-only position over a time-ordered sequence of samples.
///
/// Implementations are composed by wrapping: decoded chunks, derived averages, counter
/// reconstruction, window bounding, multi-chunk merging and replica deduplication all expose
/// this one capability set.
///
/// Contract:
/// - `current` is only meaningful after `advance` or `seek` returned `true`.
/// - `seek(t)` never moves backwards. If the cursor already sits on a sample with timestamp
///   `>= t` it stays there.
/// - Once `advance` or `seek` returned `false` the cursor is exhausted; `error` tells whether
///   that was the end of data or a failure.
pub trait SampleCursor {
    fn advance(&mut self) -> bool;
    fn seek(&mut self, t: Timestamp) -> bool;
    fn current(&self) -> Sample;
    fn error(&self) -> Option<&QueryError>;
}

impl<C: SampleCursor + ?Sized> SampleCursor for Box<C> {
    #[inline]
    fn advance(&mut self) -> bool {
        (**self).advance()
    }

    #[inline]
    fn seek(&mut self, t: Timestamp) -> bool {
        (**self).seek(t)
    }

    #[inline]
    fn current(&self) -> Sample {
        (**self).current()
    }

    #[inline]
    fn error(&self) -> Option<&QueryError> {
        (**self).error()
    }
}

/// A cursor that holds no samples and reports `err` on the first query.
#[derive(Debug, Clone)]
pub struct ErrCursor {
    err: QueryError,
}

impl ErrCursor {
    pub fn new(err: QueryError) -> Self {
        Self { err }
    }

    pub fn boxed(err: QueryError) -> Box<dyn SampleCursor> {
        Box::new(Self::new(err))
    }
}

impl SampleCursor for ErrCursor {
    fn advance(&mut self) -> bool {
        false
    }

    fn seek(&mut self, _t: Timestamp) -> bool {
        false
    }

    fn current(&self) -> Sample {
        Sample::default()
    }

    fn error(&self) -> Option<&QueryError> {
        Some(&self.err)
    }
}

/// Cursor over samples that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct SliceCursor {
    samples: Vec<Sample>,
    // Index of the next sample to emit; the current one is `next - 1`.
    next: usize,
}

impl SliceCursor {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples, next: 0 }
    }

    pub fn from_pairs(pairs: &[(Timestamp, f64)]) -> Self {
        Self::new(pairs.iter().copied().map(Sample::from).collect())
    }
}

impl SampleCursor for SliceCursor {
    fn advance(&mut self) -> bool {
        if self.next >= self.samples.len() {
            self.next = self.samples.len() + 1;
            return false;
        }
        self.next += 1;
        true
    }

    fn seek(&mut self, t: Timestamp) -> bool {
        if self.next > 0 && self.next <= self.samples.len() && self.samples[self.next - 1].t >= t {
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
        match self.next {
            0 => Sample::default(),
            n => self.samples.get(n - 1).copied().unwrap_or_default(),
        }
    }

    fn error(&self) -> Option<&QueryError> {
        None
    }
}

/// Drains a cursor into memory, returning its terminal error if it has one.
pub fn expand<C: SampleCursor + ?Sized>(cursor: &mut C) -> Result<Vec<Sample>, QueryError> {
    let mut out = Vec::new();
    while cursor.advance() {
        out.push(cursor.current());
    }
    match cursor.error() {
        Some(err) => Err(err.clone()),
        None => Ok(out),
    }
}

/// Like [`expand`], but replaces NaN values with [`STALE_MARKER`] so results compare with `==`.
pub fn expand_for_inspection<C: SampleCursor + ?Sized>(
    cursor: &mut C,
) -> Result<Vec<Sample>, QueryError> {
    let mut samples = expand(cursor)?;
    for s in samples.iter_mut() {
        if s.v.is_nan() {
            s.v = STALE_MARKER;
        }
    }
    Ok(samples)
}
