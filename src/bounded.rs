use crate::cursor::SampleCursor;
use crate::error::QueryError;
use crate::types::{Sample, TimeWindow, Timestamp};

/// Restricts a cursor to a closed time window.
///
/// Samples before `mint` are skipped with a single seek. Once a sample past `maxt` has been
/// reached the cursor is exhausted for good, whatever is asked of it afterwards.
pub struct BoundedCursor<C: SampleCursor = Box<dyn SampleCursor>> {
    inner: C,
    window: TimeWindow,
    done: bool,
}

impl<C: SampleCursor> BoundedCursor<C> {
    pub fn new(inner: C, window: TimeWindow) -> Self {
        Self {
            inner,
            window,
            done: false,
        }
    }

    fn finish(&mut self) -> bool {
        self.done = true;
        false
    }
}

impl<C: SampleCursor> SampleCursor for BoundedCursor<C> {
    fn seek(&mut self, t: Timestamp) -> bool {
        if self.done || t > self.window.maxt {
            return self.finish();
        }
        if !self.inner.seek(t.max(self.window.mint)) {
            return self.finish();
        }
        if !self.window.contains(self.inner.current().t) {
            return self.finish();
        }
        true
    }

    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        if !self.inner.advance() {
            return self.finish();
        }
        let mut t = self.inner.current().t;
        if t < self.window.mint {
            if !self.inner.seek(self.window.mint) {
                return self.finish();
            }
            t = self.inner.current().t;
        }
        if !self.window.contains(t) {
            return self.finish();
        }
        true
    }

    fn current(&self) -> Sample {
        self.inner.current()
    }

    fn error(&self) -> Option<&QueryError> {
        self.inner.error()
    }
}
