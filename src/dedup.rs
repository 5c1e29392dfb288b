//! Replica deduplication: collapses HA replicas of one logical series into a single stream.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::chunk_series::Series;
use crate::config::QueryOptions;
use crate::cursor::{ErrCursor, SampleCursor};
use crate::error::QueryError;
use crate::telemetry::{query_metrics, QueryEvent, QueryEventListener};
use crate::types::{LabelSet, Sample, Timestamp};

/// Penalty applied to the unselected replica before any gap between samples is known.
///
/// Timestamps are milliseconds and scrape intervals are typically several seconds. Tunable.
pub const INITIAL_PENALTY: Timestamp = 5000;

/// The unselected replica is pushed this many observed sample gaps ahead. Tunable.
pub const PENALTY_FACTOR: i64 = 2;

/// Identity of a series once its replica labels are removed, looked up by name.
pub fn strip_replica_labels(labels: &LabelSet, replica_labels: &BTreeSet<String>) -> LabelSet {
    labels.without(replica_labels)
}

/// Groups consecutive series whose label sets are equal modulo the replica labels.
///
/// Needs one element of lookahead: a group closes when the next series has a different
/// identity or the input ends. Only the open group's members are held.
pub struct DedupSeriesSet<S, I> {
    source: I,
    replica_labels: BTreeSet<String>,
    peeked: Option<(LabelSet, S)>,
    done: bool,
    listener: Arc<dyn QueryEventListener>,
}

impl<S, I> DedupSeriesSet<S, I>
where
    S: Series,
    I: Iterator<Item = Result<S, QueryError>>,
{
    pub fn new(source: I, options: &QueryOptions) -> Self {
        Self {
            source,
            replica_labels: options.replica_labels.clone(),
            peeked: None,
            done: false,
            listener: options.event_listener.clone(),
        }
    }

    fn pull(&mut self) -> Option<Result<(LabelSet, S), QueryError>> {
        self.source.next().map(|r| {
            r.map(|s| {
                let id = strip_replica_labels(s.labels(), &self.replica_labels);
                (id, s)
            })
        })
    }

    /// Forwards a source error and ends the set. The grouping stage has already reported it.
    fn fail(&mut self, error: QueryError) -> Option<Result<DedupSeries<S>, QueryError>> {
        self.done = true;
        self.peeked = None;
        Some(Err(error))
    }
}

impl<S, I> Iterator for DedupSeriesSet<S, I>
where
    S: Series,
    I: Iterator<Item = Result<S, QueryError>>,
{
    type Item = Result<DedupSeries<S>, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let (labels, first) = match self.peeked.take() {
            Some(p) => p,
            None => match self.pull() {
                Some(Ok(p)) => p,
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    return None;
                }
            },
        };

        let mut replicas = vec![first];
        loop {
            match self.pull() {
                Some(Ok((id, s))) if id == labels => replicas.push(s),
                Some(Ok(p)) => {
                    self.peeked = Some(p);
                    break;
                }
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        query_metrics::record_replica_group(replicas.len());
        if replicas.len() > 1 {
            self.listener.on_event(QueryEvent::ReplicasMerged {
                labels: labels.clone(),
                replicas: replicas.len(),
            });
        }
        Some(Ok(DedupSeries { labels, replicas }))
    }
}

/// One logical series: the stripped label set and every replica found for it.
#[derive(Debug, Clone)]
pub struct DedupSeries<S> {
    labels: LabelSet,
    replicas: Vec<S>,
}

impl<S: Series> DedupSeries<S> {
    pub fn replicas(&self) -> &[S] {
        &self.replicas
    }
}

impl<S: Series> Series for DedupSeries<S> {
    fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// A single replica is exposed as is; more are folded pairwise,
    /// `merge(merge(r0, r1), r2)` and so on.
    fn cursor(&self) -> Box<dyn SampleCursor> {
        let mut replicas = self.replicas.iter();
        let Some(first) = replicas.next() else {
            return ErrCursor::boxed(QueryError::EmptySeries);
        };
        replicas.fold(first.cursor(), |merged, r| -> Box<dyn SampleCursor> {
            Box::new(DedupCursor::new(merged, r.cursor()))
        })
    }
}

/// Merges two cursors over replicas of the same signal whose sample clocks are not aligned.
///
/// Each step emits the earliest sample of either side. The side that was not picked has its
/// next seek pushed out by a penalty of twice the gap just observed (or [`INITIAL_PENALTY`]
/// for the first sample), so a replica's reading of the same event is skipped instead of
/// doubling the sampling rate. Ties go to `a`.
pub struct DedupCursor<A = Box<dyn SampleCursor>, B = Box<dyn SampleCursor>> {
    a: A,
    b: B,
    a_ok: bool,
    b_ok: bool,
    use_a: bool,
    last_t: Option<Timestamp>,
    pen_a: Timestamp,
    pen_b: Timestamp,
    initial_penalty: Timestamp,
    penalty_factor: i64,
    exhausted: bool,
}

impl<A: SampleCursor, B: SampleCursor> DedupCursor<A, B> {
    pub fn new(a: A, b: B) -> Self {
        Self::with_penalties(a, b, INITIAL_PENALTY, PENALTY_FACTOR)
    }

    pub fn with_penalties(a: A, b: B, initial_penalty: Timestamp, penalty_factor: i64) -> Self {
        Self {
            a,
            b,
            a_ok: true,
            b_ok: true,
            use_a: true,
            last_t: None,
            pen_a: 0,
            pen_b: 0,
            initial_penalty,
            penalty_factor,
            exhausted: false,
        }
    }

    fn penalty_after(&self, picked: Timestamp) -> Timestamp {
        match self.last_t {
            Some(last) => self.penalty_factor.saturating_mul(picked.saturating_sub(last)),
            None => self.initial_penalty,
        }
    }

    fn finish(&mut self) -> bool {
        self.exhausted = true;
        false
    }
}

impl<A: SampleCursor, B: SampleCursor> SampleCursor for DedupCursor<A, B> {
    fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        let base = match self.last_t {
            Some(t) => t.saturating_add(1),
            None => Timestamp::MIN,
        };
        if self.a_ok {
            self.a_ok = self.a.seek(base.saturating_add(self.pen_a));
        }
        if self.b_ok {
            self.b_ok = self.b.seek(base.saturating_add(self.pen_b));
        }
        if self.error().is_some() {
            return self.finish();
        }

        match (self.a_ok, self.b_ok) {
            (false, false) => self.finish(),
            (false, true) => {
                self.use_a = false;
                self.pen_b = 0;
                self.last_t = Some(self.b.current().t);
                true
            }
            (true, false) => {
                self.use_a = true;
                self.pen_a = 0;
                self.last_t = Some(self.a.current().t);
                true
            }
            (true, true) => {
                let ta = self.a.current().t;
                let tb = self.b.current().t;
                self.use_a = ta <= tb;
                if self.use_a {
                    self.pen_b = self.penalty_after(ta);
                    self.pen_a = 0;
                    self.last_t = Some(ta);
                } else {
                    self.pen_a = self.penalty_after(tb);
                    self.pen_b = 0;
                    self.last_t = Some(tb);
                }
                true
            }
        }
    }

    fn seek(&mut self, t: Timestamp) -> bool {
        if self.exhausted {
            return false;
        }
        if matches!(self.last_t, Some(last) if last >= t) {
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
        if self.use_a {
            self.a.current()
        } else {
            self.b.current()
        }
    }

    fn error(&self) -> Option<&QueryError> {
        self.a.error().or_else(|| self.b.error())
    }
}
