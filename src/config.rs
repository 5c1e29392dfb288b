//! Query options consumed by the grouping and dedup sets.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::aggregate::AggrRequest;
use crate::chunk::AggrKind;
use crate::error::QueryError;
use crate::telemetry::{noop_event_listener, QueryEventListener};
use crate::types::{TimeWindow, Timestamp};

/// Configuration options for one query over partial series.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Closed window every emitted sample must fall into.
    pub window: TimeWindow,
    /// Requested aggregate: one kind, or `Sum` + `Count` for an average.
    pub aggregates: Vec<AggrKind>,
    /// Label names that tell replicas of one logical series apart.
    pub replica_labels: BTreeSet<String>,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn QueryEventListener>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            window: TimeWindow::default(),
            // Raw chunks satisfy the average request directly.
            aggregates: vec![AggrKind::Sum, AggrKind::Count],
            replica_labels: BTreeSet::new(),
            event_listener: noop_event_listener(),
        }
    }
}

impl QueryOptions {
    pub fn new(mint: Timestamp, maxt: Timestamp) -> Self {
        QueryOptions {
            window: TimeWindow::new(mint, maxt),
            ..Default::default()
        }
    }

    pub fn with_aggregates(mut self, aggregates: &[AggrKind]) -> Self {
        self.aggregates = aggregates.to_vec();
        self
    }

    pub fn with_replica_labels<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.replica_labels = names.into_iter().map(Into::into).collect();
        self
    }

    /// Rejects static configuration errors up front instead of per series.
    pub fn validate(&self) -> Result<AggrRequest, QueryError> {
        if self.window.mint > self.window.maxt {
            return Err(QueryError::InvalidTimeRange {
                mint: self.window.mint,
                maxt: self.window.maxt,
            });
        }
        AggrRequest::from_kinds(&self.aggregates)
    }
}
