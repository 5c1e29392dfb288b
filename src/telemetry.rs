use std::sync::Arc;

use crate::error::QueryError;
use crate::types::LabelSet;

/// Receives structured events from the grouping and dedup sets.
///
/// Nothing in the library writes to stdout or stderr. Callers that want logs forward these
/// events to their own sink (`tracing`, `log`, a test recorder).
pub trait QueryEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: QueryEvent);
}

/// Structured events emitted while grouping and deduplicating series.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    /// Byte-identical chunks were delivered more than once for one series.
    DuplicateChunksRemoved { labels: LabelSet, removed: usize },
    /// Several replicas were collapsed into one logical series.
    ReplicasMerged { labels: LabelSet, replicas: usize },
    /// The upstream stream failed; the series being assembled was dropped.
    UpstreamFailed { error: QueryError },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl QueryEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: QueryEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn QueryEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics instrumentation for series grouping and replica deduplication.
///
/// Emitting is effectively a no-op until a recorder is installed. With the `prometheus`
/// feature, [`InProcessPrometheus`](query_metrics::InProcessPrometheus) installs one and
/// renders the exposition text in-process.
pub mod query_metrics {
    use ::metrics::{describe_counter, Unit};

    #[cfg(feature = "prometheus")]
    use std::sync::mpsc::{self, RecvTimeoutError, Sender};
    #[cfg(feature = "prometheus")]
    use std::thread::JoinHandle;
    #[cfg(feature = "prometheus")]
    use std::time::Duration;

    #[cfg(feature = "prometheus")]
    use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

    // Counters are exposed as `<name>_total` by the Prometheus exporter.
    pub const SERIES_GROUPED: &str = "ugnos_dedup_series_grouped";
    pub const DUPLICATE_CHUNKS_REMOVED: &str = "ugnos_dedup_duplicate_chunks_removed";
    pub const REPLICA_GROUPS: &str = "ugnos_dedup_replica_groups";
    pub const REPLICAS_MERGED: &str = "ugnos_dedup_replicas_merged";
    pub const UPSTREAM_ERRORS: &str = "ugnos_dedup_upstream_errors";

    /// Global Prometheus recorder plus the thread running its periodic upkeep.
    ///
    /// Scraping is in-process only: call [`InProcessPrometheus::render`]. Dropping the value
    /// stops the upkeep thread; the recorder itself stays installed.
    #[cfg(feature = "prometheus")]
    #[derive(Debug)]
    pub struct InProcessPrometheus {
        handle: PrometheusHandle,
        upkeep: Option<Upkeep>,
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug)]
    struct Upkeep {
        stop: Sender<()>,
        thread: JoinHandle<()>,
    }

    #[cfg(feature = "prometheus")]
    impl InProcessPrometheus {
        /// Installs the recorder (at most once per process) and runs upkeep every `interval`.
        pub fn install(interval: Duration) -> Result<Self, MetricsInitError> {
            describe_all();
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(MetricsInitError::from)?;

            let (stop, stopped) = mpsc::channel::<()>();
            let upkeep_handle = handle.clone();
            let thread = std::thread::Builder::new()
                .name("ugnos-dedup-metrics-upkeep".to_string())
                .spawn(move || {
                    while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                        upkeep_handle.run_upkeep();
                    }
                })
                .map_err(|e| MetricsInitError::ThreadSpawn(e.to_string()))?;

            Ok(Self {
                handle,
                upkeep: Some(Upkeep { stop, thread }),
            })
        }

        /// Current counters in the Prometheus text exposition format.
        pub fn render(&self) -> String {
            self.handle.render()
        }
    }

    #[cfg(feature = "prometheus")]
    impl Drop for InProcessPrometheus {
        fn drop(&mut self) {
            if let Some(Upkeep { stop, thread }) = self.upkeep.take() {
                drop(stop);
                let _ = thread.join();
            }
        }
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug, thiserror::Error)]
    pub enum MetricsInitError {
        #[error("a global metrics recorder is already installed")]
        AlreadyInstalled,
        #[error("prometheus recorder: {0}")]
        Install(String),
        #[error("metrics upkeep thread: {0}")]
        ThreadSpawn(String),
    }

    #[cfg(feature = "prometheus")]
    impl From<BuildError> for MetricsInitError {
        fn from(e: BuildError) -> Self {
            match e {
                BuildError::FailedToSetGlobalRecorder(_) => MetricsInitError::AlreadyInstalled,
                other => MetricsInitError::Install(other.to_string()),
            }
        }
    }

    #[inline]
    pub fn record_series_grouped(duplicates_removed: usize) {
        ::metrics::counter!(SERIES_GROUPED).increment(1);
        if duplicates_removed > 0 {
            ::metrics::counter!(DUPLICATE_CHUNKS_REMOVED).increment(duplicates_removed as u64);
        }
    }

    #[inline]
    pub fn record_replica_group(replicas: usize) {
        ::metrics::counter!(REPLICA_GROUPS).increment(1);
        if replicas > 1 {
            ::metrics::counter!(REPLICAS_MERGED).increment(replicas as u64);
        }
    }

    #[inline]
    pub fn record_upstream_error() {
        ::metrics::counter!(UPSTREAM_ERRORS).increment(1);
    }

    pub fn describe_all() {
        describe_counter!(
            SERIES_GROUPED,
            Unit::Count,
            "Series assembled from one run of partial series sharing a label set."
        );
        describe_counter!(
            DUPLICATE_CHUNKS_REMOVED,
            Unit::Count,
            "Chunks dropped because they were byte-identical to their predecessor."
        );
        describe_counter!(
            REPLICA_GROUPS,
            Unit::Count,
            "Logical series emitted after replica label stripping."
        );
        describe_counter!(
            REPLICAS_MERGED,
            Unit::Count,
            "Replica series merged into a deduplicated logical series."
        );
        describe_counter!(
            UPSTREAM_ERRORS,
            Unit::Count,
            "Errors received from the upstream partial series stream."
        );
    }
}
