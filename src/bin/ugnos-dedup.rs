//! Command-line driver for the merge and dedup pipeline.
//!
//! Loads query configuration from (in precedence order): defaults, config file, environment
//! variables (`UGNOS_DEDUP_*`), and CLI flags. Reads a TOML fixture of partial series, encodes
//! every payload as an XOR chunk, runs the pipeline and prints one line per output sample.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::de::IntoDeserializer;
use serde::Deserialize;
use ugnos_dedup::cursor::{expand, expand_for_inspection};
use ugnos_dedup::encoding::encode_xor_chunk;
use ugnos_dedup::group::series_source;
use ugnos_dedup::{
    select_series, AggrChunk, AggrKind, LabelSet, PartialSeries, QueryOptions, Sample, Series,
    TimeWindow, Timestamp,
};

// ---------- CLI ----------

/// Merges partial series and deduplicates HA replicas from a fixture file.
#[derive(Parser, Debug)]
#[command(name = "ugnos-dedup", version, about)]
pub struct Cli {
    /// Fixture file (TOML) with `[[series]]` entries. Required unless `--validate-config`.
    pub fixture: Option<PathBuf>,

    /// Path to config file (TOML). If omitted, `ugnos-dedup.toml` is loaded when present.
    #[arg(long, env = "UGNOS_DEDUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Do not load any config file; use defaults + env + CLI only.
    #[arg(long, default_value_t = false)]
    pub no_config: bool,

    /// Load and validate config (file + env + CLI), print the effective query, then exit.
    #[arg(long, default_value_t = false)]
    pub validate_config: bool,

    /// Lower bound of the query window (inclusive, milliseconds).
    #[arg(long, allow_negative_numbers = true)]
    pub mint: Option<Timestamp>,

    /// Upper bound of the query window (inclusive, milliseconds).
    #[arg(long, allow_negative_numbers = true)]
    pub maxt: Option<Timestamp>,

    /// Requested aggregate; repeat for `--aggr sum --aggr count`.
    #[arg(long = "aggr", value_parser = parse_aggr_kind)]
    pub aggregates: Vec<AggrKind>,

    /// Label name distinguishing replicas; repeatable.
    #[arg(long = "replica-label")]
    pub replica_labels: Vec<String>,

    /// Print NaN values as the stale marker so output diffs cleanly.
    #[arg(long, default_value_t = false)]
    pub inspect: bool,
}

fn parse_aggr_kind(s: &str) -> Result<AggrKind, String> {
    let de: serde::de::value::StrDeserializer<'_, serde::de::value::Error> =
        s.into_deserializer();
    AggrKind::deserialize(de).map_err(|e| format!("invalid aggregate {:?}: {}", s, e))
}

// ---------- File/env config (all optional for partial config) ----------

/// Query settings as read from file + env. Every field optional for layering.
#[derive(Debug, Default, Deserialize)]
pub struct QueryFileConfig {
    pub mint: Option<Timestamp>,
    pub maxt: Option<Timestamp>,
    pub aggregates: Option<Vec<AggrKind>>,
    pub replica_labels: Option<Vec<String>>,
}

/// Load merged query options. CLI overrides file/env.
fn load_query_options(cli: &Cli) -> Result<QueryOptions, String> {
    let mut builder = Config::builder();

    if !cli.no_config {
        if let Some(ref path) = cli.config {
            if !path.exists() {
                return Err(format!("config file not found: {}", path.display()));
            }
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        } else {
            let default_path = PathBuf::from("ugnos-dedup.toml");
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path.as_path()).required(false));
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("UGNOS_DEDUP")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .ignore_empty(true)
            .list_separator(",")
            .with_list_parse_key("aggregates")
            .with_list_parse_key("replica_labels"),
    );

    let merged = builder.build().map_err(|e| e.to_string())?;
    let partial: QueryFileConfig = merged.try_deserialize().map_err(|e| e.to_string())?;

    let mut options = QueryOptions::default();
    merge_into_query_options(&mut options, &partial);

    if let Some(t) = cli.mint {
        options.window.mint = t;
    }
    if let Some(t) = cli.maxt {
        options.window.maxt = t;
    }
    if !cli.aggregates.is_empty() {
        options.aggregates = cli.aggregates.clone();
    }
    if !cli.replica_labels.is_empty() {
        options = options.with_replica_labels(cli.replica_labels.iter().cloned());
    }

    options.validate().map_err(|e| e.to_string())?;
    Ok(options)
}

/// Merge file/env partial config onto `QueryOptions`. Only overwrites fields that are `Some`.
fn merge_into_query_options(base: &mut QueryOptions, partial: &QueryFileConfig) {
    if let Some(t) = partial.mint {
        base.window.mint = t;
    }
    if let Some(t) = partial.maxt {
        base.window.maxt = t;
    }
    if let Some(ref kinds) = partial.aggregates {
        base.aggregates = kinds.clone();
    }
    if let Some(ref names) = partial.replica_labels {
        base.replica_labels = names.iter().cloned().collect();
    }
}

// ---------- Fixture ----------

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    series: Vec<FixtureSeries>,
}

#[derive(Debug, Deserialize)]
struct FixtureSeries {
    labels: BTreeMap<String, String>,
    #[serde(default)]
    chunks: Vec<FixtureChunk>,
}

/// One chunk: optional explicit bounds plus sample lists per payload kind.
#[derive(Debug, Default, Deserialize)]
struct FixtureChunk {
    min_time: Option<Timestamp>,
    max_time: Option<Timestamp>,
    raw: Option<Vec<FixtureSample>>,
    count: Option<Vec<FixtureSample>>,
    sum: Option<Vec<FixtureSample>>,
    min: Option<Vec<FixtureSample>>,
    max: Option<Vec<FixtureSample>>,
    counter: Option<Vec<FixtureSample>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct FixtureSample {
    t: Timestamp,
    v: f64,
}

impl FixtureChunk {
    fn payloads(&self) -> [(AggrKind, Option<&Vec<FixtureSample>>); 6] {
        [
            (AggrKind::Raw, self.raw.as_ref()),
            (AggrKind::Count, self.count.as_ref()),
            (AggrKind::Sum, self.sum.as_ref()),
            (AggrKind::Min, self.min.as_ref()),
            (AggrKind::Max, self.max.as_ref()),
            (AggrKind::Counter, self.counter.as_ref()),
        ]
    }

    fn encode(&self) -> Result<AggrChunk, String> {
        let mut chunk = AggrChunk::default();
        let mut span: Option<TimeWindow> = None;
        for (kind, samples) in self.payloads() {
            let Some(samples) = samples else { continue };
            let samples: Vec<Sample> = samples.iter().map(|s| Sample::new(s.t, s.v)).collect();
            if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
                span = Some(match span {
                    Some(w) => TimeWindow::new(w.mint.min(first.t), w.maxt.max(last.t)),
                    None => TimeWindow::new(first.t, last.t),
                });
            }
            let encoded = encode_xor_chunk(&samples).map_err(|e| format!("{:?} payload: {}", kind, e))?;
            chunk.set_payload(kind, encoded);
        }
        let span = span.unwrap_or(TimeWindow::new(0, 0));
        chunk.min_time = self.min_time.unwrap_or(span.mint);
        chunk.max_time = self.max_time.unwrap_or(span.maxt);
        Ok(chunk)
    }
}

fn load_fixture(path: &Path) -> Result<Vec<PartialSeries>, String> {
    if !path.exists() {
        return Err(format!("fixture not found: {}", path.display()));
    }
    let fixture: Fixture = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| format!("fixture {}: {}", path.display(), e))?;

    fixture
        .series
        .into_iter()
        .map(|s| {
            let labels: LabelSet = s.labels.into_iter().collect();
            let chunks = s
                .chunks
                .iter()
                .map(FixtureChunk::encode)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("series {}: {}", labels, e))?;
            Ok(PartialSeries::new(labels, chunks))
        })
        .collect()
}

// ---------- Main ----------

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let options = load_query_options(&cli).map_err(|e| {
        eprintln!("config error: {}", e);
        e
    })?;

    if cli.validate_config {
        let aggregates: Vec<String> = options
            .aggregates
            .iter()
            .map(|k| format!("{:?}", k).to_lowercase())
            .collect();
        let replica_labels: Vec<&str> = options.replica_labels.iter().map(String::as_str).collect();
        println!("mint={}", options.window.mint);
        println!("maxt={}", options.window.maxt);
        println!("aggregates={}", aggregates.join(","));
        println!("replica_labels={}", replica_labels.join(","));
        return Ok(());
    }

    let Some(ref fixture) = cli.fixture else {
        eprintln!("config error: a fixture file is required");
        return Err("missing fixture".into());
    };
    let partials = load_fixture(fixture).map_err(|e| {
        eprintln!("fixture error: {}", e);
        e
    })?;

    for series in select_series(series_source(partials), &options) {
        let series = series.map_err(|e| {
            eprintln!("query failed: {}", e);
            e
        })?;
        let mut cursor = series.cursor();
        let samples = if cli.inspect {
            expand_for_inspection(&mut cursor)
        } else {
            expand(&mut cursor)
        }
        .map_err(|e| {
            eprintln!("series {}: {}", series.labels(), e);
            e
        })?;
        for s in samples {
            println!("{} {} {}", series.labels(), s.t, s.v);
        }
    }
    Ok(())
}
