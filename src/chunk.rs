//! Chunks as delivered by storage partitions: one time range, several alternative payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Aggregate kinds a chunk may carry a payload for. Serde: lowercase string (e.g. `"sum"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggrKind {
    Raw,
    Count,
    Sum,
    Min,
    Max,
    Counter,
}

/// Encoding tag of a single chunk payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkEncoding {
    /// Gorilla-style XOR encoding, see [`crate::encoding`].
    Xor,
    /// Any tag this build does not understand. Decoding it fails.
    Unknown(u8),
}

const ENCODING_TAG_XOR: u8 = 1;

impl ChunkEncoding {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            ENCODING_TAG_XOR => ChunkEncoding::Xor,
            other => ChunkEncoding::Unknown(other),
        }
    }
}

/// One encoded payload. `data` is shared, so cursors can own a handle without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub encoding: ChunkEncoding,
    pub data: Bytes,
}

impl Chunk {
    pub fn new(encoding: ChunkEncoding, data: impl Into<Bytes>) -> Self {
        Self {
            encoding,
            data: data.into(),
        }
    }
}

/// A time-bounded chunk with zero or more alternative payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggrChunk {
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    pub raw: Option<Chunk>,
    pub count: Option<Chunk>,
    pub sum: Option<Chunk>,
    pub min: Option<Chunk>,
    pub max: Option<Chunk>,
    pub counter: Option<Chunk>,
}

impl AggrChunk {
    pub fn raw(min_time: Timestamp, max_time: Timestamp, raw: Chunk) -> Self {
        Self {
            min_time,
            max_time,
            raw: Some(raw),
            ..Default::default()
        }
    }

    pub fn payload(&self, kind: AggrKind) -> Option<&Chunk> {
        match kind {
            AggrKind::Raw => self.raw.as_ref(),
            AggrKind::Count => self.count.as_ref(),
            AggrKind::Sum => self.sum.as_ref(),
            AggrKind::Min => self.min.as_ref(),
            AggrKind::Max => self.max.as_ref(),
            AggrKind::Counter => self.counter.as_ref(),
        }
    }

    pub fn set_payload(&mut self, kind: AggrKind, chunk: Chunk) {
        let slot = match kind {
            AggrKind::Raw => &mut self.raw,
            AggrKind::Count => &mut self.count,
            AggrKind::Sum => &mut self.sum,
            AggrKind::Min => &mut self.min,
            AggrKind::Max => &mut self.max,
            AggrKind::Counter => &mut self.counter,
        };
        *slot = Some(chunk);
    }
}

/// Sorts chunks by start time. The sort is stable; callers must not rely on tie order.
pub fn sort_by_min_time(chunks: &mut [AggrChunk]) {
    chunks.sort_by_key(|c| c.min_time);
}

/// Drops chunks identical to their immediate predecessor. Input must be sorted by `min_time`.
///
/// Returns the number of chunks removed.
pub fn remove_exact_duplicates(chunks: &mut Vec<AggrChunk>) -> usize {
    let before = chunks.len();
    if before <= 1 {
        return 0;
    }
    chunks.dedup();
    before - chunks.len()
}
