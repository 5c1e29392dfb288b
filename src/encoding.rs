//! XOR chunk codec: delta-of-delta timestamps and Gorilla XOR float packing.
//!
//! Layout: sample count as big-endian `u16`, then one MSB-first bitstream. The first sample is
//! stored as 64 raw timestamp bits and 64 raw value bits. Following timestamps are
//! delta-of-delta coded in the buckets `0`, `10`+7, `110`+9, `1110`+12, `1111`+64 bits;
//! following values are XORed against their predecessor, with the leading/trailing-zero window
//! reused when the new XOR fits inside it.

use bytes::Bytes;

use crate::chunk::{AggrChunk, Chunk, ChunkEncoding};
use crate::cursor::SampleCursor;
use crate::error::QueryError;
use crate::types::{Sample, Timestamp};

const HEADER_LEN: usize = 2;

/// Delta-of-delta buckets as (prefix bits, prefix length, payload width).
const DOD_BUCKETS: [(u64, u8, u8); 3] = [(0b10, 2, 7), (0b110, 3, 9), (0b1110, 4, 12)];

/// Decodes a chunk payload into a lazy sample cursor.
///
/// Only [`ChunkEncoding::Xor`] is recognized; every other tag is a hard error.
pub fn decode_chunk(chunk: &Chunk) -> Result<XorChunkCursor, QueryError> {
    match chunk.encoding {
        ChunkEncoding::Xor => XorChunkCursor::new(chunk.data.clone()),
        ChunkEncoding::Unknown(tag) => Err(QueryError::UnknownEncoding(tag)),
    }
}

/// Encodes time-ordered samples into an XOR chunk.
pub fn encode_xor_chunk(samples: &[Sample]) -> Result<Chunk, QueryError> {
    let count: u16 = samples.len().try_into().map_err(|_| {
        QueryError::CorruptChunk(format!("too many samples for one chunk: {}", samples.len()))
    })?;

    let mut buf = Vec::with_capacity(HEADER_LEN + samples.len() * 4);
    buf.extend_from_slice(&count.to_be_bytes());
    let mut bw = BitWriter::new(&mut buf);

    let mut prev_t: Timestamp = 0;
    let mut prev_delta: i64 = 0;
    let mut prev_bits: u64 = 0;
    let mut window = XorWindow::default();

    for (i, s) in samples.iter().enumerate() {
        let bits = s.v.to_bits();
        if i == 0 {
            bw.push_bits(s.t as u64, 64);
            bw.push_bits(bits, 64);
        } else {
            if s.t < prev_t {
                return Err(QueryError::CorruptChunk(
                    "samples must be sorted by timestamp for delta encoding".to_string(),
                ));
            }
            let delta = s.t.wrapping_sub(prev_t);
            push_dod(&mut bw, delta.wrapping_sub(prev_delta));
            prev_delta = delta;
            push_xor(&mut bw, &mut window, prev_bits ^ bits);
        }
        prev_t = s.t;
        prev_bits = bits;
    }
    bw.finish();
    Ok(Chunk::new(ChunkEncoding::Xor, buf))
}

/// Builds a raw-only [`AggrChunk`] spanning the samples' time range.
pub fn xor_aggr_chunk(samples: &[Sample]) -> Result<AggrChunk, QueryError> {
    let raw = encode_xor_chunk(samples)?;
    let min_time = samples.first().map(|s| s.t).unwrap_or_default();
    let max_time = samples.last().map(|s| s.t).unwrap_or_default();
    Ok(AggrChunk::raw(min_time, max_time, raw))
}

fn push_dod(bw: &mut BitWriter<'_>, dod: i64) {
    if dod == 0 {
        bw.push_bit(false);
        return;
    }
    for (prefix, prefix_len, width) in DOD_BUCKETS {
        if fits_signed(dod, width) {
            bw.push_bits(prefix, prefix_len);
            bw.push_bits(dod as u64, width);
            return;
        }
    }
    bw.push_bits(0b1111, 4);
    bw.push_bits(dod as u64, 64);
}

#[inline]
fn fits_signed(v: i64, width: u8) -> bool {
    let lo = -(1i64 << (width - 1));
    let hi = (1i64 << (width - 1)) - 1;
    lo <= v && v <= hi
}

#[inline]
fn sign_extend(v: u64, width: u8) -> i64 {
    let shift = 64 - width as u32;
    ((v << shift) as i64) >> shift
}

#[derive(Debug, Clone, Copy, Default)]
struct XorWindow {
    leading: u8,
    trailing: u8,
    sigbits: u8,
}

fn push_xor(bw: &mut BitWriter<'_>, window: &mut XorWindow, x: u64) {
    if x == 0 {
        bw.push_bit(false);
        return;
    }
    bw.push_bit(true);
    let leading = (x.leading_zeros() as u8).min(63);
    let trailing = x.trailing_zeros() as u8;
    let sigbits = 64 - leading - trailing;

    if window.sigbits != 0 && leading >= window.leading && trailing >= window.trailing {
        bw.push_bit(false);
        bw.push_bits(x >> window.trailing, window.sigbits);
    } else {
        bw.push_bit(true);
        bw.push_bits(leading as u64, 6);
        bw.push_bits((sigbits - 1) as u64, 6);
        bw.push_bits(x >> trailing, sigbits);
        *window = XorWindow {
            leading,
            trailing,
            sigbits,
        };
    }
}

struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    cur: u8,
    used: u8,
}

impl<'a> BitWriter<'a> {
    fn new(out: &'a mut Vec<u8>) -> Self {
        Self {
            out,
            cur: 0,
            used: 0,
        }
    }

    fn push_bit(&mut self, bit: bool) {
        let b = if bit { 1u8 } else { 0u8 };
        self.cur |= b << (7 - self.used);
        self.used += 1;
        if self.used == 8 {
            self.out.push(self.cur);
            self.cur = 0;
            self.used = 0;
        }
    }

    fn push_bits(&mut self, mut v: u64, count: u8) {
        if count == 0 {
            return;
        }
        if count < 64 {
            v &= (1u64 << count) - 1;
        }
        for i in (0..count).rev() {
            self.push_bit(((v >> i) & 1) == 1);
        }
    }

    fn finish(self) {
        if self.used > 0 {
            self.out.push(self.cur);
        }
    }
}

/// Bit reader over a shared buffer; `pos` is an absolute bit offset.
#[derive(Debug, Clone)]
struct BitReader {
    data: Bytes,
    pos: usize,
}

impl BitReader {
    fn read_bit(&mut self) -> Result<bool, QueryError> {
        let byte = self
            .data
            .get(self.pos / 8)
            .ok_or_else(|| QueryError::CorruptChunk("truncated XOR bitstream".to_string()))?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    fn read_bits(&mut self, count: u8) -> Result<u64, QueryError> {
        let mut out = 0u64;
        for _ in 0..count {
            out <<= 1;
            out |= if self.read_bit()? { 1 } else { 0 };
        }
        Ok(out)
    }
}

/// Lazy cursor over an XOR chunk. Decodes one sample per advance.
#[derive(Debug, Clone)]
pub struct XorChunkCursor {
    reader: BitReader,
    total: u16,
    read: u16,
    t: Timestamp,
    delta: i64,
    bits: u64,
    window: XorWindow,
    exhausted: bool,
    err: Option<QueryError>,
}

impl XorChunkCursor {
    fn new(data: Bytes) -> Result<Self, QueryError> {
        if data.len() < HEADER_LEN {
            return Err(QueryError::CorruptChunk(format!(
                "XOR chunk shorter than its header: {} bytes",
                data.len()
            )));
        }
        let total = u16::from_be_bytes([data[0], data[1]]);
        Ok(Self {
            reader: BitReader {
                data,
                pos: HEADER_LEN * 8,
            },
            total,
            read: 0,
            t: 0,
            delta: 0,
            bits: 0,
            window: XorWindow::default(),
            exhausted: false,
            err: None,
        })
    }

    fn decode_next(&mut self) -> Result<(), QueryError> {
        if self.read == 0 {
            self.t = self.reader.read_bits(64)? as i64;
            self.bits = self.reader.read_bits(64)?;
            return Ok(());
        }

        let dod = self.read_dod()?;
        self.delta = self.delta.wrapping_add(dod);
        self.t = self.t.wrapping_add(self.delta);

        if !self.reader.read_bit()? {
            return Ok(());
        }
        if self.reader.read_bit()? {
            let leading = self.reader.read_bits(6)? as u8;
            let sigbits = self.reader.read_bits(6)? as u8 + 1;
            if leading as u16 + sigbits as u16 > 64 {
                return Err(QueryError::CorruptChunk(
                    "invalid XOR bit widths".to_string(),
                ));
            }
            self.window = XorWindow {
                leading,
                trailing: 64 - leading - sigbits,
                sigbits,
            };
        } else if self.window.sigbits == 0 {
            return Err(QueryError::CorruptChunk(
                "XOR window reused before initialization".to_string(),
            ));
        }
        let significant = self.reader.read_bits(self.window.sigbits)?;
        self.bits ^= significant << self.window.trailing;
        Ok(())
    }

    fn read_dod(&mut self) -> Result<i64, QueryError> {
        if !self.reader.read_bit()? {
            return Ok(0);
        }
        for (_, _, width) in DOD_BUCKETS {
            if !self.reader.read_bit()? {
                return Ok(sign_extend(self.reader.read_bits(width)?, width));
            }
        }
        Ok(self.reader.read_bits(64)? as i64)
    }
}

impl SampleCursor for XorChunkCursor {
    fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if self.read >= self.total {
            self.exhausted = true;
            return false;
        }
        if let Err(e) = self.decode_next() {
            self.err = Some(e);
            self.exhausted = true;
            return false;
        }
        self.read += 1;
        true
    }

    fn seek(&mut self, t: Timestamp) -> bool {
        if self.exhausted {
            return false;
        }
        if self.read > 0 && self.t >= t {
            return true;
        }
        while self.advance() {
            if self.t >= t {
                return true;
            }
        }
        false
    }

    fn current(&self) -> Sample {
        Sample::new(self.t, f64::from_bits(self.bits))
    }

    fn error(&self) -> Option<&QueryError> {
        self.err.as_ref()
    }
}
