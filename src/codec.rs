// Sensor Rollup - Hierarchical power aggregation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Binary codecs for persisted state
//!
//! State blobs are opaque to the store. A zero-length blob always decodes to
//! "absent", which is how the store represents cold start and tombstones, so
//! every non-empty encoding is self-delimiting and starts with a version byte.
//!
//! # Aggregation state layout
//!
//! All integers and floats are little-endian:
//!
//! ```text
//! ┌──────────┬─────────┬─────────┬───────┬───────────────────┐
//! │ version  │ count   │ sum     │ flags │ min, max (if set) │
//! │ u8       │ u64     │ f64     │ u8    │ f64, f64          │
//! ├──────────┴──┬──────┴─────┬───┴───────┴──┬────────────────┤
//! │ last_ts     │ capacity   │ fifo_len      │ values         │
//! │ i64         │ u32        │ u32           │ f64 × fifo_len │
//! ├─────────────┴────────────┴───────────────┴────────────────┤
//! │ CRC-32 of every preceding byte (u32)                      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Optional parent-set layout
//!
//! ```text
//! tag u8 = 0                     -> absent
//! tag u8 = 1, n u64, n × (len u64, utf-8 bytes) -> present (n may be 0)
//! ```

use std::collections::{BTreeSet, VecDeque};

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::DecodeError;
use crate::graph::SensorId;
use crate::state::AggregationState;

/// Current state blob format version
pub const STATE_FORMAT_VERSION: u8 = 1;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const FLAG_HAS_EXTREMA: u8 = 0x01;

const TAG_ABSENT: u8 = 0;
const TAG_PRESENT: u8 = 1;

/// Byte encoding for a persisted value
pub trait StateCodec<T> {
    /// Encode a value; the result is never empty
    fn encode(&self, value: &T) -> Vec<u8>;

    /// Decode a complete blob; an empty slice means the value is absent
    fn decode(&self, bytes: &[u8]) -> Result<Option<T>, DecodeError>;
}

/// Bounds-checked little-endian reader
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.offset.saturating_add(len);
        if end > self.data.len() {
            return Err(DecodeError::BufferTooShort {
                needed: end,
                available: self.data.len(),
            });
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// Read a `u64` length prefix that must fit in memory
    fn length_prefix(&mut self) -> Result<usize, DecodeError> {
        let raw = self.u64()?;
        usize::try_from(raw).map_err(|_| self.malformed(format!("length {} out of range", raw)))
    }

    fn malformed(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::MalformedState {
            offset: self.offset,
            reason: reason.into(),
        }
    }

    fn finish(&self) -> Result<(), DecodeError> {
        let count = self.remaining();
        if count > 0 {
            return Err(DecodeError::TrailingBytes { count });
        }
        Ok(())
    }
}

/// Codec for [`AggregationState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationStateCodec;

impl AggregationStateCodec {
    /// Create the codec
    pub fn new() -> Self {
        Self
    }

    /// Decode one state from the front of `data`
    ///
    /// Returns the state and the number of bytes consumed, so blobs can be
    /// read back-to-back.
    pub fn decode_prefix(&self, data: &[u8]) -> Result<(AggregationState, usize), DecodeError> {
        let mut reader = Reader::new(data);

        let version = reader.u8()?;
        if version != STATE_FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let count = reader.u64()?;
        let sum = reader.f64()?;
        let flags = reader.u8()?;
        if flags & !FLAG_HAS_EXTREMA != 0 {
            return Err(reader.malformed(format!("unknown flags {:#04x}", flags)));
        }
        let extrema = if flags & FLAG_HAS_EXTREMA != 0 {
            Some((reader.f64()?, reader.f64()?))
        } else {
            None
        };
        if extrema.is_some() != (count > 0) {
            return Err(reader.malformed("extrema presence disagrees with count"));
        }

        let last_timestamp = reader.i64()?;
        let capacity = reader.u32()? as usize;
        let fifo_len = reader.u32()? as usize;
        if fifo_len > capacity {
            return Err(reader.malformed(format!(
                "fifo length {} exceeds capacity {}",
                fifo_len, capacity
            )));
        }

        // Values plus the CRC trailer must be present before anything is
        // allocated; capacity is never used as an allocation size here.
        let needed = fifo_len.saturating_mul(8).saturating_add(4);
        if needed > reader.remaining() {
            return Err(DecodeError::BufferTooShort {
                needed: reader.offset.saturating_add(needed),
                available: data.len(),
            });
        }

        let mut last_values = VecDeque::with_capacity(fifo_len);
        for _ in 0..fifo_len {
            last_values.push_back(reader.f64()?);
        }

        let body_len = reader.offset;
        let expected = reader.u32()?;
        let actual = CRC32.checksum(&data[..body_len]);
        if expected != actual {
            return Err(DecodeError::InvalidChecksum { expected, actual });
        }

        let state = AggregationState::from_parts(
            count,
            sum,
            extrema,
            last_timestamp,
            last_values,
            capacity,
        );
        Ok((state, reader.offset))
    }
}

impl StateCodec<AggregationState> for AggregationStateCodec {
    fn encode(&self, state: &AggregationState) -> Vec<u8> {
        let fifo_len = state.last_values_len();
        let mut bytes = Vec::with_capacity(46 + fifo_len * 8);

        bytes.push(STATE_FORMAT_VERSION);
        bytes.extend_from_slice(&state.count.to_le_bytes());
        bytes.extend_from_slice(&state.sum.to_le_bytes());

        match (state.min, state.max) {
            (Some(min), Some(max)) => {
                bytes.push(FLAG_HAS_EXTREMA);
                bytes.extend_from_slice(&min.to_le_bytes());
                bytes.extend_from_slice(&max.to_le_bytes());
            }
            _ => bytes.push(0),
        }

        bytes.extend_from_slice(&state.last_timestamp.to_le_bytes());
        bytes.extend_from_slice(&(state.capacity() as u32).to_le_bytes());
        bytes.extend_from_slice(&(fifo_len as u32).to_le_bytes());
        for value in state.last_values() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let checksum = CRC32.checksum(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        bytes
    }

    fn decode(&self, bytes: &[u8]) -> Result<Option<AggregationState>, DecodeError> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let (state, consumed) = self.decode_prefix(bytes)?;
        Reader {
            data: bytes,
            offset: consumed,
        }
        .finish()?;
        Ok(Some(state))
    }
}

/// Codec for an optional set of parent identifiers
///
/// Keeps "never written" apart from "written as an empty set".
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalParentsCodec;

impl OptionalParentsCodec {
    /// Create the codec
    pub fn new() -> Self {
        Self
    }

    /// Encode an optional parent set
    pub fn encode(&self, parents: Option<&BTreeSet<SensorId>>) -> Vec<u8> {
        let Some(parents) = parents else {
            return vec![TAG_ABSENT];
        };

        let mut bytes = Vec::new();
        bytes.push(TAG_PRESENT);
        bytes.extend_from_slice(&(parents.len() as u64).to_le_bytes());
        for parent in parents {
            let raw = parent.as_bytes();
            bytes.extend_from_slice(&(raw.len() as u64).to_le_bytes());
            bytes.extend_from_slice(raw);
        }
        bytes
    }

    /// Decode an optional parent set; an empty slice is absent
    pub fn decode(&self, bytes: &[u8]) -> Result<Option<BTreeSet<SensorId>>, DecodeError> {
        if bytes.is_empty() {
            return Ok(None);
        }

        let mut reader = Reader::new(bytes);
        let parents = match reader.u8()? {
            TAG_ABSENT => None,
            TAG_PRESENT => {
                let n = reader.u64()?;
                let mut parents = BTreeSet::new();
                for _ in 0..n {
                    let len = reader.length_prefix()?;
                    let raw = reader.take(len)?;
                    let parent =
                        std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
                    parents.insert(parent.to_string());
                }
                Some(parents)
            }
            tag => return Err(reader.malformed(format!("unknown tag {}", tag))),
        };

        reader.finish()?;
        Ok(parents)
    }
}
