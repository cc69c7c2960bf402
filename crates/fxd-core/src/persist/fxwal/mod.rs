// SPDX-License-Identifier: Apache-2.0
//! The WAL-backed `.fxwal` persistence format (`spec.md` §4.7.2, §6).
//!
//! Record framing is grounded on the teacher's `provenance_store`, which
//! likewise appends framed, checksummed records to a single file and
//! replays them in sequence to reconstruct state, discarding a truncated
//! tail rather than failing the whole load (`spec.md` §8 "Crash in the
//! middle of a WAL `append`...").

pub mod types;
pub mod uarr;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crc32fast::Hasher;

use crate::error::{FxdError, Result};
use crate::ids::NodeId;

pub use types::{RecordKind, UArrType};

/// A single decoded `.fxwal` record.
#[derive(Clone, Debug)]
pub struct WalRecord {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp in nanoseconds, assigned at append time.
    pub timestamp_ns: u64,
    /// The record's kind.
    pub kind: RecordKind,
    /// The node this record concerns.
    pub node_id: NodeId,
    /// The `UArr`-encoded payload.
    pub payload: Vec<u8>,
}

/// An open `.fxwal` file positioned for appending.
pub struct WalWriter {
    file: File,
    next_seq: u64,
}

impl WalWriter {
    /// Creates a new `.fxwal` file at `path`, writing the file header.
    /// Fails if `path` already exists.
    ///
    /// # Errors
    /// Returns [`FxdError::IoFailure`] on any underlying I/O error.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(&types::FILE_MAGIC)?;
        file.write_all(&types::FORMAT_VERSION.to_le_bytes())?;
        file.flush()?;
        Ok(Self { file, next_seq: 0 })
    }

    /// Opens an existing `.fxwal` file for appending, positioning the
    /// sequence counter one past the highest sequence number already in the
    /// file.
    ///
    /// # Errors
    /// Returns [`FxdError::SchemaMismatch`] if the file's version is newer
    /// than [`types::FORMAT_VERSION`], or [`FxdError::CorruptRecord`] if the
    /// header is malformed.
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let existing = read_all_records(path)?;
        let next_seq = existing.last().map_or(0, |r| r.seq + 1);
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self { file, next_seq })
    }

    /// Appends a new record with a caller-supplied `node_id`, `kind`, and
    /// already-`UArr`-encoded `payload`. Returns the sequence number
    /// assigned to the record.
    ///
    /// Atomic at record granularity: the CRC is computed over the whole
    /// record body before any bytes are written, so a record is either
    /// fully present and valid or entirely absent/truncated on disk.
    ///
    /// # Errors
    /// Returns [`FxdError::IoFailure`] on any underlying I/O error.
    pub fn append(&mut self, kind: RecordKind, node_id: NodeId, payload: &[u8], timestamp_ns: u64) -> Result<u64> {
        let seq = self.next_seq;
        let mut body = Vec::with_capacity(32 + payload.len());
        body.extend_from_slice(&seq.to_le_bytes());
        body.extend_from_slice(&timestamp_ns.to_le_bytes());
        body.push(kind as u8);
        let node_id_bytes = node_id.as_u64().to_le_bytes();
        body.extend_from_slice(&(node_id_bytes.len() as u64).to_le_bytes());
        body.extend_from_slice(&node_id_bytes);
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(payload);

        let mut hasher = Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        self.file.write_all(&body)?;
        self.file.write_all(&crc.to_le_bytes())?;
        self.file.flush()?;

        self.next_seq = seq + 1;
        Ok(seq)
    }

    /// Appends a compaction checkpoint record whose payload is the full,
    /// `UArr`-encoded graph snapshot (`spec.md` §4.7.2 "Periodic `checkpoint`
    /// records compact the stream"). Callers are responsible for truncating
    /// or rotating prior records; this crate keeps the simpler policy of
    /// appending the checkpoint and letting [`read_all_records`] treat it as
    /// just another record during replay (a full compaction that rewrites
    /// the file is a higher-layer operation left to the embedding
    /// application).
    ///
    /// # Errors
    /// Returns [`FxdError::IoFailure`] on any underlying I/O error.
    pub fn checkpoint(&mut self, payload: &[u8], timestamp_ns: u64) -> Result<u64> {
        self.append(RecordKind::Checkpoint, NodeId::ROOT, payload, timestamp_ns)
    }
}

/// Reads every valid record from `path` in sequence order.
///
/// A record whose CRC fails to verify (including a truncated tail left by a
/// crash mid-`append`) stops replay at that point; the records already read
/// are returned without error (`spec.md` §8 "Boundary behaviours").
///
/// # Errors
/// Returns [`FxdError::CorruptRecord`] if the file header is malformed, and
/// [`FxdError::SchemaMismatch`] if the file's version is newer than this
/// crate's [`types::FORMAT_VERSION`].
pub fn read_all_records(path: impl AsRef<Path>) -> Result<Vec<WalRecord>> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 7];
    if file.read_exact(&mut header).is_err() {
        return Err(FxdError::CorruptRecord("fxwal file shorter than header".to_string()));
    }
    if header[..5] != types::FILE_MAGIC {
        return Err(FxdError::CorruptRecord("bad fxwal file magic".to_string()));
    }
    let version = u16::from_le_bytes([header[5], header[6]]);
    if version > types::FORMAT_VERSION {
        return Err(FxdError::SchemaMismatch {
            found: u32::from(version),
            supported: u32::from(types::FORMAT_VERSION),
        });
    }

    let mut records = Vec::new();
    loop {
        match read_one_record(&mut file) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => break,
            Err(_) => break,
        }
    }
    Ok(records)
}

#[allow(clippy::expect_used)] // every slice passed to try_into() is cut to the exact target width above
fn read_one_record(file: &mut File) -> Result<Option<WalRecord>> {
    let start = file.stream_position()?;
    let mut fixed = [0u8; 8 + 8 + 1 + 8];
    if file.read_exact(&mut fixed).is_err() {
        return Ok(None);
    }
    let seq = u64::from_le_bytes(fixed[0..8].try_into().expect("fixed size"));
    let timestamp_ns = u64::from_le_bytes(fixed[8..16].try_into().expect("fixed size"));
    let kind_byte = fixed[16];
    let node_id_len = u64::from_le_bytes(fixed[17..25].try_into().expect("fixed size")) as usize;

    let mut node_id_bytes = vec![0u8; node_id_len];
    if file.read_exact(&mut node_id_bytes).is_err() {
        return Ok(None);
    }
    let mut payload_len_bytes = [0u8; 4];
    if file.read_exact(&mut payload_len_bytes).is_err() {
        return Ok(None);
    }
    let payload_len = u32::from_le_bytes(payload_len_bytes) as usize;
    let mut payload = vec![0u8; payload_len];
    if file.read_exact(&mut payload).is_err() {
        return Ok(None);
    }
    let mut crc_bytes = [0u8; 4];
    if file.read_exact(&mut crc_bytes).is_err() {
        return Ok(None);
    }
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut body = Vec::with_capacity(fixed.len() + node_id_bytes.len() + 4 + payload.len());
    body.extend_from_slice(&fixed);
    body.extend_from_slice(&node_id_bytes);
    body.extend_from_slice(&payload_len_bytes);
    body.extend_from_slice(&payload);
    let mut hasher = Hasher::new();
    hasher.update(&body);
    if hasher.finalize() != stored_crc {
        tracing::warn!(at = start, "fxwal record CRC mismatch; truncating replay here");
        return Ok(None);
    }

    let Some(kind) = RecordKind::from_u8(kind_byte) else {
        tracing::warn!(at = start, kind = kind_byte, "fxwal record has unknown kind; truncating replay here");
        return Ok(None);
    };

    let node_id = if node_id_bytes.len() == 8 {
        NodeId::from_raw(u64::from_le_bytes(node_id_bytes.try_into().expect("checked length")))
    } else {
        tracing::warn!(at = start, "fxwal record has unexpected node_id length; truncating replay here");
        return Ok(None);
    };

    Ok(Some(WalRecord {
        seq,
        timestamp_ns,
        kind,
        node_id,
        payload,
    }))
}
