//! Per-namespace write-ahead log
//!
//! Every acknowledged mutation is appended here before it is applied, so a
//! namespace can be rebuilt by replaying its log after a restart. The log
//! also defines the namespace's write order: the sequence number assigned
//! at append time is the total order of writes.
//!
//! File format:
//! - Magic bytes: "QWAL" (4 bytes)
//! - Version: u32 (4 bytes)
//! - Entries: [Entry]*
//!
//! Each entry:
//! - Length: u32 (4 bytes) - length of serialized entry
//! - Data: serialized WalEntry (msgpack)
//! - CRC32: u32 (4 bytes) - checksum of length + data

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::query::Filter;
use crate::types::{Metadata, Record, RecordId, SparseVector, Vector};
use crate::{Error, Result};

const WAL_MAGIC: &[u8; 4] = b"QWAL";
const WAL_VERSION: u32 = 1;
const WAL_FILE: &str = "wal.log";

/// Entries larger than this are treated as corruption during recovery.
const MAX_ENTRY_BYTES: u32 = 100 * 1024 * 1024;

/// Which records a delete applies to. The variants are mutually exclusive.
///
/// `Ids` and `All` deletes are idempotent. A `Filter` delete logs the
/// predicate, not the matched IDs, and is re-evaluated on replay or
/// retry, so it is not idempotent when the predicate depends on metadata
/// that other writes may change in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeleteSelector {
    Ids(Vec<RecordId>),
    Filter(Filter),
    All,
}

/// Logged mutation types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalOperation {
    /// Insert or fully replace records
    Upsert { records: Vec<Record> },
    /// Partial update of one record
    Update {
        id: RecordId,
        values: Option<Vector>,
        sparse_values: Option<SparseVector>,
        set_metadata: Option<Metadata>,
    },
    /// Remove records
    Delete { selector: DeleteSelector },
}

/// WAL entry with sequencing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing write sequence within the namespace
    pub sequence: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub operation: WalOperation,
}

/// Append-only log for one namespace
pub struct WalManager {
    path: PathBuf,
    file: File,
    next_sequence: u64,
}

impl WalManager {
    /// Open (or create) the log under `dir`, recovering the next sequence
    /// number from any existing entries.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(WAL_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let next_sequence = if file.metadata().await?.len() == 0 {
            write_header(&mut file).await?;
            0
        } else {
            let entries = read_entries(&path).await?;
            entries.last().map(|e| e.sequence + 1).unwrap_or(0)
        };

        Ok(Self {
            path,
            file,
            next_sequence,
        })
    }

    /// Sequence number the next append will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Append an operation and flush it to disk. Returns the assigned
    /// sequence number; the caller acknowledges the write only after this
    /// returns.
    pub async fn append(&mut self, operation: &WalOperation) -> Result<u64> {
        let entry = WalEntry {
            sequence: self.next_sequence,
            timestamp: chrono::Utc::now(),
            operation: operation.clone(),
        };

        // Named-field encoding: the filter tree and untagged metadata
        // values need a self-describing map layout to deserialize.
        let data = rmp_serde::to_vec_named(&entry)
            .map_err(|e| Error::internal(format!("failed to serialize WAL entry: {}", e)))?;

        let mut frame = BytesMut::with_capacity(4 + data.len() + 4);
        frame.put_u32(data.len() as u32);
        frame.put_slice(&data);
        let crc = crc32fast::hash(&frame);
        frame.put_u32(crc);

        self.file.write_all(&frame).await?;
        self.file.flush().await?;

        let seq = self.next_sequence;
        self.next_sequence += 1;
        Ok(seq)
    }

    /// Read every recoverable entry.
    pub async fn read_all(&self) -> Result<Vec<WalEntry>> {
        read_entries(&self.path).await
    }

    /// Entries to re-apply during startup, in write order.
    pub async fn replay(&self) -> Result<Vec<WalEntry>> {
        self.read_all().await
    }

    /// Drop all entries, keeping the sequence counter.
    ///
    /// TODO: checkpoint the record store and truncate once the log
    /// exceeds a size threshold; today the log only grows.
    pub async fn truncate(&mut self) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await?;
        write_header(&mut file).await?;

        // Reopen in append mode for subsequent writes
        self.file = OpenOptions::new().append(true).open(&self.path).await?;
        Ok(())
    }
}

async fn write_header(file: &mut File) -> Result<()> {
    file.write_all(WAL_MAGIC).await?;
    file.write_u32(WAL_VERSION).await?;
    file.flush().await?;
    Ok(())
}

/// Read entries, tolerating a torn tail: a truncated or corrupted frame
/// ends recovery at the last intact entry instead of failing the load.
async fn read_entries(path: &Path) -> Result<Vec<WalEntry>> {
    let mut file = File::open(path).await?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).await?;
    if &magic != WAL_MAGIC {
        return Err(Error::internal("invalid WAL file: bad magic bytes"));
    }

    let version = file.read_u32().await?;
    if version != WAL_VERSION {
        return Err(Error::internal(format!(
            "unsupported WAL version: {}",
            version
        )));
    }

    let mut entries = Vec::new();
    loop {
        let length = match file.read_u32().await {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::warn!(error = %e, "WAL entry header unreadable; stopping recovery");
                break;
            }
        };

        if length > MAX_ENTRY_BYTES {
            tracing::warn!(length, "WAL entry length implausible; stopping recovery");
            break;
        }

        let mut data = vec![0u8; length as usize];
        if file.read_exact(&mut data).await.is_err() {
            tracing::warn!("WAL entry truncated; stopping recovery");
            break;
        }

        let stored_crc = match file.read_u32().await {
            Ok(crc) => crc,
            Err(_) => {
                tracing::warn!("WAL entry missing checksum; stopping recovery");
                break;
            }
        };

        let mut checked = BytesMut::with_capacity(4 + data.len());
        checked.put_u32(length);
        checked.put_slice(&data);
        if crc32fast::hash(&checked) != stored_crc {
            tracing::warn!("WAL entry checksum mismatch; stopping recovery");
            break;
        }

        match rmp_serde::from_slice::<WalEntry>(&data) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(error = %e, "WAL entry failed to deserialize; stopping recovery");
                break;
            }
        }
    }

    Ok(entries)
}
