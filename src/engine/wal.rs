use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::engine::doc::IndexedDocument;

/// Write-ahead log for the active segment buffer. Records are truncated
/// once their documents have been flushed into durable segments.
pub struct Wal {
    file: File,
    path: PathBuf,
    position: u64,
    unsynced_bytes: u64,
    sync_mode: SyncMode,
}

#[derive(Debug, Clone, Copy)]
pub enum SyncMode {
    /// fsync after every record
    Immediate,
    /// fsync once this many bytes have accumulated
    Batch(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub seq_no: i64,
    pub op: WalOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalOp {
    Index { doc: IndexedDocument, version: i64 },
    Delete { key: String, version: i64 },
}

impl Wal {
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        let file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        let position = file.metadata()?.len();
        Ok(Wal {
            file,
            path: path.to_path_buf(),
            position,
            unsynced_bytes: 0,
            sync_mode,
        })
    }

    /// Append one record: `[len u32][crc32 u32][json payload]`. Records
    /// carry raw document sources, so the payload stays JSON.
    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        let payload = serde_json::to_vec(record)?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();

        self.file.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.file.write_all(&checksum.to_le_bytes())?;
        self.file.write_all(&payload)?;

        let written = 8 + payload.len() as u64;
        self.position += written;
        self.unsynced_bytes += written;

        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batch(limit) if self.unsynced_bytes >= limit => self.sync()?,
            _ => {}
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.unsynced_bytes = 0;
        Ok(())
    }

    /// Drop all records after a flush made them durable elsewhere.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;
        self.position = 0;
        self.unsynced_bytes = 0;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read back every intact record. Stops at the first torn or corrupt
    /// record, which can only be the unsynced tail.
    pub fn replay(path: &Path) -> Result<Vec<WalRecord>> {
        let mut records = Vec::new();
        let Ok(mut file) = File::open(path) else {
            return Ok(records);
        };
        let len = file.metadata()?.len();
        let mut offset = 0u64;

        loop {
            if offset + 8 > len {
                break;
            }
            let mut header = [0u8; 8];
            file.read_exact(&mut header)?;
            let payload_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if offset + 8 + payload_len > len {
                tracing::warn!(path = %path.display(), "truncated WAL tail, stopping replay");
                break;
            }
            let mut payload = vec![0u8; payload_len as usize];
            file.read_exact(&mut payload)?;

            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&payload);
            if hasher.finalize() != checksum {
                tracing::warn!(path = %path.display(), "corrupt WAL record, stopping replay");
                break;
            }
            match serde_json::from_slice(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
            offset += 8 + payload_len;
        }
        Ok(records)
    }
}
