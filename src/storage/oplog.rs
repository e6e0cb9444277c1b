//! Fragment op log for durability between snapshots
//!
//! Every bit mutation is appended here before it is applied in memory. On
//! open the log is replayed on top of the last snapshot; after a snapshot
//! the log is truncated.
//!
//! Format per entry:
//! - length: u32 (4 bytes)
//! - data: [u8; length] (bincode-serialized Op)
//! - crc: u32 (4 bytes, CRC32 of length + data)

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Upper bound on a single encoded op
const MAX_ENTRY_LEN: usize = 1024;

/// Sync strategy for op log writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Fsync after every write (safest, slowest)
    EveryWrite,
    /// Fsync in batches (balanced)
    #[default]
    Batched,
    /// No fsync, rely on OS (fastest, risk of loss)
    None,
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every_write" => Ok(SyncMode::EveryWrite),
            "batched" => Ok(SyncMode::Batched),
            "none" => Ok(SyncMode::None),
            other => Err(format!("unknown sync mode: {}", other)),
        }
    }
}

/// A single logged mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Set { row_id: u64, column_id: u64 },
    Clear { row_id: u64, column_id: u64 },
}

/// Append-only log of fragment mutations
pub struct OpLog {
    writer: BufWriter<File>,
    path: PathBuf,
    entry_count: u64,
    bytes_since_sync: usize,
    sync_mode: SyncMode,
    /// Batch sync threshold (bytes)
    sync_threshold: usize,
}

impl OpLog {
    /// Open or create an op log file
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let entry_count = Self::count_entries(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            entry_count,
            bytes_since_sync: 0,
            sync_mode,
            sync_threshold: 64 * 1024,
        })
    }

    fn count_entries(path: &Path) -> StorageResult<u64> {
        if !path.exists() {
            return Ok(0);
        }

        let mut reader = BufReader::new(File::open(path)?);
        let mut count = 0u64;

        loop {
            match Self::read_entry_from(&mut reader) {
                Ok(Some(_)) => count += 1,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Op log corruption at entry {} in {:?}: {}", count, path, e);
                    break;
                }
            }
        }

        Ok(count)
    }

    /// Append a mutation to the log
    pub fn append(&mut self, op: &Op) -> StorageResult<()> {
        self.write_entry(op)?;
        self.maybe_sync()
    }

    /// Append several mutations with one sync decision
    pub fn append_batch(&mut self, ops: &[Op]) -> StorageResult<()> {
        for op in ops {
            self.write_entry(op)?;
        }
        self.maybe_sync()
    }

    fn write_entry(&mut self, op: &Op) -> StorageResult<()> {
        let data = bincode::serialize(op)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&(data.len() as u32).to_le_bytes());
        hasher.update(&data);
        let crc = hasher.finalize();

        self.writer.write_all(&(data.len() as u32).to_le_bytes())?;
        self.writer.write_all(&data)?;
        self.writer.write_all(&crc.to_le_bytes())?;

        self.entry_count += 1;
        self.bytes_since_sync += 8 + data.len();
        Ok(())
    }

    fn maybe_sync(&mut self) -> StorageResult<()> {
        match self.sync_mode {
            SyncMode::EveryWrite => self.sync()?,
            SyncMode::Batched => {
                if self.bytes_since_sync >= self.sync_threshold {
                    self.sync()?;
                } else {
                    self.writer.flush()?;
                }
            }
            SyncMode::None => self.writer.flush()?,
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Read every intact entry, stopping at the first torn or corrupt one
    pub fn replay(&self) -> StorageResult<Vec<Op>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut ops = Vec::new();

        loop {
            match Self::read_entry_from(&mut reader) {
                Ok(Some(op)) => ops.push(op),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        "Op log replay stopped at entry {} in {:?}: {}",
                        ops.len(),
                        self.path,
                        e
                    );
                    break;
                }
            }
        }

        Ok(ops)
    }

    fn read_entry_from<R: Read>(reader: &mut R) -> StorageResult<Option<Op>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_ENTRY_LEN {
            return Err(StorageError::Corruption(format!(
                "Op log entry length too large: {}",
                len
            )));
        }

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;

        let mut crc_buf = [0u8; 4];
        reader.read_exact(&mut crc_buf)?;
        let stored_crc = u32::from_le_bytes(crc_buf);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len_buf);
        hasher.update(&data);
        let computed_crc = hasher.finalize();

        if stored_crc != computed_crc {
            return Err(StorageError::Corruption(format!(
                "CRC mismatch: stored={}, computed={}",
                stored_crc, computed_crc
            )));
        }

        let op: Op = bincode::deserialize(&data)?;
        Ok(Some(op))
    }

    /// Truncate the log (after a successful snapshot)
    pub fn truncate(&mut self) -> StorageResult<()> {
        self.sync()?;

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        drop(file);

        self.writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        );

        self.entry_count = 0;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Number of entries since the last truncate
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};
    use tempfile::tempdir;

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.ops");

        {
            let mut log = OpLog::open(&path, SyncMode::EveryWrite).unwrap();
            log.append(&Op::Set { row_id: 1, column_id: 2 }).unwrap();
            log.append(&Op::Clear { row_id: 1, column_id: 2 }).unwrap();
            assert_eq!(log.entry_count(), 2);
        }

        let log = OpLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(log.entry_count(), 2);
        assert_eq!(
            log.replay().unwrap(),
            vec![
                Op::Set { row_id: 1, column_id: 2 },
                Op::Clear { row_id: 1, column_id: 2 }
            ]
        );
    }

    #[test]
    fn test_truncate() {
        let dir = tempdir().unwrap();
        let mut log = OpLog::open(dir.path().join("0.ops"), SyncMode::Batched).unwrap();

        let ops: Vec<Op> = (0..10)
            .map(|i| Op::Set { row_id: 0, column_id: i })
            .collect();
        log.append_batch(&ops).unwrap();
        assert_eq!(log.entry_count(), 10);

        log.truncate().unwrap();
        assert_eq!(log.entry_count(), 0);
        assert!(log.replay().unwrap().is_empty());

        // Still appendable after truncation
        log.append(&Op::Set { row_id: 3, column_id: 3 }).unwrap();
        assert_eq!(log.replay().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.ops");

        {
            let mut log = OpLog::open(&path, SyncMode::EveryWrite).unwrap();
            log.append(&Op::Set { row_id: 1, column_id: 1 }).unwrap();
            log.append(&Op::Set { row_id: 2, column_id: 2 }).unwrap();
        }

        // Flip bytes inside the second entry
        {
            let len = std::fs::metadata(&path).unwrap().len();
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(len - 6)).unwrap();
            file.write_all(&[0xFF, 0xFF]).unwrap();
        }

        let log = OpLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(log.replay().unwrap(), vec![Op::Set { row_id: 1, column_id: 1 }]);
    }

    #[test]
    fn test_torn_write_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.ops");

        {
            let mut log = OpLog::open(&path, SyncMode::EveryWrite).unwrap();
            log.append(&Op::Set { row_id: 5, column_id: 9 }).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[12, 0]).unwrap();
        }

        let log = OpLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(log.replay().unwrap().len(), 1);
    }

    #[test]
    fn test_sync_mode_parse() {
        assert_eq!("batched".parse::<SyncMode>().unwrap(), SyncMode::Batched);
        assert_eq!("every_write".parse::<SyncMode>().unwrap(), SyncMode::EveryWrite);
        assert!("sometimes".parse::<SyncMode>().is_err());
    }
}
