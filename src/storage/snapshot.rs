//! Snapshot file format for fragment data
//!
//! A snapshot holds every non-empty row of one fragment.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (32 bytes)                       │
//! │   magic: [u8; 4] = "BFRG"               │
//! │   version: u16                          │
//! │   compression: u8                       │
//! │   reserved: u8                          │
//! │   row_count: u64                        │
//! │   body_len: u64                         │
//! │   reserved: [u8; 4]                     │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ BODY (body_len bytes, maybe LZ4)        │
//! │   For each row:                         │
//! │     row_id: u64                         │
//! │     bitmap_len: u32                     │
//! │     bitmap: [u8; bitmap_len] (roaring)  │
//! ├─────────────────────────────────────────┤
//! │ body_checksum: u32                      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Snapshots are written to a temporary file and renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use crate::storage::bitmap::BitContainer;
use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for snapshot file identification
const SNAPSHOT_MAGIC: [u8; 4] = *b"BFRG";

/// Current snapshot format version
const SNAPSHOT_VERSION: u16 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 32;

/// Suffix of the temporary file used while writing
pub const SNAPSHOT_TEMP_SUFFIX: &str = "snapshotting";

/// Compression applied to snapshot bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    #[default]
    Lz4 = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(StorageError::Corruption(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

/// Snapshot file header
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHeader {
    pub version: u16,
    pub compression: CompressionType,
    pub row_count: u64,
    pub body_len: u64,
}

impl SnapshotHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&SNAPSHOT_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = self.compression as u8;
        buf[8..16].copy_from_slice(&self.row_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.body_len.to_le_bytes());

        let checksum = crc32fast::hash(&buf[0..28]);
        buf[28..32].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StorageResult<Self> {
        let stored_checksum = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);
        let computed_checksum = crc32fast::hash(&buf[0..28]);

        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Snapshot header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        if buf[0..4] != SNAPSHOT_MAGIC {
            return Err(StorageError::Corruption(format!(
                "Invalid snapshot magic: {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > SNAPSHOT_VERSION {
            return Err(StorageError::Corruption(format!(
                "Unsupported snapshot version: {}",
                version
            )));
        }

        let compression = CompressionType::try_from(buf[6])?;
        let row_count = u64::from_le_bytes(read_array(&buf[8..16]));
        let body_len = u64::from_le_bytes(read_array(&buf[16..24]));

        Ok(Self {
            version,
            compression,
            row_count,
            body_len,
        })
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Path of the temporary file used while writing a snapshot
pub fn temp_path(path: &Path) -> PathBuf {
    path.with_extension(SNAPSHOT_TEMP_SUFFIX)
}

/// Write all non-empty rows to `path`, replacing any previous snapshot
pub fn write_snapshot(
    path: &Path,
    rows: &BTreeMap<u64, BitContainer>,
    compression: CompressionType,
) -> StorageResult<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut body = Vec::new();
    let mut row_count = 0u64;
    let mut bitmap = Vec::new();

    for (row_id, row) in rows.iter().filter(|(_, r)| !r.is_empty()) {
        bitmap.clear();
        row.write_to(&mut bitmap)?;

        body.extend_from_slice(&row_id.to_le_bytes());
        body.extend_from_slice(&(bitmap.len() as u32).to_le_bytes());
        body.extend_from_slice(&bitmap);
        row_count += 1;
    }

    let body = match compression {
        CompressionType::None => body,
        CompressionType::Lz4 => lz4_flex::compress_prepend_size(&body),
    };

    let header = SnapshotHeader {
        version: SNAPSHOT_VERSION,
        compression,
        row_count,
        body_len: body.len() as u64,
    };

    let tmp = temp_path(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header.to_bytes())?;
        writer.write_all(&body)?;
        writer.write_all(&crc32fast::hash(&body).to_le_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    std::fs::rename(&tmp, path)?;

    Ok(row_count)
}

/// Read a snapshot; a missing file is an empty fragment
pub fn read_snapshot(path: &Path) -> StorageResult<BTreeMap<u64, BitContainer>> {
    let mut rows = BTreeMap::new();

    if !path.exists() {
        return Ok(rows);
    }

    let mut reader = BufReader::new(File::open(path)?);

    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf)?;
    let header = SnapshotHeader::from_bytes(&header_buf)?;

    let mut body = vec![0u8; header.body_len as usize];
    reader.read_exact(&mut body)?;

    let mut checksum_buf = [0u8; 4];
    reader.read_exact(&mut checksum_buf)?;
    if u32::from_le_bytes(checksum_buf) != crc32fast::hash(&body) {
        return Err(StorageError::Corruption(format!(
            "Snapshot body checksum mismatch in {:?}",
            path
        )));
    }

    let body = match header.compression {
        CompressionType::None => body,
        CompressionType::Lz4 => lz4_flex::decompress_size_prepended(&body)?,
    };

    let mut offset = 0usize;
    for _ in 0..header.row_count {
        if offset + 12 > body.len() {
            return Err(StorageError::Corruption("Snapshot body truncated".into()));
        }
        let row_id = u64::from_le_bytes(read_array(&body[offset..offset + 8]));
        let len = u32::from_le_bytes(read_array(&body[offset + 8..offset + 12])) as usize;
        offset += 12;

        if offset + len > body.len() {
            return Err(StorageError::Corruption(format!(
                "Row {} bitmap extends past snapshot body",
                row_id
            )));
        }
        let row = BitContainer::read_from(&body[offset..offset + len])?;
        offset += len;

        rows.insert(row_id, row);
    }

    Ok(rows)
}
