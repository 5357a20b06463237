//! .vpi / .vps Binary File Formats
//!
//! # Distance index (`.vpi`)
//!
//! One file per vantage point, entries sorted by `(distance, id)`.
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "VPIDX001"
//! 0x08     8       u64 LE      Vantage point id
//! 0x10     8       u64 LE      N: Number of entries
//! 0x18     N*16    entries     f64 LE distance, u64 LE id
//! ```
//!
//! # Vantage point set (`.vps`)
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "VPSET001"
//! 0x08     8       u64 LE      N: Number of vantage points
//! 0x10     N*8     [u64]       Vantage point ids
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut writer = IndexWriter::new("vp_7.vpi", SeriesId(7))?;
//! writer.write_entry(IndexEntry::new(0.0, SeriesId(7)))?;
//! writer.write_entry(IndexEntry::new(1.5, SeriesId(3)))?;
//! writer.finish()?;
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::corpus::SeriesId;
use crate::index::IndexEntry;

/// Magic bytes identifying a .vpi file: "VPIDX001"
pub const INDEX_MAGIC: [u8; 8] = *b"VPIDX001";

/// Magic bytes identifying a .vps file: "VPSET001"
pub const SET_MAGIC: [u8; 8] = *b"VPSET001";

/// Index header size in bytes: 8 (magic) + 8 (vantage) + 8 (count) = 24
pub const HEADER_SIZE: usize = 24;

/// Vantage set header size in bytes: 8 (magic) + 8 (count) = 16
pub const SET_HEADER_SIZE: usize = 16;

/// On-disk size of one index entry
pub const ENTRY_SIZE: usize = std::mem::size_of::<RawEntry>();

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid magic bytes: expected {expected}")]
    InvalidMagic { expected: &'static str },

    #[error("File truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Entries out of order at position {position}")]
    Unsorted { position: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Index entry exactly as laid out on disk.
///
/// Both fields hold little-endian bit patterns; decode with [`RawEntry::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RawEntry {
    distance: u64,
    id: u64,
}

impl RawEntry {
    pub fn encode(entry: IndexEntry) -> Self {
        Self {
            distance: entry.distance.to_bits().to_le(),
            id: entry.id.0.to_le(),
        }
    }

    #[inline(always)]
    pub fn distance(&self) -> f64 {
        f64::from_bits(u64::from_le(self.distance))
    }

    #[inline(always)]
    pub fn id(&self) -> SeriesId {
        SeriesId(u64::from_le(self.id))
    }

    #[inline]
    pub fn decode(&self) -> IndexEntry {
        IndexEntry {
            distance: self.distance(),
            id: self.id(),
        }
    }

    fn to_bytes(self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.distance.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.id.to_ne_bytes());
        buf
    }
}

/// Parsed .vpi file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub vantage: SeriesId,
    pub count: u64,
}

impl IndexHeader {
    /// Parse header from raw bytes (first 24 bytes of file)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        if bytes[0..8] != INDEX_MAGIC {
            return Err(FormatError::InvalidMagic {
                expected: "VPIDX001",
            });
        }

        Ok(Self {
            vantage: SeriesId(read_u64(&bytes[8..16])),
            count: read_u64(&bytes[16..24]),
        })
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&INDEX_MAGIC);
        buf[8..16].copy_from_slice(&self.vantage.0.to_le_bytes());
        buf[16..24].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Byte offset of the entry at `position`
    #[inline(always)]
    pub fn offset(&self, position: usize) -> usize {
        HEADER_SIZE + position * ENTRY_SIZE
    }

    /// Total file size implied by the header
    pub fn file_size(&self) -> usize {
        (self.count as usize)
            .saturating_mul(ENTRY_SIZE)
            .saturating_add(HEADER_SIZE)
    }
}

#[inline(always)]
fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Streaming writer for .vpi files.
///
/// Entries must arrive in `(distance, id)` order; the writer refuses anything
/// else so a persisted index is always servable.
pub struct IndexWriter {
    writer: BufWriter<File>,
    vantage: SeriesId,
    count: u64,
    last: Option<IndexEntry>,
}

impl IndexWriter {
    /// Create a new .vpi file writer
    pub fn new<P: AsRef<Path>>(path: P, vantage: SeriesId) -> Result<Self, FormatError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // Placeholder header, count is patched in finish()
        let header = IndexHeader { vantage, count: 0 };
        writer.write_all(&header.to_bytes())?;

        Ok(Self {
            writer,
            vantage,
            count: 0,
            last: None,
        })
    }

    /// Append one entry
    pub fn write_entry(&mut self, entry: IndexEntry) -> Result<(), FormatError> {
        if let Some(last) = self.last {
            if entry.sort_key_cmp(&last).is_lt() {
                return Err(FormatError::Unsorted {
                    position: self.count as usize,
                });
            }
        }

        self.writer.write_all(&RawEntry::encode(entry).to_bytes())?;
        self.last = Some(entry);
        self.count += 1;
        Ok(())
    }

    pub fn vantage(&self) -> SeriesId {
        self.vantage
    }

    /// Finalize the file, updating the header with the actual count
    pub fn finish(mut self) -> Result<u64, FormatError> {
        use std::io::Seek;

        self.writer.flush()?;

        let file = self.writer.get_mut();
        file.seek(io::SeekFrom::Start(16))?;
        file.write_all(&self.count.to_le_bytes())?;
        file.sync_all()?;

        Ok(self.count)
    }
}

/// Encode a vantage point set as .vps bytes
pub fn encode_vantage_set(ids: &[SeriesId]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SET_HEADER_SIZE + ids.len() * 8);
    buf.extend_from_slice(&SET_MAGIC);
    buf.extend_from_slice(&(ids.len() as u64).to_le_bytes());
    for id in ids {
        buf.extend_from_slice(&id.0.to_le_bytes());
    }
    buf
}

/// Decode .vps bytes into vantage point ids
pub fn decode_vantage_set(bytes: &[u8]) -> Result<Vec<SeriesId>, FormatError> {
    if bytes.len() < SET_HEADER_SIZE {
        return Err(FormatError::Truncated {
            expected: SET_HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    if bytes[0..8] != SET_MAGIC {
        return Err(FormatError::InvalidMagic {
            expected: "VPSET001",
        });
    }

    let count = read_u64(&bytes[8..16]) as usize;
    let expected = count
        .checked_mul(8)
        .and_then(|body| body.checked_add(SET_HEADER_SIZE))
        .unwrap_or(usize::MAX);
    if bytes.len() < expected {
        return Err(FormatError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }

    Ok(bytes[SET_HEADER_SIZE..expected]
        .chunks_exact(8)
        .map(|chunk| SeriesId(read_u64(chunk)))
        .collect())
}

/// Read a whole .vps file
pub fn read_vantage_set<P: AsRef<Path>>(path: P) -> Result<Vec<SeriesId>, FormatError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    decode_vantage_set(&bytes)
}

/// Write a whole .vps file and sync it
pub fn write_vantage_set<P: AsRef<Path>>(path: P, ids: &[SeriesId]) -> Result<(), FormatError> {
    let mut file = File::create(path)?;
    file.write_all(&encode_vantage_set(ids))?;
    file.sync_all()?;
    Ok(())
}
