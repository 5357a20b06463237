//! Memory-mapped distance index
//!
//! Read-only, zero-copy access to a persisted .vpi file through the OS page
//! cache. This is the structure the query path opens for every probe.
//!
//! # Safety
//!
//! The entry region is reinterpreted with `bytemuck::try_cast_slice`, which
//! checks alignment. Entries start 24 bytes into a page-aligned mapping, so
//! the 8-byte alignment of [`RawEntry`] always holds for valid files.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::corpus::SeriesId;
use crate::format::{FormatError, IndexHeader, RawEntry, HEADER_SIZE};
use crate::index::{cut_point, IndexEntry};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Alignment error: entry region not aligned to 8 bytes")]
    AlignmentError,
}

/// Memory-mapped view of one vantage point's distance index
pub struct MappedIndex {
    mmap: Mmap,
    header: IndexHeader,
}

impl MappedIndex {
    /// Open a .vpi file for reading
    ///
    /// # Safety
    ///
    /// Memory mapping is inherently unsafe:
    /// - If the file is truncated while mapped, reads may cause SIGBUS
    /// - The file must not be modified while the index is open
    ///
    /// Index files are written once by the builder and swapped in by rename,
    /// never modified in place.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let header = IndexHeader::from_bytes(&mmap)?;

        let expected = header.file_size();
        if mmap.len() < expected {
            return Err(FormatError::Truncated {
                expected,
                actual: mmap.len(),
            }
            .into());
        }

        let index = Self { mmap, header };
        // Fail on open rather than on first probe. Range lookups binary
        // search the entries, so a misordered file is rejected here too.
        index.raw_entries()?;
        index.verify_order()?;
        Ok(index)
    }

    /// Vantage point this index was built for
    pub fn vantage(&self) -> SeriesId {
        self.header.vantage
    }

    pub fn len(&self) -> usize {
        self.header.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.count == 0
    }

    /// Get the total size of the mapped file
    pub fn memory_bytes(&self) -> usize {
        self.mmap.len()
    }

    fn raw_entries(&self) -> Result<&[RawEntry], StoreError> {
        let bytes = &self.mmap[HEADER_SIZE..self.header.file_size()];
        bytemuck::try_cast_slice(bytes).map_err(|_| StoreError::AlignmentError)
    }

    #[inline]
    fn entries(&self) -> &[RawEntry] {
        // Checked in open()
        self.raw_entries().unwrap_or(&[])
    }

    /// Entry at `position` in index order
    pub fn get(&self, position: usize) -> Option<IndexEntry> {
        self.entries().get(position).map(RawEntry::decode)
    }

    /// Every entry with `distance <= threshold`, ascending
    pub fn range_at_most(&self, threshold: f64) -> Vec<IndexEntry> {
        let entries = self.entries();
        let cut = cut_point(entries, threshold, RawEntry::distance);
        entries[..cut].iter().map(RawEntry::decode).collect()
    }

    /// Smallest and largest stored distance
    pub fn distance_bounds(&self) -> Option<(f64, f64)> {
        let entries = self.entries();
        Some((entries.first()?.distance(), entries.last()?.distance()))
    }

    /// Check that entries are in `(distance, id)` order
    pub fn verify_order(&self) -> Result<(), FormatError> {
        let entries = self.entries();
        for (i, pair) in entries.windows(2).enumerate() {
            if pair[1].decode().sort_key_cmp(&pair[0].decode()).is_lt() {
                return Err(FormatError::Unsorted { position: i + 1 });
            }
        }
        Ok(())
    }

    /// Iterate over all entries in index order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = IndexEntry> + '_ {
        self.entries().iter().map(RawEntry::decode)
    }
}
