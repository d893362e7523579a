use crate::{FaultDiskError, Result};

/// Size of one simulated sector in bytes.
pub const SECTOR_SIZE: usize = 512;

const SECTOR_SIZE_U64: u64 = SECTOR_SIZE as u64;

/// Sector index containing the given byte offset.
pub fn sector_of(offset: u64) -> u64 {
    offset / SECTOR_SIZE_U64
}

/// An inclusive run of sectors `[first, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorSpan {
    pub first: u64,
    pub last: u64,
}

impl SectorSpan {
    /// Sectors covered by `len` bytes starting at `offset`, or `None` for an empty range.
    pub fn covering(offset: u64, len: u64) -> Result<Option<Self>> {
        if len == 0 {
            return Ok(None);
        }
        let end = offset
            .checked_add(len - 1)
            .ok_or(FaultDiskError::OffsetOverflow)?;
        Ok(Some(Self {
            first: sector_of(offset),
            last: sector_of(end),
        }))
    }
}

/// A request range after clipping against the end of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClippedRange {
    pub offset: u64,
    pub len: usize,
    /// Bytes dropped from the end of the request.
    pub truncated: usize,
}

impl ClippedRange {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn span(&self) -> Result<Option<SectorSpan>> {
        SectorSpan::covering(self.offset, self.len as u64)
    }
}

/// Clip `len` bytes at `offset` so the range ends at or before `capacity`.
///
/// Offsets at or beyond the end yield an empty range rather than an error.
pub fn clip_range(offset: u64, len: usize, capacity: u64) -> ClippedRange {
    if offset >= capacity {
        return ClippedRange {
            offset,
            len: 0,
            truncated: len,
        };
    }
    let available = capacity - offset;
    let kept = usize::try_from(available).map_or(len, |avail| len.min(avail));
    ClippedRange {
        offset,
        len: kept,
        truncated: len - kept,
    }
}
