use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::registry::BadSectorRegistry;
use crate::reserve::{NoReserve, ReservePool};
use crate::sector::{clip_range, ClippedRange, SectorSpan};
use crate::sector_list::SectorList;
use crate::{FaultDiskError, Result};

/// Diagnostic snapshot of a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultDiskStatus {
    pub capacity_bytes: u64,
    /// Currently bad sectors in compressed list form (`"1,3-4,9"`).
    pub bad_sectors: String,
    pub bad_sector_count: u64,
    pub initial_bad_sectors: u64,
    pub repaired_sectors: u64,
    pub reserve_remaining: u64,
    pub reserve_initial: u64,
}

struct DiskState<B> {
    registry: BadSectorRegistry,
    reserve: ReservePool,
    /// `None` once the session has been shut down.
    backend: Option<B>,
}

impl<B: StorageBackend> DiskState<B> {
    fn backend(&mut self) -> Result<&mut B> {
        self.backend.as_mut().ok_or(FaultDiskError::Closed)
    }
}

/// A disk image that fails on configured bad sectors.
///
/// Reads touching a bad sector fail as a whole. Writes touching a bad sector reallocate it from
/// the reserve pool if possible; once the pool is empty the write fails, but sectors repaired
/// earlier in the same write stay repaired.
///
/// Every request is decided and completed under one lock, so the engine can be shared between
/// threads behind an [`std::sync::Arc`].
pub struct FaultDisk<B: StorageBackend> {
    capacity: u64,
    state: Mutex<DiskState<B>>,
}

impl<B: StorageBackend> FaultDisk<B> {
    /// Wrap `backend`, whose current length becomes the fixed size of the disk.
    pub fn new(mut backend: B, bad_sectors: SectorList, reserve_sectors: u64) -> Result<Self> {
        let capacity = backend.len()?;
        let registry = BadSectorRegistry::new(bad_sectors);
        info!(
            capacity_bytes = capacity,
            bad_sectors = registry.len(),
            reserve_sectors,
            "fault disk session started"
        );
        Ok(Self {
            capacity,
            state: Mutex::new(DiskState {
                registry,
                reserve: ReservePool::new(reserve_sectors),
                backend: Some(backend),
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, DiskState<B>>> {
        self.state.lock().map_err(|_| FaultDiskError::Poisoned)
    }

    /// Size of the disk in bytes, fixed for the session.
    pub fn size(&self) -> u64 {
        self.capacity
    }

    fn clip(&self, op: &'static str, offset: u64, len: usize) -> ClippedRange {
        let clipped = clip_range(offset, len, self.capacity);
        if clipped.is_empty() && len > 0 {
            debug!(op, offset, len, capacity = self.capacity, "request starts past end of disk");
        } else if clipped.truncated > 0 {
            debug!(
                op,
                offset,
                len,
                clipped_len = clipped.len,
                "request runs past end of disk, truncating"
            );
        }
        clipped
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// The result is shorter than `len` only when the request runs past the end of the disk.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let clipped = self.clip("read", offset, len);
        let mut buf = vec![0u8; clipped.len];
        self.read_clipped(clipped, &mut buf)?;
        Ok(buf)
    }

    /// Read into `buf`, returning the number of bytes filled.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let clipped = self.clip("read", offset, buf.len());
        self.read_clipped(clipped, &mut buf[..clipped.len])?;
        Ok(clipped.len)
    }

    /// `buf` must be exactly `clipped.len` bytes.
    fn read_clipped(&self, clipped: ClippedRange, buf: &mut [u8]) -> Result<()> {
        let Some(span) = clipped.span()? else {
            return Ok(());
        };

        let mut state = self.lock()?;
        if state.backend.is_none() {
            return Err(FaultDiskError::Closed);
        }
        if let Some(sector) = state.registry.first_bad_in(span) {
            debug!(offset = clipped.offset, len = clipped.len, sector, "read hit bad sector");
            return Err(FaultDiskError::BadSector { sector });
        }

        state.backend()?.read_at(clipped.offset, buf)
    }

    /// Write `data` at `offset`, returning the number of bytes written.
    ///
    /// Bad sectors are repaired in ascending order while reserve sectors last. A write that
    /// runs out of reserve fails without touching the store, but keeps the repairs it made.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<usize> {
        let clipped = self.clip("write", offset, data.len());
        let Some(span) = clipped.span()? else {
            return Ok(0);
        };

        let mut state = self.lock()?;
        if state.backend.is_none() {
            return Err(FaultDiskError::Closed);
        }

        let mut cursor = span.first;
        while let Some(sector) = state.registry.first_bad_in(SectorSpan {
            first: cursor,
            last: span.last,
        }) {
            match state.reserve.consume() {
                Ok(()) => {
                    let removed = state.registry.remove(sector);
                    debug_assert!(removed, "sector {sector} vanished from registry mid-scan");
                    info!(
                        sector,
                        reserve_remaining = state.reserve.available(),
                        "reallocated bad sector"
                    );
                }
                Err(NoReserve) => {
                    warn!(
                        sector,
                        offset,
                        len = clipped.len,
                        "write hit bad sector with no reserve left"
                    );
                    return Err(FaultDiskError::NoReserve { sector });
                }
            }
            if sector == span.last {
                break;
            }
            cursor = sector + 1;
        }

        state
            .backend()?
            .write_at(clipped.offset, &data[..clipped.len])?;
        Ok(clipped.len)
    }

    /// Force previous writes to stable storage.
    pub fn flush(&self) -> Result<()> {
        self.lock()?.backend()?.flush()
    }

    pub fn is_bad(&self, sector: u64) -> Result<bool> {
        Ok(self.lock()?.registry.contains(sector))
    }

    /// Currently bad sectors in ascending order.
    pub fn bad_sectors(&self) -> Result<Vec<u64>> {
        Ok(self.lock()?.registry.snapshot())
    }

    pub fn reserve_available(&self) -> Result<u64> {
        Ok(self.lock()?.reserve.available())
    }

    pub fn status(&self) -> Result<FaultDiskStatus> {
        let state = self.lock()?;
        Ok(self.status_of(&state))
    }

    fn status_of(&self, state: &DiskState<B>) -> FaultDiskStatus {
        FaultDiskStatus {
            capacity_bytes: self.capacity,
            bad_sectors: state.registry.to_sector_list().to_string(),
            bad_sector_count: state.registry.len(),
            initial_bad_sectors: state.registry.initial_count(),
            repaired_sectors: state.registry.repaired_count(),
            reserve_remaining: state.reserve.available(),
            reserve_initial: state.reserve.initial(),
        }
    }

    /// End the session: flush and release the backing store.
    ///
    /// Later requests fail with [`FaultDiskError::Closed`]. Calling this again is an error too,
    /// so the store is released exactly once.
    pub fn shutdown(&self) -> Result<FaultDiskStatus> {
        let mut state = self.lock()?;
        let mut backend = state.backend.take().ok_or(FaultDiskError::Closed)?;
        let status = self.status_of(&state);
        backend.flush()?;
        info!(
            repaired_sectors = status.repaired_sectors,
            reserve_remaining = status.reserve_remaining,
            "fault disk session closed"
        );
        Ok(status)
    }

    /// Consuming form of [`FaultDisk::shutdown`].
    pub fn close(self) -> Result<FaultDiskStatus> {
        self.shutdown()
    }
}

impl<B: StorageBackend> Drop for FaultDisk<B> {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut backend) = state.backend.take() {
            if let Err(err) = backend.flush() {
                warn!(error = %err, "failed to flush backing store while dropping fault disk");
            }
        }
    }
}

impl<B: StorageBackend> std::fmt::Debug for FaultDisk<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultDisk")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
