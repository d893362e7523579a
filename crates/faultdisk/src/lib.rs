//! Simulated degrading disk for fault-injection testing.
//!
//! A [`FaultDisk`] sits in front of a raw disk image and injects media errors on a configured
//! set of 512-byte sectors:
//!
//! - reads that touch a bad sector fail with an I/O fault, with no partial data;
//! - writes that touch a bad sector reallocate it from a finite reserve pool, and fail once the
//!   pool is exhausted (earlier reallocations in the same write are kept);
//! - requests past the end of the image are truncated rather than failed.
//!
//! [`SingleFileHost`] presents the disk as a single file in a directory so a filesystem binding
//! (see the `faultdisk-mount` tool) can mount it.

mod backend;
mod config;
mod engine;
mod error;
pub mod host;
mod range_set;
mod registry;
mod reserve;
mod sector;
mod sector_list;

pub use backend::{MemBackend, StdFileBackend, StorageBackend};
pub use config::{exposed_file_name, parse_reserve_count, FaultDiskConfig};
pub use engine::{FaultDisk, FaultDiskStatus};
pub use error::{ConfigError, FaultDiskError, Result};
pub use host::{HostError, SingleFileHost};
pub use range_set::{SectorRange, SectorRangeSet};
pub use registry::BadSectorRegistry;
pub use reserve::{NoReserve, ReservePool};
pub use sector::{clip_range, sector_of, ClippedRange, SectorSpan, SECTOR_SIZE};
pub use sector_list::{SectorList, SectorListError};

#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
