use std::path::PathBuf;

use thiserror::Error;

use crate::sector_list::SectorListError;

pub type Result<T> = std::result::Result<T, FaultDiskError>;

/// Errors returned by the fault-injection engine while a session is running.
///
/// [`FaultDiskError::BadSector`] and [`FaultDiskError::NoReserve`] are the simulated media
/// faults. Everything else means the backing store itself misbehaved.
#[derive(Debug, Error)]
pub enum FaultDiskError {
    #[error("read touches bad sector {sector}")]
    BadSector { sector: u64 },

    #[error("write touches bad sector {sector} and no reserve sectors are left")]
    NoReserve { sector: u64 },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("engine state lock poisoned")]
    Poisoned,

    #[error("disk session is closed")]
    Closed,

    /// The backing store returned an error.
    #[error("backing store io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FaultDiskError {
    /// True for the faults the engine injects on purpose.
    pub fn is_media_fault(&self) -> bool {
        matches!(self, Self::BadSector { .. } | Self::NoReserve { .. })
    }

    /// POSIX errno a filesystem host should reply with.
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::BadSector { .. } | Self::NoReserve { .. } => libc::EIO,
            Self::OffsetOverflow => libc::EINVAL,
            Self::Poisoned | Self::Closed => libc::EIO,
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Errors detected while building a session. None of these leave a partial session behind.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bad sector list: {0}")]
    SectorList(#[from] SectorListError),

    #[error("invalid reserve sector count {value:?}: expected a non-negative decimal integer")]
    ReserveCount { value: String },

    #[error("no disk image path given")]
    MissingImage,

    #[error("disk image {path} is not a regular file")]
    NotAFile { path: PathBuf },

    #[error("failed to open disk image {path}: {source}")]
    OpenImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_faults_map_to_eio() {
        assert_eq!(FaultDiskError::BadSector { sector: 3 }.to_errno(), libc::EIO);
        assert_eq!(FaultDiskError::NoReserve { sector: 3 }.to_errno(), libc::EIO);
        assert!(FaultDiskError::BadSector { sector: 3 }.is_media_fault());
        assert!(!FaultDiskError::OffsetOverflow.is_media_fault());
    }

    #[test]
    fn io_errors_keep_os_errno() {
        let err = FaultDiskError::from(std::io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.to_errno(), libc::ENOSPC);

        let err = FaultDiskError::from(std::io::Error::new(std::io::ErrorKind::Other, "gone"));
        assert_eq!(err.to_errno(), libc::EIO);
    }
}
