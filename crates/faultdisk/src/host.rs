//! Presentation of a [`FaultDisk`] as a directory holding one regular file.
//!
//! This is the part of a filesystem host that does not depend on a particular kernel binding:
//! inode numbering, attributes, directory listing, access checks and errno mapping. A FUSE
//! adapter only has to translate its callbacks into these calls.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::config::exposed_file_name;
use crate::engine::{FaultDisk, FaultDiskStatus};
use crate::{FaultDiskError, SECTOR_SIZE};

pub const ROOT_INO: u64 = 1;
pub const DISK_INO: u64 = 2;

const ROOT_PERM: u16 = 0o755;
const DISK_PERM: u16 = 0o777;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no such file or directory")]
    NotFound,

    #[error("is a directory")]
    IsDirectory,

    #[error("not a directory")]
    NotDirectory,

    #[error("access denied to disk image: {0}")]
    Access(#[source] std::io::Error),

    #[error(transparent)]
    Disk(#[from] FaultDiskError),
}

impl HostError {
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::IsDirectory => libc::EISDIR,
            Self::NotDirectory => libc::ENOTDIR,
            Self::Access(err) => err.raw_os_error().unwrap_or(libc::EACCES),
            Self::Disk(err) => err.to_errno(),
        }
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    RegularFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub ino: u64,
    pub kind: NodeKind,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
    pub blocks: u64,
    pub blksize: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub kind: NodeKind,
    pub name: String,
}

/// A root directory containing exactly one file backed by a [`FaultDisk`].
pub struct SingleFileHost<B: StorageBackend> {
    disk: Arc<FaultDisk<B>>,
    image_path: PathBuf,
    file_name: String,
    destroyed: AtomicBool,
}

impl<B: StorageBackend> SingleFileHost<B> {
    /// Expose `disk` under the final path component of `image_path`.
    pub fn new(disk: Arc<FaultDisk<B>>, image_path: impl Into<PathBuf>) -> Self {
        let image_path = image_path.into();
        let file_name = exposed_file_name(&image_path);
        Self {
            disk,
            image_path,
            file_name,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn disk(&self) -> &Arc<FaultDisk<B>> {
        &self.disk
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn getattr(&self, ino: u64) -> HostResult<NodeAttr> {
        match ino {
            ROOT_INO => Ok(NodeAttr {
                ino: ROOT_INO,
                kind: NodeKind::Directory,
                perm: ROOT_PERM,
                nlink: 2,
                size: 0,
                blocks: 0,
                blksize: SECTOR_SIZE as u32,
            }),
            DISK_INO => {
                let size = self.disk.size();
                Ok(NodeAttr {
                    ino: DISK_INO,
                    kind: NodeKind::RegularFile,
                    perm: DISK_PERM,
                    nlink: 1,
                    size,
                    blocks: size.div_ceil(SECTOR_SIZE as u64),
                    blksize: SECTOR_SIZE as u32,
                })
            }
            _ => Err(HostError::NotFound),
        }
    }

    pub fn lookup(&self, parent: u64, name: &OsStr) -> HostResult<NodeAttr> {
        match parent {
            ROOT_INO if name == OsStr::new(&self.file_name) => self.getattr(DISK_INO),
            ROOT_INO => Err(HostError::NotFound),
            DISK_INO => Err(HostError::NotDirectory),
            _ => Err(HostError::NotFound),
        }
    }

    /// Directory entries of `ino`, skipping the first `offset`.
    pub fn readdir(&self, ino: u64, offset: usize) -> HostResult<Vec<DirEntry>> {
        match ino {
            ROOT_INO => {}
            DISK_INO => return Err(HostError::NotDirectory),
            _ => return Err(HostError::NotFound),
        }
        let entries = [
            (ROOT_INO, NodeKind::Directory, "."),
            (ROOT_INO, NodeKind::Directory, ".."),
            (DISK_INO, NodeKind::RegularFile, self.file_name.as_str()),
        ];
        Ok(entries
            .into_iter()
            .skip(offset)
            .map(|(ino, kind, name)| DirEntry {
                ino,
                kind,
                name: name.to_string(),
            })
            .collect())
    }

    /// Opening never fails for an existing node; permissions are left to the kernel.
    pub fn open(&self, ino: u64) -> HostResult<()> {
        self.getattr(ino).map(|_| ())
    }

    /// Check `mask` (`R_OK`/`W_OK`/`X_OK`/`F_OK`) against the backing image file.
    pub fn access(&self, ino: u64, mask: libc::c_int) -> HostResult<()> {
        match ino {
            ROOT_INO => Ok(()),
            DISK_INO => check_access(&self.image_path, mask).map_err(HostError::Access),
            _ => Err(HostError::NotFound),
        }
    }

    fn ensure_disk(&self, ino: u64) -> HostResult<()> {
        match ino {
            DISK_INO => Ok(()),
            ROOT_INO => Err(HostError::IsDirectory),
            _ => Err(HostError::NotFound),
        }
    }

    pub fn read(&self, ino: u64, offset: u64, size: usize) -> HostResult<Vec<u8>> {
        self.ensure_disk(ino)?;
        Ok(self.disk.read(offset, size)?)
    }

    pub fn write(&self, ino: u64, offset: u64, data: &[u8]) -> HostResult<usize> {
        self.ensure_disk(ino)?;
        Ok(self.disk.write(offset, data)?)
    }

    pub fn flush(&self, ino: u64) -> HostResult<()> {
        self.ensure_disk(ino)?;
        Ok(self.disk.flush()?)
    }

    pub fn fsync(&self, ino: u64) -> HostResult<()> {
        self.flush(ino)
    }

    pub fn release(&self, ino: u64) -> HostResult<()> {
        self.getattr(ino).map(|_| ())
    }

    /// Tear the session down. Only the first call closes the disk.
    pub fn destroy(&self) -> Option<FaultDiskStatus> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return None;
        }
        match self.disk.shutdown() {
            Ok(status) => {
                info!(
                    file = %self.file_name,
                    bad_sectors = %status.bad_sectors,
                    repaired_sectors = status.repaired_sectors,
                    reserve_remaining = status.reserve_remaining,
                    "unmounted"
                );
                Some(status)
            }
            Err(err) => {
                warn!(error = %err, "failed to close disk session");
                None
            }
        }
    }
}

#[cfg(unix)]
fn check_access(path: &Path, mask: libc::c_int) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::access(c_path.as_ptr(), mask) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn check_access(path: &Path, mask: libc::c_int) -> std::io::Result<()> {
    let meta = std::fs::metadata(path)?;
    if mask & 2 != 0 && meta.permissions().readonly() {
        return Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
    }
    Ok(())
}
