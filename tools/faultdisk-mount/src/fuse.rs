//! `fuser` binding for [`SingleFileHost`].

use std::ffi::OsStr;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::{Duration, SystemTime};

use faultdisk::host::{HostError, NodeAttr, NodeKind};
use faultdisk::{SingleFileHost, StdFileBackend};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use libc::c_int;
use tracing::{debug, warn};

use crate::MountToggles;

/// Attributes only change through this process, so the kernel may cache them briefly.
const ATTR_TTL: Duration = Duration::from_secs(1);

struct FaultDiskFuse {
    host: SingleFileHost<StdFileBackend>,
    mounted_at: SystemTime,
    uid: u32,
    gid: u32,
}

impl FaultDiskFuse {
    fn new(host: SingleFileHost<StdFileBackend>) -> std::io::Result<Self> {
        let meta = std::fs::metadata(host.image_path())?;
        Ok(Self {
            host,
            mounted_at: SystemTime::now(),
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }

    fn file_attr(&self, attr: &NodeAttr) -> FileAttr {
        FileAttr {
            ino: attr.ino,
            size: attr.size,
            blocks: attr.blocks,
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: file_type(attr.kind),
            perm: attr.perm,
            nlink: attr.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: attr.blksize,
            flags: 0,
        }
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::RegularFile => FileType::RegularFile,
    }
}

/// Log a failed request and return the errno for the reply.
fn errno(err: &HostError, operation: &str, ino: u64, offset: Option<u64>) -> c_int {
    let errno = err.to_errno();
    match err {
        HostError::Disk(disk) if disk.is_media_fault() => {
            warn!(operation, ino, offset, error = %err, "media fault")
        }
        HostError::NotFound => debug!(operation, ino, "no such node"),
        _ => warn!(operation, ino, offset, errno, error = %err, "request failed"),
    }
    errno
}

impl Filesystem for FaultDiskFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        debug!(file = %self.host.file_name(), "fuse session initialised");
        Ok(())
    }

    fn destroy(&mut self) {
        self.host.destroy();
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.host.getattr(ino) {
            Ok(attr) => reply.attr(&ATTR_TTL, &self.file_attr(&attr)),
            Err(e) => reply.error(errno(&e, "getattr", ino, None)),
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.host.lookup(parent, name) {
            Ok(attr) => reply.entry(&ATTR_TTL, &self.file_attr(&attr), 0),
            Err(e) => reply.error(errno(&e, "lookup", parent, None)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.host.open(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(errno(&e, "open", ino, None)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.host.readdir(ino, 0) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(errno(&e, "opendir", ino, None)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(byte_offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.host.read(ino, byte_offset, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno(&e, "read", ino, Some(byte_offset))),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(byte_offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.host.write(ino, byte_offset, data) {
            // Clipped requests never exceed `data.len()`, which the kernel caps well below u32::MAX.
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(e) => reply.error(errno(&e, "write", ino, Some(byte_offset))),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let skip = usize::try_from(offset).unwrap_or(0);
        match self.host.readdir(ino, skip) {
            Ok(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    let next = i64::try_from(skip + i + 1).unwrap_or(i64::MAX);
                    if reply.add(entry.ino, next, file_type(entry.kind), &entry.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => reply.error(errno(&e, "readdir", ino, None)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.host.flush(ino) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e, "flush", ino, None)),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.host.fsync(ino) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e, "fsync", ino, None)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.host.release(ino) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e, "release", ino, None)),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.host.access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e, "access", ino, None)),
        }
    }
}

fn build_mount_options(toggles: MountToggles) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::FSName("faultdisk".to_owned()),
        MountOption::Subtype("faultdisk".to_owned()),
    ];
    if toggles.allow_other {
        opts.push(MountOption::AllowOther);
    }
    if toggles.auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }
    opts
}

/// Mount `host` at `mountpoint` and serve requests until it is unmounted.
pub fn mount(
    host: SingleFileHost<StdFileBackend>,
    mountpoint: &Path,
    toggles: MountToggles,
) -> std::io::Result<()> {
    let fs = FaultDiskFuse::new(host)?;
    fuser::mount2(fs, mountpoint, &build_mount_options(toggles))
}
