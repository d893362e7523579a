use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use crate::{FaultDiskError, Result};

/// Byte-addressed storage holding the real contents of the simulated disk.
///
/// All access is positioned: implementations must not depend on (or disturb) any implicit
/// cursor, so a caller never has to seek before a read or write.
pub trait StorageBackend {
    /// Current size of the store in bytes.
    fn len(&mut self) -> Result<u64>;

    /// Fill `buf` from `offset`. Short reads are errors.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` at `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Make previous writes durable.
    fn flush(&mut self) -> Result<()>;
}

fn end_offset(offset: u64, len: usize) -> Result<u64> {
    offset
        .checked_add(len as u64)
        .ok_or(FaultDiskError::OffsetOverflow)
}

/// In-memory backend, mostly useful for tests.
#[derive(Debug, Default, Clone)]
pub struct MemBackend {
    data: Vec<u8>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(len: u64) -> Result<Self> {
        let len = usize::try_from(len).map_err(|_| FaultDiskError::OffsetOverflow)?;
        Ok(Self { data: vec![0; len] })
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let end = end_offset(offset, len)?;
        if end > self.data.len() as u64 {
            return Err(FaultDiskError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "range {offset}..{end} is outside the {} byte store",
                    self.data.len()
                ),
            )));
        }
        Ok(offset as usize..end as usize)
    }
}

impl StorageBackend for MemBackend {
    fn len(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let range = self.range(offset, buf.len())?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Disk image file accessed with positioned reads and writes.
#[derive(Debug)]
pub struct StdFileBackend {
    file: File,
}

impl StdFileBackend {
    /// Open an existing image for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        Ok(Self { file })
    }

    pub fn from_file(file: File) -> Self {
        Self { file }
    }

    pub fn into_file(self) -> File {
        self.file
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

impl StorageBackend for StdFileBackend {
    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        end_offset(offset, buf.len())?;
        read_exact_at(&self.file, offset, buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        end_offset(offset, buf.len())?;
        write_all_at(&self.file, offset, buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, offset: u64, buf: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

// `seek_read`/`seek_write` move the cursor on Windows, so restore it afterwards.
#[cfg(windows)]
fn read_exact_at(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::io::Seek;
    use std::os::windows::fs::FileExt;

    let mut handle = file;
    let cursor = handle.stream_position()?;
    let mut done = 0usize;
    let res = (|| {
        while done < buf.len() {
            match file.seek_read(&mut buf[done..], offset + done as u64) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })();
    handle.seek(io::SeekFrom::Start(cursor))?;
    res
}

#[cfg(windows)]
fn write_all_at(file: &File, offset: u64, buf: &[u8]) -> io::Result<()> {
    use std::io::Seek;
    use std::os::windows::fs::FileExt;

    let mut handle = file;
    let cursor = handle.stream_position()?;
    let mut done = 0usize;
    let res = (|| {
        while done < buf.len() {
            match file.seek_write(&buf[done..], offset + done as u64) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })();
    handle.seek(io::SeekFrom::Start(cursor))?;
    res
}
