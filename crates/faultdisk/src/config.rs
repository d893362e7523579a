use std::path::{Path, PathBuf};

use crate::backend::StdFileBackend;
use crate::engine::FaultDisk;
use crate::error::ConfigError;
use crate::sector_list::SectorList;
use crate::FaultDiskError;

/// Everything needed to start a fault disk session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultDiskConfig {
    pub image: PathBuf,
    pub bad_sectors: SectorList,
    pub reserve_sectors: u64,
}

impl FaultDiskConfig {
    /// A session over `image` with no bad sectors and no reserve.
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            bad_sectors: SectorList::new(),
            reserve_sectors: 0,
        }
    }

    pub fn with_bad_sectors(mut self, bad_sectors: SectorList) -> Self {
        self.bad_sectors = bad_sectors;
        self
    }

    pub fn with_reserve_sectors(mut self, reserve_sectors: u64) -> Self {
        self.reserve_sectors = reserve_sectors;
        self
    }

    /// Build a config from the textual options a user supplies.
    ///
    /// A missing bad sector list means no bad sectors; a missing reserve count means zero.
    pub fn from_options(
        image: Option<PathBuf>,
        bad_sectors: Option<&str>,
        reserve_sectors: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let image = image
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingImage)?;
        let bad_sectors = match bad_sectors {
            Some(spec) => SectorList::parse(spec)?,
            None => SectorList::new(),
        };
        let reserve_sectors = match reserve_sectors {
            Some(raw) => parse_reserve_count(raw)?,
            None => 0,
        };
        Ok(Self {
            image,
            bad_sectors,
            reserve_sectors,
        })
    }

    /// Open the image read/write and start a session over it.
    pub fn open(&self) -> Result<FaultDisk<StdFileBackend>, ConfigError> {
        let open_err = |source| ConfigError::OpenImage {
            path: self.image.clone(),
            source,
        };

        let meta = std::fs::metadata(&self.image).map_err(open_err)?;
        if !meta.is_file() {
            return Err(ConfigError::NotAFile {
                path: self.image.clone(),
            });
        }

        let backend = StdFileBackend::open(&self.image).map_err(open_err)?;
        FaultDisk::new(backend, self.bad_sectors.clone(), self.reserve_sectors).map_err(|err| {
            match err {
                FaultDiskError::Io(source) => open_err(source),
                other => open_err(std::io::Error::new(std::io::ErrorKind::Other, other)),
            }
        })
    }

    /// Name the image is exposed under: its final path component.
    pub fn file_name(&self) -> String {
        exposed_file_name(&self.image)
    }
}

/// Final path component of `path`, or the whole path when it has none.
pub fn exposed_file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Parse a reserve sector count. Only plain decimal digits are accepted.
pub fn parse_reserve_count(raw: &str) -> Result<u64, ConfigError> {
    let trimmed = raw.trim();
    let invalid = || ConfigError::ReserveCount {
        value: raw.to_string(),
    };
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    trimmed.parse().map_err(|_| invalid())
}
