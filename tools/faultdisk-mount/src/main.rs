use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use faultdisk::{FaultDiskConfig, SingleFileHost};
use tracing_subscriber::EnvFilter;

#[cfg(all(unix, feature = "fuse"))]
mod fuse;

#[derive(Parser, Debug)]
#[command(
    name = "faultdisk-mount",
    version,
    about = "Mount a disk image as a single file whose bad sectors fail on read and get reallocated on write."
)]
struct Args {
    /// Directory to mount the filtered image on
    #[arg(required_unless_present = "check")]
    mountpoint: Option<PathBuf>,

    /// Path to the disk image to filter
    #[arg(short = 'i', long = "diskimage", value_name = "PATH", env = "FAULTDISK_IMAGE")]
    disk_image: Option<PathBuf>,

    /// Bad sectors, e.g. "1,3-4,9" (comma separated, `-` for inclusive ranges)
    #[arg(short = 's', long = "badsectors", value_name = "LIST", env = "FAULTDISK_BAD_SECTORS")]
    bad_sectors: Option<String>,

    /// Reserve sectors available for reallocation on write [default: 0]
    #[arg(
        short = 'r',
        long = "reservesectors",
        value_name = "COUNT",
        env = "FAULTDISK_RESERVE_SECTORS"
    )]
    reserve_sectors: Option<String>,

    /// Let users other than the mounting user access the mount
    #[arg(long, action = clap::ArgAction::SetTrue)]
    allow_other: bool,

    /// Keep the mount around if this process dies
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_auto_unmount: bool,

    /// Validate the configuration, print the session status as JSON and exit without mounting
    #[arg(long, action = clap::ArgAction::SetTrue)]
    check: bool,

    /// Log filter (tracing-subscriber EnvFilter syntax)
    #[arg(long, value_name = "FILTER", env = "FAULTDISK_LOG", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy)]
struct MountToggles {
    allow_other: bool,
    auto_unmount: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level)
        .with_context(|| format!("invalid log filter {:?}", args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(args)
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = FaultDiskConfig::from_options(
        args.disk_image.clone(),
        args.bad_sectors.as_deref(),
        args.reserve_sectors.as_deref(),
    )
    .context("invalid configuration")?;

    let disk = config
        .open()
        .with_context(|| format!("open disk image {}", config.image.display()))?;

    tracing::info!(
        image = %config.image.display(),
        file = %config.file_name(),
        bad_sectors = %config.bad_sectors,
        reserve_sectors = config.reserve_sectors,
        "disk session ready"
    );

    if args.check {
        let status = disk.close().context("close disk image")?;
        let json = serde_json::to_string_pretty(&status).context("serialize status")?;
        println!("{json}");
        return Ok(());
    }

    let Some(mountpoint) = args.mountpoint else {
        bail!("a mountpoint is required unless --check is given");
    };
    if !mountpoint.is_dir() {
        bail!("mountpoint {} is not a directory", mountpoint.display());
    }

    let host = SingleFileHost::new(Arc::new(disk), config.image.clone());
    let toggles = MountToggles {
        allow_other: args.allow_other,
        auto_unmount: !args.no_auto_unmount,
    };
    mount(host, &mountpoint, toggles)
}

#[cfg(all(unix, feature = "fuse"))]
fn mount(
    host: SingleFileHost<faultdisk::StdFileBackend>,
    mountpoint: &std::path::Path,
    toggles: MountToggles,
) -> anyhow::Result<()> {
    tracing::info!(mountpoint = %mountpoint.display(), "mounting");
    fuse::mount(host, mountpoint, toggles)
        .with_context(|| format!("mount {}", mountpoint.display()))
}

#[cfg(not(all(unix, feature = "fuse")))]
fn mount(
    host: SingleFileHost<faultdisk::StdFileBackend>,
    mountpoint: &std::path::Path,
    _toggles: MountToggles,
) -> anyhow::Result<()> {
    host.destroy();
    bail!(
        "cannot mount {}: faultdisk-mount was built without FUSE support (rebuild with `--features fuse`)",
        mountpoint.display()
    )
}
