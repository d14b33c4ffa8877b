//! Filesystem queries answered by the kernel.

use std::fs::File;

use camino::Utf8Path;
use color_eyre::eyre::Context;
use color_eyre::Result;
use rustix::fs::IFlags;

/// `f_type` reported by statfs(2) for btrfs.
pub const BTRFS_SUPER_MAGIC: u32 = 0x9123_683e;

/// Facts about the filesystem holding a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfo {
    /// Bytes available to unprivileged users
    pub available: u64,
    /// Whether the filesystem is copy-on-write (btrfs)
    pub cow: bool,
}

pub(crate) fn query(dir: &Utf8Path) -> Result<FsInfo> {
    let st = rustix::fs::statfs(dir.as_std_path()).with_context(|| format!("statfs {dir}"))?;
    let vfs = rustix::fs::statvfs(dir.as_std_path()).with_context(|| format!("statvfs {dir}"))?;
    Ok(FsInfo {
        available: vfs.f_bavail.saturating_mul(vfs.f_frsize),
        cow: st.f_type as u32 == BTRFS_SUPER_MAGIC,
    })
}

pub(crate) fn has_nocow(path: &Utf8Path) -> Result<bool> {
    let f = File::open(path).with_context(|| format!("Opening {path}"))?;
    let flags = rustix::fs::ioctl_getflags(&f).with_context(|| format!("Reading attributes of {path}"))?;
    Ok(flags.contains(IFlags::NOCOW))
}
