//! Host disk tooling for boot image preparation.
//!
//! This crate is the boundary between the boot image pipeline and the
//! binaries (and kernel interfaces) it depends on. Every capability is
//! exposed through the [`DiskTools`] trait so callers can swap in canned
//! outputs when exercising their control flow.
//!
//! # Capabilities
//!
//! - **ISO metadata**: directory listing of an ISO9660 image (`isoinfo`)
//! - **Partition tables**: textual dump of a raw image's partitions (`sfdisk`)
//! - **Image info and conversion**: virtual size and format conversion
//!   (`qemu-img`)
//! - **Preallocation**: force-allocating a file's blocks (`fallocate`)
//! - **Filesystem facts**: free space, copy-on-write detection and the
//!   no-COW file attribute, queried directly from the kernel
//! - **Archives**: unpacking container archives (`7z`)
//!
//! # Example
//!
//! ```no_run
//! use bootprep_tools::{DiskTools, HostTools};
//! use camino::Utf8Path;
//!
//! # fn example() -> color_eyre::Result<()> {
//! let tools = HostTools::new();
//! let size = tools.virtual_size(Utf8Path::new("/storage/disk.vmdk"))?;
//! println!("virtual size: {size}");
//! # Ok(())
//! # }
//! ```

use camino::Utf8Path;
use color_eyre::Result;

mod format;
mod fsinfo;
mod host;
mod qemu_img;

pub use format::DiskFormat;
pub use fsinfo::{FsInfo, BTRFS_SUPER_MAGIC};
pub use host::HostTools;
pub use qemu_img::{ConvertRequest, ImageInfo};

/// How to force-allocate the blocks of an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocateMode {
    /// Native `fallocate(2)` call.
    Native,
    /// POSIX emulation that writes zeroes where the native call is unsupported.
    Posix,
}

/// External tool capabilities used by the boot image pipeline.
pub trait DiskTools {
    /// List every path inside an ISO9660 image, one per line.
    ///
    /// Returns an empty string (not an error) when the image is unreadable.
    fn list_iso(&self, image: &Utf8Path) -> Result<String>;

    /// Dump the partition table of a raw disk image.
    ///
    /// Returns an empty string when no partition table could be read.
    fn list_partitions(&self, image: &Utf8Path) -> Result<String>;

    /// Logical (virtual) size in bytes of a disk image of any supported format.
    fn virtual_size(&self, image: &Utf8Path) -> Result<u64>;

    /// Convert a disk image; only returns once the converter has exited.
    fn convert(&self, request: &ConvertRequest) -> Result<()>;

    /// Force-allocate `len` bytes of `path`.
    fn allocate(&self, path: &Utf8Path, len: u64, mode: AllocateMode) -> Result<()>;

    /// Free space and copy-on-write capability of the filesystem holding `dir`.
    fn filesystem(&self, dir: &Utf8Path) -> Result<FsInfo>;

    /// Whether `path` carries the no-COW file attribute.
    fn nocow(&self, path: &Utf8Path) -> Result<bool>;

    /// Unpack a container archive (7z, zip, rar, ...) into `dest`.
    fn unpack(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<()>;
}
