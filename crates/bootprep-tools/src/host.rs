//! [`DiskTools`] backed by the host's binaries.

use camino::Utf8Path;
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::debug;
use xshell::{cmd, Shell};

use crate::qemu_img::{ConvertRequest, ImageInfo};
use crate::{fsinfo, AllocateMode, DiskTools, FsInfo};

/// Runs `isoinfo`, `sfdisk`, `qemu-img`, `fallocate` and `7z` from `$PATH`.
#[derive(Debug, Default, Clone)]
pub struct HostTools {}

impl HostTools {
    /// Create a new instance.
    pub fn new() -> Self {
        Self::default()
    }
}

fn shell() -> Result<Shell> {
    Shell::new().map_err(|e| eyre!("Failed to create shell: {e}"))
}

impl DiskTools for HostTools {
    fn list_iso(&self, image: &Utf8Path) -> Result<String> {
        let sh = shell()?;
        let out = cmd!(sh, "isoinfo -f -i {image}")
            .quiet()
            .ignore_status()
            .ignore_stderr()
            .read()
            .context("Running isoinfo")?;
        Ok(out)
    }

    fn list_partitions(&self, image: &Utf8Path) -> Result<String> {
        let sh = shell()?;
        let out = cmd!(sh, "sfdisk -l {image}")
            .quiet()
            .ignore_status()
            .ignore_stderr()
            .read()
            .context("Running sfdisk")?;
        Ok(out)
    }

    fn virtual_size(&self, image: &Utf8Path) -> Result<u64> {
        let sh = shell()?;
        let out = cmd!(sh, "qemu-img info --output=json {image}")
            .quiet()
            .read()
            .with_context(|| format!("Querying image info of {image}"))?;
        Ok(ImageInfo::parse(&out)?.virtual_size)
    }

    fn convert(&self, request: &ConvertRequest) -> Result<()> {
        let sh = shell()?;
        let args = request.args();
        debug!("qemu-img convert {}", args.join(" "));
        cmd!(sh, "qemu-img convert {args...}")
            .quiet()
            .run()
            .with_context(|| format!("Converting {}", request.source))?;
        Ok(())
    }

    fn allocate(&self, path: &Utf8Path, len: u64, mode: AllocateMode) -> Result<()> {
        let sh = shell()?;
        let len = len.to_string();
        let posix = match mode {
            AllocateMode::Native => None,
            AllocateMode::Posix => Some("-x"),
        };
        cmd!(sh, "fallocate {posix...} -l {len} {path}")
            .quiet()
            .ignore_stderr()
            .run()
            .with_context(|| format!("Allocating {len} bytes for {path}"))?;
        Ok(())
    }

    fn filesystem(&self, dir: &Utf8Path) -> Result<FsInfo> {
        fsinfo::query(dir)
    }

    fn nocow(&self, path: &Utf8Path) -> Result<bool> {
        fsinfo::has_nocow(path)
    }

    fn unpack(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<()> {
        let sh = shell()?;
        let output = format!("-o{dest}");
        cmd!(sh, "7z x -y -bso0 -bsp0 {output} {archive}")
            .quiet()
            .run()
            .with_context(|| format!("Extracting {archive}"))?;
        Ok(())
    }
}
