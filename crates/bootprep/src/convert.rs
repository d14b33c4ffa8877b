//! Converting foreign disk formats into the configured target format.

use bootprep_tools::{AllocateMode, ConvertRequest, DiskFormat, DiskTools};
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{bail, eyre, Context};
use color_eyre::Result;
use indicatif::HumanBytes;
use tracing::{debug, error, info, warn};

use crate::config::Allocation;
use crate::utils::make_readable;

/// One conversion from `source` to `dest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Existing image to read
    pub source: Utf8PathBuf,
    /// Format of `source`
    pub source_format: DiskFormat,
    /// Path to create; must not exist yet
    pub dest: Utf8PathBuf,
    /// Format of `dest`
    pub dest_format: DiskFormat,
}

/// Knobs applied to every conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Sparse or fully preallocated output
    pub allocation: Allocation,
    /// Extra creation options for qcow2 output, comma separated
    pub extra_flags: Option<String>,
}

impl ConvertOptions {
    fn creation_options(&self, dest_format: DiskFormat, cow: bool) -> Vec<String> {
        let mut options = vec![match self.allocation {
            Allocation::Sparse => "preallocation=off".to_owned(),
            Allocation::Full => "preallocation=falloc".to_owned(),
        }];
        if cow {
            options.push("nocow=on".to_owned());
        }
        if dest_format == DiskFormat::Qcow2 {
            if let Some(flags) = self.extra_flags.as_deref() {
                options.extend(flags.split(',').map(|f| f.trim().to_owned()));
            }
        }
        options
    }
}

/// Run `job`, publishing `dest` only once the converter has succeeded.
///
/// The output is written to a temporary file beside `dest`; on any failure
/// that file is removed and `source` is left as it was.
pub fn convert(tools: &dyn DiskTools, job: &ConversionJob, opts: &ConvertOptions) -> Result<()> {
    let ConversionJob {
        source,
        source_format,
        dest,
        dest_format,
    } = job;

    if dest.symlink_metadata().is_ok() {
        bail!("Conversion failed, destination {dest} already exists?");
    }
    if !source.is_file() {
        bail!("Conversion failed, source {source} does not exist?");
    }

    if source_format == dest_format {
        std::fs::rename(source, dest)
            .with_context(|| format!("Failed to move {source} to {dest}"))?;
        return Ok(());
    }

    let dir = dest.parent().unwrap_or(Utf8Path::new("."));
    let fs = tools.filesystem(dir)?;
    if opts.allocation == Allocation::Full {
        let size = tools.virtual_size(source)?;
        if size > fs.available {
            bail!(
                "Not enough free space to convert {source}, it has a size of {} but only {} is available in {dir}",
                HumanBytes(size),
                HumanBytes(fs.available)
            );
        }
    }

    let tmp = tempfile::Builder::new()
        .prefix(".convert-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Creating temporary file in {dir}"))?;
    let tmp_path = Utf8Path::from_path(tmp.path())
        .ok_or_else(|| eyre!("Non-UTF-8 temporary file"))?
        .to_owned();

    let request = ConvertRequest {
        source: source.clone(),
        source_format: *source_format,
        target: tmp_path.clone(),
        target_format: *dest_format,
        compress: opts.allocation == Allocation::Sparse,
        options: opts.creation_options(*dest_format, fs.cow),
    };
    info!("Converting {source} to {dest_format}, please wait...");
    tools
        .convert(&request)
        .with_context(|| format!("Failed to convert {source} to {dest_format}"))?;

    if *dest_format == DiskFormat::Raw && opts.allocation == Allocation::Full {
        preallocate(tools, &tmp_path);
    }

    make_readable(&tmp_path)?;
    tmp.persist_noclobber(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move converted image to {dest}"))?;
    debug!("Converted {source} into {dest}");

    if fs.cow {
        match tools.nocow(dest) {
            Ok(true) => {}
            Ok(false) => error!("Failed to disable COW for {dest}"),
            Err(e) => error!("Checking COW attribute of {dest}: {e:#}"),
        }
    }
    Ok(())
}

/// Force-allocate every byte of a freshly converted raw image.
///
/// Failures are reported but leave the image in place.
fn preallocate(tools: &dyn DiskTools, path: &Utf8Path) {
    let len = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) => {
            error!("Reading size of {path}: {e}");
            return;
        }
    };
    if let Err(e) = tools.allocate(path, len, AllocateMode::Native) {
        warn!("Native allocation of {path} failed, retrying: {e:#}");
        if let Err(e) = tools.allocate(path, len, AllocateMode::Posix) {
            error!("Failed to allocate {len} bytes for {path}: {e:#}");
        }
    }
}
