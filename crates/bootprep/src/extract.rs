//! Unpacking downloaded archives and compressed streams.

use std::fs::File;
use std::io::Read;

use bootprep_tools::DiskTools;
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::kind::ImageKind;
use crate::utils::{file_stem, make_readable, remove_if_exists};

/// Unpack `path` if its extension says it is packed, returning the image.
///
/// Compressed streams are decompressed next to the source; archives are
/// unpacked into a temporary directory inside `storage`, from which the
/// image is moved back into `storage`. The packed source is deleted on
/// success. Unknown extensions are returned unchanged.
pub fn extract(
    tools: &dyn DiskTools,
    storage: &Utf8Path,
    path: &Utf8Path,
) -> Result<Utf8PathBuf> {
    match ImageKind::of(path) {
        Some(ImageKind::GzipStream) => {
            decompress(path, |f| Box::new(flate2::read::MultiGzDecoder::new(f)))
        }
        Some(ImageKind::XzStream) => decompress(path, |f| Box::new(xz2::read::XzDecoder::new(f))),
        Some(ImageKind::Container) => unpack(tools, storage, path),
        _ => Ok(path.to_owned()),
    }
}

fn decompress(
    path: &Utf8Path,
    decoder: impl FnOnce(File) -> Box<dyn Read>,
) -> Result<Utf8PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid path: {path}"))?;
    let dir = path.parent().unwrap_or(Utf8Path::new("."));
    let target = dir.join(file_stem(name));
    info!("Extracting {name}...");

    let input = File::open(path).with_context(|| format!("Opening {path}"))?;
    let mut reader = decoder(input);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Creating temporary file in {dir}"))?;
    std::io::copy(&mut reader, tmp.as_file_mut())
        .with_context(|| format!("Failed to extract {path}"))?;
    let tmp_path =
        Utf8Path::from_path(tmp.path()).ok_or_else(|| eyre!("Non-UTF-8 temporary file"))?;
    make_readable(tmp_path)?;
    tmp.persist(&target)
        .map_err(|e| e.error)
        .with_context(|| format!("Writing {target}"))?;
    remove_if_exists(path)?;
    Ok(target)
}

fn unpack(tools: &dyn DiskTools, storage: &Utf8Path, path: &Utf8Path) -> Result<Utf8PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid path: {path}"))?;
    info!("Extracting {name}...");

    let td = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(storage)
        .with_context(|| format!("Creating extraction directory in {storage}"))?;
    let tmp = Utf8Path::from_path(td.path())
        .ok_or_else(|| eyre!("Non-UTF-8 extraction directory"))?;

    tools.unpack(path, tmp)?;
    remove_if_exists(path)?;

    let expected = tmp.join(file_stem(name));
    let found = if expected.is_file() {
        expected
    } else {
        find_image(tmp)?.ok_or_else(|| eyre!("Cannot find file {} in {name}", file_stem(name)))?
    };
    debug!("Extracted image: {found}");

    let file_name = found
        .file_name()
        .ok_or_else(|| eyre!("Invalid path: {found}"))?;
    let target = storage.join(file_name);
    std::fs::rename(&found, &target)
        .with_context(|| format!("Failed to move {found} to {target}"))?;
    Ok(target)
}

/// First disk image in `dir`, in directory scan order.
fn find_image(dir: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::try_from(entry.into_path()) else {
            continue;
        };
        if ImageKind::of(&path).is_some_and(|k| k.is_disk_image()) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}
