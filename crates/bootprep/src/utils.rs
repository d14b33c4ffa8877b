//! Small filesystem and naming helpers shared by the pipeline stages.

use std::fs::Permissions;
use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use color_eyre::Result;
use percent_encoding::percent_decode_str;
use tracing::debug;

/// Derive a filesystem-safe file name from a download URL.
///
/// Query and fragment are dropped, the last path segment is percent-decoded
/// (`+` meaning space) and anything but ASCII alphanumerics, `.`, `_` and `-`
/// becomes `_`.
pub fn base_name(url: &str) -> String {
    let url = url.split(['?', '#']).next().unwrap_or_default();
    let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let decoded = percent_decode_str(&last.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned();
    let name: String = decoded
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "boot.download".to_owned()
    } else {
        name
    }
}

/// File name without its final extension.
pub fn file_stem(name: &str) -> &str {
    Utf8Path::new(name).file_stem().unwrap_or(name)
}

/// Remove a file, treating "not found" as success.
pub fn remove_if_exists(path: &Utf8Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {path}");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Removing {path}")),
    }
}

/// Mode of images written through a temporary file.
pub const IMAGE_MODE: u32 = 0o644;

/// Temporary files are created private; open a finished image up to [`IMAGE_MODE`].
pub fn make_readable(path: &Utf8Path) -> Result<()> {
    std::fs::set_permissions(path, Permissions::from_mode(IMAGE_MODE))
        .with_context(|| format!("Setting mode of {path}"))
}

/// Whether a file name belongs to an artifact class left by an earlier,
/// differently configured run.
fn is_stale_artifact(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".rom")
        || lower.ends_with(".vars")
        || lower.starts_with("data.")
        || lower.starts_with("qemu.")
}

/// Delete firmware, vars and generic `data.*`/`qemu.*` files from storage.
pub fn purge_stale(storage: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut removed = Vec::new();
    for entry in storage
        .read_dir_utf8()
        .with_context(|| format!("Reading {storage}"))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() || !is_stale_artifact(entry.file_name()) {
            continue;
        }
        remove_if_exists(entry.path())?;
        removed.push(entry.path().to_owned());
    }
    Ok(removed)
}

/// Whether any of the given paths is a block device.
///
/// This is how an attached boot disk is detected; a bind-mounted directory
/// named like a boot image is taken to mean one of these exists.
pub fn has_disk<'a>(devices: impl IntoIterator<Item = &'a Utf8Path>) -> bool {
    devices.into_iter().any(|dev| {
        std::fs::metadata(dev)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false)
    })
}

/// Apply the configured owner and group to a prepared file.
pub fn set_owner(path: &Utf8Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
    if uid.is_none() && gid.is_none() {
        return Ok(());
    }
    std::os::unix::fs::chown(path, uid, gid)
        .with_context(|| format!("Setting owner of {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name() {
        assert_eq!(
            base_name("https://example.org/isos/alpine-virt-3.20.iso"),
            "alpine-virt-3.20.iso"
        );
        assert_eq!(
            base_name("https://example.org/get/My%20Disk+v2.vmdk?token=abc#frag"),
            "My_Disk_v2.vmdk"
        );
        assert_eq!(base_name("https://example.org/a/b(1).img.gz"), "b_1_.img.gz");
        assert_eq!(base_name("https://example.org/"), "example.org");
        assert_eq!(base_name(""), "boot.download");
    }

    #[test]
    fn test_make_readable() -> Result<()> {
        let tmp = tempfile::NamedTempFile::new()?;
        let path = Utf8Path::from_path(tmp.path()).unwrap();
        make_readable(path)?;
        assert_eq!(std::fs::metadata(path)?.permissions().mode() & 0o777, IMAGE_MODE);
        Ok(())
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("disk.vmdk"), "disk");
        assert_eq!(file_stem("disk.qcow2.7z"), "disk.qcow2");
        assert_eq!(file_stem("noext"), "noext");
    }

    #[test]
    fn test_purge_stale() -> Result<()> {
        let td = tempfile::tempdir()?;
        let dir = Utf8Path::from_path(td.path()).unwrap();
        for name in ["OVMF.rom", "uefi.vars", "data.img", "qemu.pid", "boot.img", "keep.txt"] {
            std::fs::write(dir.join(name), b"x")?;
        }
        let mut removed: Vec<String> = purge_stale(dir)?
            .iter()
            .map(|p| p.file_name().unwrap().to_owned())
            .collect();
        removed.sort();
        assert_eq!(removed, ["OVMF.rom", "data.img", "qemu.pid", "uefi.vars"]);
        assert!(dir.join("boot.img").exists());
        assert!(dir.join("keep.txt").exists());
        Ok(())
    }

    #[test]
    fn test_remove_if_exists_missing() -> Result<()> {
        let td = tempfile::tempdir()?;
        let dir = Utf8Path::from_path(td.path()).unwrap();
        remove_if_exists(&dir.join("nope"))?;
        Ok(())
    }

    #[test]
    fn test_has_disk_regular_file() -> Result<()> {
        let td = tempfile::tempdir()?;
        let dir = Utf8Path::from_path(td.path()).unwrap();
        let f = dir.join("disk1");
        std::fs::write(&f, b"")?;
        assert!(!has_disk([f.as_path(), Utf8Path::new("/nonexistent/disk")]));
        Ok(())
    }
}
