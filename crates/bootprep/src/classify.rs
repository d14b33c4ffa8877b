//! Deciding whether a file is a bootable image, and how it boots.
//!
//! Inspection looks at the extension and, unless a boot mode is forced or
//! the image is qcow2, at the image structure: pure ISO9660 images are
//! judged by the presence of an `/EFI` tree, everything else (including
//! hybrid ISOs) by whether the partition table has an EFI partition.
//! Absence of either implies legacy boot.

use std::fs::File;
use std::io::Read;

use bootprep_tools::DiskTools;
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{bail, Context};
use color_eyre::Result;
use tracing::{debug, info};

use crate::kind::{extension, ImageKind};

/// Firmware path the VM should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, serde::Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BootMode {
    /// Not determined; the launcher defaults to UEFI
    #[default]
    Unset,
    /// BIOS/MBR boot
    Legacy,
    /// UEFI boot
    Uefi,
}

/// The boot mode decided so far in a run.
///
/// The first decisive signal wins: once set, later updates are ignored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootState {
    mode: BootMode,
}

impl BootState {
    /// Apply an update produced by the classifier.
    pub fn apply(&mut self, update: Option<BootMode>) {
        if self.mode != BootMode::Unset {
            return;
        }
        if let Some(mode) = update {
            self.mode = mode;
        }
    }

    /// Current boot mode.
    pub fn mode(&self) -> BootMode {
        self.mode
    }
}

/// Result of inspecting a candidate without touching it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Inspection {
    /// Kind derived from the extension
    pub kind: ImageKind,
    /// Lower-cased extension
    pub extension: String,
    /// Boot mode implied by the image structure, if any
    pub mode: Option<BootMode>,
}

/// An accepted image at its final location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Where the image lives now
    pub path: Utf8PathBuf,
    /// Boot mode implied by the image structure, if any
    pub mode: Option<BootMode>,
}

/// Inspects candidates and moves accepted ones to `boot.<ext>` in storage.
pub struct Classifier<'a> {
    tools: &'a dyn DiskTools,
    storage: &'a Utf8Path,
    root: &'a Utf8Path,
    forced: bool,
}

impl std::fmt::Debug for Classifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("storage", &self.storage)
            .field("root", &self.root)
            .field("forced", &self.forced)
            .finish()
    }
}

/// Read the two bytes at offset 510, where an MBR keeps its signature;
/// `None` when the file is too short to have them.
fn boot_signature(path: &Utf8Path) -> Result<Option<[u8; 2]>> {
    let f = File::open(path).with_context(|| format!("Opening {path}"))?;
    let mut head = Vec::with_capacity(512);
    f.take(512)
        .read_to_end(&mut head)
        .with_context(|| format!("Reading {path}"))?;
    Ok(match head.get(510..512) {
        Some(&[a, b]) => Some([a, b]),
        _ => None,
    })
}

impl<'a> Classifier<'a> {
    /// Create a classifier; `forced` skips structural inspection entirely.
    pub fn new(
        tools: &'a dyn DiskTools,
        storage: &'a Utf8Path,
        root: &'a Utf8Path,
        forced: bool,
    ) -> Self {
        Self {
            tools,
            storage,
            root,
            forced,
        }
    }

    /// Inspect `path`; `Ok(None)` means it is not a usable boot image.
    pub fn inspect(&self, path: &Utf8Path) -> Result<Option<Inspection>> {
        match std::fs::metadata(path) {
            Ok(m) if m.is_file() && m.len() > 0 => {}
            _ => return Ok(None),
        }
        let Some(ext) = extension(path) else {
            return Ok(None);
        };
        let Some(kind) = ImageKind::from_extension(&ext).filter(|k| k.is_bootable()) else {
            return Ok(None);
        };

        if self.forced || kind == ImageKind::Qcow2 {
            return Ok(Some(Inspection {
                kind,
                extension: ext,
                mode: None,
            }));
        }

        let efi = if kind == ImageKind::Iso && boot_signature(path)? != Some([0, 0]) {
            let listing = self.tools.list_iso(path)?;
            if listing.trim().is_empty() {
                bail!("Failed to read ISO file {path}, invalid format!");
            }
            listing
                .to_uppercase()
                .lines()
                .any(|l| l.trim_start().starts_with("/EFI"))
        } else {
            self.tools
                .list_partitions(path)?
                .to_uppercase()
                .contains("EFI ")
        };
        debug!("{path}: EFI structures present: {efi}");

        Ok(Some(Inspection {
            kind,
            extension: ext,
            mode: (!efi).then_some(BootMode::Legacy),
        }))
    }

    /// Inspect `path` and, if accepted, move it to its canonical name.
    pub fn classify(&self, path: &Utf8Path) -> Result<Option<Classification>> {
        let Some(inspection) = self.inspect(path)? else {
            return Ok(None);
        };
        let path = self.relocate(path, &inspection.extension)?;
        info!("Using boot image {path}");
        Ok(Some(Classification {
            path,
            mode: inspection.mode,
        }))
    }

    /// Move an accepted image to `storage/boot.<ext>`.
    ///
    /// Bind-mounted `boot.<ext>` and `custom.<ext>` at the root stay put,
    /// as they may be read-only.
    fn relocate(&self, path: &Utf8Path, ext: &str) -> Result<Utf8PathBuf> {
        let target = self.storage.join(format!("boot.{ext}"));
        if path == target {
            return Ok(target);
        }
        if path.parent() == Some(self.root) {
            let name = path.file_name().unwrap_or_default().to_ascii_lowercase();
            if name == format!("boot.{ext}") || name == format!("custom.{ext}") {
                return Ok(path.to_owned());
            }
        }
        std::fs::rename(path, &target)
            .with_context(|| format!("Failed to move {path} to {target}"))?;
        Ok(target)
    }
}
