//! Classification of candidate files by extension.
//!
//! Every decision about what to do with a file (inspect, unpack, convert)
//! is taken on [`ImageKind`] rather than on extension strings.

use bootprep_tools::DiskFormat;
use camino::Utf8Path;

/// What a file is, judged purely from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ImageKind {
    /// `.img` or `.raw`
    Raw,
    /// `.qcow2`
    Qcow2,
    /// `.iso`
    Iso,
    /// `.vdi`
    Vdi,
    /// `.vhd`
    Vpc,
    /// `.vhdx`
    Vhdx,
    /// `.vmdk`
    Vmdk,
    /// `.gz` / `.gzip`
    GzipStream,
    /// `.xz`
    XzStream,
    /// `.7z`, `.zip`, `.rar`, `.lzma`, `.bz`, `.bz2`
    Container,
}

/// Lower-cased extension of `path`, if any.
pub fn extension(path: &Utf8Path) -> Option<String> {
    path.extension().map(|e| e.to_ascii_lowercase())
}

impl ImageKind {
    /// Classify from a bare extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let kind = match ext.to_ascii_lowercase().as_str() {
            "img" | "raw" => ImageKind::Raw,
            "qcow2" => ImageKind::Qcow2,
            "iso" => ImageKind::Iso,
            "vdi" => ImageKind::Vdi,
            "vhd" => ImageKind::Vpc,
            "vhdx" => ImageKind::Vhdx,
            "vmdk" => ImageKind::Vmdk,
            "gz" | "gzip" => ImageKind::GzipStream,
            "xz" => ImageKind::XzStream,
            "7z" | "zip" | "rar" | "lzma" | "bz" | "bz2" => ImageKind::Container,
            _ => return None,
        };
        Some(kind)
    }

    /// Classify a path by its extension.
    pub fn of(path: &Utf8Path) -> Option<Self> {
        path.extension().and_then(Self::from_extension)
    }

    /// Formats that can be booted directly without conversion.
    pub fn is_bootable(self) -> bool {
        matches!(self, ImageKind::Raw | ImageKind::Qcow2 | ImageKind::Iso)
    }

    /// Compressed streams and archives that must be unpacked first.
    pub fn is_packed(self) -> bool {
        matches!(
            self,
            ImageKind::GzipStream | ImageKind::XzStream | ImageKind::Container
        )
    }

    /// Any virtual disk image, bootable or foreign.
    pub fn is_disk_image(self) -> bool {
        !self.is_packed()
    }

    /// The converter format for disk images; `None` for ISO and packed files.
    pub fn disk_format(self) -> Option<DiskFormat> {
        match self {
            ImageKind::Raw => Some(DiskFormat::Raw),
            ImageKind::Qcow2 => Some(DiskFormat::Qcow2),
            ImageKind::Vdi => Some(DiskFormat::Vdi),
            ImageKind::Vpc => Some(DiskFormat::Vpc),
            ImageKind::Vhdx => Some(DiskFormat::Vhdx),
            ImageKind::Vmdk => Some(DiskFormat::Vmdk),
            ImageKind::Iso
            | ImageKind::GzipStream
            | ImageKind::XzStream
            | ImageKind::Container => None,
        }
    }
}
