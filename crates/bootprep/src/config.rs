//! Runtime configuration, read from flags or the container environment.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;

use bootprep_tools::DiskFormat;

/// Devices whose presence means a boot disk is attached directly.
pub const DEFAULT_DISK_DEVICES: &[&str] = &["/disk", "/disk1", "/dev/disk1"];

/// Target format for converted images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TargetFormat {
    /// Raw image with extension `img`
    Raw,
    /// qcow2 image with extension `qcow2`
    Qcow2,
}

impl TargetFormat {
    /// Extension of the converted file.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Raw => "img",
            TargetFormat::Qcow2 => "qcow2",
        }
    }

    /// Format passed to the converter.
    pub fn disk_format(self) -> DiskFormat {
        match self {
            TargetFormat::Raw => DiskFormat::Raw,
            TargetFormat::Qcow2 => DiskFormat::Qcow2,
        }
    }
}

/// How converted images reserve their backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Allocation {
    /// Allocate blocks lazily as they are written
    #[default]
    Sparse,
    /// Reserve the whole virtual size up front
    Full,
}

impl std::str::FromStr for Allocation {
    type Err = color_eyre::eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "n" | "no" | "sparse" | "off" => Ok(Allocation::Sparse),
            "y" | "yes" | "full" | "on" => Ok(Allocation::Full),
            o => Err(eyre!("Invalid allocation mode: {o}")),
        }
    }
}

/// Options for resolving the boot image.
#[derive(Debug, Clone, clap::Args)]
pub struct Config {
    /// Local file name, distribution alias or URL of the boot image
    #[clap(long, env = "BOOT", default_value = "")]
    pub boot: String,

    /// Directory holding downloaded and converted images
    #[clap(long, env = "STORAGE", default_value = "/storage")]
    pub storage: Utf8PathBuf,

    /// Directory searched for bind-mounted `boot.*` and `custom.*` files
    #[clap(long, env = "BOOTPREP_ROOT", default_value = "/", hide = true)]
    pub root: Utf8PathBuf,

    /// Format of images converted from foreign disk formats
    #[clap(long, env = "DISK_FMT", value_enum, ignore_case = true, default_value = "raw")]
    pub disk_format: TargetFormat,

    /// Preallocation of converted images (sparse or full)
    #[clap(long, env = "ALLOCATE", default_value = "sparse")]
    pub allocate: Allocation,

    /// Extra comma-separated creation options for qcow2 images
    #[clap(long, env = "DISK_FLAGS")]
    pub disk_flags: Option<String>,

    /// Force the boot mode instead of detecting it from the image
    #[clap(long, env = "BOOT_MODE")]
    pub boot_mode: Option<String>,

    /// Owner applied to prepared images
    #[clap(long, env = "UID")]
    pub uid: Option<u32>,

    /// Group applied to prepared images
    #[clap(long, env = "GID")]
    pub gid: Option<u32>,

    /// Additional block devices that count as an attached boot disk
    #[clap(long = "disk-device", env = "DEVICE", value_delimiter = ',')]
    pub disk_devices: Vec<Utf8PathBuf>,

    /// YAML file with extra distribution aliases
    #[clap(long, env = "BOOT_ALIASES")]
    pub aliases: Option<Utf8PathBuf>,
}

impl Config {
    /// The forced boot mode, if a non-empty one was configured.
    pub fn forced_boot_mode(&self) -> Option<&str> {
        self.boot_mode.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    /// Extra qcow2 options, if non-empty.
    pub fn extra_disk_flags(&self) -> Option<&str> {
        self.disk_flags.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    /// Every device path consulted when looking for an attached boot disk.
    pub fn all_disk_devices(&self) -> impl Iterator<Item = &Utf8Path> {
        DEFAULT_DISK_DEVICES
            .iter()
            .map(|p| Utf8Path::new(*p))
            .chain(self.disk_devices.iter().map(|p| p.as_path()))
    }

    #[cfg(test)]
    pub(crate) fn for_test(root: &Utf8Path, storage: &Utf8Path, boot: &str) -> Self {
        Config {
            boot: boot.to_owned(),
            storage: storage.to_owned(),
            root: root.to_owned(),
            disk_format: TargetFormat::Raw,
            allocate: Allocation::Sparse,
            disk_flags: None,
            boot_mode: None,
            uid: None,
            gid: None,
            disk_devices: Vec::new(),
            aliases: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_parse() {
        assert_eq!("Y".parse::<Allocation>().unwrap(), Allocation::Full);
        assert_eq!("full".parse::<Allocation>().unwrap(), Allocation::Full);
        assert_eq!("N".parse::<Allocation>().unwrap(), Allocation::Sparse);
        assert_eq!("".parse::<Allocation>().unwrap(), Allocation::Sparse);
        assert!("maybe".parse::<Allocation>().is_err());
    }

    #[test]
    fn test_target_format() {
        assert_eq!(TargetFormat::Raw.extension(), "img");
        assert_eq!(TargetFormat::Qcow2.disk_format(), DiskFormat::Qcow2);
    }

    #[test]
    fn test_forced_mode_blank_is_unset() {
        let mut c = Config::for_test(Utf8Path::new("/"), Utf8Path::new("/storage"), "");
        c.boot_mode = Some("  ".into());
        assert_eq!(c.forced_boot_mode(), None);
        c.boot_mode = Some("uefi".into());
        assert_eq!(c.forced_boot_mode(), Some("uefi"));
        assert_eq!(c.all_disk_devices().count(), 3);
    }
}
