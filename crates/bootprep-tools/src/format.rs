//! Disk image formats understood by the converter.

/// A virtual disk format, displayed as the name `qemu-img` uses for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DiskFormat {
    /// Plain raw image
    Raw,
    /// QEMU copy-on-write v2
    Qcow2,
    /// VirtualBox disk image
    Vdi,
    /// Microsoft VHD (called `vpc` by qemu)
    Vpc,
    /// Microsoft VHDX
    Vhdx,
    /// VMware disk
    Vmdk,
}

impl DiskFormat {
    /// Whether the converter can compress output of this format.
    pub fn supports_compression(self) -> bool {
        self == DiskFormat::Qcow2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qemu_names() {
        assert_eq!(DiskFormat::Vpc.to_string(), "vpc");
        assert_eq!(DiskFormat::Qcow2.to_string(), "qcow2");
        assert_eq!("vhdx".parse::<DiskFormat>().unwrap(), DiskFormat::Vhdx);
        assert!("vhd".parse::<DiskFormat>().is_err());
    }

    #[test]
    fn test_compression() {
        assert!(DiskFormat::Qcow2.supports_compression());
        assert!(!DiskFormat::Raw.supports_compression());
    }
}
