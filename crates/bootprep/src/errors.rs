//! Fatal pipeline failures and their process exit codes.

use color_eyre::Report;

/// A non-recoverable failure; each maps to a fixed process exit code.
///
/// The pipeline attaches these to reports with `wrap_err`, and the binary
/// recovers them with [`Fatal::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fatal {
    /// The expected image could not be extracted from an archive.
    #[error("failed to extract image from archive")]
    Extraction,
    /// The storage directory could not be created.
    #[error("failed to create storage directory")]
    Storage,
    /// The downloaded file has an extension we cannot handle.
    #[error("unsupported file extension")]
    UnknownExtension,
    /// The alias service failed.
    #[error("failed to resolve boot alias")]
    Alias,
    /// A foreign disk format could not be converted.
    #[error("failed to convert image")]
    Conversion,
    /// The converted image could not be classified.
    #[error("cannot convert file")]
    ConvertedUnreadable,
    /// A bind-mounted directory was found but no disk is attached.
    #[error("bind mount does not map to an existing file")]
    UnbackedBind,
    /// Every download attempt failed.
    #[error("failed to download image")]
    DownloadExhausted,
    /// A native-format image could not be classified.
    #[error("cannot read file")]
    Unreadable,
    /// The BOOT value is missing or invalid.
    #[error("invalid BOOT value")]
    InvalidBoot,
}

impl Fatal {
    /// Process exit code for this failure.
    pub fn code(self) -> i32 {
        match self {
            Fatal::Extraction => 32,
            Fatal::Storage | Fatal::UnknownExtension => 33,
            Fatal::Alias => 34,
            Fatal::Conversion => 35,
            Fatal::ConvertedUnreadable => 36,
            Fatal::UnbackedBind => 37,
            Fatal::DownloadExhausted => 60,
            Fatal::Unreadable => 63,
            Fatal::InvalidBoot => 64,
        }
    }

    /// Find the fatal classification attached to a report, if any.
    pub fn of(report: &Report) -> Option<Fatal> {
        report
            .downcast_ref::<Fatal>()
            .copied()
            .or_else(|| report.chain().find_map(|e| e.downcast_ref::<Fatal>().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::{eyre, WrapErr};

    #[test]
    fn test_codes() {
        assert_eq!(Fatal::Extraction.code(), 32);
        assert_eq!(Fatal::UnknownExtension.code(), 33);
        assert_eq!(Fatal::DownloadExhausted.code(), 60);
        assert_eq!(Fatal::InvalidBoot.code(), 64);
    }

    #[test]
    fn test_recover_from_report() {
        let r: color_eyre::Result<()> = Err(eyre!("disk on fire")).wrap_err(Fatal::Conversion);
        let r = r.wrap_err("Preparing boot image");
        let e = r.unwrap_err();
        assert_eq!(Fatal::of(&e), Some(Fatal::Conversion));
        assert_eq!(Fatal::of(&eyre!("plain")), None);
        assert_eq!(Fatal::of(&Report::new(Fatal::Alias)), Some(Fatal::Alias));
    }
}
