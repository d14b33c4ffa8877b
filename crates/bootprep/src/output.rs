//! The values handed to the VM launcher.

use camino::Utf8Path;
use cap_std_ext::cap_std;
use cap_std_ext::cap_std::fs::Dir;
use cap_std_ext::dirext::CapStdExtDirExt;
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use serde::Serialize;

use crate::classify::BootMode;
use crate::resolve::{BootTarget, Outcome};

/// Published in place of a path when an attached disk is the boot medium.
pub const NO_IMAGE: &str = "none";

/// Final boot medium and boot mode, as the launcher consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    /// Image path, or [`NO_IMAGE`]
    pub boot: String,
    /// `legacy`, a forced mode, or empty for the UEFI default
    pub boot_mode: String,
}

impl Published {
    /// Render `outcome`; a forced boot mode is passed through verbatim.
    pub fn new(outcome: &Outcome, forced_mode: Option<&str>) -> Self {
        let boot = match &outcome.boot {
            BootTarget::File(path) => path.to_string(),
            BootTarget::Device => NO_IMAGE.to_owned(),
        };
        let boot_mode = match (forced_mode, outcome.mode) {
            (Some(forced), _) => forced.to_owned(),
            (None, BootMode::Unset) => String::new(),
            (None, mode) => mode.to_string(),
        };
        Self { boot, boot_mode }
    }

    /// Shell-sourceable `KEY=value` lines.
    pub fn to_env(&self) -> Result<String> {
        let mut out = String::new();
        for (key, value) in [("BOOT", &self.boot), ("BOOT_MODE", &self.boot_mode)] {
            let quoted = shlex::try_quote(value).with_context(|| format!("Quoting {key}"))?;
            out.push_str(&format!("{key}={quoted}\n"));
        }
        Ok(out)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Atomically replace `path` with the env rendering.
    pub fn write_env_file(&self, path: &Utf8Path) -> Result<()> {
        let name = path
            .file_name()
            .ok_or_else(|| eyre!("Invalid output path: {path}"))?;
        let parent = match path.parent() {
            Some(p) if !p.as_str().is_empty() => p,
            _ => Utf8Path::new("."),
        };
        let dir = Dir::open_ambient_dir(parent, cap_std::ambient_authority())
            .with_context(|| format!("Opening {parent}"))?;
        dir.atomic_write(name, self.to_env()?)
            .with_context(|| format!("Writing {path}"))?;
        Ok(())
    }
}
