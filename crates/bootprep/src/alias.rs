//! Mapping of distribution aliases (like `alpine`) to download URLs.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::Deserialize;

/// The alias used when BOOT is empty or still a placeholder.
pub const DEFAULT_ALIAS: &str = "alpine";

const FEDORA_CLOUD: &str = "https://download.fedoraproject.org/pub/fedora/linux/releases/42/Cloud/x86_64/images/Fedora-Cloud-Base-Generic-42-1.1.x86_64.qcow2";

/// Built-in aliases: key, display name, URL.
const BUILTIN: &[(&str, &str, &str)] = &[
    (
        "alpine",
        "Alpine Linux",
        "https://dl-cdn.alpinelinux.org/alpine/v3.22/releases/x86_64/alpine-virt-3.22.0-x86_64.iso",
    ),
    (
        "debian",
        "Debian",
        "https://cdimage.debian.org/debian-cd/current/amd64/iso-cd/debian-13.1.0-amd64-netinst.iso",
    ),
    (
        "ubuntu",
        "Ubuntu Server",
        "https://releases.ubuntu.com/24.04/ubuntu-24.04.3-live-server-amd64.iso",
    ),
    (
        "fedora",
        "Fedora Server",
        "https://download.fedoraproject.org/pub/fedora/linux/releases/42/Server/x86_64/iso/Fedora-Server-netinst-x86_64-42-1.1.iso",
    ),
    ("fedora-cloud", "Fedora Cloud", FEDORA_CLOUD),
];

/// A resolved alias.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Alias {
    /// Human-readable distribution name
    pub name: String,
    /// Download URL
    pub url: String,
}

/// The alias lookup service.
pub trait ResolveAlias {
    /// Look up `spec`; `Ok(None)` means it is not an alias.
    fn resolve(&self, spec: &str) -> Result<Option<Alias>>;
}

/// Built-in aliases, optionally extended (and overridden) by a YAML file
/// mapping keys to `{name, url}`.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    extra: Option<Utf8PathBuf>,
}

impl AliasTable {
    /// Create a table, reading `extra` lazily on each lookup.
    pub fn new(extra: Option<Utf8PathBuf>) -> Self {
        Self { extra }
    }

    fn load_extra(path: &Utf8Path) -> Result<BTreeMap<String, Alias>> {
        let buf = std::fs::read_to_string(path).with_context(|| format!("Reading {path}"))?;
        let entries: BTreeMap<String, Alias> =
            serde_yaml::from_str(&buf).with_context(|| format!("Parsing {path}"))?;
        Ok(entries
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect())
    }
}

impl ResolveAlias for AliasTable {
    fn resolve(&self, spec: &str) -> Result<Option<Alias>> {
        let key = spec.trim().to_ascii_lowercase();
        if let Some(path) = self.extra.as_deref() {
            if let Some(alias) = Self::load_extra(path)?.remove(&key) {
                return Ok(Some(alias));
            }
        }
        Ok(BUILTIN
            .iter()
            .find(|(k, _, _)| *k == key)
            .map(|(_, name, url)| Alias {
                name: (*name).to_owned(),
                url: (*url).to_owned(),
            }))
    }
}
