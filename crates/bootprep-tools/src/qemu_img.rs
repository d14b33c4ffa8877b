//! `qemu-img` argument building and output parsing.

use camino::Utf8PathBuf;
use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::Deserialize;

use crate::DiskFormat;

/// The subset of `qemu-img info --output=json` we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInfo {
    /// Logical size of the disk in bytes
    #[serde(rename = "virtual-size")]
    pub virtual_size: u64,
}

impl ImageInfo {
    /// Parse the JSON document printed by `qemu-img info --output=json`.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Parsing qemu-img info output")
    }
}

/// A single `qemu-img convert` invocation.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Image to read
    pub source: Utf8PathBuf,
    /// Format of the source image
    pub source_format: DiskFormat,
    /// File to write; created or truncated by the converter
    pub target: Utf8PathBuf,
    /// Format to write
    pub target_format: DiskFormat,
    /// Compress the output (only honoured for formats supporting it)
    pub compress: bool,
    /// Creation options passed via `-o`, e.g. `preallocation=falloc`
    pub options: Vec<String>,
}

impl ConvertRequest {
    /// Arguments following `qemu-img convert`.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_owned(),
            self.source_format.to_string(),
            "-O".to_owned(),
            self.target_format.to_string(),
        ];
        if self.compress && self.target_format.supports_compression() {
            args.push("-c".to_owned());
        }
        let options: Vec<&str> = self
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect();
        if !options.is_empty() {
            args.push("-o".to_owned());
            args.push(options.join(","));
        }
        args.push(self.source.to_string());
        args.push(self.target.to_string());
        args
    }
}
