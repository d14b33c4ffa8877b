//! The boot source pipeline: find, fetch, unpack, convert and classify.

use bootprep_tools::DiskTools;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std_ext::cap_std;
use cap_std_ext::cap_std::fs::Dir;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::{Report, Result};
use tracing::{debug, info, warn};

use crate::alias::{ResolveAlias, DEFAULT_ALIAS};
use crate::classify::{BootMode, BootState, Classification, Classifier};
use crate::config::Config;
use crate::convert::{convert, ConversionJob, ConvertOptions};
use crate::download::{download, DownloadError, Transfer};
use crate::errors::Fatal;
use crate::extract::extract;
use crate::kind::{extension, ImageKind};
use crate::retry::{Pause, RetrySchedule};
use crate::utils::{base_name, file_stem, has_disk, purge_stale, remove_if_exists, set_owner};

/// Names looked for before anything is downloaded, highest priority first.
pub const LOCAL_CANDIDATES: &[&str] = &[
    "boot.img",
    "boot.raw",
    "boot.iso",
    "boot.qcow2",
    "custom.iso",
];

/// Substring marking a BOOT value copied verbatim from documentation.
const PLACEHOLDER: &str = "example.com/";

/// What the VM should boot from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootTarget {
    /// An image file
    File(Utf8PathBuf),
    /// A disk attached to the container; there is no image file
    Device,
}

/// The result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Boot medium
    pub boot: BootTarget,
    /// Boot mode derived from the medium
    pub mode: BootMode,
}

/// Strip one layer of quotes and surrounding whitespace from a BOOT value.
///
/// Returns `None` when nothing usable is left, including placeholder URLs.
pub fn normalize_spec(raw: &str) -> Option<String> {
    let s = raw.trim();
    let s = ['"', '\'']
        .iter()
        .find_map(|q| s.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)))
        .unwrap_or(s)
        .trim();
    if s.is_empty() || s.to_ascii_lowercase().contains(PLACEHOLDER) {
        None
    } else {
        Some(s.to_owned())
    }
}

fn fatal(kind: Fatal, msg: String) -> Report {
    Report::new(kind).wrap_err(msg)
}

/// Entries of `path`, or nothing if it is not a readable directory.
fn list_dir(path: &Utf8Path) -> Result<Vec<(String, bool)>> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let dir = Dir::open_ambient_dir(path, cap_std::ambient_authority())
        .with_context(|| format!("Opening {path}"))?;
    let mut entries = Vec::new();
    for entry in dir.entries()? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
            continue;
        };
        // Links may point anywhere on the host, so resolve them by full path
        let full = path.join(&name);
        let meta = match std::fs::metadata(&full) {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping {full}: {e}");
                continue;
            }
        };
        if meta.is_file() || meta.is_dir() {
            entries.push((name, meta.is_dir()));
        }
    }
    Ok(entries)
}

/// Runs the whole boot source resolution.
pub struct Pipeline<'a> {
    config: &'a Config,
    tools: &'a dyn DiskTools,
    transfer: &'a dyn Transfer,
    aliases: &'a dyn ResolveAlias,
    pause: &'a dyn Pause,
    schedule: RetrySchedule,
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline retrying downloads per [`RetrySchedule::download`].
    pub fn new(
        config: &'a Config,
        tools: &'a dyn DiskTools,
        transfer: &'a dyn Transfer,
        aliases: &'a dyn ResolveAlias,
        pause: &'a dyn Pause,
    ) -> Self {
        Self {
            config,
            tools,
            transfer,
            aliases,
            pause,
            schedule: RetrySchedule::download(),
        }
    }

    fn storage(&self) -> &Utf8Path {
        &self.config.storage
    }

    fn classifier(&self) -> Classifier<'_> {
        Classifier::new(
            self.tools,
            &self.config.storage,
            &self.config.root,
            self.config.forced_boot_mode().is_some(),
        )
    }

    /// Resolve the configured boot source into a single boot medium.
    ///
    /// Errors that should end the process with a specific exit code carry a
    /// [`Fatal`] in their chain.
    pub fn run(&self) -> Result<Outcome> {
        let mut state = BootState::default();

        if let Some(boot) = self.search_local(&mut state)? {
            return Ok(Outcome {
                boot,
                mode: state.mode(),
            });
        }

        let spec = normalize_spec(&self.config.boot).unwrap_or_else(|| {
            warn!("No value specified for BOOT, using default \"{DEFAULT_ALIAS}\"");
            DEFAULT_ALIAS.to_owned()
        });

        let (url, label) = match self.aliases.resolve(&spec).wrap_err(Fatal::Alias)? {
            Some(alias) => {
                debug!("Alias {spec} resolved to {}", alias.url);
                (alias.url, Some(alias.name))
            }
            None => (spec, None),
        };
        validate(&url)?;

        let path = self.acquire(&url, label.as_deref())?;
        let path = extract(self.tools, self.storage(), &path).wrap_err(Fatal::Extraction)?;
        let c = self.finish(&path)?;
        state.apply(c.mode);
        Ok(Outcome {
            boot: BootTarget::File(c.path),
            mode: state.mode(),
        })
    }

    /// Look for an image already present at the root or in storage.
    fn search_local(&self, state: &mut BootState) -> Result<Option<BootTarget>> {
        let root = self.config.root.as_path();
        let storage = self.storage();
        let listings = [(root, list_dir(root)?), (storage, list_dir(storage)?)];

        for candidate in LOCAL_CANDIDATES {
            for (dir, entries) in &listings {
                let Some((name, is_dir)) = entries
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(candidate))
                else {
                    continue;
                };
                let path = dir.join(name);
                if *is_dir {
                    if has_disk(self.config.all_disk_devices()) {
                        info!("{path} is a directory, booting from the attached disk");
                        return Ok(Some(BootTarget::Device));
                    }
                    return Err(fatal(
                        Fatal::UnbackedBind,
                        format!("The bind {path} maps to a file that does not exist!"),
                    ));
                }
                let c = self
                    .classifier()
                    .classify(&path)
                    .wrap_err(Fatal::Unreadable)?;
                if let Some(c) = c {
                    state.apply(c.mode);
                    return Ok(Some(BootTarget::File(c.path)));
                }
                debug!("Ignoring unusable {path}");
            }
        }
        Ok(None)
    }

    /// Prepare storage and download `url`, retrying per the schedule.
    fn acquire(&self, url: &str, label: Option<&str>) -> Result<Utf8PathBuf> {
        let storage = self.storage();
        std::fs::create_dir_all(storage)
            .with_context(|| format!("Failed to create directory \"{storage}\""))
            .wrap_err(Fatal::Storage)?;
        for removed in purge_stale(storage)? {
            debug!("Removed stale {removed}");
        }

        let base = base_name(url);
        let dest = storage.join(&base);
        remove_if_exists(&dest)?;
        let label = label.unwrap_or(&base);

        let total = self.schedule.total();
        let mut last: Option<DownloadError> = None;
        for attempt in self.schedule.attempts() {
            if !attempt.wait.is_zero() {
                self.pause.pause(attempt.wait, "Retrying failed download");
            }
            match download(self.transfer, storage, url, &base, label) {
                Ok(path) => return Ok(path),
                Err(e) => {
                    if matches!(e, DownloadError::Invalid(_)) {
                        remove_if_exists(&dest)?;
                    }
                    warn!("Download attempt {} of {total} failed: {e}", attempt.number);
                    last = Some(e);
                }
            }
        }

        remove_if_exists(&dest)?;
        let cause = last.map_or_else(|| eyre!("No download attempts allowed"), Report::new);
        Err(cause
            .wrap_err(format!("Failed to download {url}"))
            .wrap_err(Fatal::DownloadExhausted))
    }

    /// Classify a downloaded image, converting foreign formats first.
    fn finish(&self, path: &Utf8Path) -> Result<Classification> {
        let name = path.file_name().unwrap_or(path.as_str());
        let ext = extension(path).unwrap_or_default();
        let kind = ImageKind::from_extension(&ext);
        let (uid, gid) = (self.config.uid, self.config.gid);

        if kind.is_some_and(|k| k.is_bootable()) {
            set_owner(path, uid, gid)?;
            return self
                .classifier()
                .classify(path)
                .and_then(|c| c.ok_or_else(|| eyre!("Not a usable boot image")))
                .wrap_err_with(|| format!("Cannot read file \"{name}\""))
                .wrap_err(Fatal::Unreadable);
        }

        let Some(source_format) = kind.and_then(|k| k.disk_format()) else {
            return Err(fatal(
                Fatal::UnknownExtension,
                format!("Unknown file extension, type \".{ext}\" is not recognized!"),
            ));
        };

        let target = self.config.disk_format;
        let dest = self
            .storage()
            .join(format!("{}.{}", file_stem(name), target.extension()));
        let job = ConversionJob {
            source: path.to_owned(),
            source_format,
            dest: dest.clone(),
            dest_format: target.disk_format(),
        };
        let opts = ConvertOptions {
            allocation: self.config.allocate,
            extra_flags: self.config.extra_disk_flags().map(ToOwned::to_owned),
        };
        convert(self.tools, &job, &opts).wrap_err(Fatal::Conversion)?;
        remove_if_exists(path)?;
        set_owner(&dest, uid, gid)?;

        self.classifier()
            .classify(&dest)
            .and_then(|c| c.ok_or_else(|| eyre!("Not a usable boot image")))
            .wrap_err_with(|| format!("Cannot convert file \"{name}\""))
            .wrap_err(Fatal::ConvertedUnreadable)
    }
}

/// Check that a resolved spec looks like a download URL.
fn validate(spec: &str) -> Result<()> {
    if !spec.contains('.') {
        return Err(fatal(
            Fatal::InvalidBoot,
            format!("Invalid BOOT value specified, shortcut \"{spec}\" is not recognized!"),
        ));
    }
    if !spec.to_ascii_lowercase().starts_with("http") {
        return Err(fatal(
            Fatal::InvalidBoot,
            format!("Invalid BOOT value specified, \"{spec}\" is not a valid URL!"),
        ));
    }
    Ok(())
}
