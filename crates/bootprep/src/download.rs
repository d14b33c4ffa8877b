//! Fetching boot images over HTTP(S).
//!
//! A single call to [`download`] is one attempt: it transfers the URL into
//! storage (resuming a partial file when the server allows it), watches the
//! destination with a progress reporter, and rejects results too small to
//! be a disk image. Retrying is the caller's business.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tracing::{debug, info};

/// Anything smaller than this cannot be a usable boot image.
pub const MIN_IMAGE_SIZE: u64 = 100_000;

/// How long to wait for the server to accept a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a download attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Writing the file ran out of space.
    #[error("not enough free space on the storage device")]
    DiskFull(#[source] std::io::Error),
    /// The server could not be reached or the connection broke.
    #[error("network failure")]
    Network(#[source] BoxError),
    /// The server answered with an error status.
    #[error("server returned HTTP status {0}")]
    Server(u16),
    /// The transfer completed but the file is too small to be an image.
    #[error("downloaded file is invalid ({0} bytes)")]
    Invalid(u64),
    /// Anything else.
    #[error("download failed")]
    Other(#[source] BoxError),
}

impl DownloadError {
    fn from_io(e: std::io::Error) -> Self {
        if e.raw_os_error() == Some(libc::ENOSPC) {
            DownloadError::DiskFull(e)
        } else if e
            .get_ref()
            .is_some_and(|inner| inner.is::<reqwest::Error>())
        {
            DownloadError::Network(Box::new(e))
        } else {
            DownloadError::Other(Box::new(e))
        }
    }
}

/// Moves the bytes of a URL into a local file.
pub trait Transfer {
    /// Transfer `url` into `dest`, continuing a partial `dest` if present.
    fn transfer(&self, url: &str, dest: &Utf8Path) -> Result<(), DownloadError>;
}

/// [`Transfer`] over HTTP(S) with a fresh connection per call.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    connect_timeout: Duration,
    system_proxy: bool,
}

impl Default for HttpTransfer {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            system_proxy: true,
        }
    }
}

impl Transfer for HttpTransfer {
    fn transfer(&self, url: &str, dest: &Utf8Path) -> Result<(), DownloadError> {
        let mut builder = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(None::<Duration>)
            .pool_max_idle_per_host(0);
        if !self.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| DownloadError::Other(Box::new(e)))?;

        let existing = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
        let mut request = client.get(url);
        if existing > 0 {
            debug!("Resuming {dest} at {existing} bytes");
            request = request.header(RANGE, format!("bytes={existing}-"));
        }
        let mut response = request
            .send()
            .map_err(|e| DownloadError::Network(Box::new(e)))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing > 0 {
            debug!("{dest} is already complete");
            return Ok(());
        }
        if !status.is_success() {
            return Err(DownloadError::Server(status.as_u16()));
        }

        let mut opts = OpenOptions::new();
        opts.create(true);
        if status == StatusCode::PARTIAL_CONTENT {
            opts.append(true);
        } else {
            opts.write(true).truncate(true);
        }
        let mut file = opts.open(dest).map_err(DownloadError::from_io)?;
        std::io::copy(&mut response, &mut file).map_err(DownloadError::from_io)?;
        file.sync_all().map_err(DownloadError::from_io)?;
        Ok(())
    }
}

/// Reports the growth of a file on a spinner from a background thread.
///
/// The reporter is purely advisory; dropping it stops the thread.
#[derive(Debug)]
pub(crate) struct ProgressReporter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub(crate) fn spawn(path: &Utf8Path, message: &str) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let bar = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} {msg} {binary_bytes} ({binary_bytes_per_sec})")
        {
            bar.set_style(style);
        }
        bar.set_message(message.to_owned());
        let path = path.to_owned();
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("download-progress".into())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    if let Ok(meta) = std::fs::metadata(&path) {
                        bar.set_position(meta.len());
                    }
                    bar.tick();
                    std::thread::park_timeout(Duration::from_millis(500));
                }
                bar.finish_and_clear();
            })
            .ok();
        Self { stop, handle }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

/// Download `url` to `storage/base`, showing `label` while it runs.
///
/// On failure the destination is left in place (a partial file may be
/// resumed later, an undersized one must be deleted by the caller).
pub fn download(
    transfer: &dyn Transfer,
    storage: &Utf8Path,
    url: &str,
    base: &str,
    label: &str,
) -> Result<Utf8PathBuf, DownloadError> {
    let dest = storage.join(base);
    info!("Downloading {label}...");
    {
        let _progress = ProgressReporter::spawn(&dest, &format!("Downloading {label}"));
        transfer.transfer(url, &dest)?;
    }
    let size = match std::fs::metadata(&dest) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => 0,
        Err(e) => return Err(DownloadError::from_io(e)),
    };
    if size < MIN_IMAGE_SIZE {
        return Err(DownloadError::Invalid(size));
    }
    Ok(dest)
}
