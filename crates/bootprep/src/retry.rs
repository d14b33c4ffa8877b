//! Download retry policy and the countdown shown between attempts.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Waits before each download attempt, in seconds.
const DOWNLOAD_WAITS: [u64; 3] = [0, 5, 10];

/// One attempt of a retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: usize,
    /// Time to wait before starting this attempt
    pub wait: Duration,
}

/// An ordered list of waits, one per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    waits: Vec<Duration>,
}

impl RetrySchedule {
    /// Build a schedule from explicit waits.
    pub fn new(waits: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            waits: waits.into_iter().collect(),
        }
    }

    /// Three attempts, waiting 0, 5 and 10 seconds beforehand.
    pub fn download() -> Self {
        Self::new(DOWNLOAD_WAITS.into_iter().map(Duration::from_secs))
    }

    /// Total number of attempts.
    pub fn total(&self) -> usize {
        self.waits.len()
    }

    /// Iterate over the attempts in order.
    pub fn attempts(&self) -> impl Iterator<Item = Attempt> + '_ {
        self.waits.iter().enumerate().map(|(i, wait)| Attempt {
            number: i + 1,
            wait: *wait,
        })
    }
}

/// Blocks between attempts, telling the user why.
pub trait Pause {
    /// Wait for `wait`; `reason` completes the sentence "… in N seconds".
    fn pause(&self, wait: Duration, reason: &str);
}

/// Sleeps while counting down on a spinner.
#[derive(Debug, Default, Clone, Copy)]
pub struct Countdown;

impl Pause for Countdown {
    fn pause(&self, wait: Duration, reason: &str) {
        let secs = wait.as_secs();
        info!("{reason} in {secs} seconds...");
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            bar.set_style(style);
        }
        for remaining in (1..=secs).rev() {
            bar.set_message(format!("{reason} in {remaining} seconds..."));
            bar.tick();
            std::thread::sleep(Duration::from_secs(1));
        }
        std::thread::sleep(wait.saturating_sub(Duration::from_secs(secs)));
        bar.finish_and_clear();
    }
}
