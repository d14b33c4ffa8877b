//! Integration tests for bootprep
//!
//! These drive an installed `bootprep` binary (see `BOOTPREP_PATH`) against
//! images created with the real host tools.

use camino::{Utf8Path, Utf8PathBuf};

use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};
use serde_json::Value;
use tempfile::TempDir;
use xshell::{cmd, Shell};

/// A test registered with [`integration_test!`].
#[derive(Debug)]
pub(crate) struct IntegrationTest {
    pub(crate) name: &'static str,
    pub(crate) f: fn() -> Result<()>,
}

#[linkme::distributed_slice]
pub(crate) static INTEGRATION_TESTS: [IntegrationTest];

/// Register a `fn() -> Result<()>` as an integration test.
macro_rules! integration_test {
    ($fn:ident) => {
        ::paste::paste! {
            #[::linkme::distributed_slice($crate::INTEGRATION_TESTS)]
            static [<INTEGRATION_TEST_ $fn:upper>]: $crate::IntegrationTest =
                $crate::IntegrationTest {
                    name: stringify!($fn),
                    f: $fn,
                };
        }
    };
}
pub(crate) use integration_test;

mod tests {
    pub mod inspect;
    pub mod resolve;
}

/// Create a new xshell Shell for running commands
pub(crate) fn shell() -> Result<Shell> {
    Shell::new().map_err(|e| eyre!("Failed to create shell: {}", e))
}

/// Get the path to the bootprep binary, checking BOOTPREP_PATH first, then falling back to "bootprep"
pub(crate) fn get_bootprep_command() -> Result<String> {
    if let Ok(path) = std::env::var("BOOTPREP_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/bootprep", "target/release/bootprep"]
        .into_iter()
        .find(|p| Utf8Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set BOOTPREP_PATH={path} to run using this binary"
        ));
    }
    Ok("bootprep".to_owned())
}

/// A root and a storage directory for one run.
pub(crate) struct Workspace {
    _td: TempDir,
    pub(crate) root: Utf8PathBuf,
    pub(crate) storage: Utf8PathBuf,
}

impl Workspace {
    pub(crate) fn new() -> Result<Self> {
        let td = tempfile::tempdir()?;
        let base = Utf8PathBuf::try_from(td.path().to_owned())?;
        let root = base.join("root");
        let storage = base.join("storage");
        std::fs::create_dir(&root)?;
        std::fs::create_dir(&storage)?;
        Ok(Self {
            _td: td,
            root,
            storage,
        })
    }

    /// Run `bootprep resolve --json` with `boot`, returning the parsed output.
    pub(crate) fn resolve(&self, sh: &Shell, boot: &str) -> Result<Value> {
        let bin = get_bootprep_command()?;
        let stdout = cmd!(sh, "{bin} resolve --json")
            .env("BOOT", boot)
            .env("STORAGE", &self.storage)
            .env("BOOTPREP_ROOT", &self.root)
            .read()?;
        serde_json::from_str(&stdout).context("Failed to parse JSON output")
    }

    /// Run `bootprep resolve`, expecting it to fail; returns the exit code.
    pub(crate) fn resolve_failure(&self, sh: &Shell, boot: &str) -> Result<i32> {
        let bin = get_bootprep_command()?;
        let output = cmd!(sh, "{bin} resolve")
            .env("BOOT", boot)
            .env("STORAGE", &self.storage)
            .env("BOOTPREP_ROOT", &self.root)
            .ignore_status()
            .output()?;
        if output.status.success() {
            return Err(eyre!("bootprep unexpectedly succeeded for BOOT={boot}"));
        }
        output
            .status
            .code()
            .ok_or_else(|| eyre!("bootprep was killed by a signal"))
    }
}

fn main() {
    let args = Arguments::from_args();

    let tests: Vec<Trial> = INTEGRATION_TESTS
        .iter()
        .map(|test| {
            let f = test.f;
            Trial::test(test.name, move || f().map_err(|e| format!("{:?}", e).into()))
        })
        .collect();

    // Run the tests and exit with the result
    libtest_mimic::run(&args, tests).exit();
}
