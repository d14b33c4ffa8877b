//! Fakes shared by the unit tests.

use std::cell::RefCell;

use bootprep_tools::{AllocateMode, ConvertRequest, DiskTools, FsInfo};
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use tempfile::TempDir;

use crate::classify::Classifier;

/// A root and a storage directory inside a temporary directory.
pub(crate) struct Fixture {
    _td: TempDir,
    pub(crate) root: Utf8PathBuf,
    pub(crate) storage: Utf8PathBuf,
}

impl Fixture {
    pub(crate) fn new() -> Result<Self> {
        let td = tempfile::tempdir()?;
        let base = Utf8Path::from_path(td.path())
            .ok_or_else(|| eyre!("non-UTF-8 tempdir"))?
            .to_owned();
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

    pub(crate) fn classifier<'a>(&'a self, tools: &'a FakeTools, forced: bool) -> Classifier<'a> {
        Classifier::new(tools, &self.storage, &self.root, forced)
    }

    /// Names of the regular files in storage, sorted.
    pub(crate) fn storage_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for e in self.storage.read_dir_utf8()? {
            let e = e?;
            names.push(e.file_name().to_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// [`DiskTools`] returning canned outputs and recording what was called.
pub(crate) struct FakeTools {
    pub(crate) iso_listing: String,
    pub(crate) partitions: String,
    pub(crate) virtual_size: u64,
    pub(crate) fs: FsInfo,
    pub(crate) nocow: bool,
    pub(crate) fail_convert: bool,
    pub(crate) fail_native_allocate: bool,
    pub(crate) fail_posix_allocate: bool,
    /// Files (relative path, content) produced by `unpack`
    pub(crate) archive: Vec<(String, Vec<u8>)>,
    pub(crate) calls: RefCell<Vec<String>>,
    pub(crate) requests: RefCell<Vec<ConvertRequest>>,
}

impl Default for FakeTools {
    fn default() -> Self {
        Self {
            iso_listing: String::new(),
            partitions: String::new(),
            virtual_size: 1024 * 1024,
            fs: FsInfo {
                available: u64::MAX,
                cow: false,
            },
            nocow: false,
            fail_convert: false,
            fail_native_allocate: false,
            fail_posix_allocate: false,
            archive: Vec::new(),
            calls: RefCell::new(Vec::new()),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl FakeTools {
    /// Tools reporting an EFI system partition on every image.
    pub(crate) fn efi() -> Self {
        Self {
            partitions: "Device Start End Sectors Size Type\ndisk1 2048 206847 204800 100M EFI System\n"
                .into(),
            iso_listing: "/EFI\n/EFI/BOOT\n".into(),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn requests(&self) -> Vec<ConvertRequest> {
        self.requests.borrow().clone()
    }

    fn record(&self, call: &str) {
        self.calls.borrow_mut().push(call.to_owned());
    }
}

impl DiskTools for FakeTools {
    fn list_iso(&self, _image: &Utf8Path) -> Result<String> {
        self.record("list_iso");
        Ok(self.iso_listing.clone())
    }

    fn list_partitions(&self, _image: &Utf8Path) -> Result<String> {
        self.record("list_partitions");
        Ok(self.partitions.clone())
    }

    fn virtual_size(&self, _image: &Utf8Path) -> Result<u64> {
        self.record("virtual_size");
        Ok(self.virtual_size)
    }

    fn convert(&self, request: &ConvertRequest) -> Result<()> {
        self.record("convert");
        self.requests.borrow_mut().push(request.clone());
        if self.fail_convert {
            std::fs::write(&request.target, b"partial")?;
            bail!("qemu-img: error while writing sector");
        }
        std::fs::copy(&request.source, &request.target)?;
        Ok(())
    }

    fn allocate(&self, _path: &Utf8Path, len: u64, mode: AllocateMode) -> Result<()> {
        self.record(&format!("allocate {mode:?} {len}"));
        let fail = match mode {
            AllocateMode::Native => self.fail_native_allocate,
            AllocateMode::Posix => self.fail_posix_allocate,
        };
        if fail {
            bail!("fallocate: Operation not supported");
        }
        Ok(())
    }

    fn filesystem(&self, _dir: &Utf8Path) -> Result<FsInfo> {
        Ok(self.fs)
    }

    fn nocow(&self, _path: &Utf8Path) -> Result<bool> {
        self.record("nocow");
        Ok(self.nocow)
    }

    fn unpack(&self, _archive: &Utf8Path, dest: &Utf8Path) -> Result<()> {
        self.record("unpack");
        for (name, content) in &self.archive {
            let path = dest.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        Ok(())
    }
}
