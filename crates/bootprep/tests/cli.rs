//! Tests driving the bootprep binary against temporary directories.

use std::process::{Command, Output};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Result;
use tempfile::TempDir;

struct Dirs {
    _td: TempDir,
    root: Utf8PathBuf,
    storage: Utf8PathBuf,
}

fn dirs() -> Result<Dirs> {
    let td = tempfile::tempdir()?;
    let base = Utf8PathBuf::try_from(td.path().to_owned())?;
    let root = base.join("root");
    let storage = base.join("storage");
    std::fs::create_dir(&root)?;
    std::fs::create_dir(&storage)?;
    Ok(Dirs {
        _td: td,
        root,
        storage,
    })
}

fn bootprep_with_env(d: &Dirs, env: &[(&str, &str)], args: &[&str]) -> Result<Output> {
    let out = Command::new(env!("CARGO_BIN_EXE_bootprep"))
        .args(args)
        .env_clear()
        .env("PATH", std::env::var_os("PATH").unwrap_or_default())
        .env("STORAGE", &d.storage)
        .env("BOOTPREP_ROOT", &d.root)
        .envs(env.iter().copied())
        .output()?;
    Ok(out)
}

fn bootprep(d: &Dirs, boot: &str, args: &[&str]) -> Result<Output> {
    bootprep_with_env(d, &[("BOOT", boot)], args)
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn test_local_qcow2() -> Result<()> {
    let d = dirs()?;
    std::fs::write(d.storage.join("boot.qcow2"), b"QFI\xfb")?;
    let out = bootprep(&d, "", &["resolve"])?;
    assert!(out.status.success(), "{out:?}");
    let path = d.storage.join("boot.qcow2");
    let expected = format!("BOOT={}\nBOOT_MODE=''\n", shlex::try_quote(path.as_str())?);
    similar_asserts::assert_eq!(stdout(&out), expected);
    Ok(())
}

#[test]
fn test_forced_mode_is_published() -> Result<()> {
    let d = dirs()?;
    std::fs::write(d.root.join("boot.img"), vec![0u8; 4096])?;
    let envfile = d.storage.join("boot.env");
    let out = bootprep_with_env(
        &d,
        &[("BOOT_MODE", "legacy")],
        &["resolve", "--json", "--output", envfile.as_str()],
    )?;
    assert!(out.status.success(), "{out:?}");
    let v: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    // Accepted in place at the root
    assert_eq!(v["boot"], d.root.join("boot.img").as_str());
    assert_eq!(v["boot_mode"], "legacy");
    let env = std::fs::read_to_string(&envfile)?;
    assert!(env.ends_with("BOOT_MODE=legacy\n"), "{env}");
    Ok(())
}

#[test]
fn test_invalid_boot_exit_code() -> Result<()> {
    let d = dirs()?;
    let out = bootprep(&d, "not-a-distro", &["resolve"])?;
    assert_eq!(out.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("is not recognized"), "{stderr}");
    Ok(())
}

#[test]
fn test_unbacked_bind_exit_code() -> Result<()> {
    let d = dirs()?;
    if ["/disk", "/disk1", "/dev/disk1"]
        .iter()
        .any(|p| Utf8Path::new(p).exists())
    {
        return Ok(());
    }
    std::fs::create_dir(d.root.join("boot.iso"))?;
    let out = bootprep(&d, "", &["resolve"])?;
    assert_eq!(out.status.code(), Some(37));
    Ok(())
}

#[test]
fn test_inspect_json() -> Result<()> {
    let d = dirs()?;
    let path = d.storage.join("disk.qcow2");
    std::fs::write(&path, b"QFI\xfb")?;
    let out = bootprep(&d, "", &["inspect", "--json", path.as_str()])?;
    assert!(out.status.success(), "{out:?}");
    let v: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(v["kind"], "qcow2");
    assert!(v["mode"].is_null());
    // Inspection never moves the file
    assert!(path.exists());
    Ok(())
}

#[test]
#[ignore] // Requires qemu-img and sfdisk
fn test_local_raw_without_partitions_is_legacy() -> Result<()> {
    let d = dirs()?;
    let image = d.storage.join("boot.img");
    let status = Command::new("qemu-img")
        .args(["create", "-f", "raw", image.as_str(), "16M"])
        .status()?;
    assert!(status.success());
    let out = bootprep(&d, "", &["resolve"])?;
    assert!(out.status.success(), "{out:?}");
    assert!(stdout(&out).ends_with("BOOT_MODE=legacy\n"));
    Ok(())
}
