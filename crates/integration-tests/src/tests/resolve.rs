use color_eyre::eyre::eyre;
use color_eyre::Result;
use xshell::cmd;

use crate::{integration_test, shell, Workspace};

fn test_resolve_local_qcow2() -> Result<()> {
    let sh = shell()?;
    let ws = Workspace::new()?;
    let image = ws.storage.join("boot.qcow2");
    cmd!(sh, "qemu-img create -q -f qcow2 {image} 64M").run()?;

    let out = ws.resolve(&sh, "")?;
    assert_eq!(out["boot"], image.as_str());
    assert_eq!(out["boot_mode"], "");
    Ok(())
}
integration_test!(test_resolve_local_qcow2);

fn test_resolve_raw_without_partitions() -> Result<()> {
    let sh = shell()?;
    let ws = Workspace::new()?;
    let image = ws.root.join("custom.iso");
    cmd!(sh, "qemu-img create -q -f raw {image} 16M").run()?;

    let out = ws.resolve(&sh, "")?;
    // Root mounts are used in place
    assert_eq!(out["boot"], image.as_str());
    assert_eq!(out["boot_mode"], "legacy");
    Ok(())
}
integration_test!(test_resolve_raw_without_partitions);

fn test_resolve_raw_with_efi_partition() -> Result<()> {
    let sh = shell()?;
    let ws = Workspace::new()?;
    let staged = ws.storage.join("Disk.RAW");
    cmd!(sh, "qemu-img create -q -f raw {staged} 64M").run()?;
    cmd!(sh, "sfdisk -q {staged}")
        .stdin("label: gpt\n,32M,U\n")
        .run()?;
    std::fs::rename(&staged, ws.storage.join("BOOT.RAW"))?;

    let out = ws.resolve(&sh, "")?;
    let boot = ws.storage.join("boot.raw");
    assert_eq!(out["boot"], boot.as_str());
    assert_eq!(out["boot_mode"], "");
    if !boot.exists() {
        return Err(eyre!("{boot} was not created"));
    }
    Ok(())
}
integration_test!(test_resolve_raw_with_efi_partition);

fn test_resolve_exit_codes() -> Result<()> {
    let sh = shell()?;
    let ws = Workspace::new()?;
    assert_eq!(ws.resolve_failure(&sh, "no-such-distro")?, 64);
    assert_eq!(ws.resolve_failure(&sh, "ftp.example.org/disk.iso")?, 64);

    let blocked = Workspace::new()?;
    std::fs::create_dir(blocked.root.join("boot.img"))?;
    let disk_attached = ["/disk", "/disk1", "/dev/disk1"]
        .iter()
        .any(|p| std::path::Path::new(p).exists());
    if !disk_attached {
        assert_eq!(blocked.resolve_failure(&sh, "")?, 37);
    }
    Ok(())
}
integration_test!(test_resolve_exit_codes);
