use color_eyre::eyre::Context;
use color_eyre::Result;
use serde_json::Value;
use xshell::cmd;

use crate::{get_bootprep_command, integration_test, shell, Workspace};

fn test_inspect_does_not_move() -> Result<()> {
    let sh = shell()?;
    let ws = Workspace::new()?;
    let bin = get_bootprep_command()?;
    let image = ws.storage.join("disk.qcow2");
    cmd!(sh, "qemu-img create -q -f qcow2 {image} 64M").run()?;

    let stdout = cmd!(sh, "{bin} inspect --json {image}").read()?;
    let v: Value = serde_json::from_str(&stdout).context("Failed to parse JSON output")?;
    assert_eq!(v["kind"], "qcow2");
    assert_eq!(v["extension"], "qcow2");
    assert!(v["mode"].is_null());
    assert!(image.exists());
    Ok(())
}
integration_test!(test_inspect_does_not_move);

fn test_inspect_rejects_unknown() -> Result<()> {
    let sh = shell()?;
    let ws = Workspace::new()?;
    let bin = get_bootprep_command()?;
    let notes = ws.storage.join("notes.txt");
    std::fs::write(&notes, "hello")?;

    let output = cmd!(sh, "{bin} inspect {notes}").ignore_status().output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a usable boot image"), "{stderr}");
    Ok(())
}
integration_test!(test_inspect_rejects_unknown);
