//! Install and remove the management agent.
//!
//! Uninstall is a pile of best-effort removals; enrollment is one installer
//! invocation whose exit code is informational only — the coordinator decides
//! success by polling enrollment state afterwards.

use anyhow::{Context as _, Result};
use std::process::Command;
use tracing::{debug, info, warn};
use windows::Win32::System::Registry::{HKEY_LOCAL_MACHINE, KEY_READ};

use crate::config::Context;
use crate::registry::{self, Key};
use crate::removal::Removal;
use crate::utils::redact_secrets;

const UNINSTALL_ROOTS: [&str; 2] = [
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
];

// The deployment-agent tree is left alone on purpose: the emptied manifests
// and their backups have to survive the uninstall.
const VENDOR_CONFIG_TREES: [&str; 2] = [r"SOFTWARE\AIRWATCH", r"SOFTWARE\WOW6432Node\AIRWATCH"];

const HUB_APPX_PATTERN: &str = "*AirWatchLLC*";

/// Remove the installed agent and every vendor trace that would block a clean
/// re-enrollment: MSI product, packaged Hub app, configuration subtrees,
/// device certificates. Absence of any target is expected.
pub fn uninstall() -> Result<()> {
    match find_hub_product_code()? {
        Some(code) => {
            info!(product = %code, "uninstalling management agent");
            run_logged(Command::new("msiexec.exe").args(["/x", &code, "/qn", "/norestart"]));
        }
        None => debug!("no installed agent product found"),
    }

    remove_hub_appx();

    for tree in VENDOR_CONFIG_TREES {
        registry::delete_tree(HKEY_LOCAL_MACHINE, tree).warn_if_failed(tree);
    }

    remove_vendor_certificates();
    Ok(())
}

/// Run the enrollment installer and wait for it to exit. Failures are logged,
/// never escalated; enrollment polling is the only success signal.
pub fn enroll(ctx: &Context) -> Result<()> {
    let msi = ctx.installer_path();
    if !msi.is_file() {
        anyhow::bail!("enrollment installer not found at {}", msi.display());
    }
    let msi_log = ctx.staging_dir.join("AWAgent.log");

    let mut cmd = Command::new("msiexec.exe");
    cmd.current_dir(&ctx.staging_dir)
        .arg("/i")
        .arg(&msi)
        .arg("/quiet")
        .arg("ENROLL=Y")
        .arg("DOWNLOADWSBUNDLE=false")
        .arg(format!("SERVER={}", ctx.server))
        .arg(format!("LGNAME={}", ctx.org_group))
        .arg(format!("USERNAME={}", ctx.username))
        .arg(format!("PASSWORD={}", ctx.password))
        .arg("ASSIGNTOLOGGEDINUSER=Y")
        .arg("/log")
        .arg(&msi_log);

    info!(command = %redact_secrets(&format!("{cmd:?}")), "starting enrollment installer");
    let status = cmd.status().context("spawn msiexec")?;
    info!(code = status.code(), "enrollment installer exited");
    Ok(())
}

/// Scan both uninstall hives for the Hub's product entry.
fn find_hub_product_code() -> Result<Option<String>> {
    for root in UNINSTALL_ROOTS {
        let Some(key) = Key::open(HKEY_LOCAL_MACHINE, root, KEY_READ)? else {
            continue;
        };
        for sub in key.subkeys()? {
            let Some(entry) = key.subkey(&sub, KEY_READ)? else {
                continue;
            };
            let Some(name) = entry.read_string("DisplayName") else {
                continue;
            };
            if name.contains("Workspace ONE Intelligent Hub") || name.contains("AirWatch") {
                // MSI entries are keyed by product code GUID.
                if sub.starts_with('{') && sub.ends_with('}') {
                    return Ok(Some(sub));
                }
            }
        }
    }
    Ok(None)
}

fn remove_hub_appx() {
    let script = format!(
        "Get-AppxPackage -AllUsers '{HUB_APPX_PATTERN}' | Remove-AppxPackage -AllUsers"
    );
    match powershell(&script) {
        Removal::Failed => warn!("packaged Hub app removal failed"),
        r => debug!(?r, "packaged Hub app removal"),
    }
}

/// Delete machine-store certificates issued by the vendor CA or carrying the
/// vendor's device-root subject.
fn remove_vendor_certificates() {
    let script = "Get-ChildItem -Path Cert:\\LocalMachine -Recurse | \
         Where-Object { $_.PSIsContainer -eq $false -and \
         ($_.Issuer -like '*AirWatchCa*' -or $_.Subject -like '*AwDeviceRoot*') } | \
         Remove-Item -Force";
    match powershell(script) {
        Removal::Failed => warn!("vendor certificate removal failed"),
        r => debug!(?r, "vendor certificate removal"),
    }
}

fn powershell(script: &str) -> Removal {
    let result = Command::new("powershell.exe")
        .args(["-NoProfile", "-NonInteractive", "-Command", script])
        .output();
    match result {
        Ok(out) if out.status.success() => Removal::Removed,
        Ok(out) => {
            debug!(code = out.status.code(), "powershell exited nonzero");
            Removal::NotFound
        }
        Err(_) => Removal::Failed,
    }
}

fn run_logged(cmd: &mut Command) {
    match cmd.status() {
        Ok(status) => info!(code = status.code(), "external command exited"),
        Err(e) => warn!(%e, "external command failed to start"),
    }
}
