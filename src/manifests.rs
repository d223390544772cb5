//! App deployment manifests and per-user install state.
//!
//! Setting each manifest aside before unenrollment is what keeps managed
//! applications installed: the agent's uninstall routine strips every app it
//! still holds a deployment manifest for, so the payload is renamed to a
//! backup value and an empty value is left at the original name.

use anyhow::Result;
use tracing::{debug, error, info};
use windows::Win32::System::Registry::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE};

use crate::registry::Key;

const MANIFEST_ROOT: &str = r"SOFTWARE\AirWatchMDM\AppDeploymentAgent\AppManifests";
const INSTALL_STATUS_ROOT: &str = r"SOFTWARE\AirWatchMDM\AppDeploymentAgent\AppInstallStatus";
const MANIFEST_VALUE: &str = "DeploymentManifestXML";
const MANIFEST_BACKUP: &str = "DeploymentManifestXML_BAK";

/// Set every app's deployment manifest aside before unenrollment.
///
/// An already-present backup value means a previous run left the entry behind;
/// that app is reported and skipped rather than overwriting the saved payload.
pub fn backup_deployment_manifests() -> Result<()> {
    let Some(root) = Key::open(HKEY_LOCAL_MACHINE, MANIFEST_ROOT, KEY_READ)? else {
        debug!("no app manifest container; nothing to set aside");
        return Ok(());
    };
    for app in root.subkeys()? {
        let Some(key) = root.subkey(&app, KEY_READ | KEY_WRITE)? else {
            continue;
        };
        if key.has_value(MANIFEST_BACKUP) {
            error!(app = %app, "manifest backup already present; skipping this app");
            continue;
        }
        let Some((ty, data)) = key.read_raw(MANIFEST_VALUE) else {
            debug!(app = %app, "no deployment manifest value");
            continue;
        };
        key.write_raw(MANIFEST_BACKUP, ty, &data)?;
        key.write_raw(MANIFEST_VALUE, ty, &[])?;
        info!(app = %app, "deployment manifest set aside");
    }
    Ok(())
}

/// Delete the backup values once migration has finished. The emptied primary
/// values stay in place.
pub fn delete_manifest_backups() -> Result<()> {
    let Some(root) = Key::open(HKEY_LOCAL_MACHINE, MANIFEST_ROOT, KEY_READ)? else {
        return Ok(());
    };
    for app in root.subkeys()? {
        let Some(key) = root.subkey(&app, KEY_READ | KEY_WRITE)? else {
            continue;
        };
        key.delete_value(MANIFEST_BACKUP)
            .warn_if_failed(&format!("manifest backup for {app}"));
    }
    Ok(())
}

/// True once every app entry under every user hive reports IsInstalled = 1.
/// An empty inventory counts as settled.
pub fn all_apps_installed() -> Result<bool> {
    let Some(root) = Key::open(HKEY_LOCAL_MACHINE, INSTALL_STATUS_ROOT, KEY_READ)? else {
        return Ok(true);
    };
    for sid in root.subkeys()? {
        let Some(user) = root.subkey(&sid, KEY_READ)? else {
            continue;
        };
        for app in user.subkeys()? {
            let Some(entry) = user.subkey(&app, KEY_READ)? else {
                continue;
            };
            if entry.read_dword("IsInstalled").unwrap_or(0) != 1 {
                debug!(app = %app, user = %sid, "app not yet reinstalled");
                return Ok(false);
            }
        }
    }
    Ok(true)
}
