//! Backup, restore and cleanup of the provisioning recovery trees.
//!
//! Paths come in through [`RecoveryRoots`] so the same code runs against
//! temp directories in tests and `C:\Recovery\*` in production.

use anyhow::{Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::RecoveryRoots;
use crate::removal::Removal;

pub const BACKUP_SUFFIX: &str = ".bak";
pub const UNATTEND_FILE: &str = "unattend.xml";
pub const INSTALLER_FILE: &str = "AirwatchAgent.msi";

fn backup_path(root: &Path) -> PathBuf {
    let mut name = root.file_name().unwrap_or_default().to_os_string();
    name.push(BACKUP_SUFFIX);
    root.with_file_name(name)
}

/// Copy each existing recovery tree to `<path>.bak`, replacing any prior
/// backup. Missing trees are skipped.
pub fn backup_trees(roots: &RecoveryRoots) -> Result<()> {
    for root in roots.all() {
        if !root.is_dir() {
            debug!(path = %root.display(), "recovery tree absent; not backed up");
            continue;
        }
        let bak = backup_path(root);
        if bak.exists() {
            fs::remove_dir_all(&bak)
                .with_context(|| format!("clear stale backup {}", bak.display()))?;
        }
        copy_tree(root, &bak)?;
        info!(from = %root.display(), to = %bak.display(), "recovery tree backed up");
    }
    Ok(())
}

/// Put the provisioning inputs back where OOBE expects them: the unattend
/// answer file from the OEM backup, any provisioning package from the
/// Customizations backup, and the enrollment installer from the staging dir.
/// Missing sources are skipped, not errors.
pub fn restore_trees(roots: &RecoveryRoots, staging_dir: &Path) -> Result<()> {
    if let Some(unattend) = find_file(&backup_path(&roots.oem), |n| {
        n.eq_ignore_ascii_case(UNATTEND_FILE)
    }) {
        place(&unattend, &roots.auto_apply.join(UNATTEND_FILE))?;
    }
    if let Some(ppkg) = find_file(&backup_path(&roots.customizations), |n| {
        Path::new(n)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("ppkg"))
    }) {
        if let Some(name) = ppkg.file_name() {
            place(&ppkg, &roots.customizations.join(name))?;
        }
    }
    let installer = staging_dir.join(INSTALLER_FILE);
    if installer.is_file() {
        place(&installer, &roots.oem.join(INSTALLER_FILE))?;
    }
    Ok(())
}

/// Delete all `.bak` trees. Tri-state per tree; absence is silent.
pub fn cleanup_backups(roots: &RecoveryRoots) {
    for root in roots.all() {
        let bak = backup_path(root);
        let removal = if bak.exists() {
            Removal::from_io(fs::remove_dir_all(&bak))
        } else {
            Removal::NotFound
        };
        removal.warn_if_failed(&bak.display().to_string());
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("read {}", src.display()))? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn find_file(dir: &Path, matches: impl Fn(&str) -> bool + Copy) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file(&path, matches) {
                return Some(found);
            }
        } else if matches(&entry.file_name().to_string_lossy()) {
            return Some(path);
        }
    }
    None
}

fn place(src: &Path, dst: &Path) -> Result<()> {
    if let Some(dir) = dst.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    fs::copy(src, dst).with_context(|| format!("restore {}", dst.display()))?;
    info!(to = %dst.display(), "restored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roots_in(dir: &Path) -> RecoveryRoots {
        RecoveryRoots {
            oem: dir.join("OEM"),
            auto_apply: dir.join("AutoApply"),
            customizations: dir.join("Customizations"),
        }
    }

    #[test]
    fn backup_copies_existing_trees_only() {
        let tmp = tempfile::tempdir().unwrap();
        let roots = roots_in(tmp.path());
        fs::create_dir_all(roots.oem.join("sub")).unwrap();
        fs::write(roots.oem.join("sub").join("unattend.xml"), "<xml/>").unwrap();

        backup_trees(&roots).unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("OEM.bak").join("sub").join("unattend.xml"))
                .unwrap(),
            "<xml/>"
        );
        assert!(!tmp.path().join("AutoApply.bak").exists());
    }

    #[test]
    fn backup_replaces_stale_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let roots = roots_in(tmp.path());
        fs::create_dir_all(&roots.oem).unwrap();
        fs::write(roots.oem.join("a.txt"), "new").unwrap();
        fs::create_dir_all(tmp.path().join("OEM.bak")).unwrap();
        fs::write(tmp.path().join("OEM.bak").join("stale.txt"), "old").unwrap();

        backup_trees(&roots).unwrap();

        assert!(!tmp.path().join("OEM.bak").join("stale.txt").exists());
        assert_eq!(
            fs::read_to_string(tmp.path().join("OEM.bak").join("a.txt")).unwrap(),
            "new"
        );
    }

    #[test]
    fn restore_places_unattend_ppkg_and_installer() {
        let tmp = tempfile::tempdir().unwrap();
        let roots = roots_in(tmp.path());
        let staging = tmp.path().join("staging");
        fs::create_dir_all(tmp.path().join("OEM.bak").join("answer")).unwrap();
        fs::write(
            tmp.path().join("OEM.bak").join("answer").join("Unattend.xml"),
            "<unattend/>",
        )
        .unwrap();
        fs::create_dir_all(tmp.path().join("Customizations.bak")).unwrap();
        fs::write(
            tmp.path().join("Customizations.bak").join("device.ppkg"),
            "ppkg",
        )
        .unwrap();
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join(INSTALLER_FILE), "msi").unwrap();

        restore_trees(&roots, &staging).unwrap();

        assert_eq!(
            fs::read_to_string(roots.auto_apply.join("unattend.xml")).unwrap(),
            "<unattend/>"
        );
        assert_eq!(
            fs::read_to_string(roots.customizations.join("device.ppkg")).unwrap(),
            "ppkg"
        );
        assert_eq!(
            fs::read_to_string(roots.oem.join(INSTALLER_FILE)).unwrap(),
            "msi"
        );
    }

    #[test]
    fn restore_skips_missing_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let roots = roots_in(tmp.path());
        restore_trees(&roots, &tmp.path().join("staging")).unwrap();
        assert!(!roots.auto_apply.exists());
        assert!(!roots.oem.exists());
    }

    #[test]
    fn cleanup_removes_all_backups() {
        let tmp = tempfile::tempdir().unwrap();
        let roots = roots_in(tmp.path());
        for name in ["OEM.bak", "AutoApply.bak", "Customizations.bak"] {
            fs::create_dir_all(tmp.path().join(name)).unwrap();
            fs::write(tmp.path().join(name).join("x"), "x").unwrap();
        }

        cleanup_backups(&roots);

        assert!(!tmp.path().join("OEM.bak").exists());
        assert!(!tmp.path().join("AutoApply.bak").exists());
        assert!(!tmp.path().join("Customizations.bak").exists());
    }
}
