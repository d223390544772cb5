//! Reads the device's enrollment identity and completion state.
//!
//! Two sources have to agree before the device counts as enrolled: the OMA-DM
//! enrollment record (modern subsystem) and the vendor's legacy status flag.

use crate::coordinator::EnrollmentStatus;

#[cfg(windows)]
const ACCOUNTS_ROOT: &str = r"SOFTWARE\Microsoft\Provisioning\OMADM\Accounts";
#[cfg(windows)]
const ENROLLMENTS_ROOT: &str = r"SOFTWARE\Microsoft\Enrollments";
#[cfg(windows)]
const LEGACY_STATUS_KEY: &str = r"SOFTWARE\AIRWATCH\EnrollmentStatus";

/// Both sources must agree: a non-empty UPN and the legacy flag reading
/// exactly "Completed". Anything else is not enrolled.
pub fn status_from_sources(upn: Option<&str>, legacy_flag: Option<&str>) -> EnrollmentStatus {
    match (upn, legacy_flag) {
        (Some(upn), Some("Completed")) if !upn.is_empty() => EnrollmentStatus::Completed,
        _ => EnrollmentStatus::NotCompleted,
    }
}

/// The single active enrollment account GUID, if any.
#[cfg(windows)]
pub fn account_id() -> anyhow::Result<Option<String>> {
    use crate::registry::Key;
    use windows::Win32::System::Registry::{HKEY_LOCAL_MACHINE, KEY_READ};

    let Some(root) = Key::open(HKEY_LOCAL_MACHINE, ACCOUNTS_ROOT, KEY_READ)? else {
        return Ok(None);
    };
    Ok(root.subkeys()?.into_iter().next())
}

#[cfg(windows)]
pub fn status() -> anyhow::Result<EnrollmentStatus> {
    use crate::registry::Key;
    use windows::Win32::System::Registry::{HKEY_LOCAL_MACHINE, KEY_READ};

    let Some(account) = account_id()? else {
        return Ok(EnrollmentStatus::NotCompleted);
    };
    let upn = Key::open(
        HKEY_LOCAL_MACHINE,
        &format!(r"{ENROLLMENTS_ROOT}\{account}"),
        KEY_READ,
    )?
    .and_then(|k| k.read_string("UPN"));
    let flag = Key::open(HKEY_LOCAL_MACHINE, LEGACY_STATUS_KEY, KEY_READ)?
        .and_then(|k| k.read_string("Status"));
    Ok(status_from_sources(upn.as_deref(), flag.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn completed_requires_both_sources() {
        assert_eq!(
            status_from_sources(Some("user@example.com"), Some("Completed")),
            EnrollmentStatus::Completed
        );
        assert_eq!(
            status_from_sources(None, Some("Completed")),
            EnrollmentStatus::NotCompleted
        );
        assert_eq!(
            status_from_sources(Some("user@example.com"), Some("Provisioned")),
            EnrollmentStatus::NotCompleted
        );
        assert_eq!(
            status_from_sources(Some("user@example.com"), None),
            EnrollmentStatus::NotCompleted
        );
        assert_eq!(status_from_sources(None, None), EnrollmentStatus::NotCompleted);
    }

    #[test]
    fn empty_upn_does_not_count() {
        assert_eq!(
            status_from_sources(Some(""), Some("Completed")),
            EnrollmentStatus::NotCompleted
        );
    }
}
