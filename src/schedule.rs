//! Scheduled-task leftovers from the resume-after-reboot path.

use std::process::Command;
use tracing::debug;

use crate::removal::Removal;

/// Drop the resume task registered for reboot continuation. Absence is the
/// normal case on a run that never rebooted.
pub fn unregister_resume_task(task_name: &str) -> Removal {
    let result = Command::new("schtasks.exe")
        .args(["/Delete", "/TN", task_name, "/F"])
        .output();
    let removal = match result {
        Ok(out) if out.status.success() => Removal::Removed,
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            if err.to_ascii_lowercase().contains("cannot find") {
                Removal::NotFound
            } else {
                debug!(code = out.status.code(), stderr = %err.trim(), "schtasks delete");
                Removal::Failed
            }
        }
        Err(_) => Removal::Failed,
    };
    removal.warn_if_failed(&format!("scheduled task {task_name}"))
}
