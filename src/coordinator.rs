use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Completed,
    NotCompleted,
}

/// The three wait stages. Each is a bounded polling loop; running out of
/// attempts is a terminal outcome distinct from confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStage {
    UnenrollConfirm,
    EnrollConfirm,
    AppsInstalled,
}

impl std::fmt::Display for PollStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PollStage::UnenrollConfirm => "unenrollment confirmation",
            PollStage::EnrollConfirm => "enrollment confirmation",
            PollStage::AppsInstalled => "managed application reinstall",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("destination server is not reachable on the management port")]
    Unreachable,
    #[error("timed out waiting for {stage}")]
    PollTimeout { stage: PollStage },
    #[error("administrator privileges are required")]
    NeedsElevation,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub backup_recovery: bool,
}

/// Seam between the migration sequence and the device. The real
/// implementation wires these to the registry, installer, BitLocker and
/// notification surfaces; tests substitute a recording fake.
///
/// Side-effecting steps are best-effort: implementations log their own
/// failures and the coordinator judges progress purely by the status queries.
pub trait MigrationSteps {
    fn server_reachable(&mut self) -> bool;
    fn set_notifications(&mut self, enabled: bool);
    fn suspend_encryption(&mut self);
    fn enrollment_status(&mut self) -> EnrollmentStatus;
    fn backup_app_manifests(&mut self);
    fn backup_recovery_trees(&mut self);
    fn uninstall_agent(&mut self);
    fn enroll_device(&mut self);
    fn restore_recovery_trees(&mut self);
    fn resume_encryption(&mut self);
    fn apps_installed(&mut self) -> bool;
    fn cleanup(&mut self);
    fn sleep(&mut self, interval: Duration);
}

/// Drive the whole migration: connectivity gate, conditional unenroll,
/// enroll, restore, then cleanup once the app inventory settles.
///
/// The connectivity check is fail-closed — nothing on the device is touched
/// until the destination answers on the management port. Encryption stays
/// suspended across the entire unenroll+enroll cycle and is resumed exactly
/// once, right after the recovery trees are restored.
pub fn run(steps: &mut dyn MigrationSteps, opts: &RunOptions) -> Result<(), MigrationError> {
    if !steps.server_reachable() {
        return Err(MigrationError::Unreachable);
    }
    info!("destination reachable; starting migration");

    steps.set_notifications(false);
    steps.suspend_encryption();

    if steps.enrollment_status() == EnrollmentStatus::Completed {
        info!("device is enrolled; preserving app manifests and unenrolling");
        steps.backup_app_manifests();
        if opts.backup_recovery {
            steps.backup_recovery_trees();
        }
        steps.uninstall_agent();
        poll(steps, opts, PollStage::UnenrollConfirm, |s| {
            s.enrollment_status() == EnrollmentStatus::NotCompleted
        })?;
    } else {
        info!("device is not enrolled; skipping unenrollment");
    }

    steps.enroll_device();
    poll(steps, opts, PollStage::EnrollConfirm, |s| {
        s.enrollment_status() == EnrollmentStatus::Completed
    })?;

    steps.restore_recovery_trees();
    steps.resume_encryption();

    poll(steps, opts, PollStage::AppsInstalled, |s| s.apps_installed())?;

    steps.set_notifications(true);
    steps.cleanup();
    info!("migration complete");
    Ok(())
}

fn poll(
    steps: &mut dyn MigrationSteps,
    opts: &RunOptions,
    stage: PollStage,
    mut done: impl FnMut(&mut dyn MigrationSteps) -> bool,
) -> Result<(), MigrationError> {
    for attempt in 1..=opts.max_poll_attempts {
        if done(steps) {
            info!(%stage, attempt, "confirmed");
            return Ok(());
        }
        debug!(%stage, attempt, "still waiting");
        steps.sleep(opts.poll_interval);
    }
    Err(MigrationError::PollTimeout { stage })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Recording {
        calls: Vec<String>,
        reachable: bool,
        // Front of the queue is the next answer; the last answer repeats.
        statuses: VecDeque<EnrollmentStatus>,
        apps: VecDeque<bool>,
        sleeps: u32,
    }

    impl Recording {
        fn reachable(statuses: &[EnrollmentStatus], apps: &[bool]) -> Self {
            Self {
                reachable: true,
                statuses: statuses.iter().copied().collect(),
                apps: apps.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn count(&self, name: &str) -> usize {
            self.calls.iter().filter(|c| c.as_str() == name).count()
        }

        fn position(&self, name: &str) -> usize {
            self.calls
                .iter()
                .position(|c| c == name)
                .unwrap_or_else(|| panic!("{name} never called: {:?}", self.calls))
        }
    }

    impl MigrationSteps for Recording {
        fn server_reachable(&mut self) -> bool {
            self.calls.push("server_reachable".into());
            self.reachable
        }
        fn set_notifications(&mut self, enabled: bool) {
            self.calls.push(format!("set_notifications({enabled})"));
        }
        fn suspend_encryption(&mut self) {
            self.calls.push("suspend_encryption".into());
        }
        fn enrollment_status(&mut self) -> EnrollmentStatus {
            self.calls.push("enrollment_status".into());
            if self.statuses.len() > 1 {
                self.statuses.pop_front().unwrap()
            } else {
                *self.statuses.front().expect("status scripted")
            }
        }
        fn backup_app_manifests(&mut self) {
            self.calls.push("backup_app_manifests".into());
        }
        fn backup_recovery_trees(&mut self) {
            self.calls.push("backup_recovery_trees".into());
        }
        fn uninstall_agent(&mut self) {
            self.calls.push("uninstall_agent".into());
        }
        fn enroll_device(&mut self) {
            self.calls.push("enroll_device".into());
        }
        fn restore_recovery_trees(&mut self) {
            self.calls.push("restore_recovery_trees".into());
        }
        fn resume_encryption(&mut self) {
            self.calls.push("resume_encryption".into());
        }
        fn apps_installed(&mut self) -> bool {
            self.calls.push("apps_installed".into());
            if self.apps.len() > 1 {
                self.apps.pop_front().unwrap()
            } else {
                *self.apps.front().expect("apps scripted")
            }
        }
        fn cleanup(&mut self) {
            self.calls.push("cleanup".into());
        }
        fn sleep(&mut self, _interval: Duration) {
            self.sleeps += 1;
        }
    }

    fn opts() -> RunOptions {
        RunOptions {
            poll_interval: Duration::from_secs(0),
            max_poll_attempts: 10,
            backup_recovery: false,
        }
    }

    use EnrollmentStatus::{Completed, NotCompleted};

    #[test]
    fn enrolled_device_runs_full_sequence_in_order() {
        // Initial check Completed; one poll still Completed, then unenrolled;
        // first post-enroll poll NotCompleted, then Completed.
        let mut steps = Recording::reachable(
            &[Completed, Completed, NotCompleted, NotCompleted, Completed],
            &[true],
        );
        run(&mut steps, &opts()).unwrap();

        assert!(steps.position("backup_app_manifests") < steps.position("uninstall_agent"));
        assert!(steps.position("uninstall_agent") < steps.position("enroll_device"));
        assert!(steps.position("enroll_device") < steps.position("restore_recovery_trees"));
        assert!(steps.position("restore_recovery_trees") < steps.position("resume_encryption"));
        assert!(steps.position("resume_encryption") < steps.position("apps_installed"));
        assert!(steps.position("apps_installed") < steps.position("set_notifications(true)"));
        assert!(steps.position("set_notifications(true)") < steps.position("cleanup"));
        assert_eq!(steps.calls.last().unwrap(), "cleanup");
        assert_eq!(steps.count("enroll_device"), 1);
        assert_eq!(steps.count("resume_encryption"), 1);
        assert_eq!(steps.count("suspend_encryption"), 1);
    }

    #[test]
    fn notifications_disabled_before_encryption_suspend() {
        let mut steps = Recording::reachable(&[NotCompleted, Completed], &[true]);
        run(&mut steps, &opts()).unwrap();
        assert!(steps.position("set_notifications(false)") < steps.position("suspend_encryption"));
        assert!(steps.position("suspend_encryption") < steps.position("enrollment_status"));
    }

    #[test]
    fn unenrolled_device_skips_backup_and_uninstall() {
        let mut steps = Recording::reachable(&[NotCompleted, Completed], &[true]);
        run(&mut steps, &opts()).unwrap();
        assert_eq!(steps.count("backup_app_manifests"), 0);
        assert_eq!(steps.count("uninstall_agent"), 0);
        assert_eq!(steps.count("backup_recovery_trees"), 0);
        assert_eq!(steps.count("enroll_device"), 1);
        assert_eq!(steps.count("resume_encryption"), 1);
    }

    #[test]
    fn unreachable_server_mutates_nothing() {
        let mut steps = Recording {
            statuses: [Completed].into_iter().collect(),
            apps: [true].into_iter().collect(),
            ..Recording::default()
        };
        let err = run(&mut steps, &opts()).unwrap_err();
        assert!(matches!(err, MigrationError::Unreachable));
        assert_eq!(steps.calls, vec!["server_reachable".to_string()]);
    }

    #[test]
    fn enroll_only_after_unenroll_confirmed() {
        let mut steps = Recording::reachable(
            &[
                Completed,
                Completed,
                Completed,
                NotCompleted,
                NotCompleted,
                Completed,
            ],
            &[true],
        );
        run(&mut steps, &opts()).unwrap();
        // Last enrollment_status call before enroll_device observed NotCompleted.
        let enroll_at = steps.position("enroll_device");
        let polls_before = steps.calls[..enroll_at]
            .iter()
            .filter(|c| c.as_str() == "enrollment_status")
            .count();
        assert_eq!(polls_before, 4);
        assert_eq!(steps.count("enroll_device"), 1);
    }

    #[test]
    fn backup_recovery_toggle_enables_tree_backup() {
        let mut steps = Recording::reachable(
            &[Completed, NotCompleted, NotCompleted, Completed],
            &[true],
        );
        let mut o = opts();
        o.backup_recovery = true;
        run(&mut steps, &o).unwrap();
        assert_eq!(steps.count("backup_recovery_trees"), 1);
        assert!(steps.position("backup_recovery_trees") < steps.position("uninstall_agent"));
    }

    #[test]
    fn pending_app_blocks_notification_restore() {
        let mut steps =
            Recording::reachable(&[NotCompleted, Completed], &[false, false, false, true]);
        run(&mut steps, &opts()).unwrap();
        assert_eq!(steps.count("apps_installed"), 4);
        assert_eq!(steps.sleeps, 3);
        assert!(steps.position("apps_installed") < steps.position("set_notifications(true)"));
        assert_eq!(steps.calls.last().unwrap(), "cleanup");
    }

    #[test]
    fn unenroll_poll_exhaustion_fails_without_cleanup() {
        let mut steps = Recording::reachable(&[Completed], &[true]);
        let err = run(&mut steps, &opts()).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::PollTimeout {
                stage: PollStage::UnenrollConfirm
            }
        ));
        assert_eq!(steps.count("enroll_device"), 0);
        assert_eq!(steps.count("cleanup"), 0);
        assert_eq!(steps.sleeps, 10);
    }

    #[test]
    fn enroll_poll_exhaustion_leaves_encryption_suspended() {
        let mut steps = Recording::reachable(&[NotCompleted], &[true]);
        let err = run(&mut steps, &opts()).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::PollTimeout {
                stage: PollStage::EnrollConfirm
            }
        ));
        assert_eq!(steps.count("resume_encryption"), 0);
        assert_eq!(steps.count("restore_recovery_trees"), 0);
    }

    #[test]
    fn apps_poll_exhaustion_happens_after_resume() {
        let mut steps = Recording::reachable(&[NotCompleted, Completed], &[false]);
        let err = run(&mut steps, &opts()).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::PollTimeout {
                stage: PollStage::AppsInstalled
            }
        ));
        assert_eq!(steps.count("resume_encryption"), 1);
        assert_eq!(steps.count("cleanup"), 0);
    }

    #[test]
    fn poll_stage_display_names() {
        assert_eq!(
            PollStage::UnenrollConfirm.to_string(),
            "unenrollment confirmation"
        );
        assert_eq!(
            MigrationError::PollTimeout {
                stage: PollStage::AppsInstalled
            }
            .to_string(),
            "timed out waiting for managed application reinstall"
        );
    }
}
