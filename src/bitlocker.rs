//! BitLocker protector suspend/resume for the system drive.
//!
//! `-RebootCount 0` keeps protection suspended across reboots until this tool
//! explicitly resumes it; the window has to span the whole unenroll+enroll
//! cycle. A drive without BitLocker makes manage-bde exit nonzero, which is
//! logged and otherwise ignored.

use std::process::Command;
use tracing::{info, warn};

const SYSTEM_DRIVE: &str = "C:";

pub fn suspend() {
    run(&["-protectors", "-disable", SYSTEM_DRIVE, "-RebootCount", "0"]);
}

pub fn resume() {
    run(&["-protectors", "-enable", SYSTEM_DRIVE]);
}

fn run(args: &[&str]) {
    match Command::new("manage-bde.exe").args(args).output() {
        Ok(out) if out.status.success() => {
            info!(args = ?args, "manage-bde succeeded");
        }
        Ok(out) => {
            warn!(
                code = out.status.code(),
                stdout = %String::from_utf8_lossy(&out.stdout).trim(),
                "manage-bde exited nonzero"
            );
        }
        Err(e) => warn!(%e, "manage-bde failed to start"),
    }
}
