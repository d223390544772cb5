/// Outcome of a best-effort removal of an external resource (registry value or
/// tree, certificate, scheduled task, backup directory). Absence of the target
/// is an expected state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    NotFound,
    Failed,
}

impl Removal {
    pub fn from_io(result: std::io::Result<()>) -> Self {
        match result {
            Ok(()) => Removal::Removed,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Removal::NotFound,
            Err(_) => Removal::Failed,
        }
    }

    /// Log only the `Failed` case; `NotFound` stays silent.
    pub fn warn_if_failed(self, what: &str) -> Self {
        if self == Removal::Failed {
            tracing::warn!(what, "removal failed");
        }
        self
    }
}
