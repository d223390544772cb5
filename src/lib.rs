//! Migrates a Windows device's Workspace ONE UEM enrollment from one console
//! to another while keeping already-installed managed applications in place.
//!
//! The orchestration itself (state sequencing, polling, configuration) is
//! portable and unit-tested everywhere; everything that touches the registry,
//! the installer, BitLocker or the task scheduler is Windows-only.

pub mod config;
pub mod coordinator;
pub mod elevation;
pub mod enrollment;
pub mod net;
pub mod recovery;
pub mod removal;
pub mod utils;

#[cfg(windows)]
pub mod agent;
#[cfg(windows)]
pub mod bitlocker;
#[cfg(windows)]
pub mod manifests;
#[cfg(windows)]
pub mod notifications;
#[cfg(windows)]
pub mod registry;
#[cfg(windows)]
pub mod schedule;
