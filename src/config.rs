use anyhow::{Context as _, Result};
use clap::Parser;
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fs, io::Write, path::Path, path::PathBuf, time::Duration};

use crate::coordinator::RunOptions;

/// Migrate this device's Workspace ONE UEM enrollment to a new console,
/// keeping installed managed applications in place across the re-enrollment.
#[derive(Parser, Debug)]
#[command(name = "ws1migrate", version)]
pub struct Args {
    /// Destination device-services server, e.g. ds137.awmdm.com
    pub server: String,
    /// Organization group identifier on the destination console
    pub org_group: String,
    /// Staging account user name for enrollment
    pub username: String,
    /// Staging account password
    pub password: String,

    /// Directory holding AirwatchAgent.msi and run state (default C:\Temp\ws1migrate)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
    /// Management port used for the connectivity pre-check
    #[arg(long)]
    pub port: Option<u16>,
    /// Seconds between status polls
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,
    /// Poll attempts per wait stage before the run fails as timed out
    #[arg(long)]
    pub max_poll_attempts: Option<u32>,
    /// Copy the recovery trees aside before unenrolling
    #[arg(long)]
    pub backup_recovery: bool,
    /// Settings file path (default <staging-dir>\ws1migrate.json)
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default)]
    pub backup_recovery: bool,
    #[serde(default = "default_recovery_roots")]
    pub recovery_roots: RecoveryRoots,
    #[serde(default = "default_notification_channels")]
    pub notification_channels: Vec<String>,
    #[serde(default = "default_resume_task")]
    pub resume_task_name: String,
    #[serde(default)]
    pub version: Option<u32>,
}

/// The three fixed provisioning trees preserved around the re-enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryRoots {
    pub oem: PathBuf,
    pub auto_apply: PathBuf,
    pub customizations: PathBuf,
}

impl RecoveryRoots {
    pub fn all(&self) -> [&PathBuf; 3] {
        [&self.oem, &self.auto_apply, &self.customizations]
    }
}

fn default_port() -> u16 {
    443
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    7
}
fn default_max_poll_attempts() -> u32 {
    360
}
fn default_resume_task() -> String {
    "WS1Migration".into()
}

fn default_recovery_roots() -> RecoveryRoots {
    RecoveryRoots {
        oem: PathBuf::from(r"C:\Recovery\OEM"),
        auto_apply: PathBuf::from(r"C:\Recovery\AutoApply"),
        customizations: PathBuf::from(r"C:\Recovery\Customizations"),
    }
}

fn default_notification_channels() -> Vec<String> {
    [
        "Windows.SystemToast.DeviceEnrollmentActivity",
        "Windows.SystemToast.DeviceManagement",
        "Windows.SystemToast.Winlogon",
        "AirWatchLLC.WorkspaceONEIntelligentHub_htcwkw4rx2gx4!App",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            poll_interval_secs: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            backup_recovery: false,
            recovery_roots: default_recovery_roots(),
            notification_channels: default_notification_channels(),
            resume_task_name: default_resume_task(),
            version: None,
        }
    }
}

pub static DEFAULT_STAGING: Lazy<PathBuf> = Lazy::new(|| {
    if cfg!(windows) {
        PathBuf::from(r"C:\Temp\ws1migrate")
    } else if let Some(dirs) = ProjectDirs::from("com", "Ws1Migrate", "ws1migrate") {
        dirs.data_local_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("ws1migrate")
    }
});

pub fn load_or_default(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(s) => match serde_json::from_str(&s) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to parse settings JSON: {}, using defaults", e);
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

pub fn save_atomic(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(settings)?;
    {
        let mut f = fs::File::create(&tmp).context("create temp settings")?;
        f.write_all(&data).context("write temp settings")?;
        f.sync_all().ok();
    }
    // Best-effort atomic replace.
    fs::rename(&tmp, path).context("rename temp to final")?;
    Ok(())
}

/// Everything a migration run needs, resolved once at startup and passed
/// explicitly — no procedure reads process-global state.
#[derive(Debug, Clone)]
pub struct Context {
    pub server: String,
    pub org_group: String,
    pub username: String,
    pub password: String,
    pub staging_dir: PathBuf,
    pub log_dir: PathBuf,
    pub settings: Settings,
}

impl Context {
    pub fn resolve(args: Args) -> Result<Self> {
        let staging_dir = args
            .staging_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_STAGING.clone());
        let staging_dir = ensure_staging(staging_dir);

        let settings_path = args
            .settings
            .clone()
            .unwrap_or_else(|| staging_dir.join("ws1migrate.json"));
        let mut settings = load_or_default(&settings_path);
        if let Some(port) = args.port {
            settings.port = port;
        }
        if let Some(interval) = args.poll_interval_secs {
            settings.poll_interval_secs = interval;
        }
        if let Some(attempts) = args.max_poll_attempts {
            settings.max_poll_attempts = attempts;
        }
        if args.backup_recovery {
            settings.backup_recovery = true;
        }
        // Persist the effective tuning so a run resumed after reboot (via the
        // scheduled task) sees the same values.
        if let Err(e) = save_atomic(&settings, &settings_path) {
            tracing::warn!("Failed to persist settings: {}", e);
        }

        // Logs live next to the staging dir, not inside it: cleanup() deletes
        // the staging dir and the log has to outlive the run.
        let log_dir = staging_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| staging_dir.clone());

        Ok(Self {
            server: args.server,
            org_group: args.org_group,
            username: args.username,
            password: args.password,
            staging_dir,
            log_dir,
            settings,
        })
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            poll_interval: Duration::from_secs(self.settings.poll_interval_secs),
            max_poll_attempts: self.settings.max_poll_attempts,
            backup_recovery: self.settings.backup_recovery,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.connect_timeout_secs)
    }

    pub fn installer_path(&self) -> PathBuf {
        self.staging_dir.join("AirwatchAgent.msi")
    }
}

fn ensure_staging(preferred: PathBuf) -> PathBuf {
    if fs::create_dir_all(&preferred).is_ok() {
        return preferred;
    }
    let fallback = ProjectDirs::from("com", "Ws1Migrate", "ws1migrate")
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("ws1migrate"));
    tracing::warn!(
        "Failed to create staging dir {}, falling back to {}",
        preferred.display(),
        fallback.display()
    );
    fs::create_dir_all(&fallback).ok();
    fallback
}
