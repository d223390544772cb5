//! Per-channel toast notification toggles.
//!
//! Disabling writes an explicit `Enabled = 0`; re-enabling deletes the value
//! so the channel falls back to its inherited default instead of a forced on.

use anyhow::Result;
use tracing::debug;
use windows::Win32::System::Registry::{HKEY_CURRENT_USER, KEY_READ, KEY_WRITE};

use crate::registry::Key;

const SETTINGS_ROOT: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Notifications\Settings";

pub fn set_enabled(channels: &[String], enabled: bool) -> Result<()> {
    for channel in channels {
        let path = format!(r"{SETTINGS_ROOT}\{channel}");
        if enabled {
            if let Some(key) = Key::open(HKEY_CURRENT_USER, &path, KEY_READ | KEY_WRITE)? {
                key.delete_value("Enabled")
                    .warn_if_failed(&format!("notification toggle for {channel}"));
            }
        } else {
            let key = Key::create(HKEY_CURRENT_USER, &path)?;
            key.write_dword("Enabled", 0)?;
        }
        debug!(channel = %channel, enabled, "notification channel updated");
    }
    Ok(())
}
