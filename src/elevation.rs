//! Elevation precondition. The workflow itself never relaunches anything;
//! the entry point checks, and on `false` decides between a `runas` relaunch
//! and aborting.

#[cfg(windows)]
pub fn is_elevated() -> bool {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Security::{
        GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation,
    };
    use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    unsafe {
        let mut token = HANDLE::default();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
            return false;
        }
        let mut elevation = TOKEN_ELEVATION::default();
        let mut len = 0u32;
        let ok = GetTokenInformation(
            token,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut _),
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut len,
        );
        let _ = CloseHandle(token);
        ok.is_ok() && elevation.TokenIsElevated != 0
    }
}

/// Relaunch this executable elevated with the same arguments. Returns once
/// the UAC-approved copy has been started; the caller exits immediately.
#[cfg(windows)]
pub fn relaunch_elevated(args: &[String]) -> anyhow::Result<()> {
    use windows::Win32::UI::Shell::ShellExecuteW;
    use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
    use windows::core::PCWSTR;

    use crate::utils::to_utf16;

    let exe = std::env::current_exe()?;
    let params = args
        .iter()
        .map(|a| {
            if a.contains(' ') {
                format!("\"{a}\"")
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let exe_w = to_utf16(&exe.display().to_string());
    let params_w = to_utf16(&params);
    let h = unsafe {
        ShellExecuteW(
            None,
            windows::core::w!("runas"),
            PCWSTR(exe_w.as_ptr()),
            PCWSTR(params_w.as_ptr()),
            None,
            SW_SHOWNORMAL,
        )
    };
    // ShellExecute reports failure through values <= 32.
    if h.0 as isize <= 32 {
        anyhow::bail!("elevated relaunch was refused (ShellExecuteW returned {:?})", h.0);
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn is_elevated() -> bool {
    true
}

#[cfg(not(windows))]
pub fn relaunch_elevated(_args: &[String]) -> anyhow::Result<()> {
    Ok(())
}
