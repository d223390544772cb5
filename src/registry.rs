use anyhow::Result;
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_NO_MORE_ITEMS, FILETIME};
use windows::Win32::System::Registry::*;
use windows::core::{PCWSTR, PWSTR};

use crate::removal::Removal;
use crate::utils::to_utf16;

const MAX_NAME: usize = 256;

/// Open registry key handle, closed on drop.
pub struct Key(HKEY);

impl Drop for Key {
    fn drop(&mut self) {
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

impl Key {
    /// Open an existing key. An absent key is `Ok(None)`, not an error.
    pub fn open(root: HKEY, path: &str, access: REG_SAM_FLAGS) -> Result<Option<Key>> {
        let wide = to_utf16(path);
        let mut hkey = HKEY::default();
        let status =
            unsafe { RegOpenKeyExW(root, PCWSTR(wide.as_ptr()), 0, access, &mut hkey) };
        if status.is_ok() {
            Ok(Some(Key(hkey)))
        } else if status == ERROR_FILE_NOT_FOUND {
            Ok(None)
        } else {
            Err(anyhow::anyhow!("RegOpenKeyExW {path} failed: {:?}", status))
        }
    }

    /// Open or create a key with read/write access.
    pub fn create(root: HKEY, path: &str) -> Result<Key> {
        let wide = to_utf16(path);
        let mut hkey = HKEY::default();
        let status = unsafe {
            RegCreateKeyExW(
                root,
                PCWSTR(wide.as_ptr()),
                0,
                None,
                REG_OPTION_NON_VOLATILE,
                KEY_READ | KEY_WRITE,
                None,
                &mut hkey,
                None,
            )
        };
        if status.is_ok() {
            Ok(Key(hkey))
        } else {
            Err(anyhow::anyhow!(
                "RegCreateKeyExW {path} failed: {:?}",
                status
            ))
        }
    }

    pub fn subkey(&self, name: &str, access: REG_SAM_FLAGS) -> Result<Option<Key>> {
        Key::open(self.0, name, access)
    }

    /// Names of all immediate child keys.
    pub fn subkeys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut index = 0u32;
        loop {
            let mut buf = [0u16; MAX_NAME];
            let mut len = buf.len() as u32;
            let mut ft = FILETIME::default();
            let status = unsafe {
                RegEnumKeyExW(
                    self.0,
                    index,
                    PWSTR(buf.as_mut_ptr()),
                    &mut len,
                    None,
                    PWSTR::null(),
                    None,
                    Some(&mut ft),
                )
            };
            if status == ERROR_NO_MORE_ITEMS {
                break;
            }
            if !status.is_ok() {
                return Err(anyhow::anyhow!("RegEnumKeyExW failed: {:?}", status));
            }
            names.push(String::from_utf16_lossy(&buf[..len as usize]));
            index += 1;
        }
        Ok(names)
    }

    pub fn has_value(&self, name: &str) -> bool {
        let wide = to_utf16(name);
        let mut cb = 0u32;
        unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(wide.as_ptr()),
                None,
                None,
                None,
                Some(&mut cb),
            )
        }
        .is_ok()
    }

    /// Read a value's type and raw bytes. Absent values and query failures
    /// both come back as `None`.
    pub fn read_raw(&self, name: &str) -> Option<(REG_VALUE_TYPE, Vec<u8>)> {
        let wide = to_utf16(name);
        let mut ty = REG_VALUE_TYPE(0);
        let mut cb = 0u32;
        if unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(wide.as_ptr()),
                None,
                Some(&mut ty),
                None,
                Some(&mut cb),
            )
        }
        .is_err()
        {
            return None;
        }
        let mut buf = vec![0u8; cb as usize];
        let mut cb2 = cb;
        if cb2 > 0
            && unsafe {
                RegQueryValueExW(
                    self.0,
                    PCWSTR(wide.as_ptr()),
                    None,
                    None,
                    Some(buf.as_mut_ptr()),
                    Some(&mut cb2),
                )
            }
            .is_err()
        {
            return None;
        }
        buf.truncate(cb2 as usize);
        Some((ty, buf))
    }

    pub fn read_string(&self, name: &str) -> Option<String> {
        let (ty, data) = self.read_raw(name)?;
        if ty != REG_SZ && ty != REG_EXPAND_SZ {
            return None;
        }
        let wide: Vec<u16> = data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let s = String::from_utf16_lossy(&wide);
        Some(s.trim_end_matches('\0').to_string())
    }

    pub fn read_dword(&self, name: &str) -> Option<u32> {
        let (ty, data) = self.read_raw(name)?;
        if ty != REG_DWORD || data.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
    }

    pub fn write_raw(&self, name: &str, ty: REG_VALUE_TYPE, data: &[u8]) -> Result<()> {
        let wide = to_utf16(name);
        let status = unsafe { RegSetValueExW(self.0, PCWSTR(wide.as_ptr()), 0, ty, Some(data)) };
        if status.is_ok() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("RegSetValueExW {name} failed: {:?}", status))
        }
    }

    pub fn write_string(&self, name: &str, value: &str) -> Result<()> {
        let data: Vec<u8> = to_utf16(value)
            .into_iter()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        self.write_raw(name, REG_SZ, &data)
    }

    pub fn write_dword(&self, name: &str, value: u32) -> Result<()> {
        self.write_raw(name, REG_DWORD, &value.to_le_bytes())
    }

    pub fn delete_value(&self, name: &str) -> Removal {
        let wide = to_utf16(name);
        let status = unsafe { RegDeleteValueW(self.0, PCWSTR(wide.as_ptr())) };
        if status.is_ok() {
            Removal::Removed
        } else if status == ERROR_FILE_NOT_FOUND {
            Removal::NotFound
        } else {
            Removal::Failed
        }
    }
}

/// Delete a whole subtree under `root`.
pub fn delete_tree(root: HKEY, path: &str) -> Removal {
    let wide = to_utf16(path);
    let status = unsafe { RegDeleteTreeW(root, PCWSTR(wide.as_ptr())) };
    if status.is_ok() {
        Removal::Removed
    } else if status == ERROR_FILE_NOT_FOUND {
        Removal::NotFound
    } else {
        Removal::Failed
    }
}
