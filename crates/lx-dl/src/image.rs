//! Loaded shared objects.

use std::ffi::{CStr, CString};

use camino::{Utf8Path, Utf8PathBuf};
use libc::{c_int, c_void};
use thiserror::Error;

use crate::elf::{dynamic_lookup, dynamic_ptr, ElfDyn, LinkMap, DT_SONAME, DT_STRSZ, DT_STRTAB};

#[derive(Debug, Error)]
pub enum DlError {
    #[error("loading {path} failed: {reason}")]
    Open { path: Utf8PathBuf, reason: String },

    #[error("no link map for {path}: {reason}")]
    NoLinkMap { path: Utf8PathBuf, reason: String },

    #[error("{path} has no PLT relocations of the supported kind")]
    UnsupportedImage { path: Utf8PathBuf },

    #[error("making a GOT page writable failed: {errno}")]
    Protect { errno: i32 },
}

/// A shared object opened through the dynamic linker. Closed on drop;
/// the live engine keeps patch images alive until shutdown by holding
/// them in its loaded list.
pub struct Image {
    handle: *mut c_void,
    path: Utf8PathBuf,
}

// The handle is a process-global token; dlopen/dlsym are thread-safe.
unsafe impl Send for Image {}

fn last_dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown dlerror".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Image {
    fn open(path: &Utf8Path, mode: c_int) -> Result<Self, DlError> {
        let c_path = CString::new(path.as_str()).map_err(|_| DlError::Open {
            path: path.to_owned(),
            reason: "path contains an interior NUL".to_string(),
        })?;
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), mode) };
        if handle.is_null() {
            return Err(DlError::Open {
                path: path.to_owned(),
                reason: last_dl_error(),
            });
        }
        Ok(Self {
            handle,
            path: path.to_owned(),
        })
    }

    /// Open without polluting the global namespace; used to read metadata
    /// (SONAME) off library inputs.
    pub fn open_local(path: &Utf8Path) -> Result<Self, DlError> {
        Self::open(path, libc::RTLD_LAZY | libc::RTLD_LOCAL)
    }

    /// Open the final artifact: its symbols become available to
    /// everything loaded later.
    pub fn open_global(path: &Utf8Path) -> Result<Self, DlError> {
        Self::open(path, libc::RTLD_LAZY | libc::RTLD_GLOBAL)
    }

    /// Open a live-patch image: global, and deep-bound so the new code
    /// prefers its own definitions over the stale ones in the host.
    pub fn open_deep(path: &Utf8Path) -> Result<Self, DlError> {
        Self::open(path, libc::RTLD_LAZY | libc::RTLD_GLOBAL | libc::RTLD_DEEPBIND)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Address of an exported symbol, if the image defines it.
    pub fn symbol(&self, name: &str) -> Option<*mut c_void> {
        let c_name = CString::new(name).ok()?;
        let address = unsafe { libc::dlsym(self.handle, c_name.as_ptr()) };
        if address.is_null() {
            None
        } else {
            Some(address)
        }
    }

    pub(crate) fn link_map(&self) -> Result<*const LinkMap, DlError> {
        let mut map: *mut LinkMap = std::ptr::null_mut();
        let rc = unsafe {
            libc::dlinfo(
                self.handle,
                libc::RTLD_DI_LINKMAP,
                &mut map as *mut *mut LinkMap as *mut c_void,
            )
        };
        if rc != 0 || map.is_null() {
            return Err(DlError::NoLinkMap {
                path: self.path.clone(),
                reason: last_dl_error(),
            });
        }
        Ok(map)
    }

    fn dynamic(&self) -> Result<*const ElfDyn, DlError> {
        let map = self.link_map()?;
        Ok(unsafe { (*map).l_ld })
    }

    /// The image's dynamic string table as raw bytes.
    fn string_table(&self) -> Result<&[u8], DlError> {
        let dynamic = self.dynamic()?;
        let table = unsafe { dynamic_ptr::<u8>(dynamic, DT_STRTAB) };
        let size = unsafe { dynamic_lookup(dynamic, DT_STRSZ) };
        match (table, size) {
            (Some(table), Some(size)) if !table.is_null() => {
                Ok(unsafe { std::slice::from_raw_parts(table, size as usize) })
            }
            _ => Ok(&[]),
        }
    }

    /// The library's SONAME, when it declares one.
    pub fn soname(&self) -> Option<String> {
        let dynamic = self.dynamic().ok()?;
        let offset = unsafe { dynamic_lookup(dynamic, DT_SONAME) }? as usize;
        let table = self.string_table().ok()?;
        let name = table.get(offset..)?;
        let end = name.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&name[..end]).ok().map(str::to_owned)
    }

    /// Every name in the dynamic string table. A superset of the exported
    /// symbols (the table also holds SONAMEs and needed-library names),
    /// which is fine: callers `dlsym` each candidate anyway.
    pub fn exported_names(&self) -> Vec<String> {
        match self.string_table() {
            Ok(table) => symbol_names(table).map(str::to_owned).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

/// Split a dynamic string table into its NUL-terminated names.
pub fn symbol_names(table: &[u8]) -> impl Iterator<Item = &str> {
    table
        .split(|&b| b == 0)
        .filter(|name| !name.is_empty())
        .filter_map(|name| std::str::from_utf8(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_names_splits_on_nul() {
        let table = b"\0main\0_Z1fv\0libm.so.6\0";
        let names: Vec<_> = symbol_names(table).collect();
        assert_eq!(names, ["main", "_Z1fv", "libm.so.6"]);
    }

    #[test]
    fn symbol_names_skips_invalid_utf8() {
        let table = b"ok\0\xff\xfe\0also_ok\0";
        let names: Vec<_> = symbol_names(table).collect();
        assert_eq!(names, ["ok", "also_ok"]);
    }

    #[test]
    fn symbol_names_of_empty_table() {
        assert_eq!(symbol_names(b"").count(), 0);
        assert_eq!(symbol_names(b"\0\0\0").count(), 0);
    }

    #[test]
    fn opening_a_missing_object_fails() {
        let err = Image::open_local(Utf8Path::new("/nonexistent/libmissing.so"));
        assert!(matches!(err, Err(DlError::Open { .. })));
    }
}
