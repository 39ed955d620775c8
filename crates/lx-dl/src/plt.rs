//! PLT entry rewriting.
//!
//! The one platform primitive the live engine needs: given a host image
//! and a `(symbol, address)` pair, redirect the host's PLT entry for that
//! symbol to the new address. Future indirect calls through the host's
//! procedure linkage table then land in the new code; calls already in
//! flight and inlined calls are unaffected.

use std::ffi::CStr;

use libc::c_void;

use crate::elf::{
    dynamic_lookup, dynamic_ptr, ElfRela, ElfSym, DT_JMPREL, DT_PLTREL, DT_PLTRELSZ, DT_RELA,
    DT_STRTAB, DT_SYMTAB, R_JUMP_SLOT,
};
use crate::image::{DlError, Image};

/// A view over one loaded image's `.rela.plt` relocations.
pub struct PltTable {
    load_base: usize,
    relocations: *const ElfRela,
    relocation_count: usize,
    symbols: *const ElfSym,
    strings: *const u8,
}

// Raw pointers into the (immutable, process-lifetime) dynamic tables of a
// loaded image.
unsafe impl Send for PltTable {}

impl PltTable {
    /// Build the table for an image. Fails when the image carries no
    /// RELA-style PLT relocations (not produced on x86_64/aarch64).
    pub fn from_image(image: &Image) -> Result<Self, DlError> {
        let map = image.link_map()?;
        let (load_base, dynamic) = unsafe { ((*map).l_addr, (*map).l_ld) };

        let unsupported = || DlError::UnsupportedImage {
            path: image.path().to_owned(),
        };

        let pltrel = unsafe { dynamic_lookup(dynamic, DT_PLTREL) }.ok_or_else(unsupported)?;
        if pltrel as i64 != DT_RELA {
            return Err(unsupported());
        }

        let relocations =
            unsafe { dynamic_ptr::<ElfRela>(dynamic, DT_JMPREL) }.ok_or_else(unsupported)?;
        let bytes = unsafe { dynamic_lookup(dynamic, DT_PLTRELSZ) }.ok_or_else(unsupported)?;
        let symbols =
            unsafe { dynamic_ptr::<ElfSym>(dynamic, DT_SYMTAB) }.ok_or_else(unsupported)?;
        let strings = unsafe { dynamic_ptr::<u8>(dynamic, DT_STRTAB) }.ok_or_else(unsupported)?;

        Ok(Self {
            load_base,
            relocations,
            relocation_count: bytes as usize / std::mem::size_of::<ElfRela>(),
            symbols,
            strings,
        })
    }

    /// Redirect the PLT entry for `name` to `new_address`.
    ///
    /// Returns the previous GOT value when the symbol had a PLT entry,
    /// `Ok(None)` when it does not. The latter is not an error: patch
    /// images export plenty of symbols the host never calls indirectly.
    pub fn replace(
        &self,
        name: &str,
        new_address: *mut c_void,
    ) -> Result<Option<*mut c_void>, DlError> {
        for index in 0..self.relocation_count {
            let relocation = unsafe { &*self.relocations.add(index) };
            if (relocation.r_info & 0xffff_ffff) as u32 != R_JUMP_SLOT {
                continue;
            }
            let symbol_index = (relocation.r_info >> 32) as usize;
            let symbol = unsafe { &*self.symbols.add(symbol_index) };
            let entry_name =
                unsafe { CStr::from_ptr(self.strings.add(symbol.st_name as usize).cast()) };
            if entry_name.to_bytes() != name.as_bytes() {
                continue;
            }

            let slot = (self.load_base + relocation.r_offset as usize) as *mut *mut c_void;
            unsafe {
                make_writable(slot.cast())?;
                let old = slot.read();
                slot.write(new_address);
                return Ok(Some(old));
            }
        }
        Ok(None)
    }
}

/// Lift RELRO from the page holding `address`. The page stays writable
/// afterwards; the session patches repeatedly and restores nothing until
/// shutdown.
unsafe fn make_writable(address: *mut c_void) -> Result<(), DlError> {
    let page_size = libc::sysconf(libc::_SC_PAGESIZE) as usize;
    let page = (address as usize) & !(page_size - 1);
    let rc = libc::mprotect(
        page as *mut c_void,
        page_size,
        libc::PROT_READ | libc::PROT_WRITE,
    );
    if rc != 0 {
        return Err(DlError::Protect {
            errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        });
    }
    Ok(())
}
