//! The slice of the ELF dynamic-linking ABI this crate touches.
//!
//! `libc` does not expose `link_map` or the 64-bit dynamic-section entry
//! types portably, so they are declared here. Layouts follow the Itanium
//! ELF-64 object format; the runtime addresses read out of `l_ld` are the
//! relocated ones (glibc adjusts `DT_STRTAB`/`DT_SYMTAB` at load time).

use libc::c_char;

/// One entry of the `.dynamic` section.
#[repr(C)]
pub struct ElfDyn {
    pub d_tag: i64,
    /// Union of `d_val` and `d_ptr`; both 64-bit.
    pub d_un: u64,
}

/// One `.rela.plt` relocation.
#[repr(C)]
pub struct ElfRela {
    pub r_offset: u64,
    pub r_info: u64,
    pub r_addend: i64,
}

/// One `.dynsym` entry.
#[repr(C)]
pub struct ElfSym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

/// glibc's per-object chain node, obtained through
/// `dlinfo(RTLD_DI_LINKMAP)`.
#[repr(C)]
pub struct LinkMap {
    pub l_addr: usize,
    pub l_name: *const c_char,
    pub l_ld: *const ElfDyn,
    pub l_next: *mut LinkMap,
    pub l_prev: *mut LinkMap,
}

pub const DT_NULL: i64 = 0;
pub const DT_PLTRELSZ: i64 = 2;
pub const DT_STRTAB: i64 = 5;
pub const DT_SYMTAB: i64 = 6;
pub const DT_RELA: i64 = 7;
pub const DT_STRSZ: i64 = 10;
pub const DT_SONAME: i64 = 14;
pub const DT_PLTREL: i64 = 20;
pub const DT_JMPREL: i64 = 23;

#[cfg(target_arch = "x86_64")]
pub const R_JUMP_SLOT: u32 = 7; // R_X86_64_JUMP_SLOT
#[cfg(target_arch = "aarch64")]
pub const R_JUMP_SLOT: u32 = 1026; // R_AARCH64_JUMP_SLOT
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub const R_JUMP_SLOT: u32 = u32::MAX; // no PLT rewriting on this arch

/// Walk a dynamic section for one tag's value.
///
/// # Safety
/// `dynamic` must point at a `DT_NULL`-terminated dynamic section of a
/// currently loaded object.
pub unsafe fn dynamic_lookup(dynamic: *const ElfDyn, tag: i64) -> Option<u64> {
    let mut entry = dynamic;
    while (*entry).d_tag != DT_NULL {
        if (*entry).d_tag == tag {
            return Some((*entry).d_un);
        }
        entry = entry.add(1);
    }
    None
}

/// Convenience for the handful of call sites that need a typed pointer.
pub unsafe fn dynamic_ptr<T>(dynamic: *const ElfDyn, tag: i64) -> Option<*const T> {
    dynamic_lookup(dynamic, tag).map(|value| value as *const T)
}

const _: () = assert!(std::mem::size_of::<ElfDyn>() == 16);
const _: () = assert!(std::mem::size_of::<ElfRela>() == 24);
const _: () = assert!(std::mem::size_of::<ElfSym>() == 24);
