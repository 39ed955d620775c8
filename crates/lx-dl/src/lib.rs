//! Dynamic-linker primitives for lx
//!
//! The live engine depends on exactly four abstract operations: open an
//! object, look up a symbol, enumerate exported names, and replace a PLT
//! entry. This crate implements them for ELF on Linux via `libc`;
//! everything above it stays platform-agnostic.

mod elf;
mod image;
mod plt;

pub use image::{symbol_names, DlError, Image};
pub use plt::PltTable;
