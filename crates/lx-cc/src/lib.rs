//! C/C++ build support for lx
//!
//! This crate provides the types shared by the graph builder and the
//! executor: source kinds, the include scanner, path normalisation,
//! build settings, and compiler command formation.

pub mod command;
pub mod kind;
pub mod paths;
pub mod scan;
pub mod settings;

pub use command::CompileInvocation;
pub use kind::SourceKind;
pub use settings::{BuildKind, BuildSettings, CompilerFamily};
