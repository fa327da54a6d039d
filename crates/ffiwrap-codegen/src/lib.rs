//! Wrapper generation for processed native bindings
//!
//! This crate turns the IR produced by `ffiwrap-bindings` into host source
//! files: functions are grouped into classes, names are derived and kept
//! unique, parameters get guard checks from the validation rules, and the
//! result is rendered through replaceable templates.

pub mod config;
pub mod naming;
pub mod snippets;
pub mod generators;
pub mod template;
pub mod output;
pub mod wrapper_generator;

pub use config::*;
pub use naming::*;
pub use snippets::*;
pub use generators::*;
pub use template::*;
pub use output::*;
pub use wrapper_generator::*;

#[cfg(test)]
mod template_test;
