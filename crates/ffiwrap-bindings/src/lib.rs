//! Processing of generated FFI binding output
//!
//! This crate turns the text artifacts of an upstream binding generator into
//! the shared IR, and provides the type machinery used afterwards:
//! - declaration parsing (host-style functions and native prototypes)
//! - constant, structure and enum extraction
//! - native to host type mapping and value conversion
//! - runtime parameter validation

pub mod lexer;
pub mod params;
pub mod docblock;
pub mod parser;
pub mod constants;
pub mod structures;
pub mod processor;
pub mod types;
pub mod convert;
pub mod validation;

// Re-export core types
pub use ffiwrap_core::*;

pub use parser::{BindingOutputParser, ParseOutput};
pub use constants::{parse_literal, ConstantExtractor};
pub use structures::StructureExtractor;
pub use processor::*;
pub use types::{HostType, TypeMapper};
pub use convert::{ConversionError, IntegerWidth, TypeConverter};
pub use validation::*;

#[cfg(test)]
mod validation_test;
