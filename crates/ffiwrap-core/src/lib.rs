//! Core types for the ffiwrap binding pipeline
//!
//! This crate holds what every stage shares: the intermediate representation
//! of a native interface, host-side values, and the error taxonomy.

pub mod error;
pub mod ir;
pub mod value;

pub use error::*;
pub use ir::*;
pub use value::Value;
