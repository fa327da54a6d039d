//! Native to host type mapping
//!
//! Raw native type strings are classified into a small set of host types.
//! Classification is total: anything unrecognized maps to [`HostType::Mixed`].

use crate::params::normalize_type;
use ffiwrap_core::ProcessedBindings;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Host-side type of a native value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostType {
    Int,
    Float,
    Bool,
    String,
    Void,
    /// Dynamically typed; accepts anything
    Mixed,
    Array(Box<HostType>),
    /// Opaque native pointer or struct reference, with its native type name
    Handle(Option<String>),
    Callable,
    Nullable(Box<HostType>),
}

impl HostType {
    /// Wrap in `Nullable` unless the type already admits null
    pub fn nullable(self) -> HostType {
        match self {
            HostType::Mixed | HostType::Void | HostType::Nullable(_) => self,
            other => HostType::Nullable(Box::new(other)),
        }
    }

    /// The type without a nullable wrapper
    pub fn base(&self) -> &HostType {
        match self {
            HostType::Nullable(inner) => inner.base(),
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, HostType::Nullable(_) | HostType::Mixed)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.base(), HostType::Int | HostType::Float)
    }

    /// Type as written in a host signature, e.g. `?string` or `\FFI\CData`
    pub fn declaration(&self) -> String {
        match self {
            HostType::Int => "int".to_string(),
            HostType::Float => "float".to_string(),
            HostType::Bool => "bool".to_string(),
            HostType::String => "string".to_string(),
            HostType::Void => "void".to_string(),
            HostType::Mixed => "mixed".to_string(),
            HostType::Array(_) => "array".to_string(),
            HostType::Handle(_) => "\\FFI\\CData".to_string(),
            HostType::Callable => "callable".to_string(),
            HostType::Nullable(inner) => format!("?{}", inner.declaration()),
        }
    }

    /// Type as written in documentation, e.g. `int[]` or `string|null`
    pub fn doc_type(&self) -> String {
        match self {
            HostType::Array(element) => match element.as_ref() {
                HostType::Mixed => "array".to_string(),
                element => format!("{}[]", element.doc_type()),
            },
            HostType::Nullable(inner) => format!("{}|null", inner.doc_type()),
            other => other.declaration(),
        }
    }

    /// Host literal used to initialize a slot of this type
    pub fn default_value(&self) -> &'static str {
        match self {
            HostType::Int => "0",
            HostType::Float => "0.0",
            HostType::Bool => "false",
            HostType::String => "''",
            HostType::Array(_) => "[]",
            HostType::Void
            | HostType::Mixed
            | HostType::Handle(_)
            | HostType::Callable
            | HostType::Nullable(_) => "null",
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.declaration())
    }
}

/// Maps raw native type strings to host types and back
#[derive(Debug, Clone)]
pub struct TypeMapper {
    primitives: HashMap<String, HostType>,
    structures: HashSet<String>,
    enums: HashSet<String>,
    handle_families: Vec<String>,
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeMapper {
    /// Create a new type mapper with the default primitive table
    pub fn new() -> Self {
        Self {
            primitives: Self::create_default_type_mappings(),
            structures: HashSet::new(),
            enums: HashSet::new(),
            handle_families: Vec::new(),
        }
    }

    /// Create default mappings from native primitive spellings to host types
    fn create_default_type_mappings() -> HashMap<String, HostType> {
        let mut mappings = HashMap::new();

        // Integers
        for name in [
            "char", "signed char", "unsigned char", "short", "short int", "signed short", "unsigned short",
            "unsigned short int", "int", "signed", "signed int", "unsigned", "unsigned int", "long", "long int",
            "signed long", "unsigned long", "unsigned long int", "long long", "long long int", "signed long long",
            "unsigned long long", "unsigned long long int", "int8_t", "uint8_t", "int16_t", "uint16_t", "int32_t",
            "uint32_t", "int64_t", "uint64_t", "size_t", "ssize_t", "ptrdiff_t", "intptr_t", "uintptr_t", "off_t",
            "wchar_t", "int_fast8_t", "int_least8_t", "uint_fast8_t", "uint_least8_t",
        ] {
            mappings.insert(name.to_string(), HostType::Int);
        }

        // Floating point
        for name in ["float", "double", "long double"] {
            mappings.insert(name.to_string(), HostType::Float);
        }

        mappings.insert("bool".to_string(), HostType::Bool);
        mappings.insert("_Bool".to_string(), HostType::Bool);
        mappings.insert("void".to_string(), HostType::Void);

        // Host spellings that appear in host-style declarations
        mappings.insert("integer".to_string(), HostType::Int);
        mappings.insert("boolean".to_string(), HostType::Bool);
        mappings.insert("string".to_string(), HostType::String);
        mappings.insert("array".to_string(), HostType::Array(Box::new(HostType::Mixed)));
        mappings.insert("iterable".to_string(), HostType::Array(Box::new(HostType::Mixed)));
        mappings.insert("callable".to_string(), HostType::Callable);
        mappings.insert("Closure".to_string(), HostType::Callable);
        mappings.insert("\\Closure".to_string(), HostType::Callable);
        mappings.insert("mixed".to_string(), HostType::Mixed);
        mappings.insert("null".to_string(), HostType::Mixed);
        mappings.insert("CData".to_string(), HostType::Handle(None));
        mappings.insert("FFI\\CData".to_string(), HostType::Handle(None));
        mappings.insert("\\FFI\\CData".to_string(), HostType::Handle(None));
        mappings.insert("object".to_string(), HostType::Handle(None));

        mappings
    }

    /// Treat type names starting with any of these prefixes as opaque handles
    pub fn with_handle_families<I, S>(mut self, families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handle_families.extend(families.into_iter().map(Into::into));
        self
    }

    /// Register the structure and enum names of a processed interface
    pub fn with_bindings(mut self, bindings: &ProcessedBindings) -> Self {
        self.structures.extend(bindings.structures().map(|s| s.name.clone()));
        self.enums.extend(bindings.enums().map(|e| e.name.clone()));
        self
    }

    pub fn register_structure<S: Into<String>>(&mut self, name: S) {
        self.structures.insert(name.into());
    }

    pub fn register_enum<S: Into<String>>(&mut self, name: S) {
        self.enums.insert(name.into());
    }

    /// Map a raw native type to its host type
    ///
    /// With `allow_null` the result is wrapped as nullable unless it already
    /// admits null. A leading `?` always makes the result nullable.
    pub fn map_native_type_to_host(&self, raw_type: &str, allow_null: bool) -> HostType {
        let normalized = normalize_type(raw_type);
        let (normalized, marked) = match normalized.strip_prefix('?') {
            Some(rest) => (rest.trim().to_string(), true),
            None => (normalized, false),
        };

        let host = self.classify(&normalized);
        if allow_null || marked {
            host.nullable()
        } else {
            host
        }
    }

    fn classify(&self, normalized: &str) -> HostType {
        if normalized.is_empty() || normalized == "..." {
            return HostType::Mixed;
        }

        // function pointers
        if normalized.contains("(*)") || normalized.contains("(^)") {
            return HostType::Callable;
        }

        // host union types: `int|null`, `string|int`
        if normalized.contains('|') {
            return self.classify_union(normalized);
        }

        // arrays: `int[4]`, `char*[]`
        if let Some(bracket) = normalized.find('[') {
            if normalized.ends_with(']') {
                let element = self.classify(normalized[..bracket].trim());
                return HostType::Array(Box::new(element));
            }
        }

        let pointer_depth = normalized.chars().rev().take_while(|c| *c == '*' || c.is_whitespace()).filter(|c| *c == '*').count();
        let core = normalized.trim_end_matches(|c: char| c == '*' || c.is_whitespace());
        let core = strip_qualifiers(core);

        match pointer_depth {
            0 => self.classify_value_type(&core),
            1 => match core.as_str() {
                "char" | "signed char" => HostType::String,
                "void" => HostType::Mixed,
                _ => HostType::Handle(Some(aggregate_name(&core).to_string())),
            },
            _ if core == "char" => HostType::Array(Box::new(HostType::String)),
            _ => HostType::Handle(Some(aggregate_name(&core).to_string())),
        }
    }

    fn classify_value_type(&self, core: &str) -> HostType {
        if let Some(host) = self.primitives.get(core) {
            return host.clone();
        }

        if let Some(name) = core.strip_prefix("enum ") {
            log::trace!("Mapping enum {} to int", name);
            return HostType::Int;
        }
        if let Some(name) = core.strip_prefix("struct ").or_else(|| core.strip_prefix("union ")) {
            return HostType::Handle(Some(name.trim().to_string()));
        }
        if self.enums.contains(core) {
            return HostType::Int;
        }
        if self.structures.contains(core) || self.is_handle_family(core) {
            return HostType::Handle(Some(core.to_string()));
        }

        HostType::Mixed
    }

    fn classify_union(&self, normalized: &str) -> HostType {
        let parts: Vec<&str> = normalized.split('|').map(str::trim).collect();
        let has_null = parts.iter().any(|p| p.eq_ignore_ascii_case("null"));
        let others: Vec<HostType> = parts
            .iter()
            .filter(|p| !p.eq_ignore_ascii_case("null"))
            .map(|p| self.classify(p))
            .collect();

        let base = match others.as_slice() {
            [single] => single.clone(),
            _ => HostType::Mixed,
        };
        if has_null {
            base.nullable()
        } else {
            base
        }
    }

    fn is_handle_family(&self, core: &str) -> bool {
        self.handle_families.iter().any(|family| core.starts_with(family.as_str()))
    }

    /// Native spelling used when a host value is marshalled back
    pub fn map_host_type_to_native(&self, host: &HostType) -> &'static str {
        match host.base() {
            HostType::Int => "long",
            HostType::Float => "double",
            HostType::Bool => "bool",
            HostType::String => "const char*",
            HostType::Void => "void",
            HostType::Mixed
            | HostType::Array(_)
            | HostType::Handle(_)
            | HostType::Callable
            | HostType::Nullable(_) => "void*",
        }
    }
}

/// Remove cv-qualifiers, keeping `struct`/`union`/`enum` tags
pub fn strip_qualifiers(raw: &str) -> String {
    raw.split_whitespace()
        .filter(|word| !matches!(*word, "const" | "volatile" | "restrict" | "__restrict"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn aggregate_name(core: &str) -> &str {
    core.strip_prefix("struct ")
        .or_else(|| core.strip_prefix("union "))
        .or_else(|| core.strip_prefix("enum "))
        .unwrap_or(core)
        .trim()
}
