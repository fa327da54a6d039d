//! Intermediate representation between parsing and generation
//!
//! Everything in here is produced once by the binding processor and read by
//! the generators afterwards. `ProcessedBindings` has no mutating methods; it
//! is assembled through [`ProcessedBindingsBuilder`].

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Constants keyed by raw identifier, in declaration order
pub type Constants = IndexMap<String, Value>;

/// A single function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name without any sigil
    pub name: String,
    /// Raw native type string; `mixed` when the declaration carries no type
    pub raw_type: String,
    /// Declared with a nullable marker (`?type`) or a `null` default
    #[serde(default)]
    pub nullable: bool,
}

impl Parameter {
    pub fn new<N: Into<String>, T: Into<String>>(name: N, raw_type: T) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            nullable: false,
        }
    }

    pub fn nullable<N: Into<String>, T: Into<String>>(name: N, raw_type: T) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            nullable: true,
        }
    }

    /// Whether no type information was found for this parameter
    pub fn is_untyped(&self) -> bool {
        self.raw_type == UNTYPED
    }
}

/// Raw type recorded for parameters and returns that carry no type at all
pub const UNTYPED: &str = "mixed";

/// A parsed native function declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    /// Raw native identifier
    pub name: String,
    /// Raw native return type
    pub return_type: String,
    pub parameters: Vec<Parameter>,
    /// Free-text documentation lines, annotations removed
    #[serde(default)]
    pub documentation: Vec<String>,
    /// The declaration text as it appeared in the binding output
    #[serde(default)]
    pub raw_declaration: String,
}

impl FunctionSignature {
    pub fn new<N: Into<String>, R: Into<String>>(name: N, return_type: R, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            parameters,
            documentation: Vec::new(),
            raw_declaration: String::new(),
        }
    }

    pub fn with_documentation(mut self, documentation: Vec<String>) -> Self {
        self.documentation = documentation;
        self
    }

    pub fn returns_void(&self) -> bool {
        self.return_type.trim() == "void"
    }

    pub fn parameter_types(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.raw_type.as_str()).collect()
    }
}

/// A structure or union field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub raw_type: String,
}

impl StructField {
    pub fn new<N: Into<String>, T: Into<String>>(name: N, raw_type: T) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
        }
    }
}

/// A structure or union layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDefinition {
    pub name: String,
    pub fields: Vec<StructField>,
    #[serde(default)]
    pub is_union: bool,
}

impl StructureDefinition {
    pub fn new<N: Into<String>>(name: N, fields: Vec<StructField>, is_union: bool) -> Self {
        Self {
            name: name.into(),
            fields,
            is_union,
        }
    }

    pub fn kind(&self) -> &'static str {
        if self.is_union { "union" } else { "struct" }
    }
}

/// A native enumeration; its members are also published as constants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDefinition {
    pub name: String,
    pub members: Vec<(String, i64)>,
}

/// The aggregate IR produced once per run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedBindings {
    functions: IndexMap<String, FunctionSignature>,
    structures: IndexMap<String, StructureDefinition>,
    #[serde(default)]
    enums: IndexMap<String, EnumDefinition>,
    constants: Constants,
}

impl ProcessedBindings {
    /// Start assembling a new IR
    pub fn builder() -> ProcessedBindingsBuilder {
        ProcessedBindingsBuilder::default()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.functions.values()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn structures(&self) -> impl Iterator<Item = &StructureDefinition> {
        self.structures.values()
    }

    pub fn structure(&self, name: &str) -> Option<&StructureDefinition> {
        self.structures.get(name)
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDefinition> {
        self.enums.values()
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.structures.is_empty() && self.constants.is_empty()
    }
}

/// Single-writer builder for [`ProcessedBindings`]
#[derive(Debug, Default)]
pub struct ProcessedBindingsBuilder {
    inner: ProcessedBindings,
}

impl ProcessedBindingsBuilder {
    /// Add a function; returns `false` and keeps the first one if the name is taken
    pub fn add_function(&mut self, function: FunctionSignature) -> bool {
        if self.inner.functions.contains_key(&function.name) {
            return false;
        }
        self.inner.functions.insert(function.name.clone(), function);
        true
    }

    /// Add a structure; returns `false` and keeps the first one if the name is taken
    pub fn add_structure(&mut self, structure: StructureDefinition) -> bool {
        if self.inner.structures.contains_key(&structure.name) {
            return false;
        }
        self.inner.structures.insert(structure.name.clone(), structure);
        true
    }

    /// Add an enum and publish each member as an integer constant
    pub fn add_enum(&mut self, definition: EnumDefinition) -> bool {
        if self.inner.enums.contains_key(&definition.name) {
            return false;
        }
        for (member, value) in &definition.members {
            self.inner.constants.entry(member.clone()).or_insert(Value::Int(*value));
        }
        self.inner.enums.insert(definition.name.clone(), definition);
        true
    }

    /// Add a constant; a later definition of the same name replaces the value
    pub fn add_constant<N: Into<String>>(&mut self, name: N, value: Value) {
        self.inner.constants.insert(name.into(), value);
    }

    pub fn build(self) -> ProcessedBindings {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_first_function() {
        let mut builder = ProcessedBindings::builder();
        assert!(builder.add_function(FunctionSignature::new("add", "int", vec![])));
        assert!(!builder.add_function(FunctionSignature::new("add", "long", vec![])));
        let bindings = builder.build();
        assert_eq!(bindings.function_count(), 1);
        assert_eq!(bindings.function("add").unwrap().return_type, "int");
    }

    #[test]
    fn test_enum_members_become_constants() {
        let mut builder = ProcessedBindings::builder();
        builder.add_constant("MATH_SUCCESS", Value::Int(42));
        builder.add_enum(EnumDefinition {
            name: "MathError".to_string(),
            members: vec![("MATH_SUCCESS".to_string(), 0), ("MATH_ERROR".to_string(), -1)],
        });
        let bindings = builder.build();
        // explicit constant wins over the enum member
        assert_eq!(bindings.constants()["MATH_SUCCESS"], Value::Int(42));
        assert_eq!(bindings.constants()["MATH_ERROR"], Value::Int(-1));
        assert_eq!(bindings.enums().count(), 1);
    }

    #[test]
    fn test_constants_keep_declaration_order() {
        let mut builder = ProcessedBindings::builder();
        builder.add_constant("Z", Value::Int(1));
        builder.add_constant("A", Value::Int(2));
        let bindings = builder.build();
        let names: Vec<&String> = bindings.constants().keys().collect();
        assert_eq!(names, vec!["Z", "A"]);
    }

    #[test]
    fn test_parameter_helpers() {
        assert!(Parameter::new("x", UNTYPED).is_untyped());
        assert!(Parameter::nullable("s", "const char*").nullable);
        let f = FunctionSignature::new("reset", "void", vec![]);
        assert!(f.returns_void());
    }
}
