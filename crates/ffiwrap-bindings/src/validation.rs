//! Runtime parameter validation
//!
//! Rules are looked up by raw native type in a [`RuleTable`] that is built
//! once and never changes afterwards. For each value the rules registered for
//! its type run in order; each rule sees the output of the last successful
//! conversion, and every failure is reported rather than only the first.

use crate::convert::{IntegerWidth, TypeConverter};
use crate::params::normalize_type;
use crate::types::TypeMapper;
use ffiwrap_core::{FfiWrapError, FfiWrapResult, FunctionSignature, Value};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Result of a custom predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Valid,
    /// Valid, and the value should be replaced by this one
    Converted(Value),
    Invalid(Vec<String>),
}

impl From<bool> for Outcome {
    fn from(valid: bool) -> Self {
        if valid {
            Outcome::Valid
        } else {
            Outcome::Invalid(vec!["Custom validation failed".to_string()])
        }
    }
}

impl From<&str> for Outcome {
    fn from(message: &str) -> Self {
        Outcome::Invalid(vec![message.to_string()])
    }
}

impl From<String> for Outcome {
    fn from(message: String) -> Self {
        Outcome::Invalid(vec![message])
    }
}

/// Custom validation predicate
pub type Predicate = Arc<dyn Fn(&Value) -> Outcome + Send + Sync>;

/// Kind of a validation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Type,
    Range,
    Count,
    AllowedValues,
    Pattern,
    Custom,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::Type => "type",
            RuleKind::Range => "range",
            RuleKind::Count => "count",
            RuleKind::AllowedValues => "allowed_values",
            RuleKind::Pattern => "pattern",
            RuleKind::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

/// A single validation rule
#[derive(Clone)]
pub enum ValidationRule {
    /// Coerce to the host type of the raw type
    Type,
    /// Inclusive numeric bounds
    Range { min: Option<f64>, max: Option<f64> },
    /// Inclusive length bounds for strings and arrays
    Count { min: Option<usize>, max: Option<usize> },
    AllowedValues(Vec<Value>),
    Pattern(Regex),
    Custom { name: String, predicate: Predicate },
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationRule::Type => write!(f, "Type"),
            ValidationRule::Range { min, max } => f.debug_struct("Range").field("min", min).field("max", max).finish(),
            ValidationRule::Count { min, max } => f.debug_struct("Count").field("min", min).field("max", max).finish(),
            ValidationRule::AllowedValues(values) => f.debug_tuple("AllowedValues").field(values).finish(),
            ValidationRule::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            ValidationRule::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

impl ValidationRule {
    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        ValidationRule::Range { min, max }
    }

    pub fn count(min: Option<usize>, max: Option<usize>) -> Self {
        ValidationRule::Count { min, max }
    }

    /// Create a new custom rule from a predicate
    pub fn custom<N, F, O>(name: N, predicate: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Value) -> O + Send + Sync + 'static,
        O: Into<Outcome>,
    {
        ValidationRule::Custom {
            name: name.into(),
            predicate: Arc::new(move |value| predicate(value).into()),
        }
    }

    /// Bounds of the native integer width, if `raw_type` is a bounded integer
    pub fn width_range(raw_type: &str) -> Option<Self> {
        IntegerWidth::of(raw_type).map(|width| ValidationRule::Range {
            min: Some(width.min() as f64),
            max: Some(width.max() as f64),
        })
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            ValidationRule::Type => RuleKind::Type,
            ValidationRule::Range { .. } => RuleKind::Range,
            ValidationRule::Count { .. } => RuleKind::Count,
            ValidationRule::AllowedValues(_) => RuleKind::AllowedValues,
            ValidationRule::Pattern(_) => RuleKind::Pattern,
            ValidationRule::Custom { .. } => RuleKind::Custom,
        }
    }

    /// Apply the rule; `Ok(Some(v))` means the value was converted to `v`
    fn apply(&self, value: &Value, raw_type: &str, converter: &TypeConverter) -> Result<Option<Value>, Vec<String>> {
        match self {
            ValidationRule::Type => converter
                .coerce(value, raw_type)
                .map(Some)
                .map_err(|e| vec![e.message]),
            ValidationRule::Range { min, max } => {
                let number = numeric_view(value).ok_or_else(|| {
                    vec![format!("Value of type {} is not numeric", value.type_name())]
                })?;
                let mut errors = Vec::new();
                if let Some(min) = min {
                    if number < *min {
                        errors.push(format!("Value {} is below minimum {}", value, format_bound(*min)));
                    }
                }
                if let Some(max) = max {
                    if number > *max {
                        errors.push(format!("Value {} is above maximum {}", value, format_bound(*max)));
                    }
                }
                if errors.is_empty() { Ok(None) } else { Err(errors) }
            }
            ValidationRule::Count { min, max } => {
                let length = value.length().ok_or_else(|| {
                    vec![format!("Value of type {} has no length", value.type_name())]
                })?;
                let mut errors = Vec::new();
                if let Some(min) = min {
                    if length < *min {
                        errors.push(format!("Length {} is below minimum length {}", length, min));
                    }
                }
                if let Some(max) = max {
                    if length > *max {
                        errors.push(format!("Length {} is above maximum length {}", length, max));
                    }
                }
                if errors.is_empty() { Ok(None) } else { Err(errors) }
            }
            ValidationRule::AllowedValues(allowed) => {
                if allowed.iter().any(|candidate| loosely_equal(candidate, value)) {
                    Ok(None)
                } else {
                    let listed = allowed.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                    Err(vec![format!("Value {} is not one of the allowed values: {}", value, listed)])
                }
            }
            ValidationRule::Pattern(regex) => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Int(_) | Value::Float(_) | Value::Bool(_) => value.to_string(),
                    other => return Err(vec![format!("Value of type {} cannot match a pattern", other.type_name())]),
                };
                if regex.is_match(&text) {
                    Ok(None)
                } else {
                    Err(vec![format!("Value {} does not match pattern {}", value, regex.as_str())])
                }
            }
            ValidationRule::Custom { name, predicate } => match catch_unwind(AssertUnwindSafe(|| predicate(value))) {
                Ok(Outcome::Valid) => Ok(None),
                Ok(Outcome::Converted(converted)) => Ok(Some(converted)),
                Ok(Outcome::Invalid(errors)) => Err(errors),
                Err(panic) => Err(vec![format!("Custom rule '{}' raised: {}", name, panic_message(&panic))]),
            },
        }
    }
}

fn numeric_view(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    }
}

fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 1e18 {
        format!("{}", bound as i64)
    } else {
        format!("{}", bound)
    }
}

fn loosely_equal(candidate: &Value, value: &Value) -> bool {
    match (candidate.as_f64(), value.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => candidate == value,
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result of validating one value or one argument list
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// The value after every conversion, present when valid
    pub converted_value: Option<Value>,
}

impl ValidationResult {
    pub fn valid(value: Value) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            converted_value: Some(value),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
            converted_value: None,
        }
    }

    /// Convert into an error at a caller boundary
    pub fn into_result(self) -> FfiWrapResult<Value> {
        match (self.is_valid, self.converted_value) {
            (true, Some(value)) => Ok(value),
            (true, None) => Ok(Value::Null),
            (false, _) => Err(FfiWrapError::validation(self.errors)),
        }
    }
}

/// Immutable lookup from raw native type to its ordered rules
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, Vec<ValidationRule>>,
}

impl RuleTable {
    /// Create an empty rule table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with type and width rules for the common native types
    pub fn with_defaults() -> Self {
        let mut table = Self::new();

        for raw in [
            "int8_t", "uint8_t", "int16_t", "uint16_t", "int32_t", "uint32_t", "int64_t", "uint64_t", "char",
            "signed char", "unsigned char", "short", "unsigned short", "int", "unsigned int", "unsigned", "long",
            "unsigned long", "long long", "unsigned long long", "size_t", "ssize_t",
        ] {
            table.register(raw, ValidationRule::Type);
            if let Some(range) = ValidationRule::width_range(raw) {
                table.register(raw, range);
            }
        }

        for raw in [
            "float", "double", "long double", "bool", "_Bool", "const char*", "char*", "void*", "const void*",
            "int*", "const int*", "unsigned char*", "const unsigned char*", "float*", "double*", "const double*",
            "size_t*", "char**", "const char**", "void**",
        ] {
            table.register(raw, ValidationRule::Type);
        }

        table
    }

    /// Append a rule for a raw type
    pub fn register<S: AsRef<str>>(&mut self, raw_type: S, rule: ValidationRule) -> &mut Self {
        self.rules
            .entry(normalize_type(raw_type.as_ref()))
            .or_default()
            .push(rule);
        self
    }

    /// Replace every rule for a raw type
    pub fn replace<S: AsRef<str>>(&mut self, raw_type: S, rules: Vec<ValidationRule>) -> &mut Self {
        self.rules.insert(normalize_type(raw_type.as_ref()), rules);
        self
    }

    pub fn rules_for(&self, raw_type: &str) -> Option<&[ValidationRule]> {
        self.rules.get(&normalize_type(raw_type)).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Validates host values against the rules for their native types
#[derive(Debug, Clone)]
pub struct ValidationRuleEngine {
    table: RuleTable,
    converter: TypeConverter,
}

impl Default for ValidationRuleEngine {
    fn default() -> Self {
        Self::new(RuleTable::with_defaults(), TypeMapper::new())
    }
}

impl ValidationRuleEngine {
    /// Create a new engine over a finished rule table
    pub fn new(table: RuleTable, mapper: TypeMapper) -> Self {
        Self {
            table,
            converter: TypeConverter::new(mapper),
        }
    }

    pub fn rule_table(&self) -> &RuleTable {
        &self.table
    }

    pub fn converter(&self) -> &TypeConverter {
        &self.converter
    }

    /// Rules that apply to `raw_type`; an empty slice means the implicit type check
    pub fn rules_for(&self, raw_type: &str) -> &[ValidationRule] {
        self.table.rules_for(raw_type).unwrap_or(&[])
    }

    /// Validate one value against the rules for its raw type
    pub fn validate_parameter(&self, value: &Value, raw_type: &str) -> ValidationResult {
        let Some(rules) = self.table.rules_for(raw_type) else {
            // unregistered types get a plain type check, including native width
            return match self.converter.convert(value, raw_type) {
                Ok(converted) => ValidationResult::valid(converted),
                Err(e) => ValidationResult::invalid(vec![e.message]),
            };
        };

        let mut current = value.clone();
        let mut errors = Vec::new();
        for rule in rules {
            match rule.apply(&current, raw_type, &self.converter) {
                Ok(Some(converted)) => current = converted,
                Ok(None) => {}
                Err(rule_errors) => errors.extend(rule_errors),
            }
        }

        if errors.is_empty() {
            ValidationResult::valid(current)
        } else {
            ValidationResult::invalid(errors)
        }
    }

    /// Validate an argument list pairwise against raw types
    ///
    /// The converted value of a valid list is an array of converted arguments.
    pub fn validate_function_parameters(&self, values: &[Value], raw_types: &[&str]) -> ValidationResult {
        if values.len() != raw_types.len() {
            return ValidationResult::invalid(vec![format!(
                "Expected {} parameters, got {}",
                raw_types.len(),
                values.len()
            )]);
        }

        let nullable = vec![false; values.len()];
        self.validate_list(values, raw_types, &nullable)
    }

    /// Validate arguments for a parsed signature, honoring nullable parameters
    pub fn validate_call(&self, signature: &FunctionSignature, values: &[Value]) -> ValidationResult {
        if values.len() != signature.parameters.len() {
            return ValidationResult::invalid(vec![format!(
                "{}() expects {} parameters, got {}",
                signature.name,
                signature.parameters.len(),
                values.len()
            )]);
        }

        let raw_types = signature.parameter_types();
        let nullable: Vec<bool> = signature.parameters.iter().map(|p| p.nullable).collect();
        self.validate_list(values, &raw_types, &nullable)
    }

    fn validate_list(&self, values: &[Value], raw_types: &[&str], nullable: &[bool]) -> ValidationResult {
        let mut converted = Vec::with_capacity(values.len());
        let mut errors = Vec::new();

        for (index, ((value, raw_type), allow_null)) in values.iter().zip(raw_types).zip(nullable).enumerate() {
            if *allow_null && value.is_null() {
                converted.push(Value::Null);
                continue;
            }
            let result = self.validate_parameter(value, raw_type);
            if result.is_valid {
                converted.push(result.converted_value.unwrap_or(Value::Null));
            } else {
                errors.extend(
                    result
                        .errors
                        .into_iter()
                        .map(|e| format!("Parameter #{} ({}): {}", index + 1, raw_type, e)),
                );
            }
        }

        if errors.is_empty() {
            ValidationResult::valid(Value::Array(converted))
        } else {
            ValidationResult::invalid(errors)
        }
    }
}
