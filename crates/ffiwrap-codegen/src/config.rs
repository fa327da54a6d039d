//! Configuration for wrapper generation
//!
//! A `GeneratorConfig` is read from TOML, validated once and then handed to
//! the [`WrapperGenerator`](crate::WrapperGenerator). Every field has a
//! default, so an empty file is a valid configuration.

use ffiwrap_bindings::{RuleTable, TypeMapper, ValidationRule};
use ffiwrap_core::{FfiWrapError, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Conflicting settings: {0}")]
    ConflictingSettings(String),
}

impl From<ConfigError> for FfiWrapError {
    fn from(error: ConfigError) -> Self {
        FfiWrapError::configuration(error.to_string())
    }
}

/// Configuration for wrapper generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Name of the wrapped library; the fallback class is named after it
    pub library_name: String,

    /// Namespace of every generated class, segments separated by `\`
    pub namespace: String,

    /// Prefixes removed from native names before grouping and naming
    pub strip_prefixes: Vec<String>,

    /// Regexes over native names that mark a function as a constructor
    pub constructor_patterns: Vec<String>,

    /// Explicit grouping rules, tried in order before the prefix heuristic
    pub group_patterns: Vec<GroupPattern>,

    /// Native type-name prefixes that are treated as opaque handles
    pub handle_families: Vec<String>,

    /// Emit runtime argument checks in generated methods
    pub emit_validation: bool,

    /// Emit doc comments on generated classes and methods
    pub emit_doc_comments: bool,

    /// Emit a generation timestamp in file headers
    pub emit_timestamp: bool,

    /// Name of the class holding the library constants
    pub constants_class: String,

    /// Generate one class per native structure
    pub generate_struct_classes: bool,

    /// Extension of generated artifacts, without the dot
    pub file_extension: String,

    /// Groups with fewer functions are merged into the fallback class
    pub min_group_size: usize,

    /// Directory with template overrides (`<name>.tmpl`)
    pub template_dir: Option<PathBuf>,

    /// Extra validation rules per raw native type
    pub rules: Vec<RuleConfig>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            library_name: "native".to_string(),
            namespace: "Native\\Bindings".to_string(),
            strip_prefixes: Vec::new(),
            constructor_patterns: vec![
                r"^[Nn]ew[A-Z]\w*$".to_string(),
                r"(?i)(^|_)(new|create)$".to_string(),
            ],
            group_patterns: Vec::new(),
            handle_families: Vec::new(),
            emit_validation: true,
            emit_doc_comments: true,
            emit_timestamp: true,
            constants_class: "Constants".to_string(),
            generate_struct_classes: true,
            file_extension: "php".to_string(),
            min_group_size: 2,
            template_dir: None,
            rules: Vec::new(),
        }
    }
}

/// A `(regex, group)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPattern {
    pub pattern: String,
    pub group: String,
}

/// Validation rules for one raw native type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub raw_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_min: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_max: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl RuleConfig {
    /// Validate the rule entry
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.raw_type.trim().is_empty() {
            return Err(ConfigError::InvalidValue("rules.raw_type cannot be empty".to_string()));
        }

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(ConfigError::InvalidValue(format!(
                    "Rule for '{}' has min {} greater than max {}",
                    self.raw_type, min, max
                )));
            }
        }

        if let (Some(min), Some(max)) = (self.length_min, self.length_max) {
            if min > max {
                return Err(ConfigError::InvalidValue(format!(
                    "Rule for '{}' has length_min {} greater than length_max {}",
                    self.raw_type, min, max
                )));
            }
        }

        if let Some(pattern) = &self.pattern {
            Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidValue(format!("Rule for '{}' has an invalid pattern: {}", self.raw_type, e))
            })?;
        }

        Ok(())
    }

    /// Rules described by this entry, in a fixed order
    pub fn to_rules(&self) -> Result<Vec<ValidationRule>, ConfigError> {
        let mut rules = Vec::new();

        if self.min.is_some() || self.max.is_some() {
            rules.push(ValidationRule::range(self.min, self.max));
        }
        if self.length_min.is_some() || self.length_max.is_some() {
            rules.push(ValidationRule::count(self.length_min, self.length_max));
        }
        if let Some(values) = &self.allowed_values {
            rules.push(ValidationRule::AllowedValues(values.clone()));
        }
        if let Some(pattern) = &self.pattern {
            let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
            rules.push(ValidationRule::Pattern(regex));
        }

        Ok(rules)
    }
}

impl GeneratorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::IoError(format!("Failed to read config file {:?}: {}", path.as_ref(), e)))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("Failed to parse TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(format!("Failed to write TOML: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate namespace
        if self.namespace.is_empty() {
            return Err(ConfigError::InvalidValue("namespace cannot be empty".to_string()));
        }
        for segment in self.namespace.trim_start_matches('\\').split('\\') {
            if !is_valid_identifier(segment) {
                return Err(ConfigError::InvalidValue(format!(
                    "namespace segment '{}' is not a valid identifier",
                    segment
                )));
            }
        }

        if !is_valid_identifier(&self.constants_class) {
            return Err(ConfigError::InvalidValue(format!(
                "constants_class '{}' is not a valid identifier",
                self.constants_class
            )));
        }

        if self.library_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("library_name cannot be empty".to_string()));
        }

        if self.file_extension.is_empty() || self.file_extension.contains(['.', '/', '\\']) {
            return Err(ConfigError::InvalidValue(format!(
                "file_extension '{}' must be a bare extension",
                self.file_extension
            )));
        }

        if self.min_group_size == 0 {
            return Err(ConfigError::InvalidValue("min_group_size must be greater than 0".to_string()));
        }

        // Validate regexes
        for pattern in &self.constructor_patterns {
            Regex::new(pattern)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid constructor pattern '{}': {}", pattern, e)))?;
        }
        for group in &self.group_patterns {
            Regex::new(&group.pattern)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid group pattern '{}': {}", group.pattern, e)))?;
            if group.group.trim().is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "Group pattern '{}' names an empty group",
                    group.pattern
                )));
            }
        }

        for rule in &self.rules {
            rule.validate()?;
        }

        if self.strip_prefixes.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidValue("strip_prefixes cannot contain empty entries".to_string()));
        }

        if let Some(dir) = &self.template_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue("template_dir cannot be empty".to_string()));
            }
        }

        if !self.emit_validation && !self.rules.is_empty() {
            return Err(ConfigError::ConflictingSettings(
                "rules are configured but emit_validation is false".to_string(),
            ));
        }

        Ok(())
    }

    /// Type mapper with the configured handle families
    pub fn type_mapper(&self) -> TypeMapper {
        TypeMapper::new().with_handle_families(self.handle_families.iter().cloned())
    }

    /// Default rule table extended with the configured rules
    ///
    /// Configured rules run after the default type and width rules of their
    /// raw type.
    pub fn rule_table(&self) -> Result<RuleTable, ConfigError> {
        let mut table = RuleTable::with_defaults();
        for entry in &self.rules {
            let has_defaults = table.rules_for(&entry.raw_type).is_some();
            if !has_defaults {
                table.register(&entry.raw_type, ValidationRule::Type);
            }
            for rule in entry.to_rules()? {
                table.register(&entry.raw_type, rule);
            }
        }
        Ok(table)
    }
}

/// Check if a string is a valid host identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    // First character must be letter or underscore
    if !first.is_alphabetic() && first != '_' {
        return false;
    }

    // Remaining characters must be alphanumeric or underscore
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
