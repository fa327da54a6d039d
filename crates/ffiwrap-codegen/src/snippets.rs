//! Host-side argument checks emitted into generated methods
//!
//! Each validation rule registered for a parameter's raw type becomes a guard
//! that throws before the native call. Checks that the host signature already
//! enforces are not emitted.

use crate::naming::to_camel_case;
use ffiwrap_bindings::{HostType, ValidationRule};
use ffiwrap_core::Value;

/// Renders host values as source literals
pub fn host_literal(value: &Value) -> String {
    match value {
        Value::Null | Value::Handle { .. } => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_nan() => "\\NAN".to_string(),
        Value::Float(f) if f.is_infinite() => {
            if *f > 0.0 {
                "\\INF".to_string()
            } else {
                "-\\INF".to_string()
            }
        }
        Value::Float(f) => {
            let text = f.to_string();
            if text.contains(['.', 'e', 'E']) {
                text
            } else {
                format!("{}.0", text)
            }
        }
        Value::String(s) => quote(s),
        Value::Array(items) => format!("[{}]", items.iter().map(host_literal).collect::<Vec<_>>().join(", ")),
    }
}

/// Single-quoted host string literal
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 1e18 {
        format!("{}", bound as i64)
    } else {
        format!("{}", bound)
    }
}

/// A parameter as seen by the check emitter
#[derive(Debug, Clone, Copy)]
pub struct CheckTarget<'a> {
    /// Host variable name, without the sigil
    pub variable: &'a str,
    /// Native function name used in messages
    pub function: &'a str,
    pub host: &'a HostType,
    pub nullable: bool,
}

/// Emits guard statements for validation rules
#[derive(Debug, Clone, Copy, Default)]
pub struct SnippetEmitter;

impl SnippetEmitter {
    pub fn new() -> Self {
        Self
    }

    /// One guard statement per rule that needs a runtime check
    pub fn emit(&self, target: CheckTarget<'_>, rules: &[ValidationRule]) -> Vec<String> {
        rules.iter().filter_map(|rule| self.emit_rule(target, rule)).collect()
    }

    fn emit_rule(&self, target: CheckTarget<'_>, rule: &ValidationRule) -> Option<String> {
        let var = format!("${}", target.variable);
        let (condition, exception, message) = match rule {
            // the declared parameter type already enforces these
            ValidationRule::Type => return None,
            ValidationRule::Range { min, max } => {
                let (condition, message) = range_check(&var, *min, *max)?;
                (condition, "\\OutOfRangeException", message)
            }
            ValidationRule::Count { min, max } => {
                let length = match target.host.base() {
                    HostType::String => format!("strlen({})", var),
                    HostType::Array(_) => format!("count({})", var),
                    _ => format!("(is_array({0}) ? count({0}) : strlen((string) {0}))", var),
                };
                let (condition, message) = match (min, max) {
                    (Some(min), Some(max)) => (
                        format!("{0} < {1} || {0} > {2}", length, min, max),
                        format!("length must be between {} and {}", min, max),
                    ),
                    (Some(min), None) => (format!("{} < {}", length, min), format!("length must be at least {}", min)),
                    (None, Some(max)) => (format!("{} > {}", length, max), format!("length must be at most {}", max)),
                    (None, None) => return None,
                };
                (condition, "\\LengthException", message)
            }
            ValidationRule::AllowedValues(values) => {
                let listed = values.iter().map(host_literal).collect::<Vec<_>>().join(", ");
                (
                    format!("!in_array({}, [{}], true)", var, listed),
                    "\\InvalidArgumentException",
                    format!("must be one of {}", listed),
                )
            }
            ValidationRule::Pattern(regex) => {
                let delimited = format!("/{}/u", escape_delimiter(regex.as_str()));
                (
                    format!("!preg_match({}, (string) {})", quote(&delimited), var),
                    "\\InvalidArgumentException",
                    format!("must match {}", regex.as_str()),
                )
            }
            ValidationRule::Custom { name, .. } => {
                log::debug!("Custom rule '{}' on {}() has no host check", name, target.function);
                return None;
            }
        };

        let condition = if target.nullable {
            format!("{} !== null && ({})", var, condition)
        } else {
            condition
        };
        let text = format!("{}(): {} {}", target.function, var, message);
        Some(format!(
            "if ({}) {{\n    throw new {}({});\n}}",
            condition,
            exception,
            quote(&text)
        ))
    }

    /// Guards for a parameter whose raw type maps to a narrow native integer
    ///
    /// Used when no rule table entry exists for the raw type.
    pub fn width_guard(&self, target: CheckTarget<'_>, raw_type: &str) -> Option<String> {
        if !matches!(target.host.base(), HostType::Int) {
            return None;
        }
        let rule = ValidationRule::width_range(raw_type)?;
        self.emit_rule(target, &rule)
    }
}

fn range_check(var: &str, min: Option<f64>, max: Option<f64>) -> Option<(String, String)> {
    // bounds outside the host integer range can never be violated
    let min = min.filter(|m| *m > i64::MIN as f64);
    let max = max.filter(|m| *m < i64::MAX as f64);

    match (min, max) {
        (Some(min), Some(max)) => Some((
            format!("{0} < {1} || {0} > {2}", var, format_bound(min), format_bound(max)),
            format!("must be between {} and {}", format_bound(min), format_bound(max)),
        )),
        (Some(min), None) => Some((
            format!("{} < {}", var, format_bound(min)),
            format!("must be at least {}", format_bound(min)),
        )),
        (None, Some(max)) => Some((
            format!("{} > {}", var, format_bound(max)),
            format!("must be at most {}", format_bound(max)),
        )),
        (None, None) => None,
    }
}

/// Host variable name for a native parameter name
pub fn variable_name(raw: &str) -> String {
    let name = to_camel_case(raw);
    if name.is_empty() {
        "arg".to_string()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("arg{}", name)
    } else if name == "this" {
        "self_".to_string()
    } else {
        name
    }
}

/// Escape `/` for a slash-delimited PCRE pattern, leaving already escaped slashes alone
fn escape_delimiter(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    for c in pattern.chars() {
        if c == '/' && !escaped {
            out.push('\\');
        }
        out.push(c);
        escaped = c == '\\' && !escaped;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn target<'a>(host: &'a HostType, nullable: bool) -> CheckTarget<'a> {
        CheckTarget {
            variable: "value",
            function: "set_level",
            host,
            nullable,
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(host_literal(&Value::Int(-3)), "-3");
        assert_eq!(host_literal(&Value::Float(2.0)), "2.0");
        assert_eq!(host_literal(&Value::Float(3.14159)), "3.14159");
        assert_eq!(host_literal(&Value::Float(f64::INFINITY)), "\\INF");
        assert_eq!(host_literal(&Value::from("it's")), "'it\\'s'");
        assert_eq!(host_literal(&Value::from("C:\\tmp")), "'C:\\\\tmp'");
        assert_eq!(host_literal(&Value::from(vec![1i64, 2])), "[1, 2]");
        assert_eq!(host_literal(&Value::Null), "null");
    }

    #[test]
    fn test_range_guard() {
        let emitter = SnippetEmitter::new();
        let rules = vec![ValidationRule::Type, ValidationRule::width_range("uint8_t").unwrap()];
        let snippets = emitter.emit(target(&HostType::Int, false), &rules);

        assert_eq!(snippets.len(), 1);
        assert_eq!(
            snippets[0],
            "if ($value < 0 || $value > 255) {\n    throw new \\OutOfRangeException('set_level(): $value must be between 0 and 255');\n}"
        );
    }

    #[test]
    fn test_full_width_range_is_skipped() {
        let emitter = SnippetEmitter::new();
        assert!(emitter.emit(target(&HostType::Int, false), &[ValidationRule::width_range("int64_t").unwrap()]).is_empty());

        let snippets = emitter.emit(target(&HostType::Int, false), &[ValidationRule::width_range("uint64_t").unwrap()]);
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].starts_with("if ($value < 0)"));
    }

    #[test]
    fn test_nullable_guard() {
        let emitter = SnippetEmitter::new();
        let host = HostType::Nullable(Box::new(HostType::String));
        let snippets = emitter.emit(target(&host, true), &[ValidationRule::count(None, Some(16))]);
        assert!(snippets[0].starts_with("if ($value !== null && (strlen($value) > 16))"));
        assert!(snippets[0].contains("\\LengthException"));
    }

    #[test]
    fn test_allowed_values_and_pattern() {
        let emitter = SnippetEmitter::new();
        let rules = vec![
            ValidationRule::AllowedValues(vec![Value::Int(1), Value::Int(2)]),
            ValidationRule::Pattern(Regex::new("^a/b$").unwrap()),
            ValidationRule::custom("never", |_: &Value| false),
        ];
        let snippets = emitter.emit(target(&HostType::Mixed, false), &rules);

        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].starts_with("if (!in_array($value, [1, 2], true))"));
        assert!(snippets[1].contains("preg_match('/^a\\\\/b$/u', (string) $value)"));
    }

    #[test]
    fn test_escaped_slashes_are_kept() {
        assert_eq!(escape_delimiter(r"a\/b"), r"a\/b");
        assert_eq!(escape_delimiter("a/b"), r"a\/b");
        assert_eq!(escape_delimiter(r"a\\/b"), r"a\\\/b");

        let rules = vec![ValidationRule::Pattern(Regex::new(r"^a\/b$").unwrap())];
        let snippets = SnippetEmitter::new().emit(target(&HostType::Mixed, false), &rules);
        assert!(snippets[0].contains(r"preg_match('/^a\\/b$/u'"), "{}", snippets[0]);
    }

    #[test]
    fn test_width_guard() {
        let emitter = SnippetEmitter::new();
        assert!(emitter.width_guard(target(&HostType::Int, false), "int16_t").is_some());
        assert!(emitter.width_guard(target(&HostType::Float, false), "float").is_none());
    }

    #[test]
    fn test_variable_names() {
        assert_eq!(variable_name("initial_capacity"), "initialCapacity");
        assert_eq!(variable_name("this"), "self_");
        assert_eq!(variable_name("2d"), "arg2d");
    }
}
