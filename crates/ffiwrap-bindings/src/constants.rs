//! Constant extraction and literal coercion
//!
//! Three declaration forms are recognized, in any mix:
//! `const NAME = value;`, `define('NAME', value);` and `#define NAME value`.
//! Values are coerced from their literal syntax into [`Value`]s; a value that
//! is not a literal (an expression, a function-like macro) is reported and
//! skipped.

use crate::params::split_top_level;
use ffiwrap_core::{Constants, Diagnostic, DiagnosticCollector, Value};
use regex::Regex;

/// Diagnostic code for constants whose value is not a literal
pub const UNSUPPORTED_CONSTANT: &str = "unsupported-constant";

/// Constants found in one artifact
#[derive(Debug, Default)]
pub struct ConstantOutput {
    pub constants: Constants,
    pub diagnostics: DiagnosticCollector,
}

/// Extracts named constants from constant declaration text
#[derive(Debug, Clone)]
pub struct ConstantExtractor {
    const_pattern: Regex,
    define_call_pattern: Regex,
    macro_pattern: Regex,
}

impl Default for ConstantExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantExtractor {
    /// Create a new constant extractor
    pub fn new() -> Self {
        Self {
            const_pattern: Regex::new(
                r"^\s*(?:(?:public|protected|private|final)\s+)*const\s+(?:[A-Za-z_][\w\\]*\s+)?([A-Za-z_]\w*)\s*=\s*(.+?)\s*;",
            )
            .expect("valid const pattern"),
            define_call_pattern: Regex::new(r#"^\s*define\s*\(\s*['"]([A-Za-z_]\w*)['"]\s*,\s*(.+?)\s*\)\s*;"#)
                .expect("valid define pattern"),
            macro_pattern: Regex::new(r"^\s*#\s*define\s+([A-Za-z_]\w*)(\(?)(.*)$").expect("valid macro pattern"),
        }
    }

    /// Extract every constant; later definitions of a name replace earlier ones
    pub fn extract(&self, text: &str) -> ConstantOutput {
        let mut output = ConstantOutput::default();
        let mut lines = text.lines().enumerate().peekable();

        while let Some((index, line)) = lines.next() {
            let line_number = index + 1;

            if let Some(captures) = self.macro_pattern.captures(line) {
                // continuation lines belong to the macro
                let mut value = captures[3].to_string();
                while value.trim_end().ends_with('\\') {
                    let trimmed = value.trim_end();
                    value = trimmed[..trimmed.len() - 1].to_string();
                    match lines.next() {
                        Some((_, next)) => value.push_str(next),
                        None => break,
                    }
                }
                if &captures[2] == "(" {
                    log::debug!("Skipping function-like macro {}", &captures[1]);
                    continue;
                }
                let value = strip_trailing_comment(&value);
                if value.is_empty() {
                    log::debug!("Skipping valueless macro {}", &captures[1]);
                    continue;
                }
                self.record(&mut output, &captures[1], value, line_number);
            } else if let Some(captures) = self
                .const_pattern
                .captures(line)
                .or_else(|| self.define_call_pattern.captures(line))
            {
                self.record(&mut output, &captures[1], &captures[2], line_number);
            }
        }

        log::debug!("Extracted {} constants", output.constants.len());
        output
    }

    fn record(&self, output: &mut ConstantOutput, name: &str, text: &str, line: usize) {
        match parse_literal(text) {
            Some(value) => {
                output.constants.insert(name.to_string(), value);
            }
            None => output.diagnostics.add(
                Diagnostic::warning(format!("Constant '{}' has a non-literal value '{}'", name, text.trim()))
                    .at_line(line)
                    .with_code(UNSUPPORTED_CONSTANT),
            ),
        }
    }
}

fn strip_trailing_comment(value: &str) -> &str {
    let mut end = value.len();
    if let Some(i) = value.find("//") {
        end = end.min(i);
    }
    if let Some(i) = value.find("/*") {
        end = end.min(i);
    }
    value[..end].trim()
}

/// Coerce literal syntax into a value
///
/// Supports quoted strings, booleans, null, integers in decimal, hex, octal
/// and binary with native suffixes, floats, and `[...]`/`array(...)` lists.
pub fn parse_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // `(1024)` style wrappers
    if text.starts_with('(') && text.ends_with(')') && split_top_level(text, ' ').len() == 1 {
        return parse_literal(&text[1..text.len() - 1]);
    }

    match text.to_ascii_lowercase().as_str() {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" | "nullptr" => return Some(Value::Null),
        _ => {}
    }

    if let Some(body) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return parse_list(body);
    }
    if let Some(body) = strip_array_call(text) {
        return parse_list(body);
    }
    if let Some(s) = parse_quoted(text) {
        return Some(Value::String(s));
    }
    if let Some(i) = parse_integer(text) {
        return Some(Value::Int(i));
    }
    parse_float(text).map(Value::Float)
}

fn strip_array_call(text: &str) -> Option<&str> {
    let lower = text.get(..5)?.to_ascii_lowercase();
    if lower != "array" {
        return None;
    }
    text[5..].trim_start().strip_prefix('(')?.strip_suffix(')')
}

fn parse_list(body: &str) -> Option<Value> {
    let mut items = Vec::new();
    for piece in split_top_level(body, ',') {
        // keyed entries keep only the value
        let value_text = match piece.find("=>") {
            Some(arrow) => &piece[arrow + 2..],
            None => piece,
        };
        items.push(parse_literal(value_text)?);
    }
    Some(Value::Array(items))
}

fn parse_quoted(text: &str) -> Option<String> {
    let quote = text.chars().next()?;
    if (quote != '"' && quote != '\'') || text.len() < 2 || !text.ends_with(quote) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == quote {
            // `'a' . 'b'` is an expression, not a literal
            return None;
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') if quote == '"' => out.push('\n'),
            Some('t') if quote == '"' => out.push('\t'),
            Some('r') if quote == '"' => out.push('\r'),
            Some('0') if quote == '"' => out.push('\0'),
            Some(c) if c == quote || c == '\\' => out.push(c),
            Some('$') if quote == '"' => out.push('$'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}

/// Parse an integer literal with optional sign, radix prefix and native suffix
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let digits = digits.trim_end_matches(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L'));
    let digits = digits.replace(['_', '\''], "");
    if digits.is_empty() {
        return None;
    }

    let lower = digits.to_ascii_lowercase();
    let magnitude = if let Some(hex) = lower.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).ok()?
    } else if let Some(oct) = lower.strip_prefix("0o") {
        u64::from_str_radix(oct, 8).ok()?
    } else if lower.len() > 1 && lower.starts_with('0') {
        u64::from_str_radix(&lower[1..], 8).ok()?
    } else {
        lower.parse::<u64>().ok()?
    };

    if negative {
        if magnitude == i64::MIN.unsigned_abs() {
            Some(i64::MIN)
        } else {
            i64::try_from(magnitude).ok().map(|m| -m)
        }
    } else {
        // unsigned 64-bit constants keep their bit pattern
        Some(magnitude as i64)
    }
}

fn parse_float(text: &str) -> Option<f64> {
    let trimmed = text.trim_end_matches(['f', 'F', 'l', 'L']);
    if !trimmed.contains(['.', 'e', 'E']) && !matches!(trimmed.to_ascii_lowercase().as_str(), "inf" | "nan") {
        return None;
    }
    trimmed.replace('_', "").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_coercion() {
        assert_eq!(parse_literal("1024"), Some(Value::Int(1024)));
        assert_eq!(parse_literal("-17"), Some(Value::Int(-17)));
        assert_eq!(parse_literal("0xFF"), Some(Value::Int(255)));
        assert_eq!(parse_literal("0b101"), Some(Value::Int(5)));
        assert_eq!(parse_literal("010"), Some(Value::Int(8)));
        assert_eq!(parse_literal("100UL"), Some(Value::Int(100)));
        assert_eq!(parse_literal("1_000"), Some(Value::Int(1000)));
        assert_eq!(parse_literal("3.14159"), Some(Value::Float(3.14159)));
        assert_eq!(parse_literal("1e3"), Some(Value::Float(1000.0)));
        assert_eq!(parse_literal("2.5f"), Some(Value::Float(2.5)));
        assert_eq!(parse_literal("TRUE"), Some(Value::Bool(true)));
        assert_eq!(parse_literal("null"), Some(Value::Null));
        assert_eq!(parse_literal("'it\\'s'"), Some(Value::from("it's")));
        assert_eq!(parse_literal("\"a\\tb\""), Some(Value::from("a\tb")));
        assert_eq!(parse_literal("(42)"), Some(Value::Int(42)));
    }

    #[test]
    fn test_nested_lists() {
        assert_eq!(
            parse_literal("[1, [2, 3], 'x']"),
            Some(Value::Array(vec![
                Value::Int(1),
                Value::Array(vec![Value::Int(2), Value::Int(3)]),
                Value::from("x"),
            ]))
        );
        assert_eq!(parse_literal("array(1, 2)"), Some(Value::from(vec![1i64, 2])));
        assert_eq!(parse_literal("['a' => 1, 'b' => 2]"), Some(Value::from(vec![1i64, 2])));
        assert_eq!(parse_literal("[]"), Some(Value::Array(vec![])));
    }

    #[test]
    fn test_non_literals() {
        assert_eq!(parse_literal("FOO + 1"), None);
        assert_eq!(parse_literal("sizeof(int)"), None);
        assert_eq!(parse_literal(""), None);
    }

    #[test]
    fn test_extract_mixed_forms() {
        let text = r#"
const MAX_SIZE = 1024;
const VERSION = "1.0.0";
define('PI', 3.14159);
#define DEBUG_MODE 1 // on
#define MAX(a, b) ((a) > (b) ? (a) : (b))
#define EMPTY
#define MULTI 1 \
    + 2
const MAX_SIZE = 2048;
"#;
        let output = ConstantExtractor::new().extract(text);
        let constants = &output.constants;
        assert_eq!(constants["MAX_SIZE"], Value::Int(2048));
        assert_eq!(constants["VERSION"], Value::from("1.0.0"));
        assert_eq!(constants["PI"], Value::Float(3.14159));
        assert_eq!(constants["DEBUG_MODE"], Value::Int(1));
        assert!(!constants.contains_key("MAX"));
        assert!(!constants.contains_key("EMPTY"));
        assert!(!constants.contains_key("MULTI"));
        assert_eq!(output.diagnostics.with_code(UNSUPPORTED_CONSTANT).count(), 1);

        let names: Vec<&String> = constants.keys().collect();
        assert_eq!(names, vec!["MAX_SIZE", "VERSION", "PI", "DEBUG_MODE"]);
    }

    #[test]
    fn test_class_constants() {
        let output = ConstantExtractor::new().extract("    public const int LIMIT = 0x10;\n    final const NAME = 'n';");
        assert_eq!(output.constants["LIMIT"], Value::Int(16));
        assert_eq!(output.constants["NAME"], Value::from("n"));
    }
}
