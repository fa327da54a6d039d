//! Documentation block parsing
//!
//! Extracts `@param` and `@return` annotations from `/** ... */` blocks. The
//! annotation types are only used to fill gaps left by the declaration itself.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

/// A documented parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocParam {
    pub raw_type: Option<String>,
    pub description: String,
}

/// A documented return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocReturn {
    pub raw_type: String,
    pub description: String,
}

/// Parsed contents of a documentation block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocBlock {
    /// Cleaned lines of the block, annotations included
    pub lines: Vec<String>,
    /// Free-text lines that are not annotations
    pub summary: Vec<String>,
    pub params: IndexMap<String, DocParam>,
    pub returns: Option<DocReturn>,
}

fn param_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@param\s+(?:(?P<type>[^$]+?)\s+)?(?:\.\.\.)?&?\$(?P<name>\w+)\s*(?P<desc>.*)$")
            .expect("valid @param regex")
    })
}

fn param_untyped_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@param\s+(?P<name>\w+)\s*(?P<desc>.*)$").expect("valid @param regex"))
}

impl DocBlock {
    /// Parse a raw `/** ... */` comment
    pub fn parse(comment: &str) -> Self {
        let body = comment
            .trim()
            .trim_start_matches("/**")
            .trim_end_matches("*/");
        let lines = body
            .lines()
            .map(|line| line.trim().trim_start_matches('*').trim().to_string())
            .collect::<Vec<_>>();
        Self::from_lines(trim_blank_edges(lines))
    }

    /// Parse already-cleaned lines (as stored on a function signature)
    pub fn from_lines(lines: Vec<String>) -> Self {
        let mut block = DocBlock {
            lines: lines.clone(),
            ..Default::default()
        };

        for line in &lines {
            if let Some(captures) = param_regex().captures(line) {
                let raw_type = captures
                    .name("type")
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|t| !t.is_empty());
                block.params.insert(
                    captures["name"].to_string(),
                    DocParam {
                        raw_type,
                        description: captures["desc"].trim().to_string(),
                    },
                );
            } else if let Some(captures) = param_untyped_regex().captures(line) {
                block.params.insert(
                    captures["name"].to_string(),
                    DocParam {
                        raw_type: None,
                        description: captures["desc"].trim().to_string(),
                    },
                );
            } else if let Some(rest) = line.strip_prefix("@return") {
                let rest = rest.strip_prefix('s').unwrap_or(rest).trim();
                if let Some((raw_type, description)) = split_doc_type(rest) {
                    block.returns = Some(DocReturn { raw_type, description });
                }
            } else if !line.starts_with('@') {
                block.summary.push(line.clone());
            }
        }

        block.summary = trim_blank_edges(std::mem::take(&mut block.summary));
        block
    }

    pub fn param_type(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|p| p.raw_type.as_deref())
    }

    pub fn return_type(&self) -> Option<&str> {
        self.returns.as_ref().map(|r| r.raw_type.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn trim_blank_edges(mut lines: Vec<String>) -> Vec<String> {
    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Split `const char* the message` into (`const char*`, `the message`)
///
/// Leading qualifier words are consumed together with the base type, and
/// pointer stars are attached whether or not they are spaced.
fn split_doc_type(text: &str) -> Option<(String, String)> {
    let mut words = text.split_whitespace().peekable();
    let mut type_words: Vec<&str> = Vec::new();

    while let Some(word) = words.next() {
        type_words.push(word);
        let is_qualifier = matches!(
            word,
            "const" | "unsigned" | "signed" | "struct" | "union" | "enum" | "volatile"
        ) || (matches!(word, "long" | "short") && words.peek().is_some_and(|n| matches!(*n, "long" | "int" | "double")));
        if !is_qualifier {
            while words.peek().is_some_and(|n| n.chars().all(|c| c == '*')) {
                type_words.extend(words.next());
            }
            break;
        }
    }

    if type_words.is_empty() {
        return None;
    }
    let raw_type = crate::params::normalize_type(&type_words.join(" "));
    let description = words.collect::<Vec<_>>().join(" ");
    Some((raw_type, description))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "/**\n * Add two integers\n *\n * @param int $a First operand\n * @param ?int $b\n * @return int the sum\n */";

    #[test]
    fn test_parse_typed_annotations() {
        let block = DocBlock::parse(DOC);
        assert_eq!(block.summary, vec!["Add two integers"]);
        assert_eq!(block.param_type("a"), Some("int"));
        assert_eq!(block.params["a"].description, "First operand");
        assert_eq!(block.param_type("b"), Some("?int"));
        assert_eq!(block.return_type(), Some("int"));
        assert_eq!(block.returns.as_ref().unwrap().description, "the sum");
    }

    #[test]
    fn test_multiword_native_types() {
        let block = DocBlock::from_lines(vec![
            "@param const char* $name Name to look up".to_string(),
            "@return unsigned long long count".to_string(),
        ]);
        assert_eq!(block.param_type("name"), Some("const char*"));
        assert_eq!(block.return_type(), Some("unsigned long long"));

        let block = DocBlock::from_lines(vec!["@return const char * the message".to_string()]);
        assert_eq!(block.return_type(), Some("const char*"));
        assert_eq!(block.returns.unwrap().description, "the message");
    }

    #[test]
    fn test_untyped_and_plain_params() {
        let block = DocBlock::from_lines(vec![
            "@param $value".to_string(),
            "@param count Number of items".to_string(),
        ]);
        assert_eq!(block.param_type("value"), None);
        assert!(block.params.contains_key("value"));
        assert_eq!(block.params["count"].description, "Number of items");
    }

    #[test]
    fn test_empty_block() {
        let block = DocBlock::parse("/** */");
        assert!(block.is_empty());
        assert!(block.returns.is_none());
    }
}
