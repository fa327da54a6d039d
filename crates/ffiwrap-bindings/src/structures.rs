//! Structure, union and enum extraction
//!
//! Picks up `struct`/`union`/`enum` bodies, named either by their tag or by a
//! `typedef` alias, at top level and inside string literals. Anonymous nested
//! aggregates become fields typed `struct` or `union`.

use crate::constants::parse_integer;
use crate::lexer::{find_matching, Lexer, Token, TokenKind};
use crate::params::{parse_parameter, split_top_level};
use ffiwrap_core::{Diagnostic, DiagnosticCollector, EnumDefinition, StructField, StructureDefinition};

/// Diagnostic code for aggregates that could not be parsed
pub const MALFORMED_AGGREGATE: &str = "malformed-aggregate";

/// Aggregates found in one artifact
#[derive(Debug, Default)]
pub struct StructureOutput {
    pub structures: Vec<StructureDefinition>,
    pub enums: Vec<EnumDefinition>,
    pub diagnostics: DiagnosticCollector,
}

/// Extracts aggregate type definitions from binding text
#[derive(Debug, Clone, Default)]
pub struct StructureExtractor;

impl StructureExtractor {
    /// Create a new structure extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract every named struct, union and enum definition
    pub fn extract(&self, text: &str) -> StructureOutput {
        let mut output = StructureOutput::default();
        self.scan(text, 0, &mut output, true);
        log::debug!(
            "Extracted {} structures and {} enums",
            output.structures.len(),
            output.enums.len()
        );
        output
    }

    fn scan(&self, source: &str, line_offset: usize, output: &mut StructureOutput, descend: bool) {
        let tokens = Lexer::new(source).tokenize();
        let mut i = 0;

        while i < tokens.len() {
            let token = tokens[i];
            match token.kind {
                TokenKind::Ident if matches!(token.text, "struct" | "union" | "enum") => {
                    let is_typedef = i > 0 && tokens[i - 1].is_ident("typedef");
                    i = self.parse_aggregate(source, &tokens, i, is_typedef, line_offset, output);
                }
                TokenKind::StringLit if descend => {
                    let contents = token.unquoted();
                    if contents.contains('{') {
                        let contents = contents.replace("\\n", "\n").replace("\\t", "\t");
                        self.scan(&contents, line_offset + token.line - 1, output, false);
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }
    }

    /// Parse the aggregate starting at `keyword`; returns the index to resume at
    fn parse_aggregate(
        &self,
        source: &str,
        tokens: &[Token<'_>],
        keyword: usize,
        is_typedef: bool,
        line_offset: usize,
        output: &mut StructureOutput,
    ) -> usize {
        let kind = tokens[keyword].text;
        let line = tokens[keyword].line + line_offset;

        let mut open = keyword + 1;
        let tag = match tokens.get(open) {
            Some(t) if t.kind == TokenKind::Ident => {
                open += 1;
                Some(t.text)
            }
            _ => None,
        };
        if !tokens.get(open).is_some_and(|t| t.is_punct('{')) {
            // a use of the type, not a definition
            return keyword + 1;
        }

        let close = match find_matching(tokens, open, '{', '}') {
            Some(close) => close,
            None => {
                output.diagnostics.add(
                    Diagnostic::warning(format!("Unterminated {} definition", kind))
                        .at_line(line)
                        .with_code(MALFORMED_AGGREGATE),
                );
                return open + 1;
            }
        };

        let alias = if is_typedef {
            tokens[close + 1..]
                .iter()
                .take_while(|t| !t.is_punct(';'))
                .find(|t| t.kind == TokenKind::Ident)
                .map(|t| t.text)
        } else {
            None
        };
        let resume = tokens[close + 1..]
            .iter()
            .position(|t| t.is_punct(';'))
            .map_or(close + 1, |offset| close + offset + 2);

        let Some(name) = alias.or(tag) else {
            log::debug!("Skipping anonymous {} at line {}", kind, line);
            return resume;
        };

        let body = &source[tokens[open].end()..tokens[close].start];
        if kind == "enum" {
            let definition = parse_enum(name, body, line, &mut output.diagnostics);
            output.enums.push(definition);
        } else {
            let fields = parse_fields(body);
            output
                .structures
                .push(StructureDefinition::new(name, fields, kind == "union"));
        }
        resume
    }
}

/// Parse the field declarations of a struct or union body
pub fn parse_fields(body: &str) -> Vec<StructField> {
    let mut fields = Vec::new();
    let body = strip_comments(body);

    for declaration in split_top_level(&body, ';') {
        // anonymous nested aggregate: `union { ... } value`
        if let Some(brace) = declaration.find('{') {
            let keyword = if declaration[..brace].contains("union") { "union" } else { "struct" };
            let tail = declaration.rfind('}').map_or("", |end| &declaration[end + 1..]);
            for name in split_top_level(tail, ',') {
                let name = name.trim_start_matches('*').trim();
                if !name.is_empty() {
                    fields.push(StructField::new(name, keyword));
                }
            }
            continue;
        }

        let declaration = strip_bit_width(declaration);
        let declarators = split_top_level(declaration, ',');
        let Some(first) = declarators.first().and_then(|d| parse_parameter(d, fields.len())) else {
            continue;
        };

        // `int x, *y, z[2]` shares the base type of the first declarator
        let base = first.raw_type.trim_end_matches(|c| c == '*').to_string();
        let base = base.split('[').next().unwrap_or(&base).trim().to_string();
        fields.push(StructField::new(first.name, first.raw_type));

        for extra in declarators.iter().skip(1) {
            let stars = extra.chars().take_while(|c| *c == '*' || c.is_whitespace()).filter(|c| *c == '*').count();
            let rest = extra.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
            let (name, suffix) = match rest.find('[') {
                Some(bracket) => (rest[..bracket].trim(), rest[bracket..].replace(' ', "")),
                None => (rest.trim(), String::new()),
            };
            if name.is_empty() {
                continue;
            }
            fields.push(StructField::new(name, format!("{}{}{}", base, "*".repeat(stars), suffix)));
        }
    }

    fields
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for token in Lexer::new(text) {
        if token.kind == TokenKind::DocComment {
            continue;
        }
        if !out.is_empty() && needs_space(&out, token.text) {
            out.push(' ');
        }
        out.push_str(token.text);
    }
    out
}

fn needs_space(previous: &str, next: &str) -> bool {
    let last = previous.chars().last().unwrap_or(' ');
    let first = next.chars().next().unwrap_or(' ');
    (last.is_alphanumeric() || last == '_' || last == '*') && (first.is_alphanumeric() || first == '_' || first == '(' || first == '*')
}

fn strip_bit_width(declaration: &str) -> &str {
    match declaration.rfind(':') {
        Some(colon) if !declaration.contains("::") && declaration[colon + 1..].trim().chars().all(|c| c.is_ascii_digit()) => {
            declaration[..colon].trim()
        }
        _ => declaration,
    }
}

/// Parse enum members, resolving implicit and referenced values
fn parse_enum(name: &str, body: &str, line: usize, diagnostics: &mut DiagnosticCollector) -> EnumDefinition {
    let mut members: Vec<(String, i64)> = Vec::new();
    let mut next_value = 0i64;

    for entry in split_top_level(&strip_comments(body), ',') {
        let (member, value) = match entry.split_once('=') {
            Some((member, expression)) => {
                let member = member.trim();
                match evaluate(expression, &members) {
                    Some(value) => (member, value),
                    None => {
                        diagnostics.add(
                            Diagnostic::warning(format!(
                                "Cannot evaluate value of enum member '{}'; using {}",
                                member, next_value
                            ))
                            .at_line(line)
                            .with_code(MALFORMED_AGGREGATE),
                        );
                        (member, next_value)
                    }
                }
            }
            None => (entry.trim(), next_value),
        };
        if member.is_empty() {
            continue;
        }
        next_value = value.wrapping_add(1);
        members.push((member.to_string(), value));
    }

    EnumDefinition {
        name: name.to_string(),
        members,
    }
}

/// Split on `operator` outside parentheses
fn split_operator<'a>(expression: &'a str, operator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut index = 0;
    while index < expression.len() {
        let rest = &expression[index..];
        if rest.starts_with('(') {
            depth += 1;
        } else if rest.starts_with(')') {
            depth -= 1;
        } else if depth == 0 && rest.starts_with(operator) {
            parts.push(expression[start..index].trim());
            index += operator.len();
            start = index;
            continue;
        }
        index += rest.chars().next().map_or(1, char::len_utf8);
    }
    parts.push(expression[start..].trim());
    parts
}

/// Evaluate `a | b`, `1 << n`, negation, parentheses, literals and member references
fn evaluate(expression: &str, members: &[(String, i64)]) -> Option<i64> {
    let expression = expression.trim();

    let alternatives = split_operator(expression, "|");
    if alternatives.len() > 1 {
        return alternatives
            .iter()
            .try_fold(0i64, |acc, part| evaluate(part, members).map(|v| acc | v));
    }

    let shifts = split_operator(expression, "<<");
    if shifts.len() == 2 {
        let shift = u32::try_from(evaluate(shifts[1], members)?).ok()?;
        return evaluate(shifts[0], members)?.checked_shl(shift);
    }

    if let Some(inner) = expression.strip_prefix('(').and_then(|e| e.strip_suffix(')')) {
        return evaluate(inner, members);
    }
    if let Some(inner) = expression.strip_prefix('-') {
        if parse_integer(inner).is_none() {
            return evaluate(inner, members).map(|v| -v);
        }
    }
    if let Some(c) = expression.strip_prefix('\'').and_then(|e| e.strip_suffix('\'')) {
        let mut chars = c.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            return Some(ch as i64);
        }
    }

    parse_integer(expression).or_else(|| {
        members
            .iter()
            .find(|(member, _)| member == expression)
            .map(|(_, value)| *value)
    })
}
