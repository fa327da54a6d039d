//! Template engine for wrapper source text
//!
//! A deliberately small language over a fixed context schema:
//!
//! - `{{ expr }}` prints a value, `expr` being a dotted path or a literal
//!   followed by any number of `| filter` or `| filter(arg, ...)` calls
//! - `{% if [not] expr %}`, `{% elif [not] expr %}`, `{% else %}`, `{% endif %}`
//! - `{% for name in expr %}` ... `{% endfor %}`, with `loop.index`,
//!   `loop.first` and `loop.last` in scope
//! - `{% include "name" %}` renders another registered template in the
//!   current scope
//! - `{# ... #}` is a comment
//!
//! A block tag that is alone on its line removes the whole line. A `-` just
//! inside any delimiter trims the whitespace on that side.
//!
//! Filters come from a fixed set. Type-related filters are delegated to a
//! [`TemplateHelpers`] implementation supplied at render time.

use crate::generators::{WrapperClass, WrapperKind};
use crate::naming::{to_camel_case, to_pascal_case, to_snake_case, to_upper_snake_case};
use crate::snippets::{host_literal, quote};
use ffiwrap_core::{FfiWrapError, FfiWrapResult, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Name of the template for grouped function wrappers
pub const WRAPPER_CLASS: &str = "wrapper_class";
/// Name of the template for structure value classes
pub const STRUCT_CLASS: &str = "struct_class";
/// Name of the template for the constants holder
pub const CONSTANTS_CLASS: &str = "constants_class";
/// Fragment rendering one method, included by `wrapper_class`
pub const METHOD: &str = "method";
/// Fragment rendering one property, included by `struct_class`
pub const PROPERTY: &str = "property";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (WRAPPER_CLASS, include_str!("../templates/wrapper_class.tmpl")),
    (STRUCT_CLASS, include_str!("../templates/struct_class.tmpl")),
    (CONSTANTS_CLASS, include_str!("../templates/constants_class.tmpl")),
    (METHOD, include_str!("../templates/method.tmpl")),
    (PROPERTY, include_str!("../templates/property.tmpl")),
];

const MAX_INCLUDE_DEPTH: usize = 16;

/// Value visible to templates
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<TemplateValue>),
    Map(IndexMap<String, TemplateValue>),
    /// A host value, printed as a source literal
    Native(Value),
}

/// Top-level template variables
pub type TemplateContext = IndexMap<String, TemplateValue>;

impl TemplateValue {
    /// Create an empty map value
    pub fn map() -> Self {
        TemplateValue::Map(IndexMap::new())
    }

    /// Insert into a map value; no effect on other values
    pub fn with<K: Into<String>, V: Into<TemplateValue>>(mut self, key: K, value: V) -> Self {
        if let TemplateValue::Map(entries) = &mut self {
            entries.insert(key.into(), value.into());
        }
        self
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Null => false,
            TemplateValue::Bool(b) => *b,
            TemplateValue::Int(i) => *i != 0,
            TemplateValue::Str(s) => !s.is_empty(),
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Map(entries) => !entries.is_empty(),
            TemplateValue::Native(value) => !value.is_null(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        match self {
            TemplateValue::Map(entries) => entries.get(key),
            TemplateValue::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TemplateValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Source literal of the value
    pub fn literal(&self) -> String {
        match self {
            TemplateValue::Null => "null".to_string(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Int(i) => i.to_string(),
            TemplateValue::Str(s) => quote(s),
            TemplateValue::List(items) => {
                format!("[{}]", items.iter().map(|i| i.literal()).collect::<Vec<_>>().join(", "))
            }
            TemplateValue::Map(entries) => format!(
                "[{}]",
                entries
                    .iter()
                    .map(|(k, v)| format!("{} => {}", quote(k), v.literal()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TemplateValue::Native(value) => host_literal(value),
        }
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateValue::Null => Ok(()),
            TemplateValue::Bool(b) => write!(f, "{}", b),
            TemplateValue::Int(i) => write!(f, "{}", i),
            TemplateValue::Str(s) => write!(f, "{}", s),
            TemplateValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", rendered.join(", "))
            }
            TemplateValue::Map(_) => write!(f, "{}", self.literal()),
            TemplateValue::Native(value) => write!(f, "{}", host_literal(value)),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::Str(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::Str(s)
    }
}

impl From<&String> for TemplateValue {
    fn from(s: &String) -> Self {
        TemplateValue::Str(s.clone())
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

impl From<i64> for TemplateValue {
    fn from(i: i64) -> Self {
        TemplateValue::Int(i)
    }
}

impl From<usize> for TemplateValue {
    fn from(i: usize) -> Self {
        TemplateValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<Value> for TemplateValue {
    fn from(value: Value) -> Self {
        TemplateValue::Native(value)
    }
}

impl<T: Into<TemplateValue>> From<Vec<T>> for TemplateValue {
    fn from(items: Vec<T>) -> Self {
        TemplateValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(TemplateValue::Null)
    }
}

/// Type and validation helpers available as template filters
pub trait TemplateHelpers {
    /// Host type declaration for a raw native type
    fn host_type(&self, raw_type: &str) -> String;

    /// Nullable host type declaration for a raw native type
    fn nullable_host_type(&self, raw_type: &str) -> String;

    /// Host type as written in doc comments
    fn doc_type(&self, raw_type: &str) -> String;

    /// Literal used to initialize a slot of the raw type
    fn default_value(&self, raw_type: &str) -> String;

    /// Guard statements for one parameter
    fn validation(&self, variable: &str, raw_type: &str, nullable: bool, function: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    Camel,
    Pascal,
    Snake,
    Upper,
    Lower,
    HostType,
    NullableHostType,
    DocType,
    DefaultValue,
    Literal,
    Validation,
    Join,
    Indent,
}

impl FilterKind {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "camel" => FilterKind::Camel,
            "pascal" => FilterKind::Pascal,
            "snake" => FilterKind::Snake,
            "upper" => FilterKind::Upper,
            "lower" => FilterKind::Lower,
            "host_type" => FilterKind::HostType,
            "nullable_host_type" => FilterKind::NullableHostType,
            "doc_type" => FilterKind::DocType,
            "default_value" => FilterKind::DefaultValue,
            "literal" => FilterKind::Literal,
            "validation" => FilterKind::Validation,
            "join" => FilterKind::Join,
            "indent" => FilterKind::Indent,
            _ => return None,
        })
    }

    /// Accepted argument counts
    fn arity(self) -> (usize, usize) {
        match self {
            FilterKind::Validation => (1, 1),
            FilterKind::Join | FilterKind::Indent => (0, 1),
            _ => (0, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(Vec<String>),
    Str(String),
    Int(i64),
}

#[derive(Debug, Clone)]
struct Filter {
    kind: FilterKind,
    args: Vec<Operand>,
}

#[derive(Debug, Clone)]
struct Expr {
    head: Operand,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone)]
struct Condition {
    negated: bool,
    expr: Expr,
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Output { expr: Expr, line: usize },
    If { branches: Vec<(Condition, Vec<Node>)>, otherwise: Vec<Node>, line: usize },
    For { variable: String, iterable: Expr, body: Vec<Node>, line: usize },
    Include { template: String, line: usize },
}

#[derive(Debug)]
enum Segment {
    Text(String),
    Output(String, usize),
    Tag(String, usize),
}

/// A parsed template
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source; syntax errors are generation errors
    pub fn parse(name: &str, source: &str) -> FfiWrapResult<Self> {
        let segments = segment(name, source)?;
        let mut parser = TemplateParser {
            name,
            segments,
            pos: 0,
        };
        let (nodes, terminator) = parser.parse_block(&[])?;
        if let Some((keyword, line)) = terminator {
            return Err(syntax_error(name, line, format!("unexpected '{}'", keyword)));
        }
        Ok(Self {
            name: name.to_string(),
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn syntax_error(template: &str, line: usize, message: String) -> FfiWrapError {
    FfiWrapError::generation_in_template(format!("Template syntax error at line {}: {}", line, message), template)
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

/// Whether the tag spanning `start..end` is the only thing on its line
///
/// Returns the number of bytes after `end` to skip, up to and including the
/// line break.
fn standalone_tail(source: &str, start: usize, end: usize) -> Option<usize> {
    let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
    if !source[line_start..start].chars().all(|c| c == ' ' || c == '\t') {
        return None;
    }

    let after = &source[end..];
    let (line, consumed) = match after.find('\n') {
        Some(i) => (&after[..i], i + 1),
        None => (after, after.len()),
    };
    if line.chars().all(|c| c == ' ' || c == '\t' || c == '\r') {
        Some(consumed)
    } else {
        None
    }
}

fn segment(name: &str, source: &str) -> FfiWrapResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut pos = 0;
    let mut trim_next = false;

    while pos < source.len() {
        let rest = &source[pos..];
        let open_offset = ["{{", "{%", "{#"].iter().filter_map(|open| rest.find(open)).min();
        let Some(offset) = open_offset else {
            text.push_str(if trim_next { rest.trim_start() } else { rest });
            break;
        };

        let start = pos + offset;
        let chunk = &source[pos..start];
        text.push_str(if trim_next { chunk.trim_start() } else { chunk });
        trim_next = false;

        let open = &source[start..start + 2];
        let close = match open {
            "{{" => "}}",
            "{%" => "%}",
            _ => "#}",
        };
        let line = line_of(source, start);
        let Some(close_offset) = source[start + 2..].find(close) else {
            return Err(syntax_error(name, line, format!("'{}' is never closed", open)));
        };
        let end = start + 2 + close_offset + 2;

        let mut inner = &source[start + 2..end - 2];
        let trim_left = inner.starts_with('-');
        if trim_left {
            inner = &inner[1..];
        }
        let trim_right = inner.ends_with('-');
        if trim_right {
            inner = &inner[..inner.len() - 1];
        }

        let mut next = end;
        if trim_left {
            text.truncate(text.trim_end().len());
        } else if open != "{{" && !trim_right {
            if let Some(tail) = standalone_tail(source, start, end) {
                // drop the indentation before the tag and the line break after it
                text.truncate(text.trim_end_matches([' ', '\t']).len());
                next = end + tail;
            }
        }
        trim_next = trim_right;

        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }
        match open {
            "{{" => segments.push(Segment::Output(inner.trim().to_string(), line)),
            "{%" => segments.push(Segment::Tag(inner.trim().to_string(), line)),
            _ => {}
        }
        pos = next;
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

struct TemplateParser<'a> {
    name: &'a str,
    segments: Vec<Segment>,
    pos: usize,
}

type Terminator = Option<(String, usize)>;

impl TemplateParser<'_> {
    /// Parse nodes until one of `terminators` or the end of input
    ///
    /// A matched terminator is consumed and returned as its full tag text.
    fn parse_block(&mut self, terminators: &[&str]) -> FfiWrapResult<(Vec<Node>, Terminator)> {
        let mut nodes = Vec::new();

        while self.pos < self.segments.len() {
            let index = self.pos;
            self.pos += 1;
            match &self.segments[index] {
                Segment::Text(text) => nodes.push(Node::Text(text.clone())),
                Segment::Output(expr, line) => {
                    let (expr, line) = (expr.clone(), *line);
                    nodes.push(Node::Output {
                        expr: self.parse_expr(&expr, line)?,
                        line,
                    });
                }
                Segment::Tag(tag, line) => {
                    let (tag, line) = (tag.clone(), *line);
                    let (keyword, rest) = match tag.split_once(char::is_whitespace) {
                        Some((keyword, rest)) => (keyword, rest.trim()),
                        None => (tag.as_str(), ""),
                    };

                    if terminators.contains(&keyword) {
                        return Ok((nodes, Some((tag.clone(), line))));
                    }

                    match keyword {
                        "if" => nodes.push(self.parse_if(rest, line)?),
                        "for" => nodes.push(self.parse_for(rest, line)?),
                        "include" => {
                            let template = match parse_operand(rest) {
                                Some(Operand::Str(name)) => name,
                                _ => return Err(syntax_error(self.name, line, "include expects a quoted template name".to_string())),
                            };
                            nodes.push(Node::Include { template, line });
                        }
                        other => {
                            return Err(syntax_error(self.name, line, format!("unexpected tag '{}'", other)));
                        }
                    }
                }
            }
        }

        if let Some(expected) = terminators.last() {
            return Err(syntax_error(
                self.name,
                self.last_line(),
                format!("unclosed block, expected '{}'", expected),
            ));
        }
        Ok((nodes, None))
    }

    fn last_line(&self) -> usize {
        self.segments
            .iter()
            .rev()
            .find_map(|s| match s {
                Segment::Output(_, line) | Segment::Tag(_, line) => Some(*line),
                Segment::Text(_) => None,
            })
            .unwrap_or(1)
    }

    fn parse_if(&mut self, condition: &str, line: usize) -> FfiWrapResult<Node> {
        let mut branches = Vec::new();
        let mut current = self.parse_condition(condition, line)?;
        let mut otherwise = Vec::new();

        loop {
            let (body, terminator) = self.parse_block(&["elif", "else", "endif"])?;
            let Some((tag, tag_line)) = terminator else {
                return Err(syntax_error(self.name, line, "unclosed 'if'".to_string()));
            };
            branches.push((current, body));

            let (keyword, rest) = tag.split_once(char::is_whitespace).unwrap_or((tag.as_str(), ""));
            match keyword {
                "elif" => current = self.parse_condition(rest.trim(), tag_line)?,
                "else" => {
                    let (body, terminator) = self.parse_block(&["endif"])?;
                    if terminator.is_none() {
                        return Err(syntax_error(self.name, line, "unclosed 'if'".to_string()));
                    }
                    otherwise = body;
                    break;
                }
                _ => break,
            }
        }

        Ok(Node::If {
            branches,
            otherwise,
            line,
        })
    }

    fn parse_for(&mut self, header: &str, line: usize) -> FfiWrapResult<Node> {
        let Some((variable, iterable)) = header.split_once(" in ") else {
            return Err(syntax_error(self.name, line, "expected 'for <name> in <expr>'".to_string()));
        };
        let variable = variable.trim();
        if !is_identifier(variable) {
            return Err(syntax_error(self.name, line, format!("invalid loop variable '{}'", variable)));
        }
        let iterable = self.parse_expr(iterable.trim(), line)?;
        let (body, terminator) = self.parse_block(&["endfor"])?;
        if terminator.is_none() {
            return Err(syntax_error(self.name, line, "unclosed 'for'".to_string()));
        }

        Ok(Node::For {
            variable: variable.to_string(),
            iterable,
            body,
            line,
        })
    }

    fn parse_condition(&self, text: &str, line: usize) -> FfiWrapResult<Condition> {
        let (negated, text) = match text.strip_prefix("not ") {
            Some(rest) => (true, rest.trim()),
            None => (false, text),
        };
        Ok(Condition {
            negated,
            expr: self.parse_expr(text, line)?,
        })
    }

    fn parse_expr(&self, text: &str, line: usize) -> FfiWrapResult<Expr> {
        let mut parts = split_outside_quotes(text, '|').into_iter();
        let head_text = parts.next().unwrap_or_default();
        let head = parse_operand(head_text.trim())
            .ok_or_else(|| syntax_error(self.name, line, format!("invalid expression '{}'", text)))?;

        let mut filters = Vec::new();
        for part in parts {
            let part = part.trim();
            let (name, args_text) = match part.find('(') {
                Some(open) if part.ends_with(')') => (part[..open].trim(), Some(&part[open + 1..part.len() - 1])),
                _ => (part, None),
            };
            let kind = FilterKind::parse(name)
                .ok_or_else(|| syntax_error(self.name, line, format!("unknown filter '{}'", name)))?;

            let args = match args_text {
                Some(args) if !args.trim().is_empty() => split_outside_quotes(args, ',')
                    .into_iter()
                    .map(|arg| {
                        parse_operand(arg.trim())
                            .ok_or_else(|| syntax_error(self.name, line, format!("invalid argument '{}'", arg.trim())))
                    })
                    .collect::<FfiWrapResult<Vec<_>>>()?,
                _ => Vec::new(),
            };

            let (min, max) = kind.arity();
            if args.len() < min || args.len() > max {
                return Err(syntax_error(
                    self.name,
                    line,
                    format!("filter '{}' takes {} to {} arguments, got {}", name, min, max, args.len()),
                ));
            }
            filters.push(Filter { kind, args });
        }

        Ok(Expr { head, filters })
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_') && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn split_outside_quotes(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_operand(text: &str) -> Option<Operand> {
    let first = text.chars().next()?;
    if (first == '"' || first == '\'') && text.len() >= 2 && text.ends_with(first) {
        return Some(Operand::Str(unescape(&text[1..text.len() - 1])));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Operand::Int(i));
    }

    let segments: Vec<String> = text.split('.').map(str::to_string).collect();
    let valid = segments
        .iter()
        .enumerate()
        .all(|(i, s)| is_identifier(s) || (i > 0 && !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())));
    valid.then_some(Operand::Path(segments))
}

fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some(other) => result.push(other),
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn indent_lines(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    let mut result = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            result.push('\n');
            if !line.is_empty() {
                result.push_str(&pad);
            }
        }
        result.push_str(line);
    }
    result
}

/// Registry of parsed templates
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    templates: HashMap<String, Template>,
    strict: bool,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct RenderState<'a> {
    template: String,
    helpers: &'a dyn TemplateHelpers,
    scopes: Vec<TemplateContext>,
    depth: usize,
}

impl TemplateEngine {
    /// Create an engine with no templates and strict variables
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            strict: true,
        }
    }

    /// Create an engine with the built-in templates registered
    pub fn with_builtin_templates() -> FfiWrapResult<Self> {
        let mut engine = Self::new();
        for (name, source) in BUILTIN_TEMPLATES {
            engine.register_template(*name, source)?;
        }
        Ok(engine)
    }

    /// Render undefined variables as empty instead of failing
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Parse and register a template, replacing any with the same name
    pub fn register_template<N: Into<String>>(&mut self, name: N, source: &str) -> FfiWrapResult<()> {
        let name = name.into();
        let template = Template::parse(&name, source)?;
        log::debug!("Registered template '{}'", name);
        self.templates.insert(name, template);
        Ok(())
    }

    /// Register every `<name>.tmpl` file in `dir`, returning how many were loaded
    pub fn load_overrides<P: AsRef<Path>>(&mut self, dir: P) -> FfiWrapResult<usize> {
        let dir = dir.as_ref();
        let mut loaded = 0;
        let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tmpl") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = fs::read_to_string(&path)?;
            self.register_template(name, &source)?;
            log::info!("Using template override {}", path.display());
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Render a registered template
    pub fn render(&self, name: &str, context: &TemplateContext, helpers: &dyn TemplateHelpers) -> FfiWrapResult<String> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| FfiWrapError::generation_in_template(format!("Unknown template '{}'", name), name))?;

        let mut state = RenderState {
            template: name.to_string(),
            helpers,
            scopes: vec![context.clone()],
            depth: 0,
        };
        let mut out = String::new();
        self.render_nodes(&template.nodes, &mut state, &mut out)?;
        Ok(out)
    }

    /// Parse and render template source that is not registered
    pub fn render_str(&self, source: &str, context: &TemplateContext, helpers: &dyn TemplateHelpers) -> FfiWrapResult<String> {
        let template = Template::parse("<inline>", source)?;
        let mut state = RenderState {
            template: "<inline>".to_string(),
            helpers,
            scopes: vec![context.clone()],
            depth: 0,
        };
        let mut out = String::new();
        self.render_nodes(&template.nodes, &mut state, &mut out)?;
        Ok(out)
    }

    /// Render a wrapper with the template for its kind
    ///
    /// The wrapper is exposed as `class`; `extra` supplies the remaining
    /// top-level variables.
    pub fn render_wrapper(
        &self,
        wrapper: &WrapperClass,
        extra: &TemplateContext,
        helpers: &dyn TemplateHelpers,
    ) -> FfiWrapResult<String> {
        let template = match wrapper.kind {
            WrapperKind::Functions => WRAPPER_CLASS,
            WrapperKind::Structure => STRUCT_CLASS,
            WrapperKind::Constants => CONSTANTS_CLASS,
        };

        let mut context = extra.clone();
        context.insert("namespace".to_string(), TemplateValue::from(&wrapper.namespace));
        context.insert("class".to_string(), wrapper.to_template_value());
        self.render(template, &context, helpers)
    }

    fn render_nodes(&self, nodes: &[Node], state: &mut RenderState<'_>, out: &mut String) -> FfiWrapResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output { expr, line } => {
                    let value = self.evaluate(expr, state, *line)?;
                    out.push_str(&value.to_string());
                }
                Node::If { branches, otherwise, line } => {
                    let mut chosen = otherwise;
                    for (condition, body) in branches {
                        let truthy = self.evaluate(&condition.expr, state, *line)?.is_truthy();
                        if truthy != condition.negated {
                            chosen = body;
                            break;
                        }
                    }
                    self.render_nodes(chosen, state, out)?;
                }
                Node::For {
                    variable,
                    iterable,
                    body,
                    line,
                } => {
                    let items = match self.evaluate(iterable, state, *line)? {
                        TemplateValue::List(items) => items,
                        TemplateValue::Null => Vec::new(),
                        TemplateValue::Map(entries) => entries
                            .into_iter()
                            .map(|(key, value)| TemplateValue::map().with("key", key).with("value", value))
                            .collect(),
                        other => {
                            return Err(self.error(state, *line, format!("cannot iterate over '{}'", other)));
                        }
                    };

                    let length = items.len();
                    for (index, item) in items.into_iter().enumerate() {
                        let mut scope = TemplateContext::new();
                        scope.insert(variable.clone(), item);
                        scope.insert(
                            "loop".to_string(),
                            TemplateValue::map()
                                .with("index", index + 1)
                                .with("index0", index)
                                .with("first", index == 0)
                                .with("last", index + 1 == length)
                                .with("length", length),
                        );
                        state.scopes.push(scope);
                        let result = self.render_nodes(body, state, out);
                        state.scopes.pop();
                        result?;
                    }
                }
                Node::Include { template, line } => {
                    if state.depth >= MAX_INCLUDE_DEPTH {
                        return Err(self.error(state, *line, format!("include depth exceeded at '{}'", template)));
                    }
                    let included = self
                        .templates
                        .get(template)
                        .ok_or_else(|| self.error(state, *line, format!("unknown template '{}'", template)))?;

                    let outer = std::mem::replace(&mut state.template, included.name().to_string());
                    state.depth += 1;
                    let result = self.render_nodes(&included.nodes, state, out);
                    state.depth -= 1;
                    state.template = outer;
                    result?;
                }
            }
        }
        Ok(())
    }

    fn error(&self, state: &RenderState<'_>, line: usize, message: String) -> FfiWrapError {
        FfiWrapError::generation_in_template(format!("{} (line {})", message, line), state.template.as_str())
    }

    fn lookup(&self, path: &[String], state: &RenderState<'_>, line: usize) -> FfiWrapResult<TemplateValue> {
        let (first, rest) = match path.split_first() {
            Some(split) => split,
            None => return Ok(TemplateValue::Null),
        };

        let root = state.scopes.iter().rev().find_map(|scope| scope.get(first));
        let mut current = match root {
            Some(value) => value,
            None if self.strict => {
                return Err(self.error(state, line, format!("undefined variable '{}'", path.join("."))));
            }
            None => return Ok(TemplateValue::Null),
        };

        for key in rest {
            current = match current.get(key) {
                Some(value) => value,
                None if self.strict => {
                    return Err(self.error(state, line, format!("undefined variable '{}'", path.join("."))));
                }
                None => return Ok(TemplateValue::Null),
            };
        }
        Ok(current.clone())
    }

    fn operand(&self, operand: &Operand, state: &RenderState<'_>, line: usize) -> FfiWrapResult<TemplateValue> {
        match operand {
            Operand::Path(path) => self.lookup(path, state, line),
            Operand::Str(s) => Ok(TemplateValue::Str(s.clone())),
            Operand::Int(i) => Ok(TemplateValue::Int(*i)),
        }
    }

    fn evaluate(&self, expr: &Expr, state: &RenderState<'_>, line: usize) -> FfiWrapResult<TemplateValue> {
        let mut value = self.operand(&expr.head, state, line)?;
        for filter in &expr.filters {
            let args = filter
                .args
                .iter()
                .map(|arg| self.operand(arg, state, line))
                .collect::<FfiWrapResult<Vec<_>>>()?;
            value = self.apply_filter(filter.kind, value, &args, state, line)?;
        }
        Ok(value)
    }

    fn apply_filter(
        &self,
        kind: FilterKind,
        value: TemplateValue,
        args: &[TemplateValue],
        state: &RenderState<'_>,
        line: usize,
    ) -> FfiWrapResult<TemplateValue> {
        let helpers = state.helpers;
        let text = || value.to_string();

        Ok(match kind {
            FilterKind::Camel => TemplateValue::Str(to_camel_case(&text())),
            FilterKind::Pascal => TemplateValue::Str(to_pascal_case(&text())),
            FilterKind::Snake => TemplateValue::Str(to_snake_case(&text())),
            FilterKind::Upper => TemplateValue::Str(to_upper_snake_case(&text())),
            FilterKind::Lower => TemplateValue::Str(text().to_lowercase()),
            FilterKind::HostType => TemplateValue::Str(helpers.host_type(&text())),
            FilterKind::NullableHostType => TemplateValue::Str(helpers.nullable_host_type(&text())),
            FilterKind::DocType => TemplateValue::Str(helpers.doc_type(&text())),
            FilterKind::DefaultValue => TemplateValue::Str(helpers.default_value(&text())),
            FilterKind::Literal => TemplateValue::Str(value.literal()),
            FilterKind::Validation => {
                let field = |key: &str| {
                    value
                        .get(key)
                        .ok_or_else(|| self.error(state, line, format!("validation needs a parameter with '{}'", key)))
                };
                let name = field("name")?.to_string();
                let raw_type = field("raw_type")?.to_string();
                let nullable = value.get("nullable").is_some_and(TemplateValue::is_truthy);
                let function = args.first().map(|a| a.to_string()).unwrap_or_default();
                TemplateValue::Str(helpers.validation(&name, &raw_type, nullable, &function).join("\n"))
            }
            FilterKind::Join => {
                let separator = args.first().map(|a| a.to_string()).unwrap_or_else(|| ", ".to_string());
                match &value {
                    TemplateValue::List(items) => TemplateValue::Str(
                        items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(&separator),
                    ),
                    other => TemplateValue::Str(other.to_string()),
                }
            }
            FilterKind::Indent => {
                let width = match args.first() {
                    Some(TemplateValue::Int(w)) if *w >= 0 => usize::try_from(*w).unwrap_or(0),
                    Some(other) => {
                        return Err(self.error(state, line, format!("indent width must be a number, got '{}'", other)));
                    }
                    None => 4,
                };
                TemplateValue::Str(indent_lines(&text(), width))
            }
        })
    }
}
