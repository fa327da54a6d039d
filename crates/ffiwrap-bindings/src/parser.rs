//! Binding output parser
//!
//! Recognizes two declaration forms in generated binding text:
//!
//! * host-style: `[modifiers] function name(?type $a, ...)[: ret]`, either
//!   terminated by `;` or followed by a body that is skipped
//! * native prototypes: `ret name(type a, ...);`
//!
//! A `/** ... */` block immediately preceding a declaration (modifiers and
//! attributes may sit in between) is attached as its documentation. Native
//! declarations embedded in string literals (e.g. an FFI `cdef` block) are
//! scanned as well; they only add functions the host-style declarations did
//! not already provide and fill in types the host declaration left out.

use crate::docblock::DocBlock;
use crate::lexer::{find_matching, Lexer, Token, TokenKind};
use crate::params::{normalize_type, parse_parameter_list};
use ffiwrap_core::{Diagnostic, DiagnosticCollector, FunctionSignature, UNTYPED};
use indexmap::IndexMap;

/// Diagnostic code for declarations that could not be parsed
pub const PARSE_MISS: &str = "parse-miss";
/// Diagnostic code for repeated function names
pub const DUPLICATE_FUNCTION: &str = "duplicate-function";

/// Functions found in one binding text, plus recoverable problems
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub functions: IndexMap<String, FunctionSignature>,
    pub diagnostics: DiagnosticCollector,
}

impl ParseOutput {
    fn insert(&mut self, signature: FunctionSignature, line: usize) {
        if self.functions.contains_key(&signature.name) {
            self.diagnostics.add(
                Diagnostic::warning(format!(
                    "Function '{}' is declared more than once; keeping the first declaration",
                    signature.name
                ))
                .at_line(line)
                .with_code(DUPLICATE_FUNCTION),
            );
            return;
        }
        self.functions.insert(signature.name.clone(), signature);
    }

    fn miss<S: Into<String>>(&mut self, message: S, line: usize) {
        self.diagnostics
            .add(Diagnostic::warning(message).at_line(line).with_code(PARSE_MISS));
    }
}

/// Words that can precede a host-style declaration
const MODIFIERS: &[&str] = &["public", "private", "protected", "static", "final", "abstract"];

/// Words that may never start or name a native prototype
const NOT_A_TYPE: &[&str] = &[
    "return", "if", "while", "for", "switch", "sizeof", "new", "echo", "print", "else", "case", "do",
    "typedef", "define", "goto", "throw", "use", "namespace", "class", "function", "fn", "match",
    "isset", "unset", "empty", "array", "list", "include", "require",
];

/// Storage-class words dropped from native return types
const STORAGE_CLASS: &[&str] = &["extern", "static", "inline", "__inline", "__inline__"];

/// Parser for generated binding text
#[derive(Debug, Clone)]
pub struct BindingOutputParser {
    scan_embedded: bool,
}

impl Default for BindingOutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingOutputParser {
    /// Create a new parser that also scans embedded native declarations
    pub fn new() -> Self {
        Self { scan_embedded: true }
    }

    /// Only parse top-level declarations, ignoring string literal contents
    pub fn without_embedded_declarations(mut self) -> Self {
        self.scan_embedded = false;
        self
    }

    /// Parse the text into function signatures keyed by raw name
    pub fn parse(&self, text: &str) -> ParseOutput {
        let mut output = ParseOutput::default();
        let mut embedded: Vec<(String, usize)> = Vec::new();

        self.scan(text, 0, &mut output, Some(&mut embedded));

        if self.scan_embedded {
            let mut nested = ParseOutput::default();
            for (block, line_offset) in &embedded {
                self.scan(block, *line_offset, &mut nested, None);
            }
            merge_embedded(&mut output, nested);
        }

        log::debug!(
            "Parsed {} function declarations ({} diagnostics)",
            output.functions.len(),
            output.diagnostics.diagnostics().len()
        );
        output
    }

    fn scan(
        &self,
        source: &str,
        line_offset: usize,
        output: &mut ParseOutput,
        mut embedded: Option<&mut Vec<(String, usize)>>,
    ) {
        let tokens = Lexer::new(source).tokenize();
        let mut pending_doc: Option<usize> = None;
        let mut statement_start = 0usize;
        let mut i = 0usize;

        while i < tokens.len() {
            let token = tokens[i];
            let line = token.line + line_offset;

            match token.kind {
                TokenKind::DocComment => {
                    pending_doc = Some(i);
                    statement_start = i + 1;
                    i += 1;
                }
                TokenKind::Ident if token.text == "function" => {
                    match self.parse_host_declaration(source, &tokens, i, statement_start, pending_doc) {
                        HostParse::Declaration { signature, next } => {
                            output.insert(signature, line);
                            i = next;
                        }
                        HostParse::Miss { message, next } => {
                            output.miss(message, line);
                            i = next;
                        }
                        HostParse::NotADeclaration => i += 1,
                    }
                    pending_doc = None;
                    statement_start = i;
                }
                TokenKind::Punct('(') => match self.parse_native_prototype(source, &tokens, i, statement_start, pending_doc) {
                    NativeParse::Declaration { signature, next } => {
                        output.insert(signature, line);
                        i = next;
                        pending_doc = None;
                        statement_start = i;
                    }
                    NativeParse::Unterminated { name, next } => {
                        output.miss(format!("Declaration of '{}' is not terminated", name), line);
                        i = next;
                        pending_doc = None;
                        statement_start = i;
                    }
                    NativeParse::NotADeclaration => i += 1,
                },
                TokenKind::Punct(';') | TokenKind::Punct('{') | TokenKind::Punct('}') => {
                    pending_doc = None;
                    statement_start = i + 1;
                    i += 1;
                }
                TokenKind::StringLit => {
                    if let Some(blocks) = embedded.as_deref_mut() {
                        let contents = token.unquoted();
                        if contents.contains('(') && contents.contains(';') {
                            blocks.push((unescape_embedded(contents), line - 1));
                        }
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }
    }

    fn parse_host_declaration(
        &self,
        source: &str,
        tokens: &[Token<'_>],
        keyword: usize,
        statement_start: usize,
        pending_doc: Option<usize>,
    ) -> HostParse {
        let mut name_index = keyword + 1;
        if tokens.get(name_index).is_some_and(|t| t.is_punct('&')) {
            name_index += 1;
        }
        let name = match tokens.get(name_index) {
            Some(t) if t.kind == TokenKind::Ident => t.text,
            // closures and `use function` imports
            _ => return HostParse::NotADeclaration,
        };

        let open = name_index + 1;
        if !tokens.get(open).is_some_and(|t| t.is_punct('(')) {
            return HostParse::Miss {
                message: format!("Expected '(' after function name '{}'", name),
                next: open,
            };
        }
        let close = match find_matching(tokens, open, '(', ')') {
            Some(close) => close,
            None => {
                return HostParse::Miss {
                    message: format!("Unbalanced parentheses in declaration of '{}'", name),
                    next: open + 1,
                }
            }
        };

        let mut parameters = parse_parameter_list(&source[tokens[open].end()..tokens[close].start]);

        // Step: optional `: type` return clause
        let mut cursor = close + 1;
        let mut signature_end = tokens[close].end();
        let mut return_type: Option<String> = None;
        if tokens.get(cursor).is_some_and(|t| t.is_punct(':')) {
            let type_start = cursor + 1;
            let mut type_end = type_start;
            while tokens.get(type_end).is_some_and(|t| {
                !t.is_punct('{') && !t.is_punct(';') && !t.is_punct('}') && t.kind != TokenKind::DocComment
            }) {
                type_end += 1;
            }
            if type_end > type_start {
                let text = &source[tokens[type_start].start..tokens[type_end - 1].end()];
                return_type = Some(normalize_type(text));
                signature_end = tokens[type_end - 1].end();
            }
            cursor = type_end;
        }

        // Step: skip a body or a terminating `;`
        let next = match tokens.get(cursor) {
            Some(t) if t.is_punct('{') => find_matching(tokens, cursor, '{', '}').map_or(tokens.len(), |end| end + 1),
            Some(t) if t.is_punct(';') => cursor + 1,
            _ => cursor,
        };

        let doc = pending_doc.map(|index| DocBlock::parse(tokens[index].text)).unwrap_or_default();
        backfill_from_doc(&mut parameters, &mut return_type, &doc);

        let declaration_start = if statement_start < keyword
            && tokens[statement_start..keyword].iter().all(|t| is_modifier_or_attribute(t))
        {
            tokens[statement_start].start
        } else {
            tokens[keyword].start
        };

        let mut signature = FunctionSignature::new(name, return_type.unwrap_or_else(|| UNTYPED.to_string()), parameters)
            .with_documentation(doc.lines);
        signature.raw_declaration = collapse_whitespace(&source[declaration_start..signature_end]);

        HostParse::Declaration { signature, next }
    }

    fn parse_native_prototype(
        &self,
        source: &str,
        tokens: &[Token<'_>],
        open: usize,
        statement_start: usize,
        pending_doc: Option<usize>,
    ) -> NativeParse {
        if open == 0 || statement_start >= open - 1 {
            return NativeParse::NotADeclaration;
        }
        let name_token = tokens[open - 1];
        if name_token.kind != TokenKind::Ident || NOT_A_TYPE.contains(&name_token.text) {
            return NativeParse::NotADeclaration;
        }

        // the return type is the run of type-like tokens right before the name
        let mut begin = open - 1;
        while begin > statement_start && is_type_token(&tokens[begin - 1]) {
            begin -= 1;
        }
        let return_tokens = &tokens[begin..open - 1];
        if !return_tokens.iter().any(|t| t.kind == TokenKind::Ident) {
            return NativeParse::NotADeclaration;
        }

        let close = match find_matching(tokens, open, '(', ')') {
            Some(close) => close,
            None => {
                return NativeParse::Unterminated {
                    name: name_token.text.to_string(),
                    next: open + 1,
                }
            }
        };

        let next = match tokens.get(close + 1) {
            Some(t) if t.is_punct(';') => close + 2,
            Some(t) if t.is_punct('{') => find_matching(tokens, close + 1, '{', '}').map_or(tokens.len(), |end| end + 1),
            // a prototype may end at a line break or at the end of input without `;`
            None => close + 1,
            Some(t) if t.line > tokens[close].line => close + 1,
            _ => {
                return NativeParse::Unterminated {
                    name: name_token.text.to_string(),
                    next: close + 1,
                }
            }
        };

        let return_type = return_tokens
            .iter()
            .filter(|t| !STORAGE_CLASS.contains(&t.text))
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(" ");
        let mut return_type = Some(normalize_type(&return_type));
        let mut parameters = parse_parameter_list(&source[tokens[open].end()..tokens[close].start]);

        let doc = pending_doc.map(|index| DocBlock::parse(tokens[index].text)).unwrap_or_default();
        backfill_from_doc(&mut parameters, &mut return_type, &doc);

        let mut signature = FunctionSignature::new(
            name_token.text,
            return_type.unwrap_or_else(|| UNTYPED.to_string()),
            parameters,
        )
        .with_documentation(doc.lines);
        signature.raw_declaration = collapse_whitespace(&source[tokens[begin].start..tokens[close].end()]);

        NativeParse::Declaration { signature, next }
    }
}

enum HostParse {
    Declaration { signature: FunctionSignature, next: usize },
    Miss { message: String, next: usize },
    NotADeclaration,
}

enum NativeParse {
    Declaration { signature: FunctionSignature, next: usize },
    Unterminated { name: String, next: usize },
    NotADeclaration,
}

fn is_type_token(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::Ident => !NOT_A_TYPE.contains(&token.text),
        TokenKind::Punct('*') | TokenKind::Punct('&') => true,
        _ => false,
    }
}

fn is_modifier_or_attribute(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::Ident => MODIFIERS.contains(&token.text),
        _ => false,
    }
}

/// Fill untyped parameters and a missing return type from documentation
///
/// Declared types always win; a `?type` or `type|null` annotation also marks
/// the parameter nullable.
fn backfill_from_doc(parameters: &mut [ffiwrap_core::Parameter], return_type: &mut Option<String>, doc: &DocBlock) {
    for parameter in parameters.iter_mut() {
        if !parameter.is_untyped() {
            continue;
        }
        if let Some(doc_type) = doc.param_type(&parameter.name) {
            let (base, nullable) = strip_nullable(doc_type);
            parameter.raw_type = base;
            parameter.nullable |= nullable;
        }
    }

    let missing = return_type.as_deref().map_or(true, |t| t.is_empty() || t == UNTYPED);
    if missing {
        if let Some(doc_type) = doc.return_type() {
            *return_type = Some(doc_type.to_string());
        }
    }
}

fn strip_nullable(doc_type: &str) -> (String, bool) {
    if let Some(rest) = doc_type.strip_prefix('?') {
        return (rest.to_string(), true);
    }
    let parts: Vec<&str> = doc_type.split('|').collect();
    if parts.len() > 1 && parts.iter().any(|p| p.eq_ignore_ascii_case("null")) {
        let rest: Vec<&str> = parts.into_iter().filter(|p| !p.eq_ignore_ascii_case("null")).collect();
        return (rest.join("|"), true);
    }
    (doc_type.to_string(), false)
}

/// Merge functions found inside string literals into the top-level results
fn merge_embedded(output: &mut ParseOutput, nested: ParseOutput) {
    for (name, native) in nested.functions {
        match output.functions.get_mut(&name) {
            Some(existing) => {
                for (parameter, native_parameter) in existing.parameters.iter_mut().zip(&native.parameters) {
                    if parameter.is_untyped() {
                        parameter.raw_type = native_parameter.raw_type.clone();
                    }
                }
                if existing.return_type == UNTYPED {
                    existing.return_type = native.return_type.clone();
                }
            }
            None => {
                output.functions.insert(name, native);
            }
        }
    }
    output.diagnostics.extend(nested.diagnostics);
}

fn unescape_embedded(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t").replace("\\\"", "\"")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_native_prototypes() {
        let source = "int add(int a, int b);\nvoid reset(void);\nconst char* greet(const char *name);";
        let output = BindingOutputParser::new().parse(source);
        assert_eq!(output.functions.len(), 3);

        let add = &output.functions["add"];
        assert_eq!(add.return_type, "int");
        assert_eq!(add.parameter_types(), vec!["int", "int"]);
        assert_eq!(add.raw_declaration, "int add(int a, int b)");

        assert!(output.functions["reset"].parameters.is_empty());
        assert_eq!(output.functions["greet"].return_type, "const char*");
    }

    #[test]
    fn test_host_declarations_with_docs() {
        let source = r#"
class MathBindings
{
    /**
     * Scale a value
     * @param float $x
     * @return float
     */
    public static function scale(float $x, $factor): float
    {
        return $this->ffi->scale($x, $factor);
    }

    public function reset(): void;
}
"#;
        let output = BindingOutputParser::new().parse(source);
        let scale = &output.functions["scale"];
        assert_eq!(scale.return_type, "float");
        assert_eq!(scale.parameters[1].raw_type, UNTYPED);
        assert_eq!(scale.documentation[0], "Scale a value");
        assert_eq!(scale.raw_declaration, "public static function scale(float $x, $factor): float");
        assert!(output.functions["reset"].returns_void());
    }

    #[test]
    fn test_doc_types_only_backfill() {
        let source = "/**\n * @param string $a\n * @param ?int $b\n * @return int\n */\nfunction f(int $a, $b) {}";
        let output = BindingOutputParser::new().parse(source);
        let f = &output.functions["f"];
        assert_eq!(f.parameters[0].raw_type, "int");
        assert_eq!(f.parameters[1].raw_type, "int");
        assert!(f.parameters[1].nullable);
        assert_eq!(f.return_type, "int");
    }

    #[test]
    fn test_doc_does_not_leak_past_statement() {
        let source = "/** @return int */\n$x = 1;\nfunction g() {}";
        let output = BindingOutputParser::new().parse(source);
        assert_eq!(output.functions["g"].return_type, UNTYPED);
        assert!(output.functions["g"].documentation.is_empty());
    }

    #[test]
    fn test_embedded_cdef_declarations() {
        let source = r#"
$ffi = FFI::cdef("
    int add(int a, int b);
    uint8_t clamp(int v);
", "libmath.so");

function add($a, $b) { return $ffi->add($a, $b); }
"#;
        let output = BindingOutputParser::new().parse(source);
        assert_eq!(output.functions.len(), 2);
        let add = &output.functions["add"];
        assert_eq!(add.parameter_types(), vec!["int", "int"]);
        assert_eq!(add.return_type, "int");
        assert_eq!(output.functions["clamp"].return_type, "uint8_t");

        let plain = BindingOutputParser::new().without_embedded_declarations().parse(source);
        assert_eq!(plain.functions.len(), 1);
    }

    #[test]
    fn test_statements_are_not_declarations() {
        let source = "return foo(1);\n$y = bar(2);\nif (x) { call(3); }\nnew Thing(4);";
        let output = BindingOutputParser::new().parse(source);
        assert!(output.functions.is_empty());
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_input_recovers() {
        let source = "int broken(int a, int b) int next\n\n/* never closed\n\nint lost(void);";
        let output = BindingOutputParser::new().parse(source);
        assert!(!output.functions.contains_key("broken"));
        assert!(!output.functions.contains_key("lost"));
        assert_eq!(output.diagnostics.with_code(PARSE_MISS).count(), 1);

        let source = "int broken(int a\nint ok(void);";
        let output = BindingOutputParser::new().parse(source);
        assert!(output.diagnostics.has_warnings());
    }

    #[test]
    fn test_prototype_without_semicolon() {
        let output = BindingOutputParser::new().parse("int add(int a, int b)");
        assert!(output.diagnostics.is_empty());
        let add = &output.functions["add"];
        assert_eq!(add.name, "add");
        assert_eq!(add.return_type, "int");
        let params: Vec<(&str, &str)> = add.parameters.iter().map(|p| (p.name.as_str(), p.raw_type.as_str())).collect();
        assert_eq!(params, vec![("a", "int"), ("b", "int")]);

        let output = BindingOutputParser::new().parse("int add(int a, int b)\ndouble scale(double x)\n");
        assert_eq!(output.functions.len(), 2);
        assert_eq!(output.functions["scale"].parameter_types(), vec!["double"]);
    }

    #[test]
    fn test_large_input_parses_quickly() {
        let source: String = (0..10_000).map(|i| format!("int fn_{}(int a, const char* b);\n", i)).collect();

        let started = Instant::now();
        let output = BindingOutputParser::new().parse(&source);

        assert_eq!(output.functions.len(), 10_000);
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let source = "int f(int a);\nlong f(long a);";
        let output = BindingOutputParser::new().parse(source);
        assert_eq!(output.functions["f"].return_type, "int");
        assert_eq!(output.diagnostics.with_code(DUPLICATE_FUNCTION).count(), 1);
    }

    #[test]
    fn test_function_pointer_parameter() {
        let source = "void callback_function(void (*callback)(int, const char*));";
        let output = BindingOutputParser::new().parse(source);
        let f = &output.functions["callback_function"];
        assert_eq!(f.parameters.len(), 1);
        assert_eq!(f.parameters[0].name, "callback");
    }

    #[test]
    fn test_storage_class_dropped() {
        let output = BindingOutputParser::new().parse("extern void* allocate_memory(size_t size);");
        assert_eq!(output.functions["allocate_memory"].return_type, "void*");
    }
}
