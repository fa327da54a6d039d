//! Parameter list splitting and declarator parsing
//!
//! Handles both host-style parameters (`?int $count = null`) and native
//! declarators (`const char *name`, `int values[4]`, `void (*cb)(int)`).

use ffiwrap_core::{Parameter, UNTYPED};

/// Split `text` on `separator` at nesting depth zero
///
/// Parentheses, brackets, braces and angle brackets nest; separators inside
/// quoted strings are ignored. Empty pieces are dropped.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for index in top_level_positions(text, separator) {
        push_piece(&mut pieces, &text[start..index]);
        start = index + separator.len_utf8();
    }
    push_piece(&mut pieces, &text[start..]);
    pieces
}

/// Byte offsets of `separator` occurrences at nesting depth zero
fn top_level_positions(text: &str, separator: char) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut previous: Option<char> = None;

    for (index, c) in text.char_indices() {
        let before = previous;
        previous = Some(c);

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
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' => depth = (depth - 1).max(0),
            // `->` and `=>` are operators, not closing brackets
            '>' if !matches!(before, Some('-') | Some('=')) => depth = (depth - 1).max(0),
            c if c == separator && depth == 0 => positions.push(index),
            _ => {}
        }
    }
    positions
}

fn push_piece<'a>(pieces: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        pieces.push(piece);
    }
}

/// Collapse whitespace and attach pointer stars to the type (`char *` -> `char*`)
pub fn normalize_type(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !out.is_empty() && !word.starts_with('*') && !word.starts_with('[') {
            out.push(' ');
        }
        out.push_str(word);
    }
    // `char*const` style spacing after stars
    out.replace("*const", "* const")
}

/// Parse a whole parameter list (the text between the parentheses)
///
/// `()` and `(void)` both yield an empty list. Parameters without a name get
/// positional names `arg0`, `arg1`, ...
pub fn parse_parameter_list(text: &str) -> Vec<Parameter> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "void" {
        return Vec::new();
    }

    split_top_level(trimmed, ',')
        .into_iter()
        .enumerate()
        .filter_map(|(index, piece)| parse_parameter(piece, index))
        .collect()
}

/// Parse a single parameter declaration
pub fn parse_parameter(text: &str, index: usize) -> Option<Parameter> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // Step 1: split off a default value
    let (declaration, default) = match split_default(text) {
        Some((declaration, default)) => (declaration, Some(default)),
        None => (text, None),
    };
    let default_is_null = default.is_some_and(|d| d.eq_ignore_ascii_case("null"));

    // Step 2: nullable marker
    let (declaration, marked_nullable) = match declaration.trim().strip_prefix('?') {
        Some(rest) => (rest.trim(), true),
        None => (declaration.trim(), false),
    };

    if declaration == "..." {
        return Some(Parameter::new("args", "..."));
    }

    // Step 3: host-style `type $name`, then native declarators
    let (name, raw_type) = if let Some(dollar) = declaration.rfind('$') {
        parse_host_style(declaration, dollar)
    } else if let Some(parsed) = parse_function_pointer(declaration) {
        parsed
    } else {
        parse_declarator(declaration)
    };

    let name = name.unwrap_or_else(|| format!("arg{}", index));
    let raw_type = if raw_type.is_empty() { UNTYPED.to_string() } else { raw_type };

    Some(Parameter {
        name,
        raw_type,
        nullable: marked_nullable || default_is_null,
    })
}

fn split_default(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let equals = top_level_positions(text, '=').into_iter().find(|&i| {
        let next = bytes.get(i + 1).copied();
        let prev = if i > 0 { bytes.get(i - 1).copied() } else { None };
        next != Some(b'=') && next != Some(b'>') && !matches!(prev, Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>'))
    })?;
    Some((text[..equals].trim(), text[equals + 1..].trim()))
}

fn parse_host_style(declaration: &str, dollar: usize) -> (Option<String>, String) {
    let name: String = declaration[dollar + 1..]
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let raw_type = declaration[..dollar]
        .trim()
        .trim_end_matches("...")
        .trim_end_matches('&')
        .trim();
    let name = if name.is_empty() { None } else { Some(name) };
    (name, normalize_type(raw_type))
}

/// `ret (*name)(args)` and `ret (^name)(args)`
fn parse_function_pointer(declaration: &str) -> Option<(Option<String>, String)> {
    let open = declaration.find("(*").or_else(|| declaration.find("(^"))?;
    let close = open + declaration[open..].find(')')?;
    let name = declaration[open + 2..close].trim();
    let name = if name.is_empty() { None } else { Some(name.to_string()) };
    let raw_type = format!("{}(*){}", &declaration[..open], &declaration[close + 1..]);
    Some((name, normalize_type(&raw_type)))
}

/// Split a native declarator into name and type
///
/// The last identifier is the name when something precedes it; otherwise the
/// whole text is a type (prototype parameters may omit names).
pub fn parse_declarator(declaration: &str) -> (Option<String>, String) {
    let declaration = declaration.trim();

    // Array suffixes belong to the type: `int v[4]` -> (`v`, `int[4]`)
    let (core, array_suffix) = match declaration.find('[') {
        Some(bracket) => (declaration[..bracket].trim_end(), declaration[bracket..].replace(' ', "")),
        None => (declaration, String::new()),
    };

    let name_start = core
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i);

    if let Some(start) = name_start {
        let type_part = core[..start].trim();
        let candidate = &core[start..];
        let type_is_qualifier_only = type_part.split_whitespace().all(is_qualifier);
        if !type_part.is_empty() && !type_is_qualifier_only && !is_type_keyword(candidate) {
            let raw_type = format!("{}{}", normalize_type(type_part), array_suffix);
            return (Some(candidate.to_string()), raw_type);
        }
    }

    (None, format!("{}{}", normalize_type(core), array_suffix))
}

fn is_qualifier(word: &str) -> bool {
    matches!(word, "const" | "volatile" | "restrict" | "struct" | "union" | "enum")
}

fn is_type_keyword(word: &str) -> bool {
    matches!(
        word,
        "int" | "char" | "short" | "long" | "float" | "double" | "void" | "signed" | "unsigned" | "bool" | "_Bool"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_nesting_and_quotes() {
        assert_eq!(
            split_top_level("int a, void (*cb)(int, char), array $x = [1, 2]", ','),
            vec!["int a", "void (*cb)(int, char)", "array $x = [1, 2]"]
        );
        assert_eq!(split_top_level("string $s = 'a,b', int $n", ','), vec!["string $s = 'a,b'", "int $n"]);
        assert_eq!(split_top_level("", ','), Vec::<&str>::new());
    }

    #[test]
    fn test_host_style_parameters() {
        let p = parse_parameter("int $a", 0).unwrap();
        assert_eq!((p.name.as_str(), p.raw_type.as_str(), p.nullable), ("a", "int", false));

        let p = parse_parameter("?string $label", 0).unwrap();
        assert_eq!((p.name.as_str(), p.raw_type.as_str(), p.nullable), ("label", "string", true));

        let p = parse_parameter("\\FFI\\CData $point = null", 0).unwrap();
        assert!(p.nullable);
        assert_eq!(p.raw_type, "\\FFI\\CData");

        let p = parse_parameter("$untyped", 0).unwrap();
        assert_eq!(p.raw_type, UNTYPED);
    }

    #[test]
    fn test_native_declarators() {
        let p = parse_parameter("const char *  name", 0).unwrap();
        assert_eq!((p.name.as_str(), p.raw_type.as_str()), ("name", "const char*"));

        let p = parse_parameter("unsigned int", 2).unwrap();
        assert_eq!((p.name.as_str(), p.raw_type.as_str()), ("arg2", "unsigned int"));

        let p = parse_parameter("double values[ 4 ]", 0).unwrap();
        assert_eq!((p.name.as_str(), p.raw_type.as_str()), ("values", "double[4]"));

        let p = parse_parameter("struct Point2D* p", 0).unwrap();
        assert_eq!(p.raw_type, "struct Point2D*");

        let p = parse_parameter("Point2D", 1).unwrap();
        assert_eq!((p.name.as_str(), p.raw_type.as_str()), ("arg1", "Point2D"));
    }

    #[test]
    fn test_function_pointer_parameter() {
        let p = parse_parameter("void (*callback)(double progress)", 0).unwrap();
        assert_eq!(p.name, "callback");
        assert_eq!(p.raw_type, "void (*)(double progress)");
    }

    #[test]
    fn test_empty_lists() {
        assert!(parse_parameter_list("").is_empty());
        assert!(parse_parameter_list(" void ").is_empty());
        assert_eq!(parse_parameter_list("int a, int b").len(), 2);
    }

    #[test]
    fn test_variadic() {
        let params = parse_parameter_list("const char* fmt, ...");
        assert_eq!(params[1].raw_type, "...");
    }

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("const   char *"), "const char*");
        assert_eq!(normalize_type("char * *"), "char**");
        assert_eq!(normalize_type("unsigned  long long"), "unsigned long long");
    }
}
