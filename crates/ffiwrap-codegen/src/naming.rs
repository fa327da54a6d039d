//! Grouping and naming heuristics
//!
//! Native libraries export flat lists of functions such as `math_add` or
//! `strLen`. The functions here split such names into words, group them by
//! their leading word and derive host member, class and type names.

use crate::config::{ConfigError, GeneratorConfig};
use ffiwrap_core::FunctionSignature;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Member name used when nothing is left after prefix removal
pub const FALLBACK_MEMBER: &str = "invoke";

/// Member name of constructor-like functions
pub const CONSTRUCTOR_MEMBER: &str = "create";

const RESERVED_WORDS: &[&str] = &[
    "abstract", "and", "array", "as", "bool", "break", "callable", "case", "catch", "class", "clone", "const",
    "continue", "declare", "default", "do", "echo", "else", "elseif", "empty", "enddeclare", "endfor",
    "endforeach", "endif", "endswitch", "endwhile", "enum", "eval", "exit", "extends", "false", "final", "finally",
    "float", "fn", "for", "foreach", "function", "global", "goto", "if", "implements", "include", "instanceof",
    "insteadof", "int", "interface", "isset", "iterable", "list", "match", "mixed", "namespace", "never", "new",
    "null", "object", "or", "parent", "print", "private", "protected", "public", "readonly", "require", "return",
    "self", "static", "string", "switch", "throw", "trait", "true", "try", "unset", "use", "var", "void", "while",
    "xor", "yield",
];

/// Whether `name` is reserved and cannot name a host class
pub fn is_reserved_word(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RESERVED_WORDS.contains(&lower.as_str())
}

/// Split an identifier into words at separators and case boundaries
///
/// `mathAdd` gives `math, Add`, `HTTPServer_start` gives `HTTP, Server, start`.
/// Digits stay attached to the word before them.
pub fn split_words(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // `aB` or the last capital of an acronym in `ABc`
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Convert to camelCase
pub fn to_camel_case(raw: &str) -> String {
    let mut result = String::new();
    for (i, word) in split_words(raw).iter().enumerate() {
        if i == 0 {
            result.push_str(&word.to_lowercase());
        } else {
            result.push_str(&capitalize(word));
        }
    }
    result
}

/// Convert to PascalCase
pub fn to_pascal_case(raw: &str) -> String {
    split_words(raw).iter().map(|w| capitalize(w)).collect()
}

/// Convert to snake_case
pub fn to_snake_case(raw: &str) -> String {
    split_words(raw).iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("_")
}

/// Convert to UPPER_SNAKE_CASE
pub fn to_upper_snake_case(raw: &str) -> String {
    split_words(raw).iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join("_")
}

/// Host type name for a native structure name
///
/// Drops `struct`/`union`/`enum` tags, qualifiers, pointer markers and a
/// trailing `_t`, then converts to PascalCase.
pub fn derive_type_name(raw: &str) -> String {
    let cleaned = raw.replace('*', " ");
    let core = cleaned
        .split_whitespace()
        .filter(|w| !matches!(*w, "struct" | "union" | "enum" | "const" | "volatile"))
        .collect::<Vec<_>>()
        .join(" ");
    let core = match core.strip_suffix("_t") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => core,
    };

    let name = to_pascal_case(&core);
    if name.is_empty() {
        "Anonymous".to_string()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("T{}", name)
    } else if is_reserved_word(&name) {
        format!("{}Type", name)
    } else {
        name
    }
}

/// Host class name for a group key
pub fn derive_class_name(group: &str) -> String {
    let name = to_pascal_case(group);
    if name.is_empty() {
        "Functions".to_string()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Group{}", name)
    } else if is_reserved_word(&name) {
        format!("{}Functions", name)
    } else {
        name
    }
}

/// A name that had to be changed to stay unique within its scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCollision {
    /// Class or file scope in which the names clash
    pub scope: String,
    /// Native identifier the name was derived from
    pub source: String,
    pub requested: String,
    pub assigned: String,
}

/// Hands out unique names, first come first served
///
/// Later requests for a taken name get a numeric suffix starting at 2.
#[derive(Debug, Clone, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
    case_insensitive: bool,
}

impl NameAllocator {
    /// Create an allocator where `Foo` and `foo` are different names
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator where `Foo` and `foo` clash
    pub fn case_insensitive() -> Self {
        Self {
            taken: HashSet::new(),
            case_insensitive: true,
        }
    }

    fn key(&self, name: &str) -> String {
        if self.case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    /// Mark a name as taken without allocating it
    pub fn reserve(&mut self, name: &str) {
        let key = self.key(name);
        self.taken.insert(key);
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(&self.key(name))
    }

    /// Allocate `name`, or the first free `name2`, `name3`, ...
    pub fn allocate(&mut self, name: &str) -> String {
        if self.taken.insert(self.key(name)) {
            return name.to_string();
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{}{}", name, suffix);
            if self.taken.insert(self.key(&candidate)) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

/// Compiled grouping and naming rules
#[derive(Debug, Clone)]
pub struct NamingRules {
    strip_prefixes: Vec<String>,
    constructor_patterns: Vec<Regex>,
    group_patterns: Vec<(Regex, String)>,
}

impl Default for NamingRules {
    fn default() -> Self {
        // the default patterns are known to compile
        Self::from_config(&GeneratorConfig::default()).unwrap_or(Self {
            strip_prefixes: Vec::new(),
            constructor_patterns: Vec::new(),
            group_patterns: Vec::new(),
        })
    }
}

impl NamingRules {
    /// Compile the naming settings of a configuration
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, ConfigError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidValue(format!("Invalid pattern '{}': {}", pattern, e)))
        };

        let constructor_patterns = config
            .constructor_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let group_patterns = config
            .group_patterns
            .iter()
            .map(|g| compile(&g.pattern).map(|regex| (regex, g.group.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        // longest prefix first so `sdl_gl_` wins over `sdl_`
        let mut strip_prefixes = config.strip_prefixes.clone();
        strip_prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));

        Ok(Self {
            strip_prefixes,
            constructor_patterns,
            group_patterns,
        })
    }

    /// Remove the first configured prefix that matches, ignoring case
    pub fn strip_prefix<'a>(&self, raw: &'a str) -> &'a str {
        for prefix in &self.strip_prefixes {
            if raw.len() > prefix.len()
                && raw.is_char_boundary(prefix.len())
                && raw[..prefix.len()].eq_ignore_ascii_case(prefix)
            {
                return &raw[prefix.len()..];
            }
        }
        raw
    }

    fn matching_group_pattern(&self, raw: &str) -> Option<&(Regex, String)> {
        self.group_patterns.iter().find(|(regex, _)| regex.is_match(raw))
    }

    /// Group key of a native function name
    ///
    /// A matching group pattern decides; otherwise the key is the first word
    /// of the name after prefix removal, lowercased.
    pub fn group_key(&self, raw: &str) -> String {
        if let Some((_, group)) = self.matching_group_pattern(raw) {
            return group.clone();
        }

        split_words(self.strip_prefix(raw))
            .first()
            .map(|w| w.to_lowercase())
            .unwrap_or_default()
    }

    /// Group functions by key, keeping first-seen order of groups and members
    pub fn group_functions<'a, I>(&self, functions: I) -> IndexMap<String, Vec<&'a FunctionSignature>>
    where
        I: IntoIterator<Item = &'a FunctionSignature>,
    {
        let mut groups: IndexMap<String, Vec<&'a FunctionSignature>> = IndexMap::new();
        for function in functions {
            let key = self.group_key(&function.name);
            log::debug!("Function {} grouped under '{}'", function.name, key);
            groups.entry(key).or_default().push(function);
        }
        groups
    }

    pub fn is_constructor(&self, raw: &str) -> bool {
        let stripped = self.strip_prefix(raw);
        self.constructor_patterns
            .iter()
            .any(|regex| regex.is_match(raw) || regex.is_match(stripped))
    }

    /// Host member name for a native function inside `group`
    pub fn derive_member_name(&self, raw: &str, group: &str) -> String {
        if self.is_constructor(raw) {
            return CONSTRUCTOR_MEMBER.to_string();
        }

        // Step 1: remove the part of the name that selected the group
        let remainder = match self.matching_group_pattern(raw) {
            Some((regex, _)) => match regex.find(raw) {
                Some(m) if m.start() == 0 => &raw[m.end()..],
                _ => self.strip_prefix(raw),
            },
            None => self.strip_prefix(raw),
        };

        let mut words = split_words(remainder);
        if words.first().is_some_and(|w| w.eq_ignore_ascii_case(group)) {
            words.remove(0);
        }

        // Step 2: camelCase the rest
        let name = to_camel_case(&words.join("_"));
        if name.is_empty() {
            FALLBACK_MEMBER.to_string()
        } else if name.starts_with(|c: char| c.is_ascii_digit()) {
            format!("call{}", name)
        } else {
            name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("mathAdd"), vec!["math", "Add"]);
        assert_eq!(split_words("math_add_point"), vec!["math", "add", "point"]);
        assert_eq!(split_words("HTTPServer_start"), vec!["HTTP", "Server", "start"]);
        assert_eq!(split_words("vec2Add"), vec!["vec2", "Add"]);
        assert!(split_words("__").is_empty());
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(to_camel_case("test_field"), "testField");
        assert_eq!(to_camel_case("getHTTPServer"), "getHttpServer");
        assert_eq!(to_pascal_case("on_player_joined"), "OnPlayerJoined");
        assert_eq!(to_snake_case("mathAddPoint"), "math_add_point");
        assert_eq!(to_upper_snake_case("maxSize"), "MAX_SIZE");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(derive_type_name("struct point_t"), "Point");
        assert_eq!(derive_type_name("const struct Point2D *"), "Point2D");
        assert_eq!(derive_type_name("union data_value"), "DataValue");
        assert_eq!(derive_type_name("list"), "ListType");
        assert_eq!(derive_type_name("*"), "Anonymous");
    }

    #[test]
    fn test_class_names() {
        assert_eq!(derive_class_name("math"), "Math");
        assert_eq!(derive_class_name("list"), "ListFunctions");
        assert_eq!(derive_class_name(""), "Functions");
    }

    #[test]
    fn test_allocator() {
        let mut names = NameAllocator::case_insensitive();
        assert_eq!(names.allocate("add"), "add");
        assert_eq!(names.allocate("Add"), "Add2");
        assert_eq!(names.allocate("add"), "add3");

        let mut exact = NameAllocator::new();
        assert_eq!(exact.allocate("MAX"), "MAX");
        assert_eq!(exact.allocate("max"), "max");
        exact.reserve("MAX2");
        assert_eq!(exact.allocate("MAX"), "MAX3");
    }

    #[test]
    fn test_member_names() {
        let rules = NamingRules::default();
        assert_eq!(rules.derive_member_name("math_add", "math"), "add");
        assert_eq!(rules.derive_member_name("mathSubtract", "math"), "subtract");
        assert_eq!(rules.derive_member_name("math_create_point_array", "math"), "createPointArray");
        assert_eq!(rules.derive_member_name("NewWindow", "new"), "create");
        assert_eq!(rules.derive_member_name("string_array_new", "string"), "create");
        assert_eq!(rules.derive_member_name("math", "math"), "invoke");
        assert_eq!(rules.derive_member_name("vec_3d", "vec"), "call3d");
    }

    #[test]
    fn test_prefixes_and_patterns() {
        let config = GeneratorConfig {
            strip_prefixes: vec!["acme_".to_string(), "acme_gl_".to_string()],
            group_patterns: vec![crate::config::GroupPattern {
                pattern: "^vec[23]_".to_string(),
                group: "vector".to_string(),
            }],
            ..GeneratorConfig::default()
        };
        let rules = NamingRules::from_config(&config).unwrap();

        assert_eq!(rules.group_key("ACME_math_add"), "math");
        assert_eq!(rules.group_key("acme_gl_clear"), "clear");
        assert_eq!(rules.group_key("vec2_add"), "vector");
        assert_eq!(rules.derive_member_name("vec3_cross", "vector"), "cross");
        assert_eq!(rules.derive_member_name("acme_math_add", "math"), "add");
    }

    #[test]
    fn test_group_functions() {
        let functions: Vec<FunctionSignature> = ["mathAdd", "mathSub", "strLen"]
            .iter()
            .map(|name| FunctionSignature::new(*name, "int", vec![]))
            .collect();
        let groups = NamingRules::default().group_functions(&functions);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["math"].len(), 2);
        assert_eq!(groups["str"].len(), 1);
    }

    #[test]
    fn test_member_name_round_trip() {
        let rules = NamingRules::default();
        for raw in ["math_add", "mathSubtract", "str_len", "math", "string_to_upper", "vec_3d", "point_new"] {
            let group = rules.group_key(raw);
            let member = rules.derive_member_name(raw, &group);
            assert_eq!(rules.group_key(&format!("{}_{}", group, member)), group, "{}", raw);
        }
    }

    #[test]
    fn test_reserved_words() {
        assert!(is_reserved_word("List"));
        assert!(!is_reserved_word("Math"));
    }
}
