//! Tests for the template engine

#[cfg(test)]
mod tests {
    use crate::config::GeneratorConfig;
    use crate::generators::{GenerationContext, WrapperClass, WrapperKind};
    use crate::template::*;
    use ffiwrap_core::{FfiWrapError, ProcessedBindings, Value};
    use std::fs;
    use tempfile::TempDir;

    fn helpers() -> GenerationContext {
        GenerationContext::new(&GeneratorConfig::default(), &ProcessedBindings::builder().build()).unwrap()
    }

    fn context(entries: Vec<(&str, TemplateValue)>) -> TemplateContext {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn render(source: &str, ctx: &TemplateContext) -> String {
        TemplateEngine::new().render_str(source, ctx, &helpers()).unwrap()
    }

    #[test]
    fn test_variables_and_case_filters() {
        let ctx = context(vec![("name", "math_add_point".into())]);
        assert_eq!(render("{{ name | pascal }}", &ctx), "MathAddPoint");
        assert_eq!(render("{{ name | camel }}", &ctx), "mathAddPoint");
        assert_eq!(render("{{ name | upper }}", &ctx), "MATH_ADD_POINT");
        assert_eq!(render("{{ name | pascal | snake }}", &ctx), "math_add_point");
    }

    #[test]
    fn test_standalone_block_lines_are_removed() {
        let ctx = context(vec![("items", vec!["a", "b"].into())]);
        let source = "start\n{% for item in items %}\n- {{ item }}\n{% endfor %}\nend\n";
        assert_eq!(render(source, &ctx), "start\n- a\n- b\nend\n");
    }

    #[test]
    fn test_indented_block_tags_are_removed() {
        let ctx = context(vec![("show", true.into())]);
        let source = "{\n    {% if show %}\n    shown\n    {% endif %}\n}";
        assert_eq!(render(source, &ctx), "{\n    shown\n}");
    }

    #[test]
    fn test_conditionals() {
        let ctx = context(vec![("flag", true.into()), ("empty", TemplateValue::List(Vec::new()))]);
        assert_eq!(render("{% if not flag %}off{% else %}on{% endif %}", &ctx), "on");
        assert_eq!(render("{% if empty %}a{% elif flag %}b{% else %}c{% endif %}", &ctx), "b");
        assert_eq!(render("{% if empty %}a{% endif %}", &ctx), "");
    }

    #[test]
    fn test_loop_variables() {
        let ctx = context(vec![("xs", vec!["a", "b", "c"].into())]);
        let source = "{% for x in xs %}{{ loop.index }}:{{ x }}{% if not loop.last %}, {% endif %}{% endfor %}";
        assert_eq!(render(source, &ctx), "1:a, 2:b, 3:c");
    }

    #[test]
    fn test_loop_over_map() {
        let ctx = context(vec![("m", TemplateValue::map().with("one", 1i64).with("two", 2i64))]);
        assert_eq!(render("{% for e in m %}{{ e.key }}={{ e.value }};{% endfor %}", &ctx), "one=1;two=2;");
    }

    #[test]
    fn test_whitespace_trim_markers() {
        let ctx = context(vec![("name", "x".into())]);
        assert_eq!(render("a   {{- name -}}   b", &ctx), "axb");
        assert_eq!(render("a\n  {%- if name -%}\n  b\n{%- endif %}", &ctx), "ab");
    }

    #[test]
    fn test_comments_and_literals() {
        let ctx = TemplateContext::new();
        assert_eq!(render("a{# note #}b", &ctx), "ab");
        assert_eq!(render("{{ \"{{\" }}", &ctx), "{{");
        assert_eq!(render("{{ 42 }}", &ctx), "42");
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render_str("line one\n{{ missing.field }}", &TemplateContext::new(), &helpers())
            .unwrap_err();

        match err {
            FfiWrapError::Generation { message, template, .. } => {
                assert!(message.contains("undefined variable 'missing.field'"));
                assert!(message.contains("line 2"));
                assert_eq!(template.as_deref(), Some("<inline>"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_lenient_engine_renders_undefined_as_empty() {
        let engine = TemplateEngine::new().lenient();
        let out = engine.render_str("[{{ missing }}]", &TemplateContext::new(), &helpers()).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_syntax_errors_fail_at_registration() {
        let mut engine = TemplateEngine::new();

        let err = engine.register_template("bad", "{{ name | shout }}").unwrap_err();
        assert!(err.to_string().contains("unknown filter 'shout'"));

        let err = engine.register_template("open", "{% if x %}never closed").unwrap_err();
        assert!(err.to_string().contains("expected 'endif'"));

        let err = engine.register_template("stray", "{% endfor %}").unwrap_err();
        assert!(err.to_string().contains("unexpected tag 'endfor'"));

        let err = engine.register_template("arity", "{{ p | validation }}").unwrap_err();
        assert!(err.to_string().contains("takes 1 to 1 arguments"));

        assert!(!engine.has_template("bad"));
    }

    #[test]
    fn test_include_shares_scope() {
        let mut engine = TemplateEngine::new();
        engine.register_template("item", "[{{ value }}]").unwrap();
        engine
            .register_template("outer", "{% for value in values %}{% include \"item\" %}{% endfor %}")
            .unwrap();

        let ctx = context(vec![("values", vec![1i64, 2].into())]);
        assert_eq!(engine.render("outer", &ctx, &helpers()).unwrap(), "[1][2]");
    }

    #[test]
    fn test_recursive_include_is_bounded() {
        let mut engine = TemplateEngine::new();
        engine.register_template("loop", "x{% include \"loop\" %}").unwrap();

        let err = engine.render("loop", &TemplateContext::new(), &helpers()).unwrap_err();
        assert!(err.to_string().contains("include depth exceeded"));
    }

    #[test]
    fn test_type_filters_use_helpers() {
        let ctx = context(vec![
            ("s", "const char*".into()),
            ("a", "int[4]".into()),
            ("d", "double".into()),
        ]);
        assert_eq!(render("{{ s | host_type }}", &ctx), "string");
        assert_eq!(render("{{ s | nullable_host_type }}", &ctx), "?string");
        assert_eq!(render("{{ a | doc_type }}", &ctx), "int[]");
        assert_eq!(render("{{ d | default_value }}", &ctx), "0.0");
    }

    #[test]
    fn test_validation_filter() {
        let param = TemplateValue::map()
            .with("name", "level")
            .with("raw_type", "uint8_t")
            .with("nullable", false);
        let ctx = context(vec![("param", param)]);

        let out = render("{{ param | validation(\"set_level\") }}", &ctx);
        assert!(out.starts_with("if ($level < 0 || $level > 255) {"));
        assert!(out.contains("set_level(): $level must be between 0 and 255"));
    }

    #[test]
    fn test_formatting_filters() {
        let ctx = context(vec![
            ("body", "a\nb\n\nc".into()),
            ("params", vec!["int $a", "int $b"].into()),
            ("pi", Value::Float(2.0).into()),
            ("text", "it's".into()),
        ]);
        assert_eq!(render("{{ body | indent(4) }}", &ctx), "a\n    b\n\n    c");
        assert_eq!(render("{{ params | join(\", \") }}", &ctx), "int $a, int $b");
        assert_eq!(render("{{ params | join }}", &ctx), "int $a, int $b");
        assert_eq!(render("{{ pi | literal }}", &ctx), "2.0");
        assert_eq!(render("{{ text | literal }}", &ctx), "'it\\'s'");
    }

    #[test]
    fn test_builtin_templates_parse() {
        let engine = TemplateEngine::with_builtin_templates().unwrap();
        for name in [WRAPPER_CLASS, STRUCT_CLASS, CONSTANTS_CLASS, METHOD, PROPERTY] {
            assert!(engine.has_template(name), "missing {}", name);
        }
    }

    #[test]
    fn test_overrides_from_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("constants_class.tmpl"), "custom {{ class.name }}").unwrap();
        fs::write(temp.path().join("notes.txt"), "{{ broken").unwrap();

        let mut engine = TemplateEngine::with_builtin_templates().unwrap();
        assert_eq!(engine.load_overrides(temp.path()).unwrap(), 1);

        let wrapper = WrapperClass {
            name: "Limits".to_string(),
            namespace: "Demo".to_string(),
            kind: WrapperKind::Constants,
            summary: String::new(),
            native_name: None,
            methods: Vec::new(),
            properties: Vec::new(),
            constants: Vec::new(),
            collisions: Vec::new(),
        };
        let out = engine.render_wrapper(&wrapper, &TemplateContext::new(), &helpers()).unwrap();
        assert_eq!(out, "custom Limits");
    }

    #[test]
    fn test_truthiness() {
        assert!(!TemplateValue::Null.is_truthy());
        assert!(!TemplateValue::from("").is_truthy());
        assert!(TemplateValue::from(vec!["x"]).is_truthy());
        assert!(!TemplateValue::Native(Value::Null).is_truthy());
        assert!(TemplateValue::Int(-1).is_truthy());
    }
}
