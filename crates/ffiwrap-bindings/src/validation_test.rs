//! Tests for the validation rule engine

#[cfg(test)]
mod tests {
    use crate::types::TypeMapper;
    use crate::validation::*;
    use ffiwrap_core::{FfiWrapError, FunctionSignature, Parameter, Value};
    use regex::Regex;

    fn engine_with(raw_type: &str, rules: Vec<ValidationRule>) -> ValidationRuleEngine {
        let mut table = RuleTable::with_defaults();
        table.replace(raw_type, rules);
        ValidationRuleEngine::new(table, TypeMapper::new())
    }

    #[test]
    fn test_unsigned_byte_out_of_range() {
        let engine = ValidationRuleEngine::default();
        let result = engine.validate_parameter(&Value::Int(300), "uint8_t");

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("above maximum 255"));
        assert!(result.converted_value.is_none());
    }

    #[test]
    fn test_type_rule_converts_before_range() {
        let engine = ValidationRuleEngine::default();
        let result = engine.validate_parameter(&Value::from("200"), "uint8_t");
        assert!(result.is_valid);
        assert_eq!(result.converted_value, Some(Value::Int(200)));
    }

    #[test]
    fn test_unregistered_type_gets_type_check() {
        let engine = ValidationRuleEngine::new(RuleTable::new(), TypeMapper::new());
        assert!(engine.rules_for("int16_t").is_empty());

        let result = engine.validate_parameter(&Value::Int(40000), "int16_t");
        assert!(!result.is_valid);

        let result = engine.validate_parameter(&Value::Float(2.0), "int16_t");
        assert_eq!(result.converted_value, Some(Value::Int(2)));
    }

    #[test]
    fn test_all_failures_are_reported() {
        let engine = engine_with(
            "const char*",
            vec![
                ValidationRule::Type,
                ValidationRule::count(Some(3), None),
                ValidationRule::Pattern(Regex::new("^[a-z]+$").unwrap()),
            ],
        );
        let result = engine.validate_parameter(&Value::from("A1"), "const char*");
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("below minimum length 3"));
        assert!(result.errors[1].contains("does not match pattern"));
    }

    #[test]
    fn test_allowed_values() {
        let engine = engine_with(
            "int",
            vec![ValidationRule::Type, ValidationRule::AllowedValues(vec![Value::Int(1), Value::Int(2)])],
        );
        assert!(engine.validate_parameter(&Value::Float(2.0), "int").is_valid);
        let result = engine.validate_parameter(&Value::Int(3), "int");
        assert_eq!(result.errors, vec!["Value 3 is not one of the allowed values: 1, 2"]);
    }

    #[test]
    fn test_custom_rule_outcomes() {
        let engine = engine_with(
            "double",
            vec![
                ValidationRule::Type,
                ValidationRule::custom("clamp", |value: &Value| {
                    let v = value.as_f64().unwrap_or(0.0);
                    Outcome::Converted(Value::Float(v.clamp(0.0, 1.0)))
                }),
                ValidationRule::custom("positive", |value: &Value| value.as_f64().is_some_and(|v| v > 0.0)),
            ],
        );

        let result = engine.validate_parameter(&Value::Int(5), "double");
        assert_eq!(result.converted_value, Some(Value::Float(1.0)));

        let result = engine.validate_parameter(&Value::Int(-5), "double");
        assert_eq!(result.errors, vec!["Custom validation failed"]);
    }

    #[test]
    fn test_panicking_custom_rule_is_contained() {
        let engine = engine_with(
            "int",
            vec![ValidationRule::custom("explodes", |_: &Value| -> Outcome { panic!("boom") })],
        );
        let result = engine.validate_parameter(&Value::Int(1), "int");
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["Custom rule 'explodes' raised: boom"]);
    }

    #[test]
    fn test_passing_rules_commute() {
        let forward = engine_with("int", vec![ValidationRule::Type, ValidationRule::range(Some(0.0), Some(100.0))]);
        let backward = engine_with("int", vec![ValidationRule::range(Some(0.0), Some(100.0)), ValidationRule::Type]);

        for value in [Value::Int(50), Value::from("50"), Value::Float(50.0)] {
            let a = forward.validate_parameter(&value, "int");
            let b = backward.validate_parameter(&value, "int");
            assert!(a.is_valid && b.is_valid);
            assert_eq!(a.converted_value, b.converted_value);
        }
    }

    #[test]
    fn test_function_parameters() {
        let engine = ValidationRuleEngine::default();

        let result = engine.validate_function_parameters(&[Value::Int(1), Value::from("2")], &["int", "int"]);
        assert_eq!(result.converted_value, Some(Value::from(vec![1i64, 2])));

        let result = engine.validate_function_parameters(&[Value::Int(1)], &["int", "int"]);
        assert_eq!(result.errors, vec!["Expected 2 parameters, got 1"]);

        let result = engine.validate_function_parameters(&[Value::Int(-1), Value::Int(999)], &["uint8_t", "uint8_t"]);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].starts_with("Parameter #1 (uint8_t): "));
        assert!(result.errors[1].starts_with("Parameter #2 (uint8_t): "));
    }

    #[test]
    fn test_validate_call_honors_nullable() {
        let engine = ValidationRuleEngine::default();
        let signature = FunctionSignature::new(
            "greet",
            "void",
            vec![Parameter::nullable("name", "const char*"), Parameter::new("times", "int")],
        );
        assert!(engine.validate_call(&signature, &[Value::Null, Value::Int(2)]).is_valid);

        let result = engine.validate_call(&signature, &[Value::from("x"), Value::Null]);
        assert!(result.errors[0].contains("non-nullable"));
    }

    #[test]
    fn test_into_result_at_boundary() {
        let engine = ValidationRuleEngine::default();
        let err = engine.validate_parameter(&Value::Int(300), "uint8_t").into_result().unwrap_err();
        assert!(matches!(err, FfiWrapError::Validation { .. }));
        assert_eq!(
            engine.validate_parameter(&Value::Int(3), "uint8_t").into_result().unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn test_default_table_covers_pointers_and_booleans() {
        let engine = ValidationRuleEngine::default();
        for raw in ["void*", "const void *", "int*", "double *", "char**", "_Bool", "long double", "bool"] {
            let kinds: Vec<RuleKind> = engine.rules_for(raw).iter().map(ValidationRule::kind).collect();
            assert_eq!(kinds, vec![RuleKind::Type], "{}", raw);
        }

        let result = engine.validate_parameter(&Value::Null, "void*");
        assert!(result.is_valid);
        let result = engine.validate_parameter(&Value::Int(1), "_Bool");
        assert_eq!(result.converted_value, Some(Value::Bool(true)));
        let result = engine.validate_parameter(&Value::Int(2), "long double");
        assert_eq!(result.converted_value, Some(Value::Float(2.0)));
    }

    #[test]
    fn test_rule_kinds() {
        assert_eq!(ValidationRule::Type.kind(), RuleKind::Type);
        assert_eq!(ValidationRule::width_range("int8_t").unwrap().kind(), RuleKind::Range);
        assert!(ValidationRule::width_range("double").is_none());
        assert_eq!(RuleKind::AllowedValues.to_string(), "allowed_values");
    }
}
