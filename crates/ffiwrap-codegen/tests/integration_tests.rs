//! End-to-end tests: binding text in, wrapper sources out

use ffiwrap_bindings::{ArtifactHandle, BindingGenerationResult, BindingProcessor};
use ffiwrap_codegen::{DirectorySink, GeneratorConfig, GroupPattern, WrapperGenerator};
use ffiwrap_core::{ProcessedBindings, Value};
use tempfile::TempDir;

const MATH_LIBRARY: &str = include_str!("fixtures/math_library.h");
const STRING_UTILS: &str = include_str!("fixtures/string_utils.h");

fn process(header: &str) -> ProcessedBindings {
    BindingProcessor::new().process_text(header, header).bindings
}

fn math_config() -> GeneratorConfig {
    GeneratorConfig {
        library_name: "math".to_string(),
        namespace: "MathLib".to_string(),
        strip_prefixes: vec!["math_".to_string()],
        emit_timestamp: false,
        ..GeneratorConfig::default()
    }
}

#[test]
fn test_math_library_bindings() {
    let bindings = process(MATH_LIBRARY);

    assert!(bindings.function_count() >= 26);
    assert_eq!(bindings.function("math_add").unwrap().parameter_types(), vec!["int", "int"]);
    assert_eq!(bindings.structure("Circle").unwrap().fields.len(), 2);
    assert_eq!(bindings.structure("PointArray").unwrap().fields.len(), 3);
    assert_eq!(bindings.constants()["MATH_PI"], Value::Float(3.14159265359));
    assert_eq!(bindings.constants()["MAX_ARRAY_SIZE"], Value::Int(1000));
    assert_eq!(bindings.constants()["MATH_ERROR_DIVISION_BY_ZERO"], Value::Int(-3));
}

#[test]
fn test_math_library_wrappers() {
    let bindings = process(MATH_LIBRARY);
    let output = WrapperGenerator::new(math_config()).unwrap().generate(&bindings).unwrap();
    assert!(output.is_complete(), "{:?}", output.report.failures);

    let find = output.artifact("Find.php").unwrap();
    assert!(find.contains("namespace MathLib;"));
    assert!(find.contains("    public function max(\\FFI\\CData $array, int $length): int\n"));
    assert!(find.contains("        if ($length < 0) {\n"));
    assert!(find.contains("        return $this->ffi->math_find_max($array, $length);\n"));

    let get = output.artifact("Get.php").unwrap();
    assert!(get.contains("    public function errorMessage(int $error): ?string\n"));
    assert!(get.contains("    public function lastError(): int\n"));

    let fallback = output.artifact("Math.php").unwrap();
    assert!(fallback.contains("    public function createPointArray(int $initialCapacity): ?\\FFI\\CData\n"));
    assert!(fallback.contains("    public function divide(float $a, float $b): float\n"));
    assert!(fallback.contains("    public function sortArrayWithCallback(\\FFI\\CData $array, int $length, mixed $compare): void\n"));

    let constants = output.artifact("Constants.php").unwrap();
    assert!(constants.contains("    public const PI = 3.14159265359;\n"));
    assert!(constants.contains("    public const ERROR_DIVISION_BY_ZERO = -3;\n"));
    assert!(constants.contains("    public const MAX_ARRAY_SIZE = 1000;\n"));
}

#[test]
fn test_group_and_structure_class_clash() {
    let bindings = process(MATH_LIBRARY);
    let output = WrapperGenerator::new(math_config()).unwrap().generate(&bindings).unwrap();

    // the `circle_*` functions claim `Circle` before the structure does
    let group = output.artifact("Circle.php").unwrap();
    assert!(group.contains("    public function area(\\FFI\\CData $circle): float\n"));

    let structure = output.artifact("Circle2.php").unwrap();
    assert!(structure.contains("Value object for native struct Circle"));
    assert!(structure.contains("    public ?\\FFI\\CData $center = null;\n"));
    assert!(structure.contains("    public float $radius = 0.0;\n"));

    let clash = output
        .report
        .collisions
        .iter()
        .find(|c| c.source == "Circle")
        .unwrap();
    assert_eq!(clash.requested, "Circle");
    assert_eq!(clash.assigned, "Circle2");
}

#[test]
fn test_string_utils_with_group_patterns() {
    let config = GeneratorConfig {
        library_name: "strings".to_string(),
        namespace: "Strings".to_string(),
        strip_prefixes: vec!["string_".to_string()],
        group_patterns: vec![GroupPattern {
            pattern: "^string_array_".to_string(),
            group: "array".to_string(),
        }],
        emit_timestamp: false,
        ..GeneratorConfig::default()
    };
    let bindings = process(STRING_UTILS);
    let output = WrapperGenerator::new(config).unwrap().generate(&bindings).unwrap();

    let arrays = output.artifact("ArrayFunctions.php").unwrap();
    assert!(arrays.contains("    public function create(int $initialCapacity): ?\\FFI\\CData\n"));
    assert!(arrays.contains("    public function join(\\FFI\\CData $array, string $separator): ?string\n"));
    assert!(arrays.contains("\\FFI::string($result)"));

    let count = output.artifact("Count.php").unwrap();
    assert!(count.contains("    public function chars(string $str, int $ch): int\n"));
    assert!(count.contains("if ($ch < -128 || $ch > 127) {"));

    let constants = output.artifact("Constants.php").unwrap();
    assert!(constants.contains("    public const UTILS_VERSION = '1.0.0';\n"));
    assert!(constants.contains("    public const MAX_STRING_LENGTH = 4096;\n"));

    let structure = output.artifact("StringArray.php").unwrap();
    assert!(structure.contains("    public ?\\FFI\\CData $strings = null;\n"));
}

#[test]
fn test_host_style_bindings() {
    let result = BindingGenerationResult::succeeded(
        ArtifactHandle::inline("constants.php", "<?php\nconst MAX_SIZE = 1024;\n"),
        ArtifactHandle::inline(
            "bindings.php",
            r#"<?php
/** Adds two numbers */
function demo_add(int $a, int $b): int {}

function demo_scale(float $value, ?float $factor = null): float {}
"#,
        ),
    );
    let bindings = BindingProcessor::new().process(&result).unwrap();

    let config = GeneratorConfig {
        library_name: "demo".to_string(),
        emit_timestamp: false,
        ..GeneratorConfig::default()
    };
    let output = WrapperGenerator::new(config).unwrap().generate(&bindings).unwrap();

    let demo = output.artifact("Demo.php").unwrap();
    assert!(demo.contains("     * Adds two numbers\n"));
    assert!(demo.contains("    public function add(int $a, int $b): int\n"));
    assert!(demo.contains("    public function scale(float $value, ?float $factor = null): float\n"));
    assert!(output.artifact("Constants.php").unwrap().contains("public const MAX_SIZE = 1024;"));
}

#[test]
fn test_write_math_wrappers_to_directory() {
    let temp = TempDir::new().unwrap();
    let generator = WrapperGenerator::new(math_config()).unwrap();
    let mut sink = DirectorySink::new(temp.path().join("generated")).unwrap();

    let report = generator.write_to(&process(MATH_LIBRARY), &mut sink).unwrap();

    assert!(!report.has_failures());
    assert_eq!(sink.written().len(), report.artifacts.len());
    assert!(temp.path().join("generated/Constants.php").exists());
    for summary in &report.artifacts {
        let source = std::fs::read_to_string(temp.path().join("generated").join(&summary.artifact)).unwrap();
        assert!(source.contains(&format!("final class {}", summary.class_name)));
    }
}
