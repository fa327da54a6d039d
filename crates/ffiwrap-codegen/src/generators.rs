//! Wrapper assembly
//!
//! Generators turn IR pieces into [`WrapperClass`] values: fully named,
//! type-mapped and checked, ready for a template. Nothing in here formats a
//! whole file; that is the template's job.

use crate::config::{ConfigError, GeneratorConfig};
use crate::naming::{to_upper_snake_case, NameAllocator, NameCollision, NamingRules};
use crate::snippets::{quote, variable_name, CheckTarget, SnippetEmitter};
use crate::template::{TemplateHelpers, TemplateValue};
use ffiwrap_bindings::types::strip_qualifiers;
use ffiwrap_bindings::{HostType, TypeMapper, ValidationRuleEngine};
use ffiwrap_core::{Constants, FunctionSignature, Parameter, ProcessedBindings, StructureDefinition, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a wrapper class wraps; selects its template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperKind {
    Functions,
    Structure,
    Constants,
}

impl fmt::Display for WrapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrapperKind::Functions => write!(f, "functions"),
            WrapperKind::Structure => write!(f, "structure"),
            WrapperKind::Constants => write!(f, "constants"),
        }
    }
}

/// A host parameter of a generated method
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedParameter {
    /// Host variable name without the sigil
    pub name: String,
    pub native_name: String,
    pub raw_type: String,
    pub declaration: String,
    pub doc_type: String,
    pub nullable: bool,
    pub variadic: bool,
    /// Default value literal, if the parameter is optional
    pub default: Option<String>,
}

impl GeneratedParameter {
    /// The parameter as written in the variable position, e.g. `...$args`
    pub fn variable(&self) -> String {
        if self.variadic {
            format!("...${}", self.name)
        } else {
            format!("${}", self.name)
        }
    }

    /// The parameter as written in a signature
    pub fn signature(&self) -> String {
        match &self.default {
            Some(default) => format!("{} {} = {}", self.declaration, self.variable(), default),
            None => format!("{} {}", self.declaration, self.variable()),
        }
    }

    pub fn to_template_value(&self) -> TemplateValue {
        TemplateValue::map()
            .with("name", &self.name)
            .with("variable", self.variable())
            .with("native_name", &self.native_name)
            .with("raw_type", &self.raw_type)
            .with("declaration", &self.declaration)
            .with("doc_type", &self.doc_type)
            .with("nullable", self.nullable)
            .with("variadic", self.variadic)
            .with("default", self.default.clone())
    }
}

/// A generated method forwarding to one native function
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMethod {
    pub name: String,
    pub native_name: String,
    pub parameters: Vec<GeneratedParameter>,
    pub return_raw: String,
    pub return_declaration: String,
    pub return_doc_type: String,
    pub documentation: Vec<String>,
    /// Guard statements run before the native call
    pub checks: Vec<String>,
    /// Statements performing the call, without indentation
    pub body: String,
    pub is_constructor: bool,
}

impl GeneratedMethod {
    pub fn to_template_value(&self) -> TemplateValue {
        let signature: Vec<String> = self.parameters.iter().map(GeneratedParameter::signature).collect();
        TemplateValue::map()
            .with("name", &self.name)
            .with("native_name", &self.native_name)
            .with(
                "parameters",
                TemplateValue::List(self.parameters.iter().map(GeneratedParameter::to_template_value).collect()),
            )
            .with("signature", signature)
            .with("return_raw", &self.return_raw)
            .with("return_declaration", &self.return_declaration)
            .with("return_doc_type", &self.return_doc_type)
            .with("documentation", self.documentation.clone())
            .with("checks", self.checks.clone())
            .with("body", &self.body)
            .with("is_constructor", self.is_constructor)
    }
}

/// A typed property of a structure class
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProperty {
    pub name: String,
    pub native_name: String,
    pub raw_type: String,
    pub declaration: String,
    pub doc_type: String,
    /// Initial value literal
    pub default: String,
    /// Expression reading the field from a native value held in `$data`
    pub read: String,
    pub is_list: bool,
}

impl GeneratedProperty {
    pub fn to_template_value(&self) -> TemplateValue {
        TemplateValue::map()
            .with("name", &self.name)
            .with("native_name", &self.native_name)
            .with("raw_type", &self.raw_type)
            .with("declaration", &self.declaration)
            .with("doc_type", &self.doc_type)
            .with("default", &self.default)
            .with("read", &self.read)
            .with("is_list", self.is_list)
    }
}

/// A class constant
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedConstant {
    pub name: String,
    pub native_name: String,
    pub value: Value,
}

/// A fully assembled wrapper class
#[derive(Debug, Clone, PartialEq)]
pub struct WrapperClass {
    pub name: String,
    pub namespace: String,
    pub kind: WrapperKind,
    pub summary: String,
    /// Native type the class mirrors, for structure classes
    pub native_name: Option<String>,
    pub methods: Vec<GeneratedMethod>,
    pub properties: Vec<GeneratedProperty>,
    pub constants: Vec<GeneratedConstant>,
    /// Member names that were suffixed to stay unique
    pub collisions: Vec<NameCollision>,
}

impl WrapperClass {
    fn new(name: String, namespace: &str, kind: WrapperKind, summary: String) -> Self {
        Self {
            name,
            namespace: namespace.to_string(),
            kind,
            summary,
            native_name: None,
            methods: Vec::new(),
            properties: Vec::new(),
            constants: Vec::new(),
            collisions: Vec::new(),
        }
    }

    /// Fully qualified class name
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}\\{}", self.namespace, self.name)
        }
    }

    pub fn method(&self, name: &str) -> Option<&GeneratedMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn to_template_value(&self) -> TemplateValue {
        let constants = self
            .constants
            .iter()
            .map(|c| {
                TemplateValue::map()
                    .with("name", &c.name)
                    .with("native_name", &c.native_name)
                    .with("value", c.value.clone())
            })
            .collect::<Vec<_>>();

        TemplateValue::map()
            .with("name", &self.name)
            .with("qualified_name", self.qualified_name())
            .with("namespace", &self.namespace)
            .with("kind", self.kind.to_string())
            .with("summary", &self.summary)
            .with("native_name", self.native_name.clone())
            .with("methods", TemplateValue::List(self.methods.iter().map(GeneratedMethod::to_template_value).collect()))
            .with(
                "properties",
                TemplateValue::List(self.properties.iter().map(GeneratedProperty::to_template_value).collect()),
            )
            .with("constants", TemplateValue::List(constants))
            .with("has_arrays", self.properties.iter().any(|p| p.is_list))
    }
}

/// Everything a generation run shares: mapping, rules and naming
#[derive(Debug, Clone)]
pub struct GenerationContext {
    mapper: TypeMapper,
    rules: ValidationRuleEngine,
    emitter: SnippetEmitter,
    naming: NamingRules,
    library_name: String,
    namespace: String,
    emit_validation: bool,
}

impl GenerationContext {
    /// Create a context for one run over `bindings`
    ///
    /// Structure and enum names of the bindings are known to the type mapper.
    pub fn new(config: &GeneratorConfig, bindings: &ProcessedBindings) -> Result<Self, ConfigError> {
        let mapper = config.type_mapper().with_bindings(bindings);
        let rules = ValidationRuleEngine::new(config.rule_table()?, mapper.clone());

        Ok(Self {
            mapper,
            rules,
            emitter: SnippetEmitter::new(),
            naming: NamingRules::from_config(config)?,
            library_name: config.library_name.clone(),
            namespace: config.namespace.clone(),
            emit_validation: config.emit_validation,
        })
    }

    pub fn mapper(&self) -> &TypeMapper {
        &self.mapper
    }

    pub fn rules(&self) -> &ValidationRuleEngine {
        &self.rules
    }

    pub fn naming(&self) -> &NamingRules {
        &self.naming
    }

    pub fn library_name(&self) -> &str {
        &self.library_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Guard statements for one parameter
    ///
    /// Types without a rule table entry still get a width guard when they
    /// are narrower than the host integer.
    pub fn checks_for(&self, variable: &str, raw_type: &str, nullable: bool, function: &str) -> Vec<String> {
        if !self.emit_validation {
            return Vec::new();
        }

        let host = self.mapper.map_native_type_to_host(raw_type, nullable);
        let target = CheckTarget {
            variable,
            function,
            host: &host,
            nullable: nullable || host.is_nullable(),
        };
        match self.rules.rule_table().rules_for(raw_type) {
            Some(rules) => self.emitter.emit(target, rules),
            None => self.emitter.width_guard(target, raw_type).into_iter().collect(),
        }
    }
}

impl TemplateHelpers for GenerationContext {
    fn host_type(&self, raw_type: &str) -> String {
        self.mapper.map_native_type_to_host(raw_type, false).declaration()
    }

    fn nullable_host_type(&self, raw_type: &str) -> String {
        self.mapper.map_native_type_to_host(raw_type, true).declaration()
    }

    fn doc_type(&self, raw_type: &str) -> String {
        self.mapper.map_native_type_to_host(raw_type, false).doc_type()
    }

    fn default_value(&self, raw_type: &str) -> String {
        self.mapper.map_native_type_to_host(raw_type, false).default_value().to_string()
    }

    fn validation(&self, variable: &str, raw_type: &str, nullable: bool, function: &str) -> Vec<String> {
        self.checks_for(variable, raw_type, nullable, function)
    }
}

/// Element type of an array-shaped raw type, e.g. `int` for `const int[4]`
fn array_element(raw_type: &str) -> Option<String> {
    let bracket = raw_type.find('[')?;
    raw_type.trim_end().ends_with(']').then(|| strip_qualifiers(raw_type[..bracket].trim()))
}

/// Builds one method per native function
#[derive(Debug, Clone, Copy)]
pub struct MethodGenerator<'a> {
    context: &'a GenerationContext,
}

impl<'a> MethodGenerator<'a> {
    pub fn new(context: &'a GenerationContext) -> Self {
        Self { context }
    }

    /// Build the method `name` forwarding to `signature`
    pub fn generate(&self, signature: &FunctionSignature, name: String) -> GeneratedMethod {
        let mut locals = NameAllocator::new();
        let mut parameters: Vec<GeneratedParameter> = signature
            .parameters
            .iter()
            .map(|p| self.parameter(p, &mut locals))
            .collect();
        mark_optional_tail(&mut parameters);

        // Step 1: guards
        let mut checks = Vec::new();
        for parameter in parameters.iter().filter(|p| !p.variadic) {
            checks.extend(self.context.checks_for(
                &parameter.name,
                &parameter.raw_type,
                parameter.nullable,
                &signature.name,
            ));
        }

        // Step 2: marshal host arrays into native buffers
        let mut statements = Vec::new();
        let mut arguments = Vec::new();
        for parameter in &parameters {
            match self.marshalled_element(parameter) {
                Some(element) => {
                    let buffer = locals.allocate(&format!("{}Buffer", parameter.name));
                    statements.push(self.marshal(parameter, &buffer, &element, &mut locals));
                    arguments.push(format!("${}", buffer));
                }
                None => arguments.push(parameter.variable()),
            }
        }

        // Step 3: the call and its return conversion
        let call = format!("$this->ffi->{}({})", signature.name, arguments.join(", "));
        let returns = self.return_type(&signature.return_type);
        statements.push(match returns.base() {
            HostType::Void => format!("{};", call),
            HostType::String => {
                let result = locals.allocate("result");
                format!(
                    "${0} = {1};\nreturn ${0} === null || is_string(${0}) ? ${0} : \\FFI::string(${0});",
                    result, call
                )
            }
            HostType::Bool => format!("return (bool) {};", call),
            _ => format!("return {};", call),
        });

        let documentation = if signature.documentation.is_empty() {
            vec![format!("Calls native {}()", signature.name)]
        } else {
            signature.documentation.clone()
        };

        GeneratedMethod {
            is_constructor: self.context.naming.is_constructor(&signature.name),
            name,
            native_name: signature.name.clone(),
            parameters,
            return_raw: signature.return_type.clone(),
            return_declaration: returns.declaration(),
            return_doc_type: returns.doc_type(),
            documentation,
            checks,
            body: statements.join("\n"),
        }
    }

    fn parameter(&self, parameter: &Parameter, locals: &mut NameAllocator) -> GeneratedParameter {
        let variadic = parameter.raw_type.trim() == "...";
        let name = locals.allocate(&variable_name(&parameter.name));

        let host = if variadic {
            HostType::Mixed
        } else {
            let mapped = self
                .context
                .mapper
                .map_native_type_to_host(&parameter.raw_type, parameter.nullable);
            // only flat numeric native arrays are marshalled, other native arrays are passed through
            let native_shaped = parameter.raw_type.contains(['*', '[']);
            let passthrough = native_shaped
                && matches!(
                    mapped.base(),
                    HostType::Array(element) if !matches!(element.as_ref(), HostType::Int | HostType::Float | HostType::Bool)
                );
            if !passthrough {
                mapped
            } else if parameter.nullable {
                HostType::Handle(None).nullable()
            } else {
                HostType::Handle(None)
            }
        };

        GeneratedParameter {
            name,
            native_name: parameter.name.clone(),
            raw_type: parameter.raw_type.clone(),
            declaration: host.declaration(),
            doc_type: host.doc_type(),
            nullable: parameter.nullable || matches!(host, HostType::Nullable(_)),
            variadic,
            default: None,
        }
    }

    fn marshalled_element(&self, parameter: &GeneratedParameter) -> Option<String> {
        if parameter.variadic || !parameter.declaration.ends_with("array") {
            return None;
        }
        array_element(&parameter.raw_type)
    }

    fn marshal(&self, parameter: &GeneratedParameter, buffer: &str, element: &str, locals: &mut NameAllocator) -> String {
        let index = locals.allocate("index");
        let item = locals.allocate("item");
        let source = &parameter.name;
        let allocation = format!(
            "$this->ffi->new({} . max(1, count(${})) . ']')",
            quote(&format!("{}[", element)),
            source
        );

        if parameter.nullable {
            format!(
                "${buffer} = ${source} === null ? null : {allocation};\nforeach (array_values(${source} ?? []) as ${index} => ${item}) {{\n    ${buffer}[${index}] = ${item};\n}}"
            )
        } else {
            format!(
                "${buffer} = {allocation};\nforeach (array_values(${source}) as ${index} => ${item}) {{\n    ${buffer}[${index}] = ${item};\n}}"
            )
        }
    }

    /// Host return type; pointers may come back null
    fn return_type(&self, raw_type: &str) -> HostType {
        let pointer = raw_type.contains('*');
        let host = self.context.mapper.map_native_type_to_host(raw_type, false);
        let host = match host {
            HostType::Array(_) => HostType::Handle(None),
            HostType::Callable => HostType::Mixed,
            other => other,
        };
        if pointer {
            host.nullable()
        } else {
            host
        }
    }
}

/// Give the trailing run of nullable parameters a `null` default
fn mark_optional_tail(parameters: &mut [GeneratedParameter]) {
    for parameter in parameters.iter_mut().rev().skip_while(|p| p.variadic) {
        if !parameter.nullable {
            break;
        }
        parameter.default = Some("null".to_string());
    }
}

/// Builds the wrapper class of one function group
#[derive(Debug, Clone, Copy)]
pub struct ClassGenerator<'a> {
    context: &'a GenerationContext,
}

impl<'a> ClassGenerator<'a> {
    pub fn new(context: &'a GenerationContext) -> Self {
        Self { context }
    }

    /// Assemble `class_name` from the functions of `group`
    ///
    /// Member names are unique ignoring case; later functions that would
    /// clash get a numeric suffix, recorded as a collision.
    pub fn assemble(&self, class_name: &str, group: &str, functions: &[&FunctionSignature]) -> WrapperClass {
        let summary = if group.is_empty() {
            format!("Functions of the {} library without a group of their own", self.context.library_name)
        } else {
            format!("Wrappers for the {} functions of the {} library", group, self.context.library_name)
        };
        let mut class = WrapperClass::new(class_name.to_string(), &self.context.namespace, WrapperKind::Functions, summary);

        let methods = MethodGenerator::new(self.context);
        let mut members = NameAllocator::case_insensitive();
        for function in functions {
            let requested = self.context.naming.derive_member_name(&function.name, group);
            let assigned = members.allocate(&requested);
            if assigned != requested {
                log::warn!(
                    "{}::{} is already taken, {} becomes {}",
                    class_name,
                    requested,
                    function.name,
                    assigned
                );
                class.collisions.push(NameCollision {
                    scope: class_name.to_string(),
                    source: function.name.clone(),
                    requested,
                    assigned: assigned.clone(),
                });
            }
            class.methods.push(methods.generate(function, assigned));
        }

        log::debug!("Assembled {} with {} methods", class_name, class.methods.len());
        class
    }
}

/// Builds value classes for native structures
#[derive(Debug, Clone, Copy)]
pub struct StructureGenerator<'a> {
    context: &'a GenerationContext,
}

impl<'a> StructureGenerator<'a> {
    pub fn new(context: &'a GenerationContext) -> Self {
        Self { context }
    }

    pub fn generate(&self, structure: &StructureDefinition, class_name: &str) -> WrapperClass {
        let summary = format!("Value object for native {} {}", structure.kind(), structure.name);
        let mut class = WrapperClass::new(class_name.to_string(), &self.context.namespace, WrapperKind::Structure, summary);
        class.native_name = Some(structure.name.clone());

        let mut names = NameAllocator::new();
        for field in &structure.fields {
            let native = if field.name.is_empty() { "field" } else { field.name.as_str() };
            let requested = variable_name(native);
            let name = names.allocate(&requested);
            if name != requested {
                class.collisions.push(NameCollision {
                    scope: class_name.to_string(),
                    source: field.name.clone(),
                    requested,
                    assigned: name.clone(),
                });
            }

            let access = format!("$data->{}", field.name);
            let host = match self.context.mapper.map_native_type_to_host(&field.raw_type, false) {
                // pointer-to-pointer fields have no length to read a list with
                HostType::Array(_) if !field.raw_type.contains('[') => HostType::Handle(None),
                other => other,
            };
            let char_array = array_element(&field.raw_type).is_some_and(|e| e == "char");

            let (declaration, doc_type, read, is_list) = if char_array {
                ("string".to_string(), "string".to_string(), format!("\\FFI::string({})", access), false)
            } else {
                match &host {
                    HostType::String => (
                        host.declaration(),
                        host.doc_type(),
                        format!("{0} === null ? '' : \\FFI::string({0})", access),
                        false,
                    ),
                    HostType::Bool => (host.declaration(), host.doc_type(), format!("(bool) {}", access), false),
                    HostType::Array(_) => (host.declaration(), host.doc_type(), format!("self::listOf({})", access), true),
                    // callables cannot be property types
                    HostType::Callable => ("mixed".to_string(), "callable|null".to_string(), access, false),
                    HostType::Handle(_) => {
                        let nullable = host.clone().nullable();
                        (nullable.declaration(), nullable.doc_type(), access, false)
                    }
                    _ => (host.declaration(), host.doc_type(), access, false),
                }
            };
            let default = if char_array {
                "''".to_string()
            } else {
                host.default_value().to_string()
            };

            class.properties.push(GeneratedProperty {
                name,
                native_name: field.name.clone(),
                raw_type: field.raw_type.clone(),
                declaration,
                doc_type,
                default,
                read,
                is_list,
            });
        }

        class
    }
}

/// Builds the class holding every constant
#[derive(Debug, Clone, Copy)]
pub struct ConstantGenerator<'a> {
    context: &'a GenerationContext,
}

impl<'a> ConstantGenerator<'a> {
    pub fn new(context: &'a GenerationContext) -> Self {
        Self { context }
    }

    pub fn generate(&self, constants: &Constants, class_name: &str) -> WrapperClass {
        let summary = format!("Constants of the {} library", self.context.library_name);
        let mut class = WrapperClass::new(class_name.to_string(), &self.context.namespace, WrapperKind::Constants, summary);

        let mut names = NameAllocator::case_insensitive();
        names.reserve("CLASS");
        for (native, value) in constants {
            let stripped = self.context.naming.strip_prefix(native);
            let mut requested = to_upper_snake_case(stripped);
            if requested.is_empty() {
                requested = to_upper_snake_case(native);
            }
            if requested.is_empty() || requested.starts_with(|c: char| c.is_ascii_digit()) {
                requested = format!("VALUE_{}", requested);
            }

            let name = names.allocate(&requested);
            if name != requested {
                log::warn!("Constant {} renamed to {} in {}", native, name, class_name);
                class.collisions.push(NameCollision {
                    scope: class_name.to_string(),
                    source: native.clone(),
                    requested,
                    assigned: name.clone(),
                });
            }
            class.constants.push(GeneratedConstant {
                name,
                native_name: native.clone(),
                value: value.clone(),
            });
        }

        class
    }
}
