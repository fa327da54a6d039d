//! Binding processor
//!
//! Turns the two artifacts of an upstream binding-generation run (constant
//! declarations and function declarations) into a [`ProcessedBindings`] IR.

use crate::constants::ConstantExtractor;
use crate::parser::BindingOutputParser;
use crate::structures::StructureExtractor;
use ffiwrap_core::{Diagnostic, DiagnosticCollector, FfiWrapError, FfiWrapResult, ProcessedBindings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Where an upstream artifact lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactHandle {
    Path(PathBuf),
    Inline { name: String, content: String },
}

impl ArtifactHandle {
    /// Create a handle for in-memory artifact text
    pub fn inline<N: Into<String>, C: Into<String>>(name: N, content: C) -> Self {
        ArtifactHandle::Inline {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ArtifactHandle::Path(path) => path.display().to_string(),
            ArtifactHandle::Inline { name, .. } => name.clone(),
        }
    }

    /// Read the artifact; bytes that are not UTF-8 are replaced, not rejected
    pub fn read(&self) -> FfiWrapResult<String> {
        match self {
            ArtifactHandle::Path(path) => {
                let bytes = fs::read(path).map_err(|e| {
                    FfiWrapError::analysis_with_artifact(format!("Cannot read artifact: {}", e), self.name())
                })?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            ArtifactHandle::Inline { content, .. } => Ok(content.clone()),
        }
    }
}

/// Outcome of the upstream binding-generation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingGenerationResult {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    pub constants: Option<ArtifactHandle>,
    pub bindings: Option<ArtifactHandle>,
}

impl BindingGenerationResult {
    /// A successful run that produced both artifacts
    pub fn succeeded(constants: ArtifactHandle, bindings: ArtifactHandle) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            constants: Some(constants),
            bindings: Some(bindings),
        }
    }

    /// A failed run
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            constants: None,
            bindings: None,
        }
    }
}

/// IR together with every recoverable problem met while building it
#[derive(Debug)]
pub struct ProcessingOutcome {
    pub bindings: ProcessedBindings,
    pub diagnostics: DiagnosticCollector,
}

/// Builds the IR from upstream artifacts
#[derive(Debug, Clone, Default)]
pub struct BindingProcessor {
    parser: BindingOutputParser,
    constants: ConstantExtractor,
    structures: StructureExtractor,
}

impl BindingProcessor {
    /// Create a new binding processor
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a processor with a custom parser
    pub fn with_parser(parser: BindingOutputParser) -> Self {
        Self {
            parser,
            ..Self::default()
        }
    }

    /// Process an upstream result, discarding diagnostics
    pub fn process(&self, result: &BindingGenerationResult) -> FfiWrapResult<ProcessedBindings> {
        self.process_with_diagnostics(result).map(|outcome| outcome.bindings)
    }

    /// Process an upstream result
    ///
    /// Fails with an analysis error if the upstream step failed, an artifact
    /// is missing or an artifact cannot be read. Declarations that cannot be
    /// parsed are skipped and reported as diagnostics.
    pub fn process_with_diagnostics(&self, result: &BindingGenerationResult) -> FfiWrapResult<ProcessingOutcome> {
        if !result.success {
            let detail = if result.errors.is_empty() {
                "no details reported".to_string()
            } else {
                result.errors.join("; ")
            };
            return Err(FfiWrapError::analysis(format!("Binding generation failed: {}", detail)));
        }

        let constants = result
            .constants
            .as_ref()
            .ok_or_else(|| FfiWrapError::analysis("Binding generation produced no constants artifact"))?;
        let bindings = result
            .bindings
            .as_ref()
            .ok_or_else(|| FfiWrapError::analysis("Binding generation produced no bindings artifact"))?;

        let constants_text = constants.read()?;
        let bindings_text = bindings.read()?;

        let outcome = self.assemble(&constants.name(), &constants_text, &bindings.name(), &bindings_text);
        log::info!(
            "Processed {} functions, {} structures and {} constants from {}",
            outcome.bindings.function_count(),
            outcome.bindings.structure_count(),
            outcome.bindings.constants().len(),
            bindings.name()
        );
        Ok(outcome)
    }

    /// Build the IR directly from artifact text; never fails
    pub fn process_text(&self, constants_text: &str, bindings_text: &str) -> ProcessingOutcome {
        self.assemble("constants", constants_text, "bindings", bindings_text)
    }

    fn assemble(
        &self,
        constants_name: &str,
        constants_text: &str,
        bindings_name: &str,
        bindings_text: &str,
    ) -> ProcessingOutcome {
        let mut diagnostics = DiagnosticCollector::new();
        let mut builder = ProcessedBindings::builder();

        // Step 1: functions
        let parsed = self.parser.parse(bindings_text);
        tag_diagnostics(parsed.diagnostics, bindings_name, &mut diagnostics);
        for (_, signature) in parsed.functions {
            builder.add_function(signature);
        }

        // Step 2: structures and enums
        let aggregates = self.structures.extract(bindings_text);
        tag_diagnostics(aggregates.diagnostics, bindings_name, &mut diagnostics);
        for structure in aggregates.structures {
            let name = structure.name.clone();
            if !builder.add_structure(structure) {
                diagnostics.add(
                    Diagnostic::info(format!("Structure '{}' is defined more than once", name)).in_artifact(bindings_name),
                );
            }
        }

        // Step 3: constants; explicit declarations override enum members
        let constants = self.constants.extract(constants_text);
        tag_diagnostics(constants.diagnostics, constants_name, &mut diagnostics);
        for definition in aggregates.enums {
            builder.add_enum(definition);
        }
        for (name, value) in constants.constants {
            builder.add_constant(name, value);
        }

        ProcessingOutcome {
            bindings: builder.build(),
            diagnostics,
        }
    }
}

fn tag_diagnostics(collected: DiagnosticCollector, artifact: &str, into: &mut DiagnosticCollector) {
    for diagnostic in collected.diagnostics() {
        into.add(diagnostic.clone().in_artifact(artifact));
    }
}
