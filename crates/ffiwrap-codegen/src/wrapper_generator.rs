//! Orchestration of a wrapper generation run
//!
//! `WrapperGenerator` plans one artifact per function group, structure and
//! the constant set, assembles each into a [`WrapperClass`] and renders it
//! through the template engine. A failing artifact is reported and skipped;
//! the remaining artifacts are still produced.

use crate::config::GeneratorConfig;
use crate::generators::{
    ClassGenerator, ConstantGenerator, GenerationContext, StructureGenerator, WrapperClass, WrapperKind,
};
use crate::naming::{derive_class_name, derive_type_name, NameAllocator, NameCollision};
use crate::output::ArtifactSink;
use crate::template::{TemplateContext, TemplateEngine, TemplateValue};
use chrono::{DateTime, SecondsFormat, Utc};
use ffiwrap_core::{FfiWrapError, FfiWrapResult, FunctionSignature, ProcessedBindings, StructureDefinition};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name written into artifact headers and reports
pub const GENERATOR_NAME: &str = "ffiwrap";

/// Summary of one produced artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub artifact: String,
    pub class_name: String,
    pub kind: WrapperKind,
    pub methods: usize,
    pub properties: usize,
    pub constants: usize,
}

/// An artifact that could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFailure {
    pub artifact: String,
    pub error: String,
}

/// What a generation run produced, renamed and skipped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generator: String,
    pub library: String,
    pub generated_at: Option<DateTime<Utc>>,
    pub artifacts: Vec<ArtifactSummary>,
    pub collisions: Vec<NameCollision>,
    pub failures: Vec<ArtifactFailure>,
}

impl GenerationReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn method_count(&self) -> usize {
        self.artifacts.iter().map(|a| a.methods).sum()
    }

    pub fn to_json(&self) -> FfiWrapResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} artifacts ({} methods), {} renamed, {} failed",
            self.artifacts.len(),
            self.method_count(),
            self.collisions.len(),
            self.failures.len()
        )
    }

    fn record_failure(&mut self, artifact: &str, error: &FfiWrapError) {
        self.artifacts.retain(|a| a.artifact != artifact);
        self.failures.push(ArtifactFailure {
            artifact: artifact.to_string(),
            error: error.to_string(),
        });
    }
}

/// Rendered artifacts keyed by file name, with the run report
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub artifacts: IndexMap<String, String>,
    pub report: GenerationReport,
}

impl GenerationOutput {
    pub fn artifact(&self, name: &str) -> Option<&str> {
        self.artifacts.get(name).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        !self.report.has_failures()
    }
}

/// One planned artifact
#[derive(Debug)]
enum Plan<'b> {
    Functions {
        class_name: String,
        group: String,
        functions: Vec<&'b FunctionSignature>,
    },
    Structure {
        class_name: String,
        structure: &'b StructureDefinition,
    },
    Constants {
        class_name: String,
    },
}

impl Plan<'_> {
    fn class_name(&self) -> &str {
        match self {
            Plan::Functions { class_name, .. }
            | Plan::Structure { class_name, .. }
            | Plan::Constants { class_name } => class_name,
        }
    }
}

/// Drives wrapper generation for processed bindings
#[derive(Debug, Clone)]
pub struct WrapperGenerator {
    config: GeneratorConfig,
    templates: TemplateEngine,
}

impl WrapperGenerator {
    /// Create a new generator
    ///
    /// Validates the configuration and loads template overrides from its
    /// template directory.
    pub fn new(config: GeneratorConfig) -> FfiWrapResult<Self> {
        config.validate()?;

        let mut templates = TemplateEngine::with_builtin_templates()?;
        if let Some(dir) = &config.template_dir {
            let loaded = templates.load_overrides(dir).map_err(|e| {
                FfiWrapError::configuration_with_field(
                    format!("Cannot load templates from {}: {}", dir.display(), e),
                    "template_dir",
                )
            })?;
            log::info!("Loaded {} template overrides from {}", loaded, dir.display());
        }

        Ok(Self { config, templates })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Templates can be replaced programmatically before generating
    pub fn templates_mut(&mut self) -> &mut TemplateEngine {
        &mut self.templates
    }

    /// Generate every artifact for `bindings`
    ///
    /// Fails only when the run cannot start; per-artifact failures are
    /// listed in the report.
    pub fn generate(&self, bindings: &ProcessedBindings) -> FfiWrapResult<GenerationOutput> {
        let generated_at = self.config.emit_timestamp.then(Utc::now);
        let mut report = GenerationReport {
            generator: format!("{} {}", GENERATOR_NAME, env!("CARGO_PKG_VERSION")),
            library: self.config.library_name.clone(),
            generated_at,
            ..GenerationReport::default()
        };

        if bindings.is_empty() {
            log::warn!("Bindings are empty, nothing to generate");
            return Ok(GenerationOutput {
                artifacts: IndexMap::new(),
                report,
            });
        }

        // Step 1: per-run type mapping, rules and naming
        let context = GenerationContext::new(&self.config, bindings)?;

        // Step 2: decide class names for every artifact
        let plans = self.plan(bindings, &context, &mut report.collisions);
        log::info!("Planned {} artifacts for {}", plans.len(), self.config.library_name);

        // Step 3: assemble and render
        let extra = self.extra_context(generated_at);

        #[cfg(feature = "parallel")]
        let built: Vec<FfiWrapResult<WrapperClass>> = {
            use rayon::prelude::*;
            plans.par_iter().map(|plan| self.assemble(plan, &context, bindings)).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let built: Vec<FfiWrapResult<WrapperClass>> = plans.iter().map(|plan| self.assemble(plan, &context, bindings)).collect();

        let mut artifacts = IndexMap::new();
        for (plan, wrapper) in plans.iter().zip(built) {
            let artifact = self.file_name(plan.class_name());
            let rendered = wrapper.and_then(|wrapper| {
                let source = self
                    .templates
                    .render_wrapper(&wrapper, &extra, &context)
                    .map_err(|e| e.for_artifact(artifact.as_str()))?;
                Ok((wrapper, source))
            });

            match rendered {
                Ok((wrapper, source)) => {
                    report.collisions.extend(wrapper.collisions.iter().cloned());
                    report.artifacts.push(ArtifactSummary {
                        artifact: artifact.clone(),
                        class_name: wrapper.name.clone(),
                        kind: wrapper.kind,
                        methods: wrapper.methods.len(),
                        properties: wrapper.properties.len(),
                        constants: wrapper.constants.len(),
                    });
                    artifacts.insert(artifact, source);
                }
                Err(e) => {
                    log::error!("Skipping {}: {}", artifact, e);
                    report.record_failure(&artifact, &e);
                }
            }
        }

        log::info!("Generated {}", report.summary());
        Ok(GenerationOutput { artifacts, report })
    }

    /// Generate and hand every artifact to `sink`
    ///
    /// Artifacts the sink rejects are moved to the report's failures.
    pub fn write_to(&self, bindings: &ProcessedBindings, sink: &mut dyn ArtifactSink) -> FfiWrapResult<GenerationReport> {
        let output = self.generate(bindings)?;
        let mut report = output.report;

        for (name, content) in &output.artifacts {
            if let Err(e) = sink.write_artifact(name, content) {
                log::error!("Failed to write {}: {}", name, e);
                report.record_failure(name, &e);
            }
        }
        Ok(report)
    }

    fn file_name(&self, class_name: &str) -> String {
        format!("{}.{}", class_name, self.config.file_extension)
    }

    fn header(&self, generated_at: Option<DateTime<Utc>>) -> String {
        let mut header = format!(
            "// Generated by {} {} from the {} bindings",
            GENERATOR_NAME,
            env!("CARGO_PKG_VERSION"),
            self.config.library_name
        );
        if let Some(at) = generated_at {
            header.push_str(&format!(" on {}", at.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        header.push_str("\n// DO NOT EDIT: changes are overwritten on regeneration");
        header
    }

    fn extra_context(&self, generated_at: Option<DateTime<Utc>>) -> TemplateContext {
        let mut extra = TemplateContext::new();
        extra.insert("header".to_string(), TemplateValue::from(self.header(generated_at)));
        extra.insert("library".to_string(), TemplateValue::from(&self.config.library_name));
        extra.insert("emit_docs".to_string(), TemplateValue::from(self.config.emit_doc_comments));
        extra
    }

    fn plan<'b>(
        &self,
        bindings: &'b ProcessedBindings,
        context: &GenerationContext,
        collisions: &mut Vec<NameCollision>,
    ) -> Vec<Plan<'b>> {
        let namespace = context.namespace().to_string();
        let mut classes = NameAllocator::case_insensitive();
        let mut allocate = |requested: String, source: &str, collisions: &mut Vec<NameCollision>| {
            let assigned = classes.allocate(&requested);
            if assigned != requested {
                log::warn!("Class {} is already taken, {} becomes {}", requested, source, assigned);
                collisions.push(NameCollision {
                    scope: namespace.clone(),
                    source: source.to_string(),
                    requested,
                    assigned: assigned.clone(),
                });
            }
            assigned
        };

        // the configured constants class keeps its name
        let constants = (!bindings.constants().is_empty()).then(|| Plan::Constants {
            class_name: allocate(self.config.constants_class.clone(), "constants", collisions),
        });

        let mut plans = Vec::new();
        let mut ungrouped = Vec::new();
        for (group, functions) in context.naming().group_functions(bindings.functions()) {
            if group.is_empty() || functions.len() < self.config.min_group_size {
                log::debug!("Group '{}' has {} functions, merging into fallback", group, functions.len());
                ungrouped.extend(functions);
                continue;
            }
            plans.push(Plan::Functions {
                class_name: allocate(derive_class_name(&group), &group, collisions),
                group,
                functions,
            });
        }

        if !ungrouped.is_empty() {
            plans.push(Plan::Functions {
                class_name: allocate(derive_class_name(&self.config.library_name), &self.config.library_name, collisions),
                group: String::new(),
                functions: ungrouped,
            });
        }

        if self.config.generate_struct_classes {
            for structure in bindings.structures() {
                plans.push(Plan::Structure {
                    class_name: allocate(derive_type_name(&structure.name), &structure.name, collisions),
                    structure,
                });
            }
        }

        plans.extend(constants);
        plans
    }

    fn assemble(&self, plan: &Plan<'_>, context: &GenerationContext, bindings: &ProcessedBindings) -> FfiWrapResult<WrapperClass> {
        let wrapper = match plan {
            Plan::Functions {
                class_name,
                group,
                functions,
            } => ClassGenerator::new(context).assemble(class_name, group, functions),
            Plan::Structure { class_name, structure } => StructureGenerator::new(context).generate(structure, class_name),
            Plan::Constants { class_name } => ConstantGenerator::new(context).generate(bindings.constants(), class_name),
        };

        if wrapper.kind == WrapperKind::Functions && wrapper.methods.is_empty() {
            return Err(FfiWrapError::generation(format!("{} has no methods", wrapper.name)));
        }
        Ok(wrapper)
    }
}
