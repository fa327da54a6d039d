//! Error handling for the ffiwrap pipeline
//!
//! This module provides the error taxonomy shared by every stage of the
//! binding-processing and wrapper-assembly pipeline, plus the diagnostic
//! collector used for conditions that are recovered locally.

use thiserror::Error;

/// Main error type for ffiwrap operations
#[derive(Error, Debug)]
pub enum FfiWrapError {
    /// Upstream artifacts are missing or unreadable, or upstream generation failed
    #[error("Analysis error: {message}")]
    Analysis {
        message: String,
        artifact: Option<String>,
    },

    /// A declaration could not be parsed
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        line: Option<usize>,
    },

    /// A validation result converted into an error at a caller boundary
    #[error("Validation failed: {}", errors.join("; "))]
    Validation {
        errors: Vec<String>,
        context: Option<String>,
    },

    /// Wrapper assembly or template rendering failed
    #[error("Generation error: {message}")]
    Generation {
        message: String,
        artifact: Option<String>,
        template: Option<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("Error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl FfiWrapError {
    /// Create a new analysis error
    pub fn analysis<S: Into<String>>(message: S) -> Self {
        Self::Analysis {
            message: message.into(),
            artifact: None,
        }
    }

    /// Create an analysis error naming the artifact involved
    pub fn analysis_with_artifact<S: Into<String>, A: Into<String>>(message: S, artifact: A) -> Self {
        Self::Analysis {
            message: message.into(),
            artifact: Some(artifact.into()),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
            line: None,
        }
    }

    /// Create a parse error with a 1-based line number
    pub fn parse_at<S: Into<String>>(message: S, line: usize) -> Self {
        Self::Parse {
            message: message.into(),
            line: Some(line),
        }
    }

    /// Create a validation error from collected messages
    pub fn validation(errors: Vec<String>) -> Self {
        Self::Validation {
            errors,
            context: None,
        }
    }

    /// Create a validation error with the name of what was validated
    pub fn validation_with_context<C: Into<String>>(errors: Vec<String>, context: C) -> Self {
        Self::Validation {
            errors,
            context: Some(context.into()),
        }
    }

    /// Create a new generation error
    pub fn generation<S: Into<String>>(message: S) -> Self {
        Self::Generation {
            message: message.into(),
            artifact: None,
            template: None,
        }
    }

    /// Create a generation error raised while rendering a named template
    pub fn generation_in_template<S: Into<String>, T: Into<String>>(message: S, template: T) -> Self {
        Self::Generation {
            message: message.into(),
            artifact: None,
            template: Some(template.into()),
        }
    }

    /// Attach the artifact name to a generation error
    pub fn for_artifact<A: Into<String>>(self, artifact_name: A) -> Self {
        match self {
            Self::Generation { message, template, .. } => Self::Generation {
                message,
                artifact: Some(artifact_name.into()),
                template,
            },
            other => other,
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error with field information
    pub fn configuration_with_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Whether this error aborts the whole invocation rather than a single artifact
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Generation { .. } | Self::Validation { .. } | Self::Parse { .. })
    }
}

/// Result type for ffiwrap operations
pub type FfiWrapResult<T> = Result<T, FfiWrapError>;

/// Diagnostic information for recoverable pipeline conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub artifact: Option<String>,
    pub line: Option<usize>,
    pub code: Option<String>,
    pub help: Option<String>,
}

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    fn with_level<S: Into<String>>(level: DiagnosticLevel, message: S) -> Self {
        Self {
            level,
            message: message.into(),
            artifact: None,
            line: None,
            code: None,
            help: None,
        }
    }

    /// Create a new error diagnostic
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self::with_level(DiagnosticLevel::Error, message)
    }

    /// Create a new warning diagnostic
    pub fn warning<S: Into<String>>(message: S) -> Self {
        Self::with_level(DiagnosticLevel::Warning, message)
    }

    /// Create a new info diagnostic
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self::with_level(DiagnosticLevel::Info, message)
    }

    /// Add the artifact the diagnostic refers to
    pub fn in_artifact<A: Into<String>>(mut self, artifact: A) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    /// Add a 1-based line number
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Add a short machine-readable code
    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add help text to the diagnostic
    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Diagnostic collector for gathering recoverable issues
#[derive(Debug, Default, Clone)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    /// Create a new diagnostic collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic to the collector
    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Add an error diagnostic
    pub fn error<S: Into<String>>(&mut self, message: S) {
        self.add(Diagnostic::error(message));
    }

    /// Add a warning diagnostic
    pub fn warning<S: Into<String>>(&mut self, message: S) {
        self.add(Diagnostic::warning(message));
    }

    /// Add an info diagnostic
    pub fn info<S: Into<String>>(&mut self, message: S) {
        self.add(Diagnostic::info(message));
    }

    /// Move every diagnostic from another collector into this one
    pub fn extend(&mut self, other: DiagnosticCollector) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Get all diagnostics
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Get diagnostics carrying a specific code
    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics
            .iter()
            .filter(move |d| d.code.as_deref() == Some(code))
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error)
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Warning)
    }

    /// Get the number of errors
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.level == DiagnosticLevel::Error).count()
    }

    /// Get the number of warnings
    pub fn warning_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.level == DiagnosticLevel::Warning).count()
    }

    /// Check whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Clear all diagnostics
    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }

    /// Convert to a result, returning an error if there are any error diagnostics
    pub fn into_result(self) -> FfiWrapResult<Vec<Diagnostic>> {
        if self.has_errors() {
            let error_messages: Vec<String> = self.diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .map(|d| d.message.clone())
                .collect();

            Err(FfiWrapError::generation(format!(
                "Generation failed with {} error(s): {}",
                error_messages.len(),
                error_messages.join("; ")
            )))
        } else {
            Ok(self.diagnostics)
        }
    }
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
            DiagnosticLevel::Info => write!(f, "info"),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.level, self.message)?;

        match (&self.artifact, self.line) {
            (Some(artifact), Some(line)) => write!(f, " at {}:{}", artifact, line)?,
            (Some(artifact), None) => write!(f, " in {}", artifact)?,
            (None, Some(line)) => write!(f, " at line {}", line)?,
            (None, None) => {}
        }

        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  help: {}", help)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FfiWrapError::analysis_with_artifact("constants artifact missing", "constants.php");
        assert_eq!(err.to_string(), "Analysis error: constants artifact missing");

        let err = FfiWrapError::validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Validation failed: a; b");
    }

    #[test]
    fn test_generation_error_artifact_attachment() {
        let err = FfiWrapError::generation_in_template("Undefined variable 'name'", "wrapper_class")
            .for_artifact("Math.php");

        match err {
            FfiWrapError::Generation { artifact, template, .. } => {
                assert_eq!(artifact.as_deref(), Some("Math.php"));
                assert_eq!(template.as_deref(), Some("wrapper_class"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fatality() {
        assert!(FfiWrapError::analysis("x").is_fatal());
        assert!(FfiWrapError::configuration("x").is_fatal());
        assert!(!FfiWrapError::generation("x").is_fatal());
        assert!(!FfiWrapError::parse("x").is_fatal());
    }

    #[test]
    fn test_collector_counts_and_result() {
        let mut collector = DiagnosticCollector::new();
        collector.warning("skipped declaration");
        collector.info("parsed 3 functions");
        assert!(!collector.has_errors());
        assert_eq!(collector.warning_count(), 1);
        assert!(collector.clone().into_result().is_ok());

        collector.add(Diagnostic::error("template failed").in_artifact("Str.php").with_code("generation"));
        assert_eq!(collector.error_count(), 1);
        assert_eq!(collector.with_code("generation").count(), 1);
        assert!(collector.into_result().is_err());
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::warning("could not parse parameter list")
            .in_artifact("bindings.php")
            .at_line(12)
            .with_code("parse-miss")
            .with_help("the declaration was skipped");
        assert_eq!(
            d.to_string(),
            "warning: could not parse parameter list at bindings.php:12 [parse-miss]\n  help: the declaration was skipped"
        );
    }
}
