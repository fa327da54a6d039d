//! Destinations for generated artifacts

use ffiwrap_core::{FfiWrapError, FfiWrapResult};
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Receives named artifacts as they are produced
pub trait ArtifactSink {
    fn write_artifact(&mut self, name: &str, content: &str) -> FfiWrapResult<()>;
}

/// Artifact names are flat file names
fn check_artifact_name(name: &str) -> FfiWrapResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(FfiWrapError::generation(format!("Invalid artifact name '{}'", name)).for_artifact(name));
    }
    Ok(())
}

/// Writes each artifact as a file in one directory
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    /// Create the sink, creating `root` if needed
    pub fn new<P: AsRef<Path>>(root: P) -> FfiWrapResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            written: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files written so far, in write order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ArtifactSink for DirectorySink {
    fn write_artifact(&mut self, name: &str, content: &str) -> FfiWrapResult<()> {
        check_artifact_name(name)?;
        let path = self.root.join(name);
        fs::write(&path, content)?;
        log::debug!("Wrote {} ({} bytes)", path.display(), content.len());
        self.written.push(path);
        Ok(())
    }
}

/// Keeps artifacts in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: IndexMap<String, String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.artifacts.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, String> {
        self.artifacts
    }
}

impl ArtifactSink for MemorySink {
    fn write_artifact(&mut self, name: &str, content: &str) -> FfiWrapResult<()> {
        check_artifact_name(name)?;
        self.artifacts.insert(name.to_string(), content.to_string());
        Ok(())
    }
}
