//! Registry failure taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use conductor_protocol::CallTargetKind;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("registry validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("overlay validation failed for {path}: {}", errors.join("; "))]
    OverlayValidationFailed { path: PathBuf, errors: Vec<String> },

    #[error("pipeline validation failed: {}", errors.join("; "))]
    PipelineValidationFailed { errors: Vec<String> },

    #[error("skill not found: {name}@{version}")]
    SkillNotFound { name: String, version: String },

    #[error("op not found: {name}@{version}")]
    OpNotFound { name: String, version: String },

    #[error("multiple {kind} versions found for {name}")]
    AmbiguousVersion { kind: CallTargetKind, name: String },
}

impl RegistryError {
    /// Stable failure code for audit records and wire errors.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::FileNotFound(_) => "registry_file_not_found",
            RegistryError::Io { .. } => "registry_io_error",
            RegistryError::Parse { .. } => "registry_parse_error",
            RegistryError::ValidationFailed { .. } => "registry_validation_failed",
            RegistryError::OverlayValidationFailed { .. } => "overlay_validation_failed",
            RegistryError::PipelineValidationFailed { .. } => "pipeline_validation_failed",
            RegistryError::SkillNotFound { .. } => "skill_not_found",
            RegistryError::OpNotFound { .. } => "op_not_found",
            RegistryError::AmbiguousVersion { .. } => "ambiguous_version",
        }
    }
}
