// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Error types for pipeline construction
//!
//! Every failure is a construction-time validation error raised at the
//! offending call. Messages are meant to be surfaced verbatim to whoever
//! wrote the pipeline definition.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for stagewire operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Main error type for stagewire
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum PipelineError {
    // ─────────────────────────────────────────────────────────────────────────
    // Naming Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage name '{name}' already exists")]
    #[diagnostic(
        code(stagewire::duplicate_name),
        help("Stage names must be unique within a pipeline")
    )]
    DuplicateName { name: String },

    #[error("{kind} '{name}' not found")]
    #[diagnostic(code(stagewire::name_not_found))]
    NameNotFound { kind: NameKind, name: String },

    #[error("Name '{name}' does not produce a valid identifier")]
    #[diagnostic(
        code(stagewire::invalid_name),
        help("Identifiers are built from the latin letters and digits of the name; include at least one letter")
    )]
    InvalidName { name: String },

    #[error("Identifier '{id}' of '{name}' is already used by '{existing}'")]
    #[diagnostic(
        code(stagewire::identifier_collision),
        help("Rename one of them or assign an explicit id")
    )]
    IdentifierCollision {
        id: String,
        existing: String,
        name: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Builder State Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(stagewire::illegal_state))]
    IllegalState(IllegalState),

    #[error("{0}")]
    #[diagnostic(
        code(stagewire::invalid_exclusion),
        help("Exclusions may only name axes and values registered in the matrix axes")
    )]
    InvalidExclusion(InvalidExclusion),

    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Circular dependency detected between: {}", .units.join(", "))]
    #[diagnostic(
        code(stagewire::circular_dependency),
        help("Review stage and build dependencies to remove the cycle")
    )]
    CyclicDependency { units: Vec<String> },

    #[error("Unit '{unit}' depends on a unit that is not part of this pipeline")]
    #[diagnostic(
        code(stagewire::unknown_dependency),
        help("Handles are only valid for the pipeline that created them")
    )]
    UnknownDependency { unit: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(stagewire::config_error))]
    Config { message: String },

    #[error("Serialization error: {message}")]
    #[diagnostic(code(stagewire::serialization_error))]
    Serialization { message: String },
}

/// What kind of named object a failed lookup was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Stage,
    Template,
    Build,
    Axis,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage => write!(f, "Stage"),
            Self::Template => write!(f, "Template"),
            Self::Build => write!(f, "Build"),
            Self::Axis => write!(f, "Axis"),
        }
    }
}

/// A single-use block was reused, or an artifact contract was broken
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IllegalState {
    #[error("only one axes configuration can be defined")]
    AxesRedefined,

    #[error("only one matrix build configuration can be defined")]
    MatrixBuildRedefined,

    #[error("Artifact is produced by build '{producer}'")]
    AlreadyProduced { producer: String },

    #[error("Missing producer")]
    MissingProducer,

    #[error("Consumer and producer cannot be the same build")]
    SameBuild,
}

/// An exclusion referenced something the matrix axes do not define
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidExclusion {
    #[error("Invalid name: {axis}")]
    UnknownAxis { axis: String },

    #[error("Invalid value: {value}")]
    UnknownValue { axis: String, value: String },
}

impl From<IllegalState> for PipelineError {
    fn from(e: IllegalState) -> Self {
        Self::IllegalState(e)
    }
}

impl From<InvalidExclusion> for PipelineError {
    fn from(e: InvalidExclusion) -> Self {
        Self::InvalidExclusion(e)
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Config { message: e.to_string() }
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config { message: e.to_string() }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization { message: e.to_string() }
    }
}

impl PipelineError {
    /// Lookup failure for a named object
    pub fn not_found(kind: NameKind, name: &str) -> Self {
        Self::NameNotFound {
            kind,
            name: name.to_string(),
        }
    }

    /// Failure to write pipeline data out; parse failures are `Config` errors
    pub fn serialization(e: impl std::fmt::Display) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }

    /// Whether this error comes from reusing a single-use block or misusing an artifact
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_verbatim() {
        let err = PipelineError::DuplicateName {
            name: "Build".into(),
        };
        assert_eq!(err.to_string(), "Stage name 'Build' already exists");

        let err: PipelineError = IllegalState::AlreadyProduced {
            producer: "Build 1".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Artifact is produced by build 'Build 1'");
        assert!(err.is_illegal_state());

        let err: PipelineError = InvalidExclusion::UnknownValue {
            axis: "OS".into(),
            value: "BeOS".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid value: BeOS");
    }

    #[test]
    fn test_not_found_names_the_kind() {
        let err = PipelineError::not_found(NameKind::Template, "Template1");
        assert_eq!(err.to_string(), "Template 'Template1' not found");
    }

    #[test]
    fn test_yaml_write_errors_are_serialization_errors() {
        let yaml_err = serde_yaml::from_str::<u32>("[").unwrap_err();
        let message = yaml_err.to_string();

        assert_eq!(
            PipelineError::serialization(yaml_err),
            PipelineError::Serialization { message }
        );
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = PipelineError::CyclicDependency {
            units: vec!["A".into(), "B".into()],
        };
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("stagewire::circular_dependency"));
        assert_eq!(err.to_string(), "Circular dependency detected between: A, B");
    }
}
