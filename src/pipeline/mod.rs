// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Pipeline definitions and types
//!
//! This module defines the pipeline model: stages with their gate units,
//! builds, matrices, templates and artifacts, plus the dependency graph
//! derived from them.

mod artifact;
mod config;
mod dag;
mod definition;
mod id;
mod matrix;
mod snapshot;
mod stage;
mod unit;
mod validation;

pub use artifact::Artifact;
pub use config::{CollisionPolicy, DeployDefaults, GateNaming, IdentifierPolicy, PipelineConfig};
pub use dag::DagBuilder;
pub use definition::{pipeline, pipeline_with_config, Pipeline};
pub use id::{to_id, to_prefixed_id};
pub use matrix::{Axes, Combination, Excludes, Exclusion, Matrix};
pub use snapshot::{DependencySnapshot, PipelineSnapshot, TemplateSnapshot, UnitSnapshot};
pub use stage::{BuildScope, Stage, StageScope};
pub use unit::{
    BuildSettings, BuildType, BuildUnit, Dependency, StageRef, Template, TemplateRef, UnitRef,
    UnitRole,
};
pub use validation::{PipelineValidator, ValidationResult};
