// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! # stagewire - Build Pipeline Graph Builder
//!
//! `stagewire` builds the dependency graph of a staged CI pipeline in memory
//! and validates it before anything is rendered.
//!
//! ## Features
//!
//! - **Stages with gates** - Each stage gets a composite unit aggregating its builds
//! - **Implicit wiring** - Stages depend on the previous stage unless told otherwise
//! - **Matrix builds** - Axes expand into combinations, minus exclusions
//! - **Artifacts** - One producer, any number of consumers, checked eagerly
//! - **Stable identifiers** - Names normalize to identifiers; collisions are caught
//!
//! ## Quick Start
//!
//! ```
//! use stagewire::{pipeline, PipelineResult};
//!
//! fn main() -> PipelineResult<()> {
//!     let pipeline = pipeline(|p| {
//!         p.stage("Build", |s| {
//!             s.build(|b| {
//!                 b.name("Compile");
//!                 Ok(())
//!             })?;
//!             s.matrix(|m| {
//!                 m.axes(|a| {
//!                     a.axis("OS", ["Linux", "Windows"]);
//!                 })?;
//!                 m.build(|b| {
//!                     let os = b.axis("OS")?.to_string();
//!                     b.name(format!("Test {os}"));
//!                     Ok(())
//!                 })?;
//!                 Ok(())
//!             })?;
//!             Ok(())
//!         })?;
//!         p.stage("Release", |s| {
//!             s.deploy(|b| {
//!                 b.name("Publish");
//!                 Ok(())
//!             })?;
//!             Ok(())
//!         })?;
//!         Ok(())
//!     })?;
//!
//!     let ids: Vec<_> = pipeline.units().map(|(_, unit)| unit.id()).collect();
//!     assert_eq!(
//!         ids,
//!         ["Stage_Build", "Compile", "TestLinux", "TestWindows", "Stage_Release", "Publish"]
//!     );
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod pipeline;

// Re-export commonly used types
pub use errors::{IllegalState, InvalidExclusion, NameKind, PipelineError, PipelineResult};
pub use pipeline::{
    pipeline, pipeline_with_config, Artifact, BuildScope, BuildUnit, Pipeline, PipelineConfig,
    PipelineSnapshot, Stage, StageRef, StageScope, UnitRef, UnitRole,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
