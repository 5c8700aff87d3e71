// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Pipeline definition
//!
//! The root aggregate: an ordered list of uniquely named stages, the wiring
//! between them, and the entry points that build and validate a pipeline.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::errors::{PipelineError, PipelineResult};

use super::config::PipelineConfig;
use super::dag::DagBuilder;
use super::id::to_prefixed_id;
use super::snapshot::PipelineSnapshot;
use super::stage::{ensure_unique_id, find_stage, Stage, StageScope};
use super::unit::{BuildUnit, StageRef, Template, TemplateRef, UnitRef};
use super::validation::{PipelineValidator, ValidationResult};

/// Build and validate a pipeline with the default configuration
pub fn pipeline<F>(configure: F) -> PipelineResult<Pipeline>
where
    F: FnOnce(&mut Pipeline) -> PipelineResult<()>,
{
    pipeline_with_config(PipelineConfig::default(), configure)
}

/// Build and validate a pipeline with the given configuration.
///
/// Either the complete, validated pipeline is returned or the first error.
pub fn pipeline_with_config<F>(config: PipelineConfig, configure: F) -> PipelineResult<Pipeline>
where
    F: FnOnce(&mut Pipeline) -> PipelineResult<()>,
{
    let mut pipeline = Pipeline::with_config(config);
    configure(&mut pipeline)?;
    pipeline.finish()
}

/// Ordered collection of stages
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    stages: Vec<Stage>,
    names: HashSet<String>,
}

impl Pipeline {
    /// Create an empty pipeline with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Declare a stage.
    ///
    /// Without an explicit dependency the stage depends on the previously
    /// declared one. Once `configure` returns, every build of the stage
    /// depends on the gates of the stage's dependencies, and the stage gate
    /// depends on every build and on those gates.
    pub fn stage<F>(&mut self, name: impl Into<String>, configure: F) -> PipelineResult<StageRef>
    where
        F: FnOnce(&mut StageScope<'_>) -> PipelineResult<()>,
    {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(PipelineError::DuplicateName { name });
        }

        let gate_id = to_prefixed_id(&self.config.gate.id_prefix, &name);
        if gate_id.is_empty() {
            return Err(PipelineError::InvalidName { name });
        }
        let gate_name = format!("{}{}", self.config.gate.name_prefix, name);
        ensure_unique_id(
            &self.stages,
            self.config.identifiers.on_collision,
            &gate_id,
            &gate_name,
        )?;

        let index = self.stages.len();
        let stage = Stage::new(index, name, gate_id, gate_name);
        let mut scope = StageScope::new(stage, &self.stages, &self.config);
        configure(&mut scope)?;
        let mut stage = scope.into_stage();

        if stage.dependencies.is_empty() && index > 0 {
            stage.dependencies.push(StageRef(index - 1));
            stage.inferred_dependency = true;
        }
        stage.wire();

        debug!(
            stage = %stage.name,
            id = %stage.gate.id(),
            builds = stage.builds.len(),
            dependencies = stage.dependencies.len(),
            inferred = stage.inferred_dependency,
            "registered stage"
        );

        self.names.insert(stage.name.clone());
        self.stages.push(stage);
        Ok(StageRef(index))
    }

    /// Look up a stage by name
    pub fn stage_named(&self, name: &str) -> PipelineResult<StageRef> {
        find_stage(&self.stages, name)
    }

    /// Add an explicit dependency to an already declared stage.
    ///
    /// A dependency inferred from declaration order is replaced.
    pub fn depends_on(&mut self, stage: StageRef, on: StageRef) -> PipelineResult<()> {
        let on_name = self
            .get_stage(on)
            .map(|s| s.name.clone())
            .ok_or_else(|| unknown_stage(on))?;
        let target = self
            .stages
            .get_mut(stage.0)
            .ok_or_else(|| unknown_stage(stage))?;

        target.withdraw_inferred_dependency();
        if !target.dependencies.contains(&on) {
            target.dependencies.push(on);
        }
        target.wire();

        debug!(stage = %target.name, depends_on = %on_name, "added stage dependency");
        Ok(())
    }

    /// Stages in declaration order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn get_stage(&self, stage: StageRef) -> Option<&Stage> {
        self.stages.get(stage.0)
    }

    /// Get all stage names
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn unit(&self, unit: UnitRef) -> Option<&BuildUnit> {
        self.stages.get(unit.stage)?.unit(unit.slot)
    }

    pub fn template(&self, template: TemplateRef) -> Option<&Template> {
        self.stages.get(template.stage)?.templates.get(template.index)
    }

    /// All units in display order: each stage's gate followed by its builds
    pub fn units(&self) -> impl Iterator<Item = (UnitRef, &BuildUnit)> {
        self.stages.iter().flat_map(|stage| stage.units())
    }

    /// All templates, stage by stage
    pub fn templates(&self) -> impl Iterator<Item = (TemplateRef, &Template)> {
        self.stages.iter().flat_map(|stage| {
            stage.templates.iter().enumerate().map(move |(index, t)| {
                (
                    TemplateRef {
                        stage: stage.index,
                        index,
                    },
                    t,
                )
            })
        })
    }

    /// First unit with the given display name
    pub fn find_unit(&self, name: &str) -> Option<(UnitRef, &BuildUnit)> {
        self.units().find(|(_, unit)| unit.name() == name)
    }

    /// Dependency graph over all units
    pub fn dag(&self) -> PipelineResult<DagBuilder> {
        DagBuilder::build(self)
    }

    /// Check the structure and collect warnings
    pub fn validate(&self) -> PipelineResult<ValidationResult> {
        PipelineValidator::validate(self)
    }

    /// Serializable view for rendering
    pub fn snapshot(&self) -> PipelineResult<PipelineSnapshot> {
        PipelineSnapshot::capture(self)
    }

    /// Validate, log warnings and hand the pipeline back
    pub fn finish(self) -> PipelineResult<Self> {
        let result = self.validate()?;
        for warning in &result.warnings {
            warn!("{warning}");
        }

        info!(
            stages = self.stages.len(),
            units = self.units().count(),
            warnings = result.warnings.len(),
            "pipeline finalized"
        );
        Ok(self)
    }
}

fn unknown_stage(stage: StageRef) -> PipelineError {
    PipelineError::UnknownDependency {
        unit: format!("stage #{}", stage.0),
    }
}
