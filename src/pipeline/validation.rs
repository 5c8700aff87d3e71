// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Pipeline validation
//!
//! Checks a built pipeline before it is handed out. Structural problems in
//! the dependency graph are errors; suspicious but legal shapes are warnings.

use std::collections::HashSet;

use crate::errors::PipelineError;
use crate::pipeline::{DagBuilder, Pipeline, Stage, TemplateRef};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline.
    ///
    /// Fails on unknown dependencies and, unless disabled in the
    /// configuration, on dependency cycles.
    pub fn validate(pipeline: &Pipeline) -> Result<ValidationResult, PipelineError> {
        let mut result = ValidationResult::new();

        DagBuilder::build(pipeline)?;

        if pipeline.stages().is_empty() {
            result.add_warning("Pipeline has no stages defined");
        }

        for stage in pipeline.stages() {
            Self::validate_stage(stage, &mut result);
        }

        Self::validate_templates(pipeline, &mut result);

        Ok(result)
    }

    /// Validate a single stage
    fn validate_stage(stage: &Stage, result: &mut ValidationResult) {
        if stage.builds().is_empty() {
            result.add_warning(&format!(
                "Stage '{}': No builds defined, the stage gate has nothing to aggregate",
                stage.name()
            ));
        }

        let empty_matrices = stage.matrices.iter().filter(|count| **count == 0).count();
        if empty_matrices > 0 {
            result.add_warning(&format!(
                "Stage '{}': {} matrix configuration(s) generated no builds",
                stage.name(),
                empty_matrices
            ));
        }
    }

    /// Warn about templates no unit applies
    fn validate_templates(pipeline: &Pipeline, result: &mut ValidationResult) {
        let applied: HashSet<TemplateRef> = pipeline
            .units()
            .flat_map(|(_, unit)| unit.settings().templates.iter().copied())
            .collect();

        for (reference, template) in pipeline.templates() {
            if !applied.contains(&reference) {
                result.add_warning(&format!(
                    "Template '{}' is never applied to a build",
                    template.name()
                ));
            }
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
