// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Serializable pipeline snapshots
//!
//! A snapshot resolves every handle to an identifier, so a rendering layer
//! can consume the pipeline as plain data.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::{PipelineError, PipelineResult};

use super::definition::Pipeline;
use super::matrix::Combination;
use super::unit::{BuildType, BuildUnit, UnitRef, UnitRole};

/// A dependency edge, by target identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySnapshot {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_rules: Option<String>,
}

/// A unit with everything a renderer needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSnapshot {
    pub id: String,
    pub name: String,
    pub stage: String,
    pub role: UnitRole,
    pub build_type: BuildType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub artifact_rules: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_running_builds: Option<u32>,
    pub enable_personal_builds: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combination: Option<Combination>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySnapshot>,
}

/// A template with the settings it applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSnapshot {
    pub id: String,
    pub name: String,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub artifact_rules: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_running_builds: Option<u32>,
    pub enable_personal_builds: bool,
}

/// Units in display order, then templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub units: Vec<UnitSnapshot>,
    pub templates: Vec<TemplateSnapshot>,
}

impl PipelineSnapshot {
    pub fn capture(pipeline: &Pipeline) -> PipelineResult<Self> {
        let units = pipeline
            .units()
            .map(|(reference, unit)| capture_unit(pipeline, reference, unit))
            .collect::<PipelineResult<Vec<_>>>()?;

        let templates = pipeline
            .templates()
            .map(|(reference, template)| {
                let settings = template.settings();
                TemplateSnapshot {
                    id: template.id().to_string(),
                    name: template.name().to_string(),
                    stage: stage_name(pipeline, reference.stage().index()),
                    description: settings.description.clone(),
                    params: settings.params.clone(),
                    artifact_rules: settings.artifact_rules.clone(),
                    max_running_builds: settings.max_running_builds,
                    enable_personal_builds: settings.enable_personal_builds,
                }
            })
            .collect();

        Ok(Self { units, templates })
    }

    pub fn unit(&self, id: &str) -> Option<&UnitSnapshot> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> PipelineResult<String> {
        serde_yaml::to_string(self).map_err(PipelineError::serialization)
    }

    /// BLAKE3 hash of the JSON form; equal pipelines hash equal
    pub fn fingerprint(&self) -> PipelineResult<String> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

fn stage_name(pipeline: &Pipeline, index: usize) -> String {
    pipeline
        .stages()
        .get(index)
        .map(|s| s.name().to_string())
        .unwrap_or_default()
}

fn capture_unit(
    pipeline: &Pipeline,
    reference: UnitRef,
    unit: &BuildUnit,
) -> PipelineResult<UnitSnapshot> {
    let unknown = || PipelineError::UnknownDependency {
        unit: unit.name().to_string(),
    };

    let dependencies = unit
        .dependencies()
        .iter()
        .map(|dependency| {
            let target = pipeline.unit(dependency.target).ok_or_else(unknown)?;
            Ok(DependencySnapshot {
                id: target.id().to_string(),
                artifact_rules: dependency.artifact_rules.clone(),
            })
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    let settings = unit.settings();
    let templates = settings
        .templates
        .iter()
        .map(|t| {
            pipeline
                .template(*t)
                .map(|template| template.id().to_string())
                .ok_or_else(unknown)
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok(UnitSnapshot {
        id: unit.id().to_string(),
        name: unit.name().to_string(),
        stage: stage_name(pipeline, reference.stage().index()),
        role: unit.role(),
        build_type: unit.role().build_type(),
        description: settings.description.clone(),
        params: settings.params.clone(),
        artifact_rules: settings.artifact_rules.clone(),
        max_running_builds: settings.max_running_builds,
        enable_personal_builds: settings.enable_personal_builds,
        templates,
        combination: unit.combination().cloned(),
        dependencies,
    })
}
