// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Build units and their configuration payload
//!
//! A build unit is the atomic schedulable entity of a pipeline. Stages own
//! their units; everything else refers to them through [`UnitRef`] handles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::matrix::Combination;

/// Handle to a stage of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageRef(pub(crate) usize);

impl StageRef {
    /// Position of the stage in declaration order
    pub fn index(self) -> usize {
        self.0
    }

    /// The gate unit standing for the whole stage
    pub fn gate(self) -> UnitRef {
        UnitRef {
            stage: self.0,
            slot: Slot::Gate,
        }
    }
}

/// Handle to a build unit (a stage gate or a build) of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitRef {
    pub(crate) stage: usize,
    pub(crate) slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum Slot {
    Gate,
    Build(usize),
}

impl UnitRef {
    pub(crate) fn build(stage: usize, index: usize) -> Self {
        Self {
            stage,
            slot: Slot::Build(index),
        }
    }

    /// Stage owning the unit
    pub fn stage(self) -> StageRef {
        StageRef(self.stage)
    }

    /// Whether this is a stage gate
    pub fn is_gate(self) -> bool {
        self.slot == Slot::Gate
    }
}

/// Handle to a stage-scoped template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateRef {
    pub(crate) stage: usize,
    pub(crate) index: usize,
}

impl TemplateRef {
    /// Stage the template was declared in
    pub fn stage(self) -> StageRef {
        StageRef(self.stage)
    }
}

/// Role of a unit in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitRole {
    /// Aggregation node standing for a whole stage
    Gate,
    /// Ordinary build
    Regular,
    /// Deployment; limited concurrency, no personal builds by default
    Deploy,
    /// Build generated from one matrix combination
    MatrixVariant,
}

impl UnitRole {
    /// Build type the host should use for this role
    pub fn build_type(self) -> BuildType {
        match self {
            Self::Gate => BuildType::Composite,
            Self::Deploy => BuildType::Deployment,
            Self::Regular | Self::MatrixVariant => BuildType::Regular,
        }
    }
}

impl std::fmt::Display for UnitRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gate => write!(f, "gate"),
            Self::Regular => write!(f, "regular"),
            Self::Deploy => write!(f, "deploy"),
            Self::MatrixVariant => write!(f, "matrix"),
        }
    }
}

/// Host build configuration type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildType {
    Regular,
    Composite,
    Deployment,
}

/// Configuration payload of a build unit or template.
///
/// Opaque to the graph logic apart from the name, the artifact rules and the
/// concurrency flags. Stage defaults are plain clones of this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Display name
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Build parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Publish rules, one rule per line
    #[serde(default)]
    pub artifact_rules: String,

    /// Concurrency ceiling; `None` is unlimited
    #[serde(default)]
    pub max_running_builds: Option<u32>,

    #[serde(default = "default_true")]
    pub enable_personal_builds: bool,

    /// Templates applied to the unit, in order
    #[serde(skip)]
    pub templates: Vec<TemplateRef>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            params: BTreeMap::new(),
            artifact_rules: String::new(),
            max_running_builds: None,
            enable_personal_builds: true,
            templates: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl BuildSettings {
    /// Set the display name
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Set a build parameter
    pub fn param(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace the publish rules
    pub fn artifact_rules(&mut self, rules: impl Into<String>) -> &mut Self {
        self.artifact_rules = rules.into();
        self
    }

    pub fn max_running_builds(&mut self, max: u32) -> &mut Self {
        self.max_running_builds = Some(max);
        self
    }

    pub fn enable_personal_builds(&mut self, enabled: bool) -> &mut Self {
        self.enable_personal_builds = enabled;
        self
    }

    /// Apply templates, keeping earlier ones
    pub fn templates(&mut self, templates: impl IntoIterator<Item = TemplateRef>) -> &mut Self {
        for template in templates {
            if !self.templates.contains(&template) {
                self.templates.push(template);
            }
        }
        self
    }

    /// Append a publish rule on its own line
    pub(crate) fn append_artifact_rule(&mut self, rule: &str) {
        append_line(&mut self.artifact_rules, rule);
    }
}

pub(crate) fn append_line(target: &mut String, line: &str) {
    if line.is_empty() || target.lines().any(|existing| existing == line) {
        return;
    }
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(line);
}

/// A directed edge from a unit to one it depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Unit that must finish first
    pub target: UnitRef,
    /// Fetch rules when the dependency also hands over artifacts
    pub artifact_rules: Option<String>,
    /// Added by stage wiring rather than declared on the unit
    pub(crate) inferred: bool,
}

impl Dependency {
    /// Whether the edge comes from stage wiring only
    pub fn is_inferred(&self) -> bool {
        self.inferred
    }
}

/// A schedulable unit: stage gate, build, deploy or matrix variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
    pub(crate) id: String,
    pub(crate) role: UnitRole,
    pub(crate) settings: BuildSettings,
    pub(crate) combination: Option<Combination>,
    pub(crate) dependencies: Vec<Dependency>,
}

impl BuildUnit {
    pub(crate) fn new(role: UnitRole, settings: BuildSettings) -> Self {
        Self {
            id: String::new(),
            role,
            settings,
            combination: None,
            dependencies: Vec::new(),
        }
    }

    /// Normalized identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn role(&self) -> UnitRole {
        self.role
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Axis values this unit was generated for, if it is a matrix variant
    pub fn combination(&self) -> Option<&Combination> {
        self.combination.as_ref()
    }

    /// Direct dependencies, in the order they were declared
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Whether the unit depends directly on `target`
    pub fn depends_on(&self, target: UnitRef) -> bool {
        self.dependencies.iter().any(|d| d.target == target)
    }

    /// Add a declared edge, merging with an existing edge to the same target
    pub(crate) fn add_dependency(&mut self, target: UnitRef, artifact_rules: Option<&str>) {
        self.merge_dependency(target, artifact_rules, false);
    }

    /// Add an edge implied by a stage dependency
    pub(crate) fn add_inferred_dependency(&mut self, target: UnitRef) {
        self.merge_dependency(target, None, true);
    }

    fn merge_dependency(&mut self, target: UnitRef, artifact_rules: Option<&str>, inferred: bool) {
        match self.dependencies.iter_mut().find(|d| d.target == target) {
            Some(dep) => {
                // A declared edge stays declared
                dep.inferred &= inferred;
                if let Some(rules) = artifact_rules {
                    append_line(dep.artifact_rules.get_or_insert_with(String::new), rules);
                }
            }
            None => self.dependencies.push(Dependency {
                target,
                artifact_rules: artifact_rules.map(str::to_string),
                inferred,
            }),
        }
    }

    /// Drop the stage-wiring edge to `target`; declared edges stay
    pub(crate) fn remove_inferred_dependency(&mut self, target: UnitRef) {
        self.dependencies
            .retain(|d| d.target != target || !d.inferred);
    }
}

/// A named configuration prototype scoped to a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub(crate) id: String,
    pub(crate) settings: BuildSettings,
}

impl Template {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }
}
