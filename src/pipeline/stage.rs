// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Stages and the scopes used to configure them
//!
//! A stage groups builds behind a gate unit. While its configure closure
//! runs, the stage is owned by a [`StageScope`]; each build is configured
//! through a [`BuildScope`] before it is appended to the stage.

use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::errors::{NameKind, PipelineError, PipelineResult};

use super::artifact::Artifact;
use super::config::{CollisionPolicy, PipelineConfig};
use super::id::to_id;
use super::matrix::{Combination, Matrix};
use super::unit::{
    BuildSettings, BuildUnit, Slot, StageRef, Template, TemplateRef, UnitRef, UnitRole,
};

/// A named group of builds with a gate unit standing for the whole stage
#[derive(Debug, Clone)]
pub struct Stage {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) gate: BuildUnit,
    pub(crate) builds: Vec<BuildUnit>,
    /// Handle slot of each build, ascending; slots of failed builds are skipped
    pub(crate) slots: Vec<usize>,
    pub(crate) next_slot: usize,
    pub(crate) defaults: BuildSettings,
    pub(crate) dependencies: Vec<StageRef>,
    /// The single dependency was inferred from declaration order
    pub(crate) inferred_dependency: bool,
    pub(crate) templates: Vec<Template>,
    /// Number of builds each matrix of the stage generated
    pub(crate) matrices: Vec<usize>,
}

impl Stage {
    pub(crate) fn new(index: usize, name: String, gate_id: String, gate_name: String) -> Self {
        let mut gate = BuildUnit::new(
            UnitRole::Gate,
            BuildSettings {
                name: gate_name,
                ..BuildSettings::default()
            },
        );
        gate.id = gate_id;

        Self {
            index,
            name,
            gate,
            builds: Vec::new(),
            slots: Vec::new(),
            next_slot: 0,
            defaults: BuildSettings::default(),
            dependencies: Vec::new(),
            inferred_dependency: false,
            templates: Vec::new(),
            matrices: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> StageRef {
        StageRef(self.index)
    }

    /// The composite unit aggregating every build of the stage
    pub fn gate(&self) -> &BuildUnit {
        &self.gate
    }

    /// Builds in creation order
    pub fn builds(&self) -> &[BuildUnit] {
        &self.builds
    }

    /// Stages this stage depends on, explicit or inferred
    pub fn dependencies(&self) -> &[StageRef] {
        &self.dependencies
    }

    /// Whether the dependency on the previous stage was inferred
    pub fn has_inferred_dependency(&self) -> bool {
        self.inferred_dependency
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Current defaults prototype
    pub fn defaults(&self) -> &BuildSettings {
        &self.defaults
    }

    /// Handle of the build named `name`
    pub fn find_build(&self, name: &str) -> Option<UnitRef> {
        self.builds
            .iter()
            .position(|b| b.name() == name)
            .map(|i| UnitRef::build(self.index, self.slots[i]))
    }

    /// Handle of the template named `name`
    pub fn find_template(&self, name: &str) -> Option<TemplateRef> {
        self.templates
            .iter()
            .position(|t| t.name() == name)
            .map(|index| TemplateRef {
                stage: self.index,
                index,
            })
    }

    pub(crate) fn unit(&self, slot: Slot) -> Option<&BuildUnit> {
        match slot {
            Slot::Gate => Some(&self.gate),
            Slot::Build(slot) => self
                .slots
                .binary_search(&slot)
                .ok()
                .and_then(|i| self.builds.get(i)),
        }
    }

    /// Gate first, then builds in creation order
    pub fn units(&self) -> impl Iterator<Item = (UnitRef, &BuildUnit)> {
        let index = self.index;
        std::iter::once((StageRef(index).gate(), &self.gate)).chain(
            self.slots
                .iter()
                .zip(&self.builds)
                .map(move |(slot, b)| (UnitRef::build(index, *slot), b)),
        )
    }

    /// Display name of whatever in this stage owns `id`
    fn id_owner(&self, id: &str) -> Option<&str> {
        self.units()
            .map(|(_, unit)| (unit.id(), unit.name()))
            .chain(self.templates.iter().map(|t| (t.id(), t.name())))
            .find(|(owned, _)| *owned == id)
            .map(|(_, name)| name)
    }

    /// Add the edges implied by the stage dependencies.
    ///
    /// Every build depends on each dependency's gate; the gate depends on
    /// every build and on each dependency's gate. Safe to call repeatedly.
    pub(crate) fn wire(&mut self) {
        let gates: Vec<UnitRef> = self.dependencies.iter().map(|s| s.gate()).collect();

        for build in &mut self.builds {
            for gate in &gates {
                build.add_inferred_dependency(*gate);
            }
        }
        for slot in &self.slots {
            self.gate.add_inferred_dependency(UnitRef::build(self.index, *slot));
        }
        for gate in gates {
            self.gate.add_inferred_dependency(gate);
        }
    }

    /// Remove the edges of the inferred dependency, if there is one
    pub(crate) fn withdraw_inferred_dependency(&mut self) {
        if !self.inferred_dependency {
            return;
        }
        self.inferred_dependency = false;

        for previous in std::mem::take(&mut self.dependencies) {
            let gate = previous.gate();
            for build in &mut self.builds {
                build.remove_inferred_dependency(gate);
            }
            self.gate.remove_inferred_dependency(gate);
        }
    }
}

/// Fail if `id` is already owned by something in `stages`
pub(crate) fn ensure_unique_id<'a>(
    stages: impl IntoIterator<Item = &'a Stage>,
    policy: CollisionPolicy,
    id: &str,
    name: &str,
) -> PipelineResult<()> {
    if policy == CollisionPolicy::Allow {
        return Ok(());
    }

    match stages.into_iter().find_map(|stage| stage.id_owner(id)) {
        Some(existing) => Err(PipelineError::IdentifierCollision {
            id: id.to_string(),
            existing: existing.to_string(),
            name: name.to_string(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn find_stage(stages: &[Stage], name: &str) -> PipelineResult<StageRef> {
    stages
        .iter()
        .find(|s| s.name == name)
        .map(Stage::reference)
        .ok_or_else(|| PipelineError::not_found(NameKind::Stage, name))
}

/// Configuration scope of a stage under construction
pub struct StageScope<'p> {
    stage: Stage,
    earlier: &'p [Stage],
    config: &'p PipelineConfig,
}

impl<'p> StageScope<'p> {
    pub(crate) fn new(stage: Stage, earlier: &'p [Stage], config: &'p PipelineConfig) -> Self {
        Self {
            stage,
            earlier,
            config,
        }
    }

    pub(crate) fn into_stage(self) -> Stage {
        self.stage
    }

    pub fn name(&self) -> &str {
        &self.stage.name
    }

    /// Handle of the stage being configured
    pub fn reference(&self) -> StageRef {
        self.stage.reference()
    }

    /// Handle of this stage's gate unit
    pub fn gate(&self) -> UnitRef {
        self.reference().gate()
    }

    /// Replace the defaults copied into builds created from now on
    pub fn defaults<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut BuildSettings),
    {
        let mut defaults = BuildSettings::default();
        configure(&mut defaults);
        self.stage.defaults = defaults;
        self
    }

    /// Create a regular build
    pub fn build<F>(&mut self, configure: F) -> PipelineResult<UnitRef>
    where
        F: FnOnce(&mut BuildScope<'_>) -> PipelineResult<()>,
    {
        self.add_unit(UnitRole::Regular, None, configure)
    }

    /// Create a deploy build.
    ///
    /// Deploy defaults (one running build, no personal builds) are applied
    /// before `configure`, which may override them.
    pub fn deploy<F>(&mut self, configure: F) -> PipelineResult<UnitRef>
    where
        F: FnOnce(&mut BuildScope<'_>) -> PipelineResult<()>,
    {
        self.add_unit(UnitRole::Deploy, None, configure)
    }

    /// Depend on another stage instead of the previous one
    pub fn depends_on(&mut self, stage: StageRef) -> &mut Self {
        if !self.stage.dependencies.contains(&stage) {
            self.stage.dependencies.push(stage);
        }
        self
    }

    /// Configure a matrix; returns the builds it generated
    pub fn matrix<F>(&mut self, configure: F) -> PipelineResult<Vec<UnitRef>>
    where
        F: FnOnce(&mut Matrix<'_, 'p>) -> PipelineResult<()>,
    {
        let mut matrix = Matrix::new(self);
        configure(&mut matrix)?;
        let generated = matrix.into_generated();

        self.stage.matrices.push(generated.len());
        Ok(generated)
    }

    /// Declare a template scoped to this stage
    pub fn template<F>(&mut self, configure: F) -> PipelineResult<TemplateRef>
    where
        F: FnOnce(&mut BuildSettings),
    {
        let mut settings = BuildSettings::default();
        configure(&mut settings);

        let id = to_id(&settings.name);
        if id.is_empty() {
            return Err(PipelineError::InvalidName {
                name: settings.name,
            });
        }
        self.ensure_unique_id(&id, &settings.name)?;

        debug!(stage = %self.stage.name, template = %settings.name, %id, "registered template");

        let template = TemplateRef {
            stage: self.stage.index,
            index: self.stage.templates.len(),
        };
        self.stage.templates.push(Template { id, settings });
        Ok(template)
    }

    /// Look up a template of this stage by name
    pub fn template_named(&self, name: &str) -> PipelineResult<TemplateRef> {
        self.stage
            .find_template(name)
            .ok_or_else(|| PipelineError::not_found(NameKind::Template, name))
    }

    /// Look up a build of this stage by name
    pub fn build_named(&self, name: &str) -> PipelineResult<UnitRef> {
        self.stage
            .find_build(name)
            .ok_or_else(|| PipelineError::not_found(NameKind::Build, name))
    }

    /// Look up an earlier stage by name
    pub fn stage_named(&self, name: &str) -> PipelineResult<StageRef> {
        find_stage(self.earlier, name)
    }

    /// Create a unit: copy defaults, apply role defaults, run `configure`,
    /// derive the identifier and append the unit to the stage.
    pub(crate) fn add_unit<F>(
        &mut self,
        role: UnitRole,
        combination: Option<Combination>,
        configure: F,
    ) -> PipelineResult<UnitRef>
    where
        F: FnOnce(&mut BuildScope<'_>) -> PipelineResult<()>,
    {
        // A handle is never handed out twice, even if this build fails
        let slot = self.stage.next_slot;
        self.stage.next_slot += 1;
        let handle = UnitRef::build(self.stage.index, slot);

        let mut settings = self.stage.defaults.clone();
        if role == UnitRole::Deploy {
            settings.max_running_builds = Some(self.config.deploy.max_running_builds);
            settings.enable_personal_builds = self.config.deploy.enable_personal_builds;
        }
        let mut unit = BuildUnit::new(role, settings);
        unit.combination = combination;

        let mut scope = BuildScope {
            unit,
            handle,
            explicit_id: None,
            stage: &self.stage,
            earlier: self.earlier,
        };
        configure(&mut scope)?;
        let BuildScope {
            mut unit,
            explicit_id,
            ..
        } = scope;

        unit.id = explicit_id.unwrap_or_else(|| to_id(unit.name()));
        if unit.id.is_empty() {
            return Err(PipelineError::InvalidName {
                name: unit.settings.name,
            });
        }
        self.ensure_unique_id(&unit.id, unit.name())?;

        debug!(
            stage = %self.stage.name,
            unit = %unit.name(),
            id = %unit.id,
            role = %unit.role,
            dependencies = unit.dependencies.len(),
            "registered build"
        );

        self.stage.builds.push(unit);
        self.stage.slots.push(slot);
        Ok(handle)
    }

    fn ensure_unique_id(&self, id: &str, name: &str) -> PipelineResult<()> {
        ensure_unique_id(
            self.earlier.iter().chain(std::iter::once(&self.stage)),
            self.config.identifiers.on_collision,
            id,
            name,
        )
    }
}

/// Configuration scope of a single build.
///
/// Dereferences to the build's [`BuildSettings`], so payload setters such as
/// `name` and `param` are called on the scope directly.
pub struct BuildScope<'s> {
    unit: BuildUnit,
    handle: UnitRef,
    explicit_id: Option<String>,
    stage: &'s Stage,
    earlier: &'s [Stage],
}

impl BuildScope<'_> {
    /// Handle of the build being configured
    pub fn reference(&self) -> UnitRef {
        self.handle
    }

    pub fn role(&self) -> UnitRole {
        self.unit.role
    }

    /// Use `id` instead of the identifier derived from the name
    pub fn id(&mut self, id: impl Into<String>) -> &mut Self {
        self.explicit_id = Some(id.into());
        self
    }

    /// Depend directly on another unit, in this stage or an earlier one
    pub fn depends_on(&mut self, unit: UnitRef) -> &mut Self {
        self.unit.add_dependency(unit, None);
        self
    }

    /// Value of `axis` for a matrix build
    pub fn axis(&self, axis: &str) -> PipelineResult<&str> {
        self.unit
            .combination
            .as_ref()
            .and_then(|c| c.get(axis))
            .ok_or_else(|| PipelineError::not_found(NameKind::Axis, axis))
    }

    /// The full combination of a matrix build
    pub fn combination(&self) -> Option<&Combination> {
        self.unit.combination.as_ref()
    }

    /// Bind this build as the producer of `artifact`
    pub fn produces(&mut self, artifact: &mut Artifact) -> PipelineResult<&mut Self> {
        if artifact.bind_producer(self.handle, |u| self.registered_name(u))? {
            self.unit
                .settings
                .append_artifact_rule(artifact.producer_rules());
            debug!(producer = %self.unit.name(), rules = %artifact.producer_rules(), "bound artifact producer");
        }
        Ok(self)
    }

    /// Depend on the producer of `artifact`, fetching with its consumer rules
    pub fn consumes(&mut self, artifact: &Artifact) -> PipelineResult<&mut Self> {
        let producer = artifact.producer_for(self.handle, |u| self.registered_name(u))?;
        self.unit
            .add_dependency(producer, Some(artifact.consumer_rules()));
        debug!(consumer = %self.unit.name(), rules = %artifact.consumer_rules(), "bound artifact consumer");
        Ok(self)
    }

    /// Look up an earlier build of this stage by name
    pub fn build_named(&self, name: &str) -> PipelineResult<UnitRef> {
        self.stage
            .find_build(name)
            .ok_or_else(|| PipelineError::not_found(NameKind::Build, name))
    }

    /// Look up a template of this stage by name
    pub fn template_named(&self, name: &str) -> PipelineResult<TemplateRef> {
        self.stage
            .find_template(name)
            .ok_or_else(|| PipelineError::not_found(NameKind::Template, name))
    }

    /// Look up an earlier stage by name
    pub fn stage_named(&self, name: &str) -> PipelineResult<StageRef> {
        find_stage(self.earlier, name)
    }

    /// Current name of a registered build; `None` for handles of builds
    /// that failed or are still being configured
    fn registered_name(&self, unit: UnitRef) -> Option<String> {
        let stage = if unit.stage == self.stage.index {
            self.stage
        } else {
            self.earlier.get(unit.stage)?
        };
        stage.unit(unit.slot).map(|b| b.name().to_string())
    }
}

impl Deref for BuildScope<'_> {
    type Target = BuildSettings;

    fn deref(&self) -> &Self::Target {
        &self.unit.settings
    }
}

impl DerefMut for BuildScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.unit.settings
    }
}
