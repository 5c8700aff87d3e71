// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Pipeline configuration
//!
//! Tunable defaults applied while a pipeline is being built. Configuration is
//! parsed from YAML or TOML text handed in by the caller.

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};

/// Settings that shape how a pipeline is wired and named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Defaults applied to deploy builds before their own configuration
    #[serde(default)]
    pub deploy: DeployDefaults,

    /// Naming of stage gate units
    #[serde(default)]
    pub gate: GateNaming,

    /// Identifier handling
    #[serde(default)]
    pub identifiers: IdentifierPolicy,

    /// Reject pipelines whose dependencies form a cycle
    #[serde(default = "default_true")]
    pub detect_cycles: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deploy: DeployDefaults::default(),
            gate: GateNaming::default(),
            identifiers: IdentifierPolicy::default(),
            detect_cycles: true,
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> PipelineResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(text: &str) -> PipelineResult<Self> {
        toml::from_str(text).map_err(Into::into)
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> PipelineResult<String> {
        serde_yaml::to_string(self).map_err(PipelineError::serialization)
    }
}

/// Deploy build defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployDefaults {
    /// Concurrency ceiling for deploy builds
    #[serde(default = "default_max_running_builds")]
    pub max_running_builds: u32,

    /// Whether personal builds are allowed for deploy builds
    #[serde(default)]
    pub enable_personal_builds: bool,
}

impl Default for DeployDefaults {
    fn default() -> Self {
        Self {
            max_running_builds: default_max_running_builds(),
            enable_personal_builds: false,
        }
    }
}

fn default_max_running_builds() -> u32 {
    1
}

/// Prefixes used to derive a stage gate's identity from the stage name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateNaming {
    #[serde(default = "default_gate_id_prefix")]
    pub id_prefix: String,

    #[serde(default = "default_gate_name_prefix")]
    pub name_prefix: String,
}

impl Default for GateNaming {
    fn default() -> Self {
        Self {
            id_prefix: default_gate_id_prefix(),
            name_prefix: default_gate_name_prefix(),
        }
    }
}

fn default_gate_id_prefix() -> String {
    "Stage_".to_string()
}

fn default_gate_name_prefix() -> String {
    "Stage: ".to_string()
}

/// Identifier handling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierPolicy {
    /// What to do when two names normalize to the same identifier
    #[serde(default)]
    pub on_collision: CollisionPolicy,
}

/// Reaction to an identifier collision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail at the call that introduced the duplicate (default)
    #[default]
    Fail,
    /// Keep both; the host decides what happens
    Allow,
}

fn default_true() -> bool {
    true
}
