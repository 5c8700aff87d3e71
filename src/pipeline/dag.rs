// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! DAG (Directed Acyclic Graph) builder for pipeline units
//!
//! Builds and validates the dependency graph between stage gates and builds,
//! giving an execution order and detecting cycles.

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use std::fmt::Write;

use crate::errors::PipelineError;
use crate::pipeline::{Pipeline, UnitRef};

/// A unit as seen by the graph
#[derive(Debug, Clone)]
struct DagNode {
    unit: UnitRef,
    id: String,
    name: String,
}

/// Builder for unit dependency DAGs.
///
/// Edges point from a dependency to the unit depending on it; the weight
/// holds the artifact rules fetched along the edge, if any.
///
/// Queries by identifier resolve to the first unit in display order that
/// carries it. When identifier collisions are allowed, use the `unit_*`
/// queries to reach the other units sharing an identifier.
pub struct DagBuilder {
    graph: DiGraph<DagNode, Option<String>>,
    unit_to_index: HashMap<UnitRef, NodeIndex>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl DagBuilder {
    /// Create a new DAG builder
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            unit_to_index: HashMap::new(),
            id_to_index: HashMap::new(),
        }
    }

    /// Build a DAG from a pipeline
    pub fn build(pipeline: &Pipeline) -> Result<Self, PipelineError> {
        let mut builder = Self::new();

        // Nodes in display order
        for (unit_ref, unit) in pipeline.units() {
            let node = builder.graph.add_node(DagNode {
                unit: unit_ref,
                id: unit.id().to_string(),
                name: unit.name().to_string(),
            });
            builder.unit_to_index.insert(unit_ref, node);
            builder
                .id_to_index
                .entry(unit.id().to_string())
                .or_insert(node);
        }

        for (unit_ref, unit) in pipeline.units() {
            let unit_node = builder.unit_to_index[&unit_ref];

            for dependency in unit.dependencies() {
                let dep_node = builder
                    .unit_to_index
                    .get(&dependency.target)
                    .ok_or_else(|| PipelineError::UnknownDependency {
                        unit: unit.name().to_string(),
                    })?;

                builder
                    .graph
                    .add_edge(*dep_node, unit_node, dependency.artifact_rules.clone());
            }
        }

        if pipeline.config().detect_cycles {
            builder.validate_acyclic()?;
        }

        Ok(builder)
    }

    /// Validate that the graph is acyclic
    fn validate_acyclic(&self) -> Result<(), PipelineError> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(self.cycle_error(cycle.node_id())),
        }
    }

    /// Error naming every unit on a cycle through `node`
    fn cycle_error(&self, node: NodeIndex) -> PipelineError {
        let mut members = tarjan_scc(&self.graph)
            .into_iter()
            .find(|component| component.contains(&node))
            .unwrap_or_else(|| vec![node]);
        members.sort();

        PipelineError::CyclicDependency {
            units: members
                .into_iter()
                .map(|n| self.graph[n].id.clone())
                .collect(),
        }
    }

    /// Units in an order where every unit comes after its dependencies
    pub fn topological_order(&self) -> Result<Vec<UnitRef>, PipelineError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n].unit).collect())
            .map_err(|cycle| self.cycle_error(cycle.node_id()))
    }

    /// Unit identifiers in topological order
    pub fn topological_order_ids(&self) -> Result<Vec<String>, PipelineError> {
        toposort(&self.graph, None)
            .map(|nodes| {
                nodes
                    .into_iter()
                    .map(|n| self.graph[n].id.clone())
                    .collect()
            })
            .map_err(|cycle| self.cycle_error(cycle.node_id()))
    }

    /// Identifiers of the units `id` depends on directly
    pub fn dependencies(&self, id: &str) -> Option<Vec<String>> {
        let node = self.id_to_index.get(id)?;
        Some(self.neighbor_ids(*node, Direction::Incoming))
    }

    /// Identifiers of the units depending directly on `id`
    pub fn dependents(&self, id: &str) -> Option<Vec<String>> {
        let node = self.id_to_index.get(id)?;
        Some(self.neighbor_ids(*node, Direction::Outgoing))
    }

    /// Units `unit` depends on directly
    pub fn unit_dependencies(&self, unit: UnitRef) -> Option<Vec<UnitRef>> {
        let node = self.unit_to_index.get(&unit)?;
        Some(
            self.neighbors(*node, Direction::Incoming)
                .map(|n| self.graph[n].unit)
                .collect(),
        )
    }

    /// Units depending directly on `unit`
    pub fn unit_dependents(&self, unit: UnitRef) -> Option<Vec<UnitRef>> {
        let node = self.unit_to_index.get(&unit)?;
        Some(
            self.neighbors(*node, Direction::Outgoing)
                .map(|n| self.graph[n].unit)
                .collect(),
        )
    }

    fn neighbor_ids(&self, node: NodeIndex, direction: Direction) -> Vec<String> {
        self.neighbors(node, direction)
            .map(|n| self.graph[n].id.clone())
            .collect()
    }

    /// Distinct neighbours in display order
    fn neighbors(&self, node: NodeIndex, direction: Direction) -> impl Iterator<Item = NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
        nodes.sort();
        nodes.dedup();
        nodes.into_iter()
    }

    /// Check if unit A depends (directly or transitively) on unit B
    pub fn depends_on(&self, unit_a: &str, unit_b: &str) -> bool {
        let Some(node_a) = self.id_to_index.get(unit_a) else {
            return false;
        };
        let Some(node_b) = self.id_to_index.get(unit_b) else {
            return false;
        };

        has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Check if `unit_a` depends (directly or transitively) on `unit_b`
    pub fn unit_depends_on(&self, unit_a: UnitRef, unit_b: UnitRef) -> bool {
        match (self.unit_to_index.get(&unit_a), self.unit_to_index.get(&unit_b)) {
            (Some(a), Some(b)) => has_path_connecting(&self.graph, *b, *a, None),
            _ => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Generate Mermaid diagram of the DAG.
    ///
    /// Edges that hand over artifacts are drawn thick.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for node in self.graph.node_indices() {
            let n = &self.graph[node];
            let _ = writeln!(out, "    {}[\"{}\"]", n.id, n.name.replace('"', "'"));
        }

        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let arrow = if self.graph[edge].is_some() { "==>" } else { "-->" };
            let _ = writeln!(
                out,
                "    {} {} {}",
                self.graph[from].id, arrow, self.graph[to].id
            );
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for node in self.graph.node_indices() {
            let n = &self.graph[node];
            let _ = writeln!(
                out,
                "    \"{}\" [label=\"{}\"];",
                n.id,
                n.name.replace('"', "\\\"")
            );
        }
        out.push('\n');

        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let style = if self.graph[edge].is_some() {
                " [style=bold]"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\"{};",
                self.graph[from].id, self.graph[to].id, style
            );
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self) -> Result<String, PipelineError> {
        let order = toposort(&self.graph, None).map_err(|cycle| self.cycle_error(cycle.node_id()))?;
        let mut out = String::new();

        for (i, node) in order.into_iter().enumerate() {
            let n = &self.graph[node];
            let _ = write!(out, "{}. {} ({})", i + 1, n.name, n.id);

            let deps = self.dependencies(&n.id).unwrap_or_default();
            if !deps.is_empty() {
                let _ = write!(out, " [depends: {}]", deps.join(", "));
            }

            out.push('\n');
        }

        Ok(out)
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{pipeline, Artifact, PipelineConfig};

    fn linear() -> Pipeline {
        pipeline(|p| {
            p.stage("A", |s| {
                s.build(|b| {
                    b.name("Compile");
                    Ok(())
                })?;
                Ok(())
            })?;
            p.stage("B", |s| {
                s.build(|b| {
                    b.name("Test");
                    Ok(())
                })?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn test_linear_dag() {
        let dag = linear().dag().unwrap();
        let order = dag.topological_order_ids().unwrap();

        let position = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(position("Compile") < position("Stage_A"));
        assert!(position("Stage_A") < position("Test"));
        assert!(position("Test") < position("Stage_B"));
        assert_eq!(dag.node_count(), 4);
        assert_eq!(dag.edge_count(), 4);
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let dag = linear().dag().unwrap();

        assert_eq!(dag.dependencies("Stage_B").unwrap(), vec!["Stage_A", "Test"]);
        assert_eq!(dag.dependents("Stage_A").unwrap(), vec!["Stage_B", "Test"]);
        assert!(dag.dependencies("Nope").is_none());
    }

    #[test]
    fn test_depends_on_check() {
        let dag = linear().dag().unwrap();

        assert!(dag.depends_on("Stage_B", "Compile")); // transitive
        assert!(dag.depends_on("Test", "Stage_A")); // direct
        assert!(!dag.depends_on("Compile", "Test")); // reverse
    }

    #[test]
    fn test_shared_identifier_resolves_to_first_unit() {
        let mut config = PipelineConfig::default();
        config.identifiers.on_collision = crate::pipeline::CollisionPolicy::Allow;
        let mut pipeline = Pipeline::with_config(config);

        let mut handles = Vec::new();
        for stage in ["A", "B"] {
            pipeline
                .stage(stage, |s| {
                    handles.push(s.build(|b| {
                        b.name("Publish");
                        Ok(())
                    })?);
                    Ok(())
                })
                .unwrap();
        }
        let (first, second) = (handles[0], handles[1]);
        let dag = pipeline.dag().unwrap();

        assert!(dag.dependencies("Publish").unwrap().is_empty());
        assert_eq!(dag.dependents("Publish").unwrap(), vec!["Stage_A"]);

        let gate_a = pipeline.stages()[0].reference().gate();
        let gate_b = pipeline.stages()[1].reference().gate();
        assert_eq!(dag.unit_dependencies(second).unwrap(), vec![gate_a]);
        assert_eq!(dag.unit_dependents(second).unwrap(), vec![gate_b]);
        assert!(dag.unit_depends_on(second, first));
        assert!(!dag.unit_depends_on(first, second));
    }

    #[test]
    fn test_build_depending_on_own_gate_is_a_cycle() {
        let result = pipeline(|p| {
            p.stage("Loop", |s| {
                let gate = s.gate();
                s.build(|b| {
                    b.name("Build");
                    b.depends_on(gate);
                    Ok(())
                })?;
                Ok(())
            })?;
            Ok(())
        });

        assert_eq!(
            result.unwrap_err(),
            PipelineError::CyclicDependency {
                units: vec!["Stage_Loop".into(), "Build".into()],
            }
        );
    }

    #[test]
    fn test_stage_cycle_through_late_dependency() {
        let mut p = Pipeline::new();
        let first = p.stage("First", |_| Ok(())).unwrap();
        let second = p.stage("Second", |_| Ok(())).unwrap();
        p.depends_on(first, second).unwrap();

        let result = p.dag();
        assert!(matches!(result, Err(PipelineError::CyclicDependency { .. })));
    }

    #[test]
    fn test_cycle_detection_can_be_disabled() {
        let config = PipelineConfig {
            detect_cycles: false,
            ..PipelineConfig::default()
        };
        let mut p = Pipeline::with_config(config);
        let first = p.stage("First", |_| Ok(())).unwrap();
        let second = p.stage("Second", |_| Ok(())).unwrap();
        p.depends_on(first, second).unwrap();

        let dag = p.dag().unwrap();
        assert!(dag.topological_order().is_err());
    }

    #[test]
    fn test_foreign_handle_is_unknown_dependency() {
        let mut other = Pipeline::new();
        other.stage("A", |_| Ok(())).unwrap();
        let foreign = other.stage("B", |_| Ok(())).unwrap();

        let result = pipeline(|p| {
            p.stage("Only", |s| {
                s.build(|b| {
                    b.name("Build");
                    b.depends_on(foreign.gate());
                    Ok(())
                })?;
                Ok(())
            })?;
            Ok(())
        });

        assert_eq!(
            result.unwrap_err(),
            PipelineError::UnknownDependency {
                unit: "Build".into()
            }
        );
    }

    #[test]
    fn test_mermaid_output() {
        let mut artifact = Artifact::new("out/*.zip", "*.zip");
        let pipeline = pipeline(|p| {
            p.stage("Stage1", |s| {
                s.build(|b| {
                    b.name("Build1");
                    b.produces(&mut artifact)?;
                    Ok(())
                })?;
                s.build(|b| {
                    b.name("Build2");
                    b.consumes(&artifact)?;
                    Ok(())
                })?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

        insta::assert_snapshot!(pipeline.dag().unwrap().to_mermaid(), @r###"
        graph TD
            Stage_Stage1["Stage: Stage1"]
            Build1["Build1"]
            Build2["Build2"]
            Build1 --> Stage_Stage1
            Build2 --> Stage_Stage1
            Build1 ==> Build2
        "###);
    }

    #[test]
    fn test_dot_output() {
        let dot = linear().dag().unwrap().to_dot();

        assert!(dot.starts_with("digraph pipeline {"));
        assert!(dot.contains("\"Stage_A\" [label=\"Stage: A\"];"));
        assert!(dot.contains("\"Stage_A\" -> \"Test\";"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_text_output() {
        let text = linear().dag().unwrap().to_text().unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first, "1. Compile (Compile)");
        assert!(text.contains("Stage: B (Stage_B) [depends: Stage_A, Test]"));
    }
}
