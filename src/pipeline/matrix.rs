// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Matrix builds
//!
//! A matrix expands named axes into every combination of their values, drops
//! the combinations matched by an exclusion and creates one build per
//! survivor. Combinations are ordered like nested loops with the first axis
//! outermost.

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::errors::{IllegalState, InvalidExclusion, PipelineResult};

use super::stage::{BuildScope, StageScope};
use super::unit::{UnitRef, UnitRole};

/// One value per axis, in axis registration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Combination(Vec<(String, String)>);

impl Combination {
    /// Value of `axis` in this combination
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn with(&self, axis: &str, value: &str) -> Self {
        let mut values = self.0.clone();
        values.push((axis.to_string(), value.to_string()));
        Self(values)
    }
}

impl Serialize for Combination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Named axes, each with an ordered list of values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Axes {
    axes: Vec<(String, Vec<String>)>,
}

impl Axes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an axis. The first registration of a name wins; later ones
    /// are ignored.
    pub fn axis<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if self.values(&name).is_none() {
            self.axes
                .push((name, values.into_iter().map(Into::into).collect()));
        }
        self
    }

    /// Values registered for `name`
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.axes
            .iter()
            .find(|(axis, _)| axis == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Axis names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Cartesian product of all axes. No axes means no combinations.
    pub fn combinations(&self) -> Vec<Combination> {
        if self.axes.is_empty() {
            return Vec::new();
        }

        self.axes
            .iter()
            .fold(vec![Combination::default()], |acc, (name, values)| {
                acc.iter()
                    .flat_map(|combination| {
                        values.iter().map(move |value| combination.with(name, value))
                    })
                    .collect()
            })
    }
}

/// A partial assignment; matches every combination agreeing on all its pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion(Vec<(String, String)>);

impl Exclusion {
    pub fn matches(&self, combination: &Combination) -> bool {
        self.0
            .iter()
            .all(|(axis, value)| combination.get(axis) == Some(value.as_str()))
    }
}

/// Collects exclusions, validating them against the registered axes
pub struct Excludes<'m> {
    axes: &'m Axes,
    exclusions: &'m mut Vec<Exclusion>,
}

impl Excludes<'_> {
    /// Exclude every combination matching all `pairs` of axis name and value.
    ///
    /// Unknown axis names or values are rejected right away.
    pub fn exclude<I, K, V>(&mut self, pairs: I) -> PipelineResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut rule: Vec<(String, String)> = Vec::new();

        for (axis, value) in pairs {
            let (axis, value) = (axis.into(), value.into());
            let Some(values) = self.axes.values(&axis) else {
                return Err(InvalidExclusion::UnknownAxis { axis }.into());
            };
            if !values.contains(&value) {
                return Err(InvalidExclusion::UnknownValue { axis, value }.into());
            }

            // Repeated axis: last value wins
            match rule.iter_mut().find(|(name, _)| *name == axis) {
                Some(entry) => entry.1 = value,
                None => rule.push((axis, value)),
            }
        }

        self.exclusions.push(Exclusion(rule));
        Ok(self)
    }
}

/// Matrix bound to the stage it adds its builds to
pub struct Matrix<'s, 'p> {
    scope: &'s mut StageScope<'p>,
    axes: Axes,
    axes_defined: bool,
    exclusions: Vec<Exclusion>,
    build_defined: bool,
    generated: Vec<UnitRef>,
}

impl<'s, 'p> Matrix<'s, 'p> {
    pub(crate) fn new(scope: &'s mut StageScope<'p>) -> Self {
        Self {
            scope,
            axes: Axes::new(),
            axes_defined: false,
            exclusions: Vec::new(),
            build_defined: false,
            generated: Vec::new(),
        }
    }

    /// Define the axes. Only one axes block is allowed per matrix.
    pub fn axes<F>(&mut self, configure: F) -> PipelineResult<&Axes>
    where
        F: FnOnce(&mut Axes),
    {
        if self.axes_defined {
            return Err(IllegalState::AxesRedefined.into());
        }
        self.axes_defined = true;

        configure(&mut self.axes);
        Ok(&self.axes)
    }

    /// Register exclusions against the axes defined so far
    pub fn excludes<F>(&mut self, configure: F) -> PipelineResult<&mut Self>
    where
        F: FnOnce(&mut Excludes<'_>) -> PipelineResult<()>,
    {
        let mut excludes = Excludes {
            axes: &self.axes,
            exclusions: &mut self.exclusions,
        };
        configure(&mut excludes)?;
        Ok(self)
    }

    /// Combinations that survive the exclusions
    pub fn combinations(&self) -> Vec<Combination> {
        self.axes
            .combinations()
            .into_iter()
            .filter(|combination| !self.exclusions.iter().any(|e| e.matches(combination)))
            .collect()
    }

    /// Create one build per surviving combination.
    ///
    /// `configure` runs once per combination, after the stage defaults were
    /// copied; the combination is readable through [`BuildScope::axis`].
    /// Only one build block is allowed per matrix.
    pub fn build<F>(&mut self, mut configure: F) -> PipelineResult<&[UnitRef]>
    where
        F: FnMut(&mut BuildScope<'_>) -> PipelineResult<()>,
    {
        if self.build_defined {
            return Err(IllegalState::MatrixBuildRedefined.into());
        }
        self.build_defined = true;

        let total = self.axes.combinations().len();
        let combinations = self.combinations();
        debug!(
            stage = %self.scope.name(),
            combinations = total,
            excluded = total - combinations.len(),
            "expanding matrix"
        );

        for combination in combinations {
            let unit = self.scope.add_unit(
                UnitRole::MatrixVariant,
                Some(combination),
                &mut configure,
            )?;
            self.generated.push(unit);
        }

        Ok(&self.generated)
    }

    pub(crate) fn into_generated(self) -> Vec<UnitRef> {
        self.generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;

    fn pairs(combination: &Combination) -> Vec<(&str, &str)> {
        combination.iter().collect()
    }

    #[test]
    fn test_no_axes_defined() {
        let axes = Axes::new();
        assert!(axes.combinations().is_empty());
    }

    #[test]
    fn test_single_axis_with_single_value() {
        let mut axes = Axes::new();
        axes.axis("A", ["B"]);

        let combinations = axes.combinations();
        assert_eq!(combinations.len(), 1);
        assert_eq!(pairs(&combinations[0]), vec![("A", "B")]);
    }

    #[test]
    fn test_multiple_axes_with_multiple_values() {
        let mut axes = Axes::new();
        axes.axis("A", ["B", "C"]).axis("X", ["Y", "Z"]);

        let combinations: Vec<_> = axes.combinations().iter().map(|c| {
            pairs(c).into_iter().map(|(a, v)| format!("{a}={v}")).collect::<Vec<_>>().join(",")
        }).collect();

        assert_eq!(
            combinations,
            vec!["A=B,X=Y", "A=B,X=Z", "A=C,X=Y", "A=C,X=Z"]
        );
    }

    #[test]
    fn test_product_size() {
        let mut axes = Axes::new();
        axes.axis("OS", ["Linux", "Windows", "MacOSX"])
            .axis("JDK", ["JDK_18", "JDK_11"])
            .axis("DB", ["pg", "mysql"]);

        let combinations = axes.combinations();
        assert_eq!(combinations.len(), 12);
        assert!(combinations.iter().all(|c| c.len() == 3));
    }

    #[test]
    fn test_empty_axis_yields_nothing() {
        let mut axes = Axes::new();
        axes.axis("OS", ["Linux"]).axis("JDK", Vec::<String>::new());
        assert!(axes.combinations().is_empty());
    }

    #[test]
    fn test_first_axis_registration_wins() {
        let mut axes = Axes::new();
        axes.axis("OS", ["Linux", "Windows"]).axis("OS", ["Solaris"]);

        assert_eq!(axes.len(), 1);
        assert_eq!(
            axes.values("OS"),
            Some(&["Linux".to_string(), "Windows".to_string()][..])
        );
    }

    #[test]
    fn test_exclusion_wildcards_other_axes() {
        let mut axes = Axes::new();
        axes.axis("OS", ["Linux", "Windows"]).axis("JDK", ["8", "11", "17"]);

        let mut exclusions = Vec::new();
        Excludes {
            axes: &axes,
            exclusions: &mut exclusions,
        }
        .exclude([("OS", "Windows")])
        .unwrap();

        let surviving: Vec<_> = axes
            .combinations()
            .into_iter()
            .filter(|c| !exclusions.iter().any(|e| e.matches(c)))
            .collect();
        assert_eq!(surviving.len(), 3);
        assert!(surviving.iter().all(|c| c.get("OS") == Some("Linux")));
    }

    #[test]
    fn test_exclusion_order_does_not_matter() {
        let mut axes = Axes::new();
        axes.axis("OS", ["Linux", "Windows", "MacOSX"])
            .axis("JDK", ["JDK_18", "JDK_11"]);

        let survivors = |rules: &[&[(&str, &str)]]| {
            let mut exclusions = Vec::new();
            let mut excludes = Excludes {
                axes: &axes,
                exclusions: &mut exclusions,
            };
            for rule in rules {
                excludes.exclude(rule.iter().copied()).unwrap();
            }
            axes.combinations()
                .into_iter()
                .filter(|c| !exclusions.iter().any(|e| e.matches(c)))
                .collect::<Vec<_>>()
        };

        let a: &[(&str, &str)] = &[("OS", "Windows"), ("JDK", "JDK_18")];
        let b: &[(&str, &str)] = &[("OS", "MacOSX")];
        assert_eq!(survivors(&[a, b]), survivors(&[b, a]));
        assert_eq!(survivors(&[a, b]), survivors(&[a, b, a]));
        assert_eq!(survivors(&[a, b]).len(), 3);
    }

    #[test]
    fn test_invalid_exclusions() {
        let mut axes = Axes::new();
        axes.axis("OS", ["Linux"]);
        let mut exclusions = Vec::new();
        let mut excludes = Excludes {
            axes: &axes,
            exclusions: &mut exclusions,
        };

        let err = excludes.exclude([("Arch", "x86")]).err().unwrap();
        assert_eq!(err.to_string(), "Invalid name: Arch");

        let err = excludes.exclude([("OS", "Plan9")]).err().unwrap();
        assert!(matches!(
            err,
            PipelineError::InvalidExclusion(InvalidExclusion::UnknownValue { .. })
        ));
        assert!(exclusions.is_empty());
    }

    #[test]
    fn test_combination_serializes_as_ordered_map() {
        let mut axes = Axes::new();
        axes.axis("OS", ["Linux"]).axis("JDK", ["11"]);
        let json = serde_json::to_string(&axes.combinations()[0]).unwrap();
        assert_eq!(json, r#"{"OS":"Linux","JDK":"11"}"#);
    }
}
