// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Artifact hand-off between builds
//!
//! An [`Artifact`] is a contract between exactly one producing build and any
//! number of consuming builds. The producer publishes with the producer
//! rules; each consumer gets a dependency on the producer that fetches with
//! the consumer rules.

use crate::errors::{IllegalState, PipelineResult};

use super::unit::UnitRef;

/// Producer/consumer data hand-off contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    producer_rules: String,
    consumer_rules: String,
    producer: Option<UnitRef>,
}

impl Artifact {
    /// Create an artifact with its publish and fetch rules
    pub fn new(producer_rules: impl Into<String>, consumer_rules: impl Into<String>) -> Self {
        Self {
            producer_rules: producer_rules.into(),
            consumer_rules: consumer_rules.into(),
            producer: None,
        }
    }

    pub fn producer_rules(&self) -> &str {
        &self.producer_rules
    }

    pub fn consumer_rules(&self) -> &str {
        &self.consumer_rules
    }

    /// The unit bound as producer, if any.
    ///
    /// The binding is made while the producer is configured, so it may name a
    /// build whose registration later failed.
    pub fn producer(&self) -> Option<UnitRef> {
        self.producer
    }

    /// Bind `unit` as producer.
    ///
    /// `registered` maps a handle to the name of the registered build behind
    /// it. A binding left by a build that never registered is replaced.
    /// Binding the same unit again is a no-op; returns whether the binding is new.
    pub(crate) fn bind_producer<F>(&mut self, unit: UnitRef, registered: F) -> PipelineResult<bool>
    where
        F: Fn(UnitRef) -> Option<String>,
    {
        match self.producer {
            Some(existing) if existing == unit => Ok(false),
            Some(existing) => match registered(existing) {
                Some(producer) => Err(IllegalState::AlreadyProduced { producer }.into()),
                None => {
                    self.producer = Some(unit);
                    Ok(true)
                }
            },
            None => {
                self.producer = Some(unit);
                Ok(true)
            }
        }
    }

    /// Resolve the producer `consumer` should depend on.
    ///
    /// A producer that never registered counts as missing.
    pub(crate) fn producer_for<F>(&self, consumer: UnitRef, registered: F) -> PipelineResult<UnitRef>
    where
        F: Fn(UnitRef) -> Option<String>,
    {
        let producer = self
            .producer
            .filter(|p| *p == consumer || registered(*p).is_some())
            .ok_or(IllegalState::MissingProducer)?;
        if producer == consumer {
            return Err(IllegalState::SameBuild.into());
        }
        Ok(producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;
    use std::collections::HashMap;

    fn registry(entries: &[(UnitRef, &str)]) -> HashMap<UnitRef, String> {
        entries
            .iter()
            .map(|(unit, name)| (*unit, name.to_string()))
            .collect()
    }

    #[test]
    fn test_new_artifact_has_no_producer() {
        let artifact = Artifact::new("producerRules", "consumerRules");
        assert_eq!(artifact.producer_rules(), "producerRules");
        assert_eq!(artifact.consumer_rules(), "consumerRules");
        assert!(artifact.producer().is_none());
    }

    #[test]
    fn test_single_producer() {
        let mut artifact = Artifact::new("p", "c");
        let first = UnitRef::build(0, 0);
        let second = UnitRef::build(0, 1);
        let names = registry(&[(first, "Build 1")]);
        let lookup = |u: UnitRef| names.get(&u).cloned();

        assert!(artifact.bind_producer(first, lookup).unwrap());
        assert!(!artifact.bind_producer(first, lookup).unwrap());

        let err = artifact.bind_producer(second, lookup).unwrap_err();
        assert_eq!(err.to_string(), "Artifact is produced by build 'Build 1'");
        assert_eq!(artifact.producer(), Some(first));
    }

    #[test]
    fn test_error_names_producer_as_registered() {
        let mut artifact = Artifact::new("p", "c");
        let first = UnitRef::build(0, 0);
        artifact.bind_producer(first, |_| None).unwrap();

        // The producer got its name after binding
        let names = registry(&[(first, "Renamed Build")]);
        let err = artifact
            .bind_producer(UnitRef::build(0, 1), |u| names.get(&u).cloned())
            .unwrap_err();
        assert_eq!(err.to_string(), "Artifact is produced by build 'Renamed Build'");
    }

    #[test]
    fn test_unregistered_producer_is_replaced() {
        let mut artifact = Artifact::new("p", "c");
        let failed = UnitRef::build(0, 0);
        let next = UnitRef::build(0, 1);
        artifact.bind_producer(failed, |_| None).unwrap();

        assert!(artifact.bind_producer(next, |_| None).unwrap());
        assert_eq!(artifact.producer(), Some(next));
    }

    #[test]
    fn test_consumer_checks() {
        let mut artifact = Artifact::new("p", "c");
        let producer = UnitRef::build(0, 0);
        let consumer = UnitRef::build(1, 0);
        let names = registry(&[(producer, "Build")]);
        let lookup = |u: UnitRef| names.get(&u).cloned();

        assert_eq!(
            artifact.producer_for(consumer, lookup),
            Err(PipelineError::IllegalState(IllegalState::MissingProducer))
        );

        artifact.bind_producer(producer, lookup).unwrap();
        assert_eq!(artifact.producer_for(consumer, lookup), Ok(producer));
        assert_eq!(
            artifact.producer_for(producer, lookup).unwrap_err().to_string(),
            "Consumer and producer cannot be the same build"
        );
    }

    #[test]
    fn test_unregistered_producer_is_missing() {
        let mut artifact = Artifact::new("p", "c");
        artifact.bind_producer(UnitRef::build(0, 0), |_| None).unwrap();

        assert_eq!(
            artifact.producer_for(UnitRef::build(0, 1), |_| None),
            Err(PipelineError::IllegalState(IllegalState::MissingProducer))
        );
    }
}
