/*
 * feature/registry.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Validation and dependency ordering of feature sets.
 */

//! Feature registry.
//!
//! Validates a set of feature definitions and orders them so that every
//! feature appears after all features it hard-depends on, and after any
//! optional dependency that is also present. The order is deterministic and
//! independent of the input order: features are considered alphabetically
//! by name, and Kahn's algorithm always takes the alphabetically smallest
//! ready feature next.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::error::{ConfigError, CycleReport, Result};
use crate::feature::Feature;

/// An ordered, validated set of features. Immutable once built; shared by
/// every document and render context of an environment.
pub struct FeatureRegistry {
    features: Vec<Rc<dyn Feature>>,
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field(
                "features",
                &self.features.iter().map(|feat| feat.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FeatureRegistry {
    /// Validate and sort the given features.
    ///
    /// Fails with a [`ConfigError`] on a duplicate feature name, on a hard
    /// dependency naming an absent feature, or on a dependency cycle. The
    /// cycle error reports every feature left with unresolved edges.
    pub fn build(features: Vec<Rc<dyn Feature>>) -> Result<Self> {
        let mut by_name: BTreeMap<String, Rc<dyn Feature>> = BTreeMap::new();
        for feature in features {
            let name = feature.name().to_owned();
            if by_name.insert(name.clone(), feature).is_some() {
                return Err(ConfigError::DuplicateFeature(name).into());
            }
        }

        for (name, feature) in &by_name {
            for dep in feature.hard_dependencies() {
                if !by_name.contains_key(&dep) {
                    return Err(ConfigError::UnmetDependency {
                        feature: name.clone(),
                        dependency: dep,
                    }
                    .into());
                }
            }
        }

        // Unresolved dependency edges per feature: hard dependencies plus
        // whichever optional dependencies are present.
        let mut remaining: BTreeMap<String, BTreeSet<String>> = by_name
            .iter()
            .map(|(name, feature)| {
                let mut deps: BTreeSet<String> =
                    feature.hard_dependencies().into_iter().collect();
                deps.extend(
                    feature
                        .optional_dependencies()
                        .into_iter()
                        .filter(|d| by_name.contains_key(d)),
                );
                (name.clone(), deps)
            })
            .collect();

        let mut ordered: Vec<Rc<dyn Feature>> = Vec::with_capacity(by_name.len());
        loop {
            // alphabetically smallest feature with no unresolved edges
            let Some(next) = remaining
                .iter()
                .find(|(_, deps)| deps.is_empty())
                .map(|(name, _)| name.clone())
            else {
                break;
            };
            remaining.remove(&next);
            for deps in remaining.values_mut() {
                deps.remove(&next);
            }
            ordered.push(Rc::clone(&by_name[&next]));
        }

        if !remaining.is_empty() {
            return Err(ConfigError::DependencyCycle(CycleReport {
                remaining: remaining
                    .into_iter()
                    .map(|(name, deps)| (name, deps.into_iter().collect()))
                    .collect(),
            })
            .into());
        }

        tracing::debug!(
            order = ?ordered.iter().map(|f| f.name()).collect::<Vec<_>>(),
            "Built feature registry"
        );

        Ok(Self { features: ordered })
    }

    /// The features, in dependency order.
    pub fn features(&self) -> &[Rc<dyn Feature>] {
        &self.features
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name() == name)
    }

    pub fn feature(&self, name: &str) -> Option<&Rc<dyn Feature>> {
        self.features.iter().find(|f| f.name() == name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature names in dependency order (for logging and tests).
    pub fn feature_names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name()).collect()
    }
}
