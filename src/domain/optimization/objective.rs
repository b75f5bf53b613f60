//! Optimization objectives and fitness orientation.
//!
//! Evaluators report raw metric values (e.g. drawdown in percent, lower is
//! better). Everything downstream compares fitness under a single
//! maximize convention: minimize objectives are negated once, here.

use crate::domain::errors::{ConfigurationError, EvaluationFailure};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Whether larger or smaller raw values are better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    /// Raw value that is worst possible in this direction
    pub fn worst(self) -> f64 {
        match self {
            Direction::Maximize => f64::NEG_INFINITY,
            Direction::Minimize => f64::INFINITY,
        }
    }

    fn orient(self, raw: f64) -> f64 {
        match self {
            Direction::Maximize => raw,
            Direction::Minimize => -raw,
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// One optimization objective as declared in the run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub direction: Direction,
}

impl ObjectiveSpec {
    pub fn maximize(name: &str) -> Self {
        Self {
            name: name.to_string(),
            weight: 1.0,
            direction: Direction::Maximize,
        }
    }

    pub fn minimize(name: &str) -> Self {
        Self {
            name: name.to_string(),
            weight: 1.0,
            direction: Direction::Minimize,
        }
    }
}

/// Evaluated fitness of one genome.
///
/// `raw` holds the values exactly as reported (keyed by objective name);
/// `oriented` holds the same values in objective order, negated for
/// minimize objectives so that larger is always better.
#[derive(Debug, Clone, PartialEq)]
pub struct Fitness {
    raw: BTreeMap<String, f64>,
    oriented: Vec<f64>,
    failed: bool,
}

impl Fitness {
    pub fn raw(&self) -> &BTreeMap<String, f64> {
        &self.raw
    }

    pub fn oriented(&self) -> &[f64] {
        &self.oriented
    }

    /// True when this is the sentinel assigned to a failed evaluation
    pub fn is_failure(&self) -> bool {
        self.failed
    }

    pub fn value(&self, objective: &str) -> Option<f64> {
        self.raw.get(objective).copied()
    }

    /// Raw values with non-finite entries mapped to `None` (JSON-safe)
    pub fn finite_values(&self) -> BTreeMap<String, Option<f64>> {
        self.raw
            .iter()
            .map(|(name, value)| (name.clone(), value.is_finite().then_some(*value)))
            .collect()
    }
}

/// The ordered objective list of a run
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveSet {
    objectives: Vec<ObjectiveSpec>,
}

impl ObjectiveSet {
    pub fn new(objectives: Vec<ObjectiveSpec>) -> Result<Self, ConfigurationError> {
        if objectives.is_empty() {
            return Err(ConfigurationError::NoObjectives);
        }

        let mut seen = HashSet::new();
        for objective in &objectives {
            if !seen.insert(objective.name.as_str()) {
                return Err(ConfigurationError::DuplicateObjective {
                    name: objective.name.clone(),
                });
            }
            if !objective.weight.is_finite() || objective.weight <= 0.0 {
                return Err(ConfigurationError::InvalidObjectiveWeight {
                    name: objective.name.clone(),
                    weight: objective.weight,
                });
            }
        }

        Ok(Self { objectives })
    }

    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectiveSpec> {
        self.objectives.iter()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.objectives.iter().map(|o| o.weight).collect()
    }

    /// Converts an evaluator report into a fitness vector.
    ///
    /// Every declared objective must be present and finite; extra metrics
    /// reported by the evaluator are ignored.
    pub fn score(&self, report: &BTreeMap<String, f64>) -> Result<Fitness, EvaluationFailure> {
        let mut raw = BTreeMap::new();
        let mut oriented = Vec::with_capacity(self.objectives.len());

        for objective in &self.objectives {
            let value = report.get(&objective.name).copied().ok_or_else(|| {
                EvaluationFailure::MissingObjective {
                    name: objective.name.clone(),
                }
            })?;
            if !value.is_finite() {
                return Err(EvaluationFailure::NonFiniteObjective {
                    name: objective.name.clone(),
                    value,
                });
            }
            raw.insert(objective.name.clone(), value);
            oriented.push(objective.direction.orient(value));
        }

        Ok(Fitness {
            raw,
            oriented,
            failed: false,
        })
    }

    /// Worst-case fitness: every objective at its minimizing-direction infinity
    pub fn sentinel(&self) -> Fitness {
        let raw = self
            .objectives
            .iter()
            .map(|o| (o.name.clone(), o.direction.worst()))
            .collect();

        Fitness {
            raw,
            oriented: vec![f64::NEG_INFINITY; self.objectives.len()],
            failed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profit_drawdown() -> ObjectiveSet {
        ObjectiveSet::new(vec![
            ObjectiveSpec::maximize("profit"),
            ObjectiveSpec::minimize("drawdown"),
        ])
        .unwrap()
    }

    #[test]
    fn test_minimize_objectives_are_negated() {
        let objectives = profit_drawdown();
        let report = BTreeMap::from([
            ("profit".to_string(), 12.5),
            ("drawdown".to_string(), 4.0),
            ("trades".to_string(), 31.0),
        ]);

        let fitness = objectives.score(&report).unwrap();
        assert_eq!(fitness.oriented(), &[12.5, -4.0]);
        assert_eq!(fitness.value("drawdown"), Some(4.0));
        assert!(!fitness.raw().contains_key("trades"));
    }

    #[test]
    fn test_missing_objective_is_a_failure() {
        let objectives = profit_drawdown();
        let report = BTreeMap::from([("profit".to_string(), 1.0)]);

        assert_eq!(
            objectives.score(&report),
            Err(EvaluationFailure::MissingObjective {
                name: "drawdown".to_string()
            })
        );
    }

    #[test]
    fn test_sentinel_uses_minimizing_direction_infinity() {
        let sentinel = profit_drawdown().sentinel();
        assert!(sentinel.is_failure());
        assert_eq!(sentinel.value("profit"), Some(f64::NEG_INFINITY));
        assert_eq!(sentinel.value("drawdown"), Some(f64::INFINITY));
        assert!(sentinel.oriented().iter().all(|v| *v == f64::NEG_INFINITY));
        assert_eq!(sentinel.finite_values()["profit"], None);
    }

    #[test]
    fn test_duplicate_objective_rejected() {
        let result = ObjectiveSet::new(vec![
            ObjectiveSpec::maximize("profit"),
            ObjectiveSpec::maximize("profit"),
        ]);
        assert!(matches!(
            result,
            Err(ConfigurationError::DuplicateObjective { .. })
        ));
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        let mut spec = ObjectiveSpec::maximize("profit");
        spec.weight = 0.0;
        assert!(matches!(
            ObjectiveSet::new(vec![spec]),
            Err(ConfigurationError::InvalidObjectiveWeight { .. })
        ));
    }
}
