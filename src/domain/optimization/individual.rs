use crate::domain::optimization::objective::Fitness;
use crate::domain::optimization::parameter_space::Genome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One candidate parameter configuration and its evaluation.
///
/// `id` is assigned from a per-run monotonic counter and doubles as the
/// insertion order used for deterministic tie-breaks.
#[derive(Debug, Clone)]
pub struct Individual {
    id: u64,
    genes: Genome,
    fitness: Option<Fitness>,
    born_in_generation: u64,
    /// Front index from the latest ranking (0 = non-dominated)
    pub rank: usize,
    /// Weighted normalized distance to the ideal point from the latest ranking
    pub diversity: f64,
}

impl Individual {
    pub fn new(id: u64, genes: Genome, born_in_generation: u64) -> Self {
        Self {
            id,
            genes,
            fitness: None,
            born_in_generation,
            rank: usize::MAX,
            diversity: f64::INFINITY,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn genes(&self) -> &Genome {
        &self.genes
    }

    pub fn fitness(&self) -> Option<&Fitness> {
        self.fitness.as_ref()
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    pub fn born_in_generation(&self) -> u64 {
        self.born_in_generation
    }

    /// Attaches the fitness vector. A genome is scored once; later calls are ignored.
    pub fn assign_fitness(&mut self, fitness: Fitness) -> bool {
        if self.fitness.is_some() {
            return false;
        }
        self.fitness = Some(fitness);
        true
    }

    /// Oriented objective values, or an empty slice before evaluation
    pub fn objectives(&self) -> &[f64] {
        self.fitness.as_ref().map(|f| f.oriented()).unwrap_or(&[])
    }

    /// A dominates B iff A >= B on every objective and > on at least one
    pub fn dominates(&self, other: &Individual) -> bool {
        dominates(self.objectives(), other.objectives())
    }

    pub fn to_record(&self) -> EliteRecord {
        EliteRecord {
            id: self.id,
            genes: self.genes.clone(),
            fitness: self
                .fitness
                .as_ref()
                .map(|f| f.finite_values())
                .unwrap_or_default(),
            evaluation_failed: self.fitness.as_ref().is_some_and(|f| f.is_failure()),
            rank: self.rank,
            distance_to_ideal: self.diversity.is_finite().then_some(self.diversity),
            born_in_generation: self.born_in_generation,
        }
    }
}

/// Dominance over oriented (maximize-convention) objective vectors
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Decoded view of an elite individual, as reported and persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliteRecord {
    pub id: u64,
    pub genes: Genome,
    /// Raw objective values; `None` marks a non-finite (sentinel) value
    pub fitness: BTreeMap<String, Option<f64>>,
    pub evaluation_failed: bool,
    pub rank: usize,
    pub distance_to_ideal: Option<f64>,
    pub born_in_generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::objective::{ObjectiveSet, ObjectiveSpec};

    #[test]
    fn test_dominance_requires_strict_improvement() {
        assert!(dominates(&[2.0, 1.0], &[1.0, 1.0]));
        assert!(!dominates(&[1.0, 1.0], &[1.0, 1.0]));
        assert!(!dominates(&[2.0, 0.0], &[1.0, 1.0]));
        assert!(!dominates(&[], &[]));
    }

    #[test]
    fn test_finite_values_dominate_sentinel() {
        assert!(dominates(
            &[-100.0, -50.0],
            &[f64::NEG_INFINITY, f64::NEG_INFINITY]
        ));
        assert!(!dominates(
            &[f64::NEG_INFINITY, f64::NEG_INFINITY],
            &[f64::NEG_INFINITY, f64::NEG_INFINITY]
        ));
    }

    #[test]
    fn test_fitness_is_assigned_once() {
        let objectives = ObjectiveSet::new(vec![ObjectiveSpec::maximize("profit")]).unwrap();
        let mut individual = Individual::new(1, Genome::new(), 0);
        assert!(!individual.is_evaluated());

        let first = objectives
            .score(&BTreeMap::from([("profit".to_string(), 5.0)]))
            .unwrap();
        assert!(individual.assign_fitness(first));
        assert!(!individual.assign_fitness(objectives.sentinel()));
        assert_eq!(individual.objectives(), &[5.0]);
    }

    #[test]
    fn test_record_marks_sentinel_values() {
        let objectives = ObjectiveSet::new(vec![ObjectiveSpec::minimize("drawdown")]).unwrap();
        let mut individual = Individual::new(4, Genome::new(), 2);
        individual.assign_fitness(objectives.sentinel());

        let record = individual.to_record();
        assert!(record.evaluation_failed);
        assert_eq!(record.fitness["drawdown"], None);
        assert_eq!(record.distance_to_ideal, None);
        assert_eq!(record.born_in_generation, 2);
    }
}
