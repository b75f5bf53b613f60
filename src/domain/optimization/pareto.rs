//! Multi-objective elite management.
//!
//! Fronts come from a full non-dominated sort of the candidate pool. When
//! a front does not fit in the elite budget, its members are ranked by
//! weighted Euclidean distance to the ideal point in normalized objective
//! space and the closest are kept. Ties fall back to insertion order
//! (individual id), so identical input always yields identical output.

use crate::domain::optimization::individual::Individual;
use std::cmp::Ordering;

const MIN_SPAN: f64 = 1e-12;

/// Best oriented value seen for each objective over the whole run
#[derive(Debug, Clone, PartialEq)]
pub struct IdealPoint {
    best: Vec<f64>,
}

impl IdealPoint {
    pub fn new(objective_count: usize) -> Self {
        Self {
            best: vec![f64::NEG_INFINITY; objective_count],
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.best
    }

    /// Folds finite objective values of evaluated individuals into the ideal point
    pub fn observe(&mut self, individuals: &[Individual]) {
        for individual in individuals {
            for (best, value) in self.best.iter_mut().zip(individual.objectives()) {
                if value.is_finite() && *value > *best {
                    *best = *value;
                }
            }
        }
    }
}

/// Pareto ranking and diversity-preserving elite truncation
#[derive(Debug, Clone)]
pub struct ParetoSelector {
    weights: Vec<f64>,
    ideal: IdealPoint,
}

impl ParetoSelector {
    pub fn new(weights: Vec<f64>) -> Self {
        let ideal = IdealPoint::new(weights.len());
        Self { weights, ideal }
    }

    pub fn ideal_point(&self) -> &IdealPoint {
        &self.ideal
    }

    /// Non-dominated sort. Returns pool indices grouped by front, front 0
    /// first, each front in ascending index order. Unevaluated individuals
    /// are never dominated nor dominating; callers rank evaluated pools only.
    pub fn compute_fronts(pool: &[Individual]) -> Vec<Vec<usize>> {
        let n = pool.len();
        if n == 0 {
            return vec![];
        }

        let mut domination_count = vec![0usize; n];
        let mut dominated_set: Vec<Vec<usize>> = vec![vec![]; n];

        for i in 0..n {
            for j in (i + 1)..n {
                if pool[i].dominates(&pool[j]) {
                    dominated_set[i].push(j);
                    domination_count[j] += 1;
                } else if pool[j].dominates(&pool[i]) {
                    dominated_set[j].push(i);
                    domination_count[i] += 1;
                }
            }
        }

        let mut fronts = Vec::new();
        let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &i in &current {
                for &j in &dominated_set[i] {
                    domination_count[j] -= 1;
                    if domination_count[j] == 0 {
                        next.push(j);
                    }
                }
            }
            next.sort_unstable();
            fronts.push(current);
            current = next;
        }

        fronts
    }

    /// Weighted distance to the ideal point, normalized per objective by
    /// the spread between the ideal and the worst finite value in `pool`.
    /// Individuals with any non-finite objective are infinitely far.
    pub fn distances_to_ideal(&self, pool: &[Individual]) -> Vec<f64> {
        let ideal = self.ideal.values();
        let mut worst = vec![f64::INFINITY; ideal.len()];
        for individual in pool {
            for (w, value) in worst.iter_mut().zip(individual.objectives()) {
                if value.is_finite() && *value < *w {
                    *w = *value;
                }
            }
        }

        let spans: Vec<f64> = ideal
            .iter()
            .zip(&worst)
            .map(|(best, worst)| {
                let span = best - worst;
                if span.is_finite() && span > MIN_SPAN {
                    span
                } else {
                    1.0
                }
            })
            .collect();

        pool.iter()
            .map(|individual| {
                let values = individual.objectives();
                if values.len() != ideal.len() || values.iter().any(|v| !v.is_finite()) {
                    return f64::INFINITY;
                }
                let squared: f64 = values
                    .iter()
                    .zip(ideal)
                    .zip(&spans)
                    .zip(&self.weights)
                    .map(|(((value, best), span), weight)| {
                        let gap = (best - value) / span;
                        weight * gap * gap
                    })
                    .sum();
                squared.sqrt()
            })
            .collect()
    }

    /// Updates the ideal point with `pool`, then fully recomputes front rank
    /// and diversity score for every member. Returns the fronts.
    pub fn rank_pool(&mut self, pool: &mut [Individual]) -> Vec<Vec<usize>> {
        self.ideal.observe(pool);
        let fronts = Self::compute_fronts(pool);
        let distances = self.distances_to_ideal(pool);

        for (rank, front) in fronts.iter().enumerate() {
            for &i in front {
                pool[i].rank = rank;
                pool[i].diversity = distances[i];
            }
        }

        fronts
    }

    /// Fills up to `target_size` slots with whole fronts in order; the first
    /// front that would overflow contributes only its members closest to
    /// the ideal point. Output is front-major, distance-minor.
    pub fn balance_fronts(
        pool: &[Individual],
        fronts: &[Vec<usize>],
        target_size: usize,
    ) -> Vec<usize> {
        let mut selected = Vec::with_capacity(target_size);

        for front in fronts {
            let room = target_size - selected.len();
            if room == 0 {
                break;
            }
            let mut ordered = front.clone();
            ordered.sort_by(|&a, &b| closer_to_ideal(&pool[a], &pool[b]));
            ordered.truncate(room);
            selected.extend(ordered);
        }

        selected
    }

    /// Ranks the pool and returns the indices of the new elite set
    pub fn select_winning_population(
        &mut self,
        pool: &mut [Individual],
        elite_size: usize,
    ) -> Vec<usize> {
        let fronts = self.rank_pool(pool);
        Self::balance_fronts(pool, &fronts, elite_size)
    }
}

fn closer_to_ideal(a: &Individual, b: &Individual) -> Ordering {
    a.diversity
        .total_cmp(&b.diversity)
        .then_with(|| a.id().cmp(&b.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::objective::{ObjectiveSet, ObjectiveSpec};
    use crate::domain::optimization::parameter_space::Genome;
    use std::collections::BTreeMap;

    fn objectives() -> ObjectiveSet {
        ObjectiveSet::new(vec![
            ObjectiveSpec::maximize("profit"),
            ObjectiveSpec::minimize("drawdown"),
        ])
        .unwrap()
    }

    fn individual(id: u64, profit: f64, drawdown: f64) -> Individual {
        let mut ind = Individual::new(id, Genome::new(), 0);
        let report = BTreeMap::from([
            ("profit".to_string(), profit),
            ("drawdown".to_string(), drawdown),
        ]);
        ind.assign_fitness(objectives().score(&report).unwrap());
        ind
    }

    fn failed(id: u64) -> Individual {
        let mut ind = Individual::new(id, Genome::new(), 0);
        ind.assign_fitness(objectives().sentinel());
        ind
    }

    fn sample_pool() -> Vec<Individual> {
        vec![
            individual(0, 10.0, 5.0), // front 0
            individual(1, 20.0, 9.0), // front 0
            individual(2, 5.0, 2.0),  // front 0
            individual(3, 8.0, 6.0),  // dominated by 0
            individual(4, 4.0, 7.0),  // dominated by 3
            failed(5),
            individual(6, 15.0, 7.0), // front 0
        ]
    }

    #[test]
    fn test_fronts_are_ordered_by_dominance() {
        let pool = sample_pool();
        let fronts = ParetoSelector::compute_fronts(&pool);
        assert_eq!(fronts[0], vec![0, 1, 2, 6]);
        assert_eq!(fronts[1], vec![3]);
        assert_eq!(fronts[2], vec![4]);
        assert_eq!(fronts[3], vec![5]);
    }

    #[test]
    fn test_front_members_are_mutually_non_dominated() {
        let pool = sample_pool();
        let fronts = ParetoSelector::compute_fronts(&pool);
        for front in &fronts {
            for &a in front {
                for &b in front {
                    assert!(!pool[a].dominates(&pool[b]));
                }
            }
        }
        for pair in fronts.windows(2) {
            for &worse in &pair[1] {
                for &better in &pair[0] {
                    assert!(!pool[worse].dominates(&pool[better]));
                }
            }
        }
    }

    #[test]
    fn test_balance_returns_min_of_target_and_total() {
        let mut selector = ParetoSelector::new(vec![1.0, 1.0]);
        let mut pool = sample_pool();
        let fronts = selector.rank_pool(&mut pool);

        for target in 0..10 {
            let selected = ParetoSelector::balance_fronts(&pool, &fronts, target);
            assert_eq!(selected.len(), target.min(pool.len()));
        }
    }

    #[test]
    fn test_overflowing_front_keeps_closest_to_ideal() {
        let mut selector = ParetoSelector::new(vec![1.0, 1.0]);
        let mut pool = sample_pool();
        let elite = selector.select_winning_population(&mut pool, 2);

        // Ideal = (profit 20, drawdown 2), pool spread (16, 7).
        // Front 0 distances: id0 ~0.758, id6 ~0.780, id2 ~0.938, id1 = 1.0
        assert_eq!(elite, vec![0, 6]);
        assert!(elite.iter().all(|&i| pool[i].rank == 0));
    }

    #[test]
    fn test_whole_fronts_precede_truncated_front() {
        let mut selector = ParetoSelector::new(vec![1.0, 1.0]);
        let mut pool = sample_pool();
        let elite = selector.select_winning_population(&mut pool, 5);

        assert_eq!(elite.len(), 5);
        assert!(elite[..4].iter().all(|&i| pool[i].rank == 0));
        assert_eq!(elite[4], 3);
        // Front-major, distance-minor
        for pair in elite[..4].windows(2) {
            assert!(pool[pair[0]].diversity <= pool[pair[1]].diversity);
        }
    }

    #[test]
    fn test_selection_is_deterministic() {
        let run = || {
            let mut selector = ParetoSelector::new(vec![1.0, 1.0]);
            let mut pool = sample_pool();
            selector.select_winning_population(&mut pool, 3)
        };
        let first = run();
        for _ in 0..5 {
            assert_eq!(run(), first);
        }
    }

    #[test]
    fn test_identical_fitness_breaks_ties_by_insertion_order() {
        let mut selector = ParetoSelector::new(vec![1.0, 1.0]);
        let mut pool = vec![
            individual(7, 10.0, 5.0),
            individual(3, 10.0, 5.0),
            individual(5, 10.0, 5.0),
        ];
        let elite = selector.select_winning_population(&mut pool, 2);
        let ids: Vec<u64> = elite.iter().map(|&i| pool[i].id()).collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[test]
    fn test_sentinel_is_never_in_front_zero_when_others_exist() {
        let mut selector = ParetoSelector::new(vec![1.0, 1.0]);
        let mut pool = vec![failed(0), individual(1, -50.0, 90.0)];
        selector.rank_pool(&mut pool);
        assert_eq!(pool[0].rank, 1);
        assert_eq!(pool[1].rank, 0);
        assert!(pool[0].diversity.is_infinite());
    }

    #[test]
    fn test_ideal_point_persists_across_pools() {
        let mut selector = ParetoSelector::new(vec![1.0, 1.0]);
        let mut first = vec![individual(0, 30.0, 1.0)];
        selector.rank_pool(&mut first);

        let mut second = vec![individual(1, 10.0, 5.0)];
        selector.rank_pool(&mut second);
        assert_eq!(selector.ideal_point().values(), &[30.0, -1.0]);
        assert!(second[0].diversity > 0.0);
    }
}
