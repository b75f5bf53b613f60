//! Parent selection over a ranked pool.
//!
//! All schemes order candidates by front rank (lower is better), then by
//! diversity score (higher is better), then by id.

use crate::domain::optimization::individual::Individual;
use anyhow::bail;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Linear ranking pressure: the best candidate is 1.5x as likely as average
const RANK_SELECTION_PRESSURE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionAlgorithm {
    Tournament,
    Roulette,
    Rank,
}

impl FromStr for SelectionAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tournament" => Ok(SelectionAlgorithm::Tournament),
            "roulette" => Ok(SelectionAlgorithm::Roulette),
            "rank" => Ok(SelectionAlgorithm::Rank),
            _ => bail!(
                "Invalid selection algorithm: {}. Must be 'tournament', 'roulette', or 'rank'",
                s
            ),
        }
    }
}

/// Best-first ordering used by every selection scheme
pub fn compare_fitness_rank(a: &Individual, b: &Individual) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| b.diversity.total_cmp(&a.diversity))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Pool indices sorted best-first
pub fn ranked_order(pool: &[Individual]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.sort_by(|&a, &b| compare_fitness_rank(&pool[a], &pool[b]));
    order
}

#[derive(Debug, Clone)]
pub struct ParentSelector {
    algorithm: SelectionAlgorithm,
    tournament_size: usize,
}

impl ParentSelector {
    pub fn new(algorithm: SelectionAlgorithm, tournament_size: usize) -> Self {
        Self {
            algorithm,
            tournament_size: tournament_size.max(1),
        }
    }

    pub fn algorithm(&self) -> SelectionAlgorithm {
        self.algorithm
    }

    /// Draws `count` parent indices (with replacement) from a ranked pool
    pub fn select_parents<R: Rng + ?Sized>(
        &self,
        pool: &[Individual],
        count: usize,
        rng: &mut R,
    ) -> Vec<usize> {
        if pool.is_empty() || count == 0 {
            return vec![];
        }

        match self.algorithm {
            SelectionAlgorithm::Tournament => (0..count)
                .map(|_| self.tournament(pool, rng))
                .collect(),
            SelectionAlgorithm::Roulette => {
                let weights: Vec<f64> = pool
                    .iter()
                    .map(|ind| 1.0 / (1.0 + ind.rank.min(pool.len()) as f64))
                    .collect();
                let order: Vec<usize> = (0..pool.len()).collect();
                (0..count)
                    .map(|_| spin(&order, &weights, rng))
                    .collect()
            }
            SelectionAlgorithm::Rank => {
                let order = ranked_order(pool);
                let n = order.len();
                let weights: Vec<f64> = (0..n)
                    .map(|position| {
                        if n == 1 {
                            1.0
                        } else {
                            let sp = RANK_SELECTION_PRESSURE;
                            sp - 2.0 * (sp - 1.0) * position as f64 / (n - 1) as f64
                        }
                    })
                    .collect();
                (0..count).map(|_| spin(&order, &weights, rng)).collect()
            }
        }
    }

    fn tournament<R: Rng + ?Sized>(&self, pool: &[Individual], rng: &mut R) -> usize {
        let mut best = rng.random_range(0..pool.len());
        for _ in 1..self.tournament_size {
            let challenger = rng.random_range(0..pool.len());
            if compare_fitness_rank(&pool[challenger], &pool[best]) == Ordering::Less {
                best = challenger;
            }
        }
        best
    }
}

/// Fitness-proportionate draw over `order` with matching `weights`
fn spin<R: Rng + ?Sized>(order: &[usize], weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return order[rng.random_range(0..order.len())];
    }

    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (idx, weight) in order.iter().zip(weights) {
        cumulative += weight;
        if target < cumulative {
            return *idx;
        }
    }
    order[order.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::parameter_space::Genome;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ranked(id: u64, rank: usize, diversity: f64) -> Individual {
        let mut ind = Individual::new(id, Genome::new(), 0);
        ind.rank = rank;
        ind.diversity = diversity;
        ind
    }

    fn pool() -> Vec<Individual> {
        vec![
            ranked(0, 2, 0.5),
            ranked(1, 0, 0.2),
            ranked(2, 0, 0.9),
            ranked(3, 1, 0.1),
            ranked(4, 3, 1.5),
        ]
    }

    #[test]
    fn test_ranked_order_uses_rank_then_diversity() {
        assert_eq!(ranked_order(&pool()), vec![2, 1, 3, 0, 4]);
    }

    #[test]
    fn test_selection_algorithm_from_str() {
        assert_eq!(
            SelectionAlgorithm::from_str("Tournament").unwrap(),
            SelectionAlgorithm::Tournament
        );
        assert_eq!(
            SelectionAlgorithm::from_str("rank").unwrap(),
            SelectionAlgorithm::Rank
        );
        assert!(SelectionAlgorithm::from_str("elitist").is_err());
    }

    #[test]
    fn test_large_tournament_favours_best() {
        let selector = ParentSelector::new(SelectionAlgorithm::Tournament, 64);
        let mut rng = StdRng::seed_from_u64(11);
        let picks = selector.select_parents(&pool(), 50, &mut rng);
        assert!(picks.iter().all(|&i| i == 2));
    }

    #[test]
    fn test_every_scheme_returns_valid_indices() {
        let pool = pool();
        let mut rng = StdRng::seed_from_u64(5);
        for algorithm in [
            SelectionAlgorithm::Tournament,
            SelectionAlgorithm::Roulette,
            SelectionAlgorithm::Rank,
        ] {
            let picks = ParentSelector::new(algorithm, 2).select_parents(&pool, 200, &mut rng);
            assert_eq!(picks.len(), 200);
            assert!(picks.iter().all(|&i| i < pool.len()));
        }
    }

    #[test]
    fn test_rank_selection_prefers_better_candidates() {
        let pool = pool();
        let mut rng = StdRng::seed_from_u64(99);
        let picks =
            ParentSelector::new(SelectionAlgorithm::Rank, 2).select_parents(&pool, 5000, &mut rng);
        let best = picks.iter().filter(|&&i| i == 2).count();
        let worst = picks.iter().filter(|&&i| i == 4).count();
        assert!(best > worst * 2, "best={} worst={}", best, worst);
    }

    #[test]
    fn test_roulette_prefers_front_zero() {
        let pool = pool();
        let mut rng = StdRng::seed_from_u64(21);
        let picks = ParentSelector::new(SelectionAlgorithm::Roulette, 2)
            .select_parents(&pool, 5000, &mut rng);
        let front_zero = picks.iter().filter(|&&i| pool[i].rank == 0).count();
        // Front 0 carries 2 / (2 + 1/2 + 1/3 + 1/4) ~ 65% of the wheel
        assert!(front_zero > 2900, "front_zero={}", front_zero);
    }
}
