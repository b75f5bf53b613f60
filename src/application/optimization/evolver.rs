//! Generational loop of the genetic optimizer.
//!
//! One generation is split into three phases so the controller can act at
//! the boundary between them:
//!
//! 1. [`PopulationEvolver::evaluate_pending`] scores every unscored
//!    individual on the evaluation worker pool.
//! 2. [`PopulationEvolver::close_generation`] merges population and elite,
//!    recomputes fronts, refreshes the elite set and advances the counter.
//! 3. [`PopulationEvolver::breed_next_generation`] selects parents and
//!    replaces the population with offspring.

use crate::config::OptimizationConfig;
use crate::domain::errors::{ConfigurationError, EvaluationFailure};
use crate::domain::optimization::individual::Individual;
use crate::domain::optimization::objective::ObjectiveSet;
use crate::domain::optimization::parameter_space::{Genome, ParameterSpace};
use crate::domain::optimization::pareto::ParetoSelector;
use crate::domain::optimization::run_state::GenerationSummary;
use crate::domain::optimization::selection::{ParentSelector, ranked_order};
use crate::domain::ports::{Evaluation, FitnessEvaluator};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error, PartialEq)]
pub enum EvolverError {
    #[error("{pending} individuals still lack fitness; generation cannot close")]
    UnevaluatedIndividuals { pending: usize },
}

/// Counts from one evaluation pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluationStats {
    pub evaluated: usize,
    pub failures: usize,
}

/// What changed when a generation closed
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub generation: u64,
    pub summary: GenerationSummary,
    pub elite_added: Vec<u64>,
    pub elite_removed: Vec<u64>,
}

/// Bounded pool that runs fitness evaluations off the async runtime
pub struct EvaluationWorkers {
    pool: Arc<ThreadPool>,
    size: usize,
}

impl EvaluationWorkers {
    pub fn new(size: usize) -> Result<Self, ConfigurationError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("evotrade-eval-{}", i))
            .build()
            .map_err(|e| ConfigurationError::InvalidRuntimeSetting {
                setting: "evaluation_concurrency",
                reason: e.to_string(),
            })?;

        Ok(Self {
            pool: Arc::new(pool),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

pub struct PopulationEvolver {
    space: ParameterSpace,
    objectives: ObjectiveSet,
    population_size: usize,
    elite_size: usize,
    crossover_offspring: usize,
    chance_of_mutation: f64,
    parent_selector: ParentSelector,
    pareto: ParetoSelector,
    rng: StdRng,
    next_id: u64,
    generation: u64,
    population: Vec<Individual>,
    elite: Vec<Individual>,
    /// Ranked candidate pool of the last closed generation
    pool: Vec<Individual>,
}

impl PopulationEvolver {
    /// Builds the evolver and samples the initial population
    pub fn new(config: &OptimizationConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let space = config.parameter_space()?;
        let objectives = config.objective_set()?;
        let seed = config.seed.unwrap_or_else(rand::random);

        let mut evolver = Self {
            pareto: ParetoSelector::new(objectives.weights()),
            space,
            objectives,
            population_size: config.population_size,
            elite_size: config.elite_size,
            crossover_offspring: config.crossover_offspring(),
            chance_of_mutation: config.chance_of_mutation,
            parent_selector: ParentSelector::new(
                config.selection_algorithm,
                config.tournament_size,
            ),
            rng: StdRng::seed_from_u64(seed),
            next_id: 0,
            generation: 0,
            population: Vec::with_capacity(config.population_size),
            elite: Vec::with_capacity(config.elite_size),
            pool: Vec::new(),
        };

        for _ in 0..evolver.population_size {
            let genes = evolver.space.sample(&mut evolver.rng);
            let individual = evolver.spawn(genes);
            evolver.population.push(individual);
        }

        debug!(
            "Evolver: Initialized population of {} (seed={})",
            evolver.population_size, seed
        );
        Ok(evolver)
    }

    fn spawn(&mut self, genes: Genome) -> Individual {
        let id = self.next_id;
        self.next_id += 1;
        Individual::new(id, genes, self.generation + 1)
    }

    /// Number of fully evaluated generations
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn elite(&self) -> &[Individual] {
        &self.elite
    }

    pub fn objectives(&self) -> &ObjectiveSet {
        &self.objectives
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn pending_evaluations(&self) -> usize {
        self.population.iter().filter(|i| !i.is_evaluated()).count()
    }

    /// Scores every individual lacking fitness. Failures and panics inside
    /// the evaluator become the sentinel fitness; nothing propagates.
    pub async fn evaluate_pending<E: FitnessEvaluator>(
        &mut self,
        evaluator: &Arc<E>,
        dataset: &Arc<E::Dataset>,
        workers: &EvaluationWorkers,
    ) -> EvaluationStats {
        let pending: Vec<(usize, Genome)> = self
            .population
            .iter()
            .enumerate()
            .filter(|(_, ind)| !ind.is_evaluated())
            .map(|(idx, ind)| (idx, ind.genes().clone()))
            .collect();

        if pending.is_empty() {
            return EvaluationStats::default();
        }

        let evaluator = Arc::clone(evaluator);
        let dataset = Arc::clone(dataset);
        let pool = Arc::clone(&workers.pool);
        let indices: Vec<usize> = pending.iter().map(|(idx, _)| *idx).collect();

        let joined = tokio::task::spawn_blocking(move || {
            pool.install(|| {
                pending
                    .into_par_iter()
                    .map(|(idx, genes)| {
                        let outcome = catch_unwind(AssertUnwindSafe(|| {
                            evaluator.evaluate(&genes, &dataset)
                        }))
                        .unwrap_or_else(|_| {
                            Err(EvaluationFailure::Backtest {
                                reason: "evaluator panicked".to_string(),
                            })
                        });
                        (idx, outcome)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .await;

        let results = match joined {
            Ok(results) => results,
            Err(e) => {
                error!("Evolver: Evaluation batch aborted: {}", e);
                indices
                    .into_iter()
                    .map(|idx| {
                        (
                            idx,
                            Err(EvaluationFailure::Backtest {
                                reason: e.to_string(),
                            }),
                        )
                    })
                    .collect()
            }
        };

        let mut stats = EvaluationStats::default();
        for (idx, outcome) in results {
            let failed = !self.assign(idx, outcome);
            stats.evaluated += 1;
            if failed {
                stats.failures += 1;
            }
        }
        stats
    }

    /// Attaches a result to `population[idx]`. Returns false when the
    /// individual ended up with the sentinel fitness.
    fn assign(&mut self, idx: usize, outcome: Result<Evaluation, EvaluationFailure>) -> bool {
        let scored = outcome.and_then(|evaluation| {
            if !evaluation.diagnostics.is_empty() {
                debug!("Evolver: Diagnostics {:?}", evaluation.diagnostics);
            }
            self.objectives.score(&evaluation.metrics)
        });

        let individual = &mut self.population[idx];
        match scored {
            Ok(fitness) => {
                individual.assign_fitness(fitness);
                true
            }
            Err(failure) => {
                debug!(
                    "Evolver: Individual {} scored as worst case: {}",
                    individual.id(),
                    failure
                );
                individual.assign_fitness(self.objectives.sentinel());
                false
            }
        }
    }

    /// Merges the evaluated population with the elite set, recomputes all
    /// fronts from scratch, refreshes the elite and advances the counter.
    pub fn close_generation(&mut self) -> Result<GenerationOutcome, EvolverError> {
        let pending = self.pending_evaluations();
        if pending > 0 {
            return Err(EvolverError::UnevaluatedIndividuals { pending });
        }

        let previous: HashSet<u64> = self.elite.iter().map(|i| i.id()).collect();
        let elite_len = self.elite.len();

        let mut pool: Vec<Individual> = Vec::with_capacity(elite_len + self.population.len());
        pool.extend(self.elite.iter().cloned());
        pool.extend(self.population.iter().cloned());

        let winners = self
            .pareto
            .select_winning_population(&mut pool, self.elite_size);

        for (member, ranked) in self.population.iter_mut().zip(&pool[elite_len..]) {
            member.rank = ranked.rank;
            member.diversity = ranked.diversity;
        }

        self.elite = winners.iter().map(|&i| pool[i].clone()).collect();
        self.pool = pool;
        self.generation += 1;

        let current: HashSet<u64> = self.elite.iter().map(|i| i.id()).collect();
        let elite_added = self
            .elite
            .iter()
            .map(|i| i.id())
            .filter(|id| !previous.contains(id))
            .collect();
        let mut elite_removed: Vec<u64> = previous.difference(&current).copied().collect();
        elite_removed.sort_unstable();

        let mut summary =
            GenerationSummary::from_population(self.generation, &self.objectives, &self.population);
        summary.elite_size = self.elite.len();

        info!(
            "Evolver: Generation {} closed (front0={}, failures={}, elite={})",
            self.generation,
            summary.front_zero_size,
            summary.evaluation_failures,
            summary.elite_size
        );

        Ok(GenerationOutcome {
            generation: self.generation,
            summary,
            elite_added,
            elite_removed,
        })
    }

    /// Replaces the population with offspring bred from the last ranked pool.
    ///
    /// `crossover_offspring` children come from uniform crossover of
    /// selected parents; remaining slots are mutation-only clones of the
    /// top-ranked candidates, each with at least one gene resampled. Every
    /// child then goes through per-gene mutation.
    pub fn breed_next_generation(&mut self) {
        if self.pool.is_empty() {
            return;
        }

        let mut offspring_genes: Vec<Genome> = Vec::with_capacity(self.population_size);

        let parents =
            self.parent_selector
                .select_parents(&self.pool, self.crossover_offspring * 2, &mut self.rng);
        for pair in parents.chunks_exact(2) {
            let child = self.space.crossover(
                self.pool[pair[0]].genes(),
                self.pool[pair[1]].genes(),
                &mut self.rng,
            );
            offspring_genes.push(child);
        }

        let order = ranked_order(&self.pool);
        let mut cursor = 0;
        while offspring_genes.len() < self.population_size {
            let source = &self.pool[order[cursor % order.len()]];
            offspring_genes.push(self.space.mutate_one(source.genes(), &mut self.rng));
            cursor += 1;
        }

        let mut next = Vec::with_capacity(self.population_size);
        for genes in offspring_genes {
            let mutated = self
                .space
                .mutate(&genes, self.chance_of_mutation, &mut self.rng);
            next.push(self.spawn(mutated));
        }

        debug!(
            "Evolver: Bred generation {} ({} crossover, {} clones)",
            self.generation + 1,
            self.crossover_offspring,
            self.population_size - self.crossover_offspring
        );
        self.population = next;
    }
}
