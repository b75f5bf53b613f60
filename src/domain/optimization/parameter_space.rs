//! Gene domains and the genetic operators that respect them.
//!
//! A genome is an ordered mapping from gene name to value. Every operator
//! in this module produces values inside the declared domain; nothing
//! downstream re-validates genes.

use crate::domain::errors::ConfigurationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Candidate parameter configuration, keyed by gene name
pub type Genome = BTreeMap<String, GeneValue>;

/// A single gene value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneValue {
    Integer(i64),
    Float(f64),
    Categorical(String),
}

impl GeneValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeneValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GeneValue::Integer(v) => Some(*v as f64),
            GeneValue::Float(v) => Some(*v),
            GeneValue::Categorical(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeneValue::Categorical(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for GeneValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneValue::Integer(v) => write!(f, "{}", v),
            GeneValue::Float(v) => write!(f, "{:.4}", v),
            GeneValue::Categorical(v) => write!(f, "{}", v),
        }
    }
}

fn default_int_step() -> i64 {
    1
}

/// Domain of one optimizable gene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneDomain {
    Integer {
        min: i64,
        max: i64,
        #[serde(default = "default_int_step")]
        step: i64,
    },
    Float {
        min: f64,
        max: f64,
        /// Optional grid resolution; `None` samples continuously
        #[serde(default)]
        step: Option<f64>,
    },
    Categorical {
        values: Vec<String>,
    },
}

impl GeneDomain {
    fn validate(&self) -> Result<(), String> {
        match self {
            GeneDomain::Integer { min, max, step } => {
                if min > max {
                    return Err(format!("min {} > max {}", min, max));
                }
                if *step <= 0 {
                    return Err(format!("step must be positive, got {}", step));
                }
                if max.checked_sub(*min).is_none() {
                    return Err(format!("range {}..={} does not fit in i64", min, max));
                }
            }
            GeneDomain::Float { min, max, step } => {
                if !min.is_finite() || !max.is_finite() {
                    return Err("bounds must be finite".to_string());
                }
                if min > max {
                    return Err(format!("min {} > max {}", min, max));
                }
                if !(max - min).is_finite() {
                    return Err(format!("range {}..={} is too wide", min, max));
                }
                if let Some(step) = step {
                    if !step.is_finite() || *step <= 0.0 {
                        return Err(format!("step must be positive, got {}", step));
                    }
                }
            }
            GeneDomain::Categorical { values } => {
                if values.is_empty() {
                    return Err("categorical set is empty".to_string());
                }
            }
        }
        Ok(())
    }

    /// Draws a value uniformly from the domain
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> GeneValue {
        match self {
            GeneDomain::Integer { min, max, step } => {
                let steps = (max - min) / step;
                let k = rng.random_range(0..=steps);
                GeneValue::Integer(min + k * step)
            }
            GeneDomain::Float { min, max, .. } => {
                let raw = if min == max {
                    *min
                } else {
                    rng.random_range(*min..=*max)
                };
                GeneValue::Float(self.snap_float(raw))
            }
            GeneDomain::Categorical { values } => {
                let idx = rng.random_range(0..values.len());
                GeneValue::Categorical(values[idx].clone())
            }
        }
    }

    /// Rounds to the step grid and clips to [min, max]
    fn snap_float(&self, raw: f64) -> f64 {
        match self {
            GeneDomain::Float { min, max, step } => {
                let snapped = match step {
                    Some(step) => min + ((raw - min) / step).round() * step,
                    None => raw,
                };
                snapped.clamp(*min, *max)
            }
            _ => raw,
        }
    }

    pub fn contains(&self, value: &GeneValue) -> bool {
        match (self, value) {
            (GeneDomain::Integer { min, max, step }, GeneValue::Integer(v)) => {
                v >= min && v <= max && (v - min) % step == 0
            }
            (GeneDomain::Float { min, max, .. }, GeneValue::Float(v)) => {
                v.is_finite() && v >= min && v <= max
            }
            (GeneDomain::Categorical { values }, GeneValue::Categorical(v)) => values.contains(v),
            _ => false,
        }
    }
}

/// A named gene and its domain, as declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneSpec {
    pub name: String,
    #[serde(flatten)]
    pub domain: GeneDomain,
}

impl GeneSpec {
    pub fn integer(name: &str, min: i64, max: i64, step: i64) -> Self {
        Self {
            name: name.to_string(),
            domain: GeneDomain::Integer { min, max, step },
        }
    }

    pub fn float(name: &str, min: f64, max: f64, step: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            domain: GeneDomain::Float { min, max, step },
        }
    }

    pub fn categorical(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            domain: GeneDomain::Categorical {
                values: values.iter().map(|v| v.to_string()).collect(),
            },
        }
    }
}

/// Validated set of gene domains, built once per run
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    genes: Vec<GeneSpec>,
}

impl ParameterSpace {
    pub fn new(genes: Vec<GeneSpec>) -> Result<Self, ConfigurationError> {
        if genes.is_empty() {
            return Err(ConfigurationError::EmptyParameterSpace);
        }

        let mut seen = HashSet::new();
        for gene in &genes {
            if !seen.insert(gene.name.as_str()) {
                return Err(ConfigurationError::DuplicateGene {
                    name: gene.name.clone(),
                });
            }
            gene.domain
                .validate()
                .map_err(|reason| ConfigurationError::InvalidGeneDomain {
                    name: gene.name.clone(),
                    reason,
                })?;
        }

        Ok(Self { genes })
    }

    pub fn genes(&self) -> &[GeneSpec] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// New genome with every gene drawn uniformly from its domain
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Genome {
        self.genes
            .iter()
            .map(|gene| (gene.name.clone(), gene.domain.sample(rng)))
            .collect()
    }

    /// Resamples each gene independently with probability `rate`
    pub fn mutate<R: Rng + ?Sized>(&self, genome: &Genome, rate: f64, rng: &mut R) -> Genome {
        let rate = rate.clamp(0.0, 1.0);
        let mut child = genome.clone();
        for gene in &self.genes {
            if rng.random_bool(rate) {
                child.insert(gene.name.clone(), gene.domain.sample(rng));
            }
        }
        child
    }

    /// Resamples exactly one randomly chosen gene
    pub fn mutate_one<R: Rng + ?Sized>(&self, genome: &Genome, rng: &mut R) -> Genome {
        let mut child = genome.clone();
        let gene = &self.genes[rng.random_range(0..self.genes.len())];
        child.insert(gene.name.clone(), gene.domain.sample(rng));
        child
    }

    /// Uniform crossover: each gene comes from either parent with equal odds
    pub fn crossover<R: Rng + ?Sized>(
        &self,
        parent_a: &Genome,
        parent_b: &Genome,
        rng: &mut R,
    ) -> Genome {
        self.genes
            .iter()
            .map(|gene| {
                let donor = if rng.random_bool(0.5) {
                    parent_a
                } else {
                    parent_b
                };
                let value = donor
                    .get(&gene.name)
                    .filter(|v| gene.domain.contains(v))
                    .cloned()
                    .unwrap_or_else(|| gene.domain.sample(rng));
                (gene.name.clone(), value)
            })
            .collect()
    }

    /// True when the genome has exactly the declared genes, each in domain
    pub fn contains(&self, genome: &Genome) -> bool {
        genome.len() == self.genes.len()
            && self.genes.iter().all(|gene| {
                genome
                    .get(&gene.name)
                    .is_some_and(|value| gene.domain.contains(value))
            })
    }
}
