//! Reference fitness evaluator: long-only moving-average crossover with a
//! fixed stop-loss, replayed bar by bar on close prices.
//!
//! Genes: `fast_period` and `slow_period` (integers), `stop_loss_pct`
//! (fraction, e.g. 0.03). Metrics: `total_return_pct`, `max_drawdown_pct`,
//! `win_rate`, `sharpe_ratio`.

use crate::domain::errors::EvaluationFailure;
use crate::domain::optimization::parameter_space::Genome;
use crate::domain::ports::{DatasetHandle, Evaluation, FitnessEvaluator};
use crate::infrastructure::simulation::csv_dataset::CsvDataset;
use statrs::statistics::{Data, Distribution};
use std::collections::BTreeMap;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

pub const FAST_PERIOD: &str = "fast_period";
pub const SLOW_PERIOD: &str = "slow_period";
pub const STOP_LOSS_PCT: &str = "stop_loss_pct";

const ANNUALIZATION: f64 = 252.0;

#[derive(Debug, Clone)]
pub struct SmaCrossEvaluator {
    pub initial_capital: f64,
    /// Fee charged on each side of a trade, as a fraction of notional
    pub fee_pct: f64,
}

impl Default for SmaCrossEvaluator {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            fee_pct: 0.001,
        }
    }
}

struct Position {
    entry_price: f64,
    units: f64,
}

fn integer_gene(genes: &Genome, name: &str) -> Result<usize, EvaluationFailure> {
    genes
        .get(name)
        .and_then(|v| v.as_i64())
        .filter(|v| *v > 0)
        .map(|v| v as usize)
        .ok_or_else(|| EvaluationFailure::Backtest {
            reason: format!("gene {} missing or not a positive integer", name),
        })
}

fn float_gene(genes: &Genome, name: &str) -> Result<f64, EvaluationFailure> {
    genes
        .get(name)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| EvaluationFailure::Backtest {
            reason: format!("gene {} missing or not numeric", name),
        })
}

impl SmaCrossEvaluator {
    fn backtest(
        &self,
        closes: &[f64],
        fast_period: usize,
        slow_period: usize,
        stop_loss_pct: f64,
    ) -> Result<Evaluation, EvaluationFailure> {
        let mut fast = SimpleMovingAverage::new(fast_period).map_err(|e| {
            EvaluationFailure::Backtest {
                reason: format!("fast SMA: {:?}", e),
            }
        })?;
        let mut slow = SimpleMovingAverage::new(slow_period).map_err(|e| {
            EvaluationFailure::Backtest {
                reason: format!("slow SMA: {:?}", e),
            }
        })?;

        let mut cash = self.initial_capital;
        let mut position: Option<Position> = None;
        let mut trade_returns: Vec<f64> = Vec::new();
        let mut equity_curve: Vec<f64> = Vec::with_capacity(closes.len());
        let mut previous: Option<(f64, f64)> = None;

        for (i, &close) in closes.iter().enumerate() {
            let fast_value = fast.next(close);
            let slow_value = slow.next(close);
            let warmed_up = i + 1 >= slow_period;

            if let Some(open) = &position {
                let stopped = close <= open.entry_price * (1.0 - stop_loss_pct);
                let crossed_down = warmed_up && fast_value < slow_value;
                if stopped || crossed_down {
                    cash = open.units * close * (1.0 - self.fee_pct);
                    trade_returns.push(close / open.entry_price - 1.0 - 2.0 * self.fee_pct);
                    position = None;
                }
            } else if warmed_up
                && let Some((prev_fast, prev_slow)) = previous
                && prev_fast <= prev_slow
                && fast_value > slow_value
            {
                let units = cash * (1.0 - self.fee_pct) / close;
                position = Some(Position {
                    entry_price: close,
                    units,
                });
                cash = 0.0;
            }

            if warmed_up {
                previous = Some((fast_value, slow_value));
            }

            let equity = match &position {
                Some(open) => open.units * close,
                None => cash,
            };
            equity_curve.push(equity);
        }

        if let (Some(open), Some(&last)) = (position.take(), closes.last()) {
            cash = open.units * last * (1.0 - self.fee_pct);
            trade_returns.push(last / open.entry_price - 1.0 - 2.0 * self.fee_pct);
            if let Some(final_equity) = equity_curve.last_mut() {
                *final_equity = cash;
            }
        }

        if trade_returns.is_empty() {
            return Err(EvaluationFailure::NoTrades);
        }

        let total_return_pct = (cash / self.initial_capital - 1.0) * 100.0;
        let max_drawdown_pct = max_drawdown_pct(&equity_curve);
        let wins = trade_returns.iter().filter(|r| **r > 0.0).count();
        let win_rate = wins as f64 / trade_returns.len() as f64;
        let sharpe_ratio = sharpe_ratio(&equity_curve);

        Ok(Evaluation::new(BTreeMap::from([
            ("total_return_pct".to_string(), total_return_pct),
            ("max_drawdown_pct".to_string(), max_drawdown_pct),
            ("win_rate".to_string(), win_rate),
            ("sharpe_ratio".to_string(), sharpe_ratio),
        ]))
        .with_diagnostic("trades", trade_returns.len() as f64))
    }
}

fn max_drawdown_pct(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &equity in equity_curve {
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max((peak - equity) / peak);
        }
    }
    worst * 100.0
}

fn sharpe_ratio(equity_curve: &[f64]) -> f64 {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }

    let data = Data::new(returns);
    match (data.mean(), data.std_dev()) {
        (Some(mean), Some(std_dev)) if std_dev > 0.0 => mean / std_dev * ANNUALIZATION.sqrt(),
        _ => 0.0,
    }
}

impl FitnessEvaluator for SmaCrossEvaluator {
    type Dataset = CsvDataset;

    fn evaluate(
        &self,
        genes: &Genome,
        dataset: &CsvDataset,
    ) -> Result<Evaluation, EvaluationFailure> {
        let fast_period = integer_gene(genes, FAST_PERIOD)?;
        let slow_period = integer_gene(genes, SLOW_PERIOD)?;
        let stop_loss_pct = float_gene(genes, STOP_LOSS_PCT)?;

        if fast_period >= slow_period {
            return Err(EvaluationFailure::Backtest {
                reason: format!(
                    "fast_period {} must be below slow_period {}",
                    fast_period, slow_period
                ),
            });
        }

        let closes: Vec<f64> = dataset.replay().iter().map(|b| b.close).collect();
        if closes.len() <= slow_period {
            return Err(EvaluationFailure::NoTrades);
        }

        self.backtest(&closes, fast_period, slow_period, stop_loss_pct)
    }
}
