//! Backtest fitness evaluation
//!
//! Events carrying indicator snapshots are grouped per symbol into price
//! series. A strategy steps through each series holding a long, short or flat
//! position, paying commission whenever the position changes. Each series is
//! split chronologically; fitness comes from the in-sample part only and the
//! out-of-sample part measures degradation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::tree::{Action, StrategyNode};
use crate::types::{IndicatorSnapshot, ObservationEvent, Regime, StrategyMetrics};

/// One observation point in a price series
#[derive(Debug, Clone)]
pub struct MarketBar {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub snapshot: IndicatorSnapshot,
}

/// Per-symbol price series built from an event snapshot
#[derive(Debug, Clone, Default)]
pub struct MarketSeries {
    pub series: BTreeMap<String, Vec<MarketBar>>,
}

impl MarketSeries {
    pub fn from_events(events: &[ObservationEvent]) -> Self {
        let mut series: BTreeMap<String, Vec<MarketBar>> = BTreeMap::new();

        for event in events {
            let (Some(snapshot), Some(symbol), Some(price)) = (event.indicators, event.symbol(), event.price())
            else {
                continue;
            };
            let mut snapshot = snapshot;
            snapshot.price = price;
            series.entry(symbol.to_string()).or_default().push(MarketBar {
                timestamp: event.timestamp,
                price,
                snapshot,
            });
        }

        for bars in series.values_mut() {
            bars.sort_by_key(|b| b.timestamp);
        }
        series.retain(|_, bars| bars.len() >= 2);

        Self { series }
    }

    pub fn total_bars(&self) -> usize {
        self.series.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Backtest parameters, taken from the GP configuration
#[derive(Debug, Clone, Copy)]
pub struct BacktestConfig {
    pub commission_rate: f64,
    pub in_sample_fraction: f64,
    pub min_trades: usize,
}

/// Fitness plus the metrics it was derived from
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub fitness: f64,
    pub metrics: StrategyMetrics,
}

#[derive(Debug, Default)]
struct SegmentResult {
    step_returns: Vec<f64>,
    trade_returns: Vec<f64>,
    regime_returns: BTreeMap<Regime, f64>,
}

impl SegmentResult {
    fn merge(&mut self, other: SegmentResult) {
        self.step_returns.extend(other.step_returns);
        self.trade_returns.extend(other.trade_returns);
        for (regime, r) in other.regime_returns {
            *self.regime_returns.entry(regime).or_insert(0.0) += r;
        }
    }
}

/// Evaluate a strategy tree against every series
pub fn evaluate(tree: &StrategyNode, market: &MarketSeries, config: &BacktestConfig) -> Evaluation {
    let mut in_sample = SegmentResult::default();
    let mut out_of_sample = SegmentResult::default();

    for bars in market.series.values() {
        let split = ((bars.len() as f64) * config.in_sample_fraction).floor() as usize;
        let split = split.clamp(1, bars.len());
        in_sample.merge(simulate(tree, &bars[..split], config.commission_rate));
        if split < bars.len() {
            // the out-of-sample segment starts at the last in-sample bar so no step is lost
            out_of_sample.merge(simulate(tree, &bars[split - 1..], config.commission_rate));
        }
    }

    let in_sample_return = compound(&in_sample.step_returns);
    let out_of_sample_return = compound(&out_of_sample.step_returns);

    let metrics = StrategyMetrics {
        total_return: in_sample_return,
        sharpe: sharpe_ratio(&in_sample.trade_returns),
        max_drawdown: max_drawdown(&equity_curve(1.0, &in_sample.step_returns)),
        win_rate: win_rate(&in_sample.trade_returns),
        profit_factor: profit_factor(&in_sample.trade_returns),
        trade_count: in_sample.trade_returns.len(),
        regime_returns: in_sample.regime_returns,
        in_sample_return,
        out_of_sample_return,
        degradation_ratio: degradation_ratio(in_sample_return, out_of_sample_return),
    };

    Evaluation {
        fitness: fitness_score(&metrics, config.min_trades),
        metrics,
    }
}

/// Blend of return, Sharpe, drawdown and win rate, in [0, 1]
pub fn fitness_score(metrics: &StrategyMetrics, min_trades: usize) -> f64 {
    if metrics.trade_count < min_trades {
        return 0.0;
    }
    let return_component = 0.5 + 0.5 * (metrics.total_return * 10.0).tanh();
    let sharpe_component = 0.5 + 0.5 * (metrics.sharpe / 2.0).tanh();
    let drawdown_component = 1.0 - metrics.max_drawdown.clamp(0.0, 1.0);
    let score = 0.35 * return_component
        + 0.30 * sharpe_component
        + 0.20 * drawdown_component
        + 0.15 * metrics.win_rate.clamp(0.0, 1.0);
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Out-of-sample return relative to in-sample return, 0 when in-sample did not profit
pub fn degradation_ratio(in_sample_return: f64, out_of_sample_return: f64) -> f64 {
    if in_sample_return <= 0.0 {
        0.0
    } else {
        out_of_sample_return / in_sample_return
    }
}

fn simulate(tree: &StrategyNode, bars: &[MarketBar], commission_rate: f64) -> SegmentResult {
    let mut result = SegmentResult::default();
    let mut position = 0.0_f64;
    let mut equity = 1.0_f64;
    let mut entry_equity = 1.0_f64;

    for window in bars.windows(2) {
        let (bar, next) = (&window[0], &window[1]);

        let target = match tree.decide(&bar.snapshot) {
            Action::Buy => 1.0,
            Action::Sell => -1.0,
            Action::Hold => position,
        };

        let mut cost = 0.0;
        if target != position {
            cost = commission_rate * (target - position).abs();
            if position != 0.0 {
                result.trade_returns.push((equity * (1.0 - cost / 2.0)) / entry_equity - 1.0);
            }
            position = target;
            entry_equity = equity;
        }

        let bar_return = if bar.price > 0.0 {
            (next.price - bar.price) / bar.price
        } else {
            0.0
        };
        let step = position * bar_return - cost;
        equity *= 1.0 + step;
        result.step_returns.push(step);
        *result.regime_returns.entry(bar.snapshot.regime).or_insert(0.0) += step;
    }

    if position != 0.0 {
        result.trade_returns.push(equity / entry_equity - 1.0);
    }
    result
}

fn compound(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

pub fn equity_curve(start: f64, returns: &[f64]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(returns.len() + 1);
    let mut equity = start;
    curve.push(equity);
    for r in returns {
        equity *= 1.0 + r;
        curve.push(equity);
    }
    curve
}

pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Mean over standard deviation of trade returns, scaled by √n
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    let (mean, std) = mean_std(returns);
    if std <= 1e-12 {
        return 0.0;
    }
    mean / std * (returns.len() as f64).sqrt()
}

/// Largest peak-to-trough decline of an equity curve, as a fraction
pub fn max_drawdown(curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &equity in curve {
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max((peak - equity) / peak);
        }
    }
    worst
}

pub fn win_rate(trade_returns: &[f64]) -> f64 {
    if trade_returns.is_empty() {
        return 0.0;
    }
    trade_returns.iter().filter(|r| **r > 0.0).count() as f64 / trade_returns.len() as f64
}

/// Gross profit over gross loss; capped when there are no losses
pub fn profit_factor(trade_returns: &[f64]) -> f64 {
    let gross_profit: f64 = trade_returns.iter().filter(|r| **r > 0.0).sum();
    let gross_loss: f64 = trade_returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
    if gross_loss <= 1e-12 {
        if gross_profit > 0.0 {
            10.0
        } else {
            0.0
        }
    } else {
        (gross_profit / gross_loss).min(10.0)
    }
}
