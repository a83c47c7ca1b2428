//! Counter-strategy construction and naive payoff simulation

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::weakness::{BotWeakness, TradeRecord, WeaknessCondition, WeaknessKind};
use crate::config::AdversarialConfig;
use crate::tree::{Action, Comparator, IndicatorKind, StrategyNode};
use crate::types::{Regime, TradeSide};

#[derive(Debug, Clone)]
pub struct AdversarialStrategy {
    pub id: Uuid,
    pub tree: Arc<StrategyNode>,
    pub weakness_ids: Vec<Uuid>,
    pub target_bots: Vec<String>,
    pub expected_edge: f64,
    pub confidence: f64,
    pub severity: f64,
    /// Naive expected payoff in percent per trade; an approximation only
    pub simulated_return: f64,
    pub composite: bool,
    pub created_at: DateTime<Utc>,
}

/// Comparator node for a condition observable in an indicator snapshot
fn observable(condition: &WeaknessCondition) -> Option<StrategyNode> {
    let node = match condition {
        WeaknessCondition::Regime { regime } => {
            StrategyNode::threshold(IndicatorKind::RegimeCode, Comparator::Eq, regime.code())
        }
        WeaknessCondition::RsiBelow { value } => StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Lt, *value),
        WeaknessCondition::RsiAbove { value } => StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Gt, *value),
        WeaknessCondition::AtrAbove { value } => StrategyNode::threshold(IndicatorKind::AtrPct, Comparator::Gt, *value),
        WeaknessCondition::VolumeBelow { value } => {
            StrategyNode::threshold(IndicatorKind::VolumeRatio, Comparator::Lt, *value)
        }
        WeaknessCondition::CounterTrend { strength } => {
            // the weak bot fights the trend, so the counter-position rides it
            StrategyNode::threshold(IndicatorKind::TrendStrength, Comparator::Gt, -*strength)
        }
        WeaknessCondition::AfterLosses { .. } | WeaknessCondition::Side { .. } => return None,
    };
    Some(node)
}

fn exit_branch(action: Action, exit_strength: f64) -> StrategyNode {
    // flatten a counter-position once the trend turns hard against it
    let (condition, exit) = match action {
        Action::Buy => (
            StrategyNode::threshold(IndicatorKind::TrendStrength, Comparator::Lt, -exit_strength),
            Action::Sell,
        ),
        _ => (
            StrategyNode::threshold(IndicatorKind::TrendStrength, Comparator::Gt, exit_strength),
            Action::Buy,
        ),
    };
    StrategyNode::conditional(condition, StrategyNode::action(exit), StrategyNode::action(Action::Hold))
}

fn counter_action(biased_side: TradeSide) -> Action {
    match biased_side.opposite() {
        TradeSide::Long => Action::Buy,
        TradeSide::Short => Action::Sell,
    }
}

/// Counter-strategy tree for one weakness
pub fn counter_tree(weakness: &BotWeakness, config: &AdversarialConfig) -> StrategyNode {
    let mut conditions: Vec<StrategyNode> = weakness.conditions.iter().filter_map(observable).collect();
    if conditions.is_empty() {
        conditions.push(StrategyNode::threshold(
            IndicatorKind::RegimeCode,
            Comparator::Eq,
            weakness.dominant_regime.code(),
        ));
    }
    let action = counter_action(weakness.biased_side);
    StrategyNode::conditional(
        StrategyNode::all_of(conditions),
        StrategyNode::action(action),
        exit_branch(action, config.trend_exit_strength),
    )
}

/// Expected payoff of countering a bot, from its own history in `regime`:
/// −avg_return × capture × confidence
pub fn simulate_payoff(history: &[TradeRecord], regime: Regime, confidence: f64, capture: f64) -> Option<f64> {
    let returns: Vec<f64> = history
        .iter()
        .filter(|t| t.regime() == Some(regime))
        .map(|t| t.trade.realized_return_pct())
        .collect();
    if returns.is_empty() {
        return None;
    }
    let avg = returns.iter().sum::<f64>() / returns.len() as f64;
    Some(-avg * capture * confidence)
}

/// Build the single-weakness strategy; `None` when the naive payoff is not positive
pub fn counter_strategy(
    weakness: &BotWeakness,
    history: &[TradeRecord],
    config: &AdversarialConfig,
    now: DateTime<Utc>,
) -> Option<AdversarialStrategy> {
    let simulated_return = simulate_payoff(history, weakness.dominant_regime, weakness.confidence, config.capture_ratio)?;
    if simulated_return <= 0.0 {
        return None;
    }
    Some(AdversarialStrategy {
        id: Uuid::new_v4(),
        tree: Arc::new(counter_tree(weakness, config)),
        weakness_ids: vec![weakness.id],
        target_bots: vec![weakness.bot_id.clone()],
        expected_edge: weakness.expected_edge,
        confidence: weakness.confidence,
        severity: weakness.severity,
        simulated_return,
        composite: false,
        created_at: now,
    })
}

/// Composite strategies for regime weaknesses shared by two or more bots
pub fn shared_strategies(
    weaknesses: &[BotWeakness],
    histories: &std::collections::HashMap<String, Vec<TradeRecord>>,
    config: &AdversarialConfig,
    now: DateTime<Utc>,
) -> Vec<AdversarialStrategy> {
    let mut by_regime: BTreeMap<Regime, Vec<&BotWeakness>> = BTreeMap::new();
    for weakness in weaknesses.iter().filter(|w| w.kind == WeaknessKind::Regime) {
        by_regime.entry(weakness.dominant_regime).or_default().push(weakness);
    }

    by_regime
        .into_iter()
        .filter_map(|(regime, group)| {
            let mut bots: Vec<String> = group.iter().map(|w| w.bot_id.clone()).collect();
            bots.sort();
            bots.dedup();
            if bots.len() < 2 {
                return None;
            }

            let n = group.len() as f64;
            let mean_severity = group.iter().map(|w| w.severity).sum::<f64>() / n;
            let mean_confidence = group.iter().map(|w| w.confidence).sum::<f64>() / n;
            let confidence = (mean_confidence + 0.1 * (bots.len() - 1) as f64).min(0.99);
            let severity = (mean_severity * config.shared_multiplier).min(1.0);

            let payoffs: Vec<f64> = group
                .iter()
                .filter_map(|w| {
                    let history = histories.get(&w.bot_id)?;
                    simulate_payoff(history, regime, confidence, config.capture_ratio)
                })
                .collect();
            if payoffs.is_empty() {
                return None;
            }
            let simulated_return = payoffs.iter().sum::<f64>() / payoffs.len() as f64;
            if simulated_return <= 0.0 {
                return None;
            }

            let longs = group.iter().filter(|w| w.biased_side == TradeSide::Long).count();
            let majority = if longs * 2 >= group.len() {
                TradeSide::Long
            } else {
                TradeSide::Short
            };
            let action = counter_action(majority);
            let tree = StrategyNode::conditional(
                StrategyNode::threshold(IndicatorKind::RegimeCode, Comparator::Eq, regime.code()),
                StrategyNode::action(action),
                exit_branch(action, config.trend_exit_strength),
            );

            Some(AdversarialStrategy {
                id: Uuid::new_v4(),
                tree: Arc::new(tree),
                weakness_ids: group.iter().map(|w| w.id).collect(),
                target_bots: bots,
                expected_edge: group.iter().map(|w| w.expected_edge).sum::<f64>() / n,
                confidence,
                severity,
                simulated_return,
                composite: true,
                created_at: now,
            })
        })
        .collect()
}
