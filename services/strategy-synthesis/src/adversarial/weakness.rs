//! Weakness mining over competitor trade histories

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::AdversarialConfig;
use crate::types::{IndicatorSnapshot, ObservationEvent, Regime, TradePayload, TradeSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaknessKind {
    Regime,
    IndicatorBlindSpot,
    Tilt,
    DirectionalBias,
}

/// Circumstance under which a bot tends to lose
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum WeaknessCondition {
    Regime { regime: Regime },
    RsiBelow { value: f64 },
    RsiAbove { value: f64 },
    AtrAbove { value: f64 },
    VolumeBelow { value: f64 },
    /// Entering against a trend at least this strong
    CounterTrend { strength: f64 },
    /// Trading right after this many consecutive losses
    AfterLosses { streak: usize },
    Side { side: TradeSide },
}

#[derive(Debug, Clone, Serialize)]
pub struct BotWeakness {
    pub id: Uuid,
    pub bot_id: String,
    pub kind: WeaknessKind,
    pub conditions: Vec<WeaknessCondition>,
    pub severity: f64,
    /// Share of the bot's trades that fall under the conditions
    pub frequency: f64,
    /// Return (percent per trade) a counter-position would capture
    pub expected_edge: f64,
    pub sample_size: usize,
    pub confidence: f64,
    pub loss_rate: f64,
    pub avg_return_pct: f64,
    /// Side the bot mostly takes when it loses this way
    pub biased_side: TradeSide,
    pub dominant_regime: Regime,
    pub detected_at: DateTime<Utc>,
}

impl WeaknessCondition {
    /// Whether a trade was taken under this condition
    pub fn matches(&self, record: &TradeRecord) -> bool {
        let side = record.trade.side;
        let Some(s) = record.snapshot.as_ref() else {
            return matches!(self, WeaknessCondition::Side { side: wanted } if *wanted == side);
        };
        match self {
            WeaknessCondition::Regime { regime } => s.regime == *regime,
            WeaknessCondition::RsiBelow { value } => s.rsi < *value,
            WeaknessCondition::RsiAbove { value } => s.rsi > *value,
            WeaknessCondition::AtrAbove { value } => s.atr_pct > *value,
            WeaknessCondition::VolumeBelow { value } => s.volume_ratio < *value,
            WeaknessCondition::CounterTrend { strength } => match side {
                TradeSide::Long => s.trend_strength < -strength,
                TradeSide::Short => s.trend_strength > *strength,
            },
            // streaks depend on trade order, not on a single record
            WeaknessCondition::AfterLosses { .. } => false,
            WeaknessCondition::Side { side: wanted } => *wanted == side,
        }
    }
}

/// One competitor trade with the market state it was taken in
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub trade: TradePayload,
    pub snapshot: Option<IndicatorSnapshot>,
}

impl TradeRecord {
    pub fn is_loss(&self) -> bool {
        self.trade.realized_return_pct() < 0.0
    }

    pub fn regime(&self) -> Option<Regime> {
        self.snapshot.map(|s| s.regime)
    }
}

/// Trade history per bot, in arrival order
pub fn trades_by_bot(events: &[ObservationEvent]) -> HashMap<String, Vec<TradeRecord>> {
    let mut by_bot: HashMap<String, Vec<TradeRecord>> = HashMap::new();
    for event in events {
        if let Some(trade) = event.as_trade() {
            by_bot.entry(trade.bot_id.clone()).or_default().push(TradeRecord {
                trade: trade.clone(),
                snapshot: event.indicators,
            });
        }
    }
    by_bot
}

/// Top `k` bots by cumulative realized PnL
pub fn top_bots(by_bot: &HashMap<String, Vec<TradeRecord>>, k: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = by_bot
        .iter()
        .map(|(bot, trades)| (bot, trades.iter().map(|t| t.trade.pnl).sum::<f64>()))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(k).map(|(bot, _)| bot.clone()).collect()
}

pub fn severity(loss_rate: f64, avg_return_pct: f64, scale: f64) -> f64 {
    (loss_rate * avg_return_pct.abs() / scale.max(1e-9)).min(1.0)
}

pub fn confidence(sample_size: usize, loss_rate: f64) -> f64 {
    let sample_term = 1.0 - (-(sample_size as f64) / 20.0).exp();
    let loss_term = (2.0 * (loss_rate - 0.5)).clamp(0.0, 1.0);
    0.5 * sample_term + 0.5 * loss_term
}

struct SubsetStats {
    sample_size: usize,
    loss_rate: f64,
    avg_return_pct: f64,
    biased_side: TradeSide,
    dominant_regime: Regime,
}

fn subset_stats(subset: &[&TradeRecord]) -> Option<SubsetStats> {
    if subset.is_empty() {
        return None;
    }
    let n = subset.len();
    let losses = subset.iter().filter(|t| t.is_loss()).count();
    let avg = subset.iter().map(|t| t.trade.realized_return_pct()).sum::<f64>() / n as f64;
    let longs = subset.iter().filter(|t| t.trade.side == TradeSide::Long).count();
    let biased_side = if longs * 2 >= n { TradeSide::Long } else { TradeSide::Short };

    let mut regimes: BTreeMap<Regime, usize> = BTreeMap::new();
    for regime in subset.iter().filter_map(|t| t.regime()) {
        *regimes.entry(regime).or_insert(0) += 1;
    }
    let dominant_regime = regimes
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(r, _)| r)
        .unwrap_or_default();

    Some(SubsetStats {
        sample_size: n,
        loss_rate: losses as f64 / n as f64,
        avg_return_pct: avg,
        biased_side,
        dominant_regime,
    })
}

/// Run every analysis for one bot and keep the registrable findings
pub fn analyze_bot(
    bot_id: &str,
    trades: &[TradeRecord],
    config: &AdversarialConfig,
    now: DateTime<Utc>,
) -> Vec<BotWeakness> {
    let total = trades.len();
    if total < config.min_sample_size {
        return Vec::new();
    }
    let mut found = Vec::new();
    let mut consider = |kind: WeaknessKind, conditions: Vec<WeaknessCondition>, subset: Vec<&TradeRecord>, loss_threshold: f64| {
        let Some(stats) = subset_stats(&subset) else {
            return;
        };
        if stats.sample_size < config.min_sample_size || stats.loss_rate <= loss_threshold {
            return;
        }
        if kind == WeaknessKind::Regime && stats.avg_return_pct >= config.max_avg_return_pct {
            return;
        }
        if stats.avg_return_pct >= 0.0 {
            return;
        }
        let severity = severity(stats.loss_rate, stats.avg_return_pct, config.severity_scale);
        if severity <= config.exploit_threshold {
            return;
        }
        found.push(BotWeakness {
            id: Uuid::new_v4(),
            bot_id: bot_id.to_string(),
            kind,
            conditions,
            severity,
            frequency: stats.sample_size as f64 / total as f64,
            expected_edge: -stats.avg_return_pct * config.capture_ratio,
            sample_size: stats.sample_size,
            confidence: confidence(stats.sample_size, stats.loss_rate),
            loss_rate: stats.loss_rate,
            avg_return_pct: stats.avg_return_pct,
            biased_side: stats.biased_side,
            dominant_regime: stats.dominant_regime,
            detected_at: now,
        });
    };

    // regime
    let mut by_regime: BTreeMap<Regime, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in trades {
        if let Some(regime) = trade.regime() {
            by_regime.entry(regime).or_default().push(trade);
        }
    }
    for (regime, subset) in by_regime {
        consider(
            WeaknessKind::Regime,
            vec![WeaknessCondition::Regime { regime }],
            subset,
            config.regime_loss_rate_threshold,
        );
    }

    // indicator conditions
    let indicator_conditions = [
        WeaknessCondition::RsiBelow {
            value: config.rsi_oversold,
        },
        WeaknessCondition::RsiAbove {
            value: config.rsi_overbought,
        },
        WeaknessCondition::AtrAbove {
            value: config.high_atr_pct,
        },
        WeaknessCondition::VolumeBelow {
            value: config.low_volume_ratio,
        },
        WeaknessCondition::CounterTrend {
            strength: config.counter_trend_strength,
        },
    ];
    for condition in indicator_conditions {
        let subset: Vec<&TradeRecord> = trades.iter().filter(|t| condition.matches(t)).collect();
        consider(
            WeaknessKind::IndicatorBlindSpot,
            vec![condition],
            subset,
            config.loss_rate_threshold,
        );
    }

    // tilt: trades taken right after a losing streak, with a loss rate above the bot's baseline
    let baseline_loss = trades.iter().filter(|t| t.is_loss()).count() as f64 / total as f64;
    let streak = config.tilt_streak.max(1);
    let tilted: Vec<&TradeRecord> = trades
        .iter()
        .enumerate()
        .skip(streak)
        .filter(|(i, _)| trades[i - streak..*i].iter().all(|t| t.is_loss()))
        .map(|(_, t)| t)
        .collect();
    let tilt_loss = subset_stats(&tilted).map(|s| s.loss_rate).unwrap_or(0.0);
    if tilt_loss > baseline_loss {
        consider(
            WeaknessKind::Tilt,
            vec![WeaknessCondition::AfterLosses { streak }],
            tilted,
            config.loss_rate_threshold,
        );
    }

    // directional bias
    let longs = trades.iter().filter(|t| t.trade.side == TradeSide::Long).count();
    let shorts = total - longs;
    let bias = (longs as f64 - shorts as f64).abs() / total as f64;
    if bias > config.bias_threshold {
        let side = if longs > shorts { TradeSide::Long } else { TradeSide::Short };
        let biased: Vec<&TradeRecord> = trades.iter().filter(|t| t.trade.side == side).collect();
        let net: f64 = biased.iter().map(|t| t.trade.realized_return_pct()).sum();
        if net < 0.0 {
            consider(
                WeaknessKind::DirectionalBias,
                vec![WeaknessCondition::Side { side }],
                biased,
                config.loss_rate_threshold,
            );
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(side: TradeSide, return_pct: f64, regime: Regime, rsi: f64) -> TradeRecord {
        TradeRecord {
            trade: TradePayload {
                bot_id: "bot".to_string(),
                symbol: "BTC".to_string(),
                side,
                price: 100.0,
                quantity: 1.0,
                pnl: return_pct,
                return_pct,
            },
            snapshot: Some(IndicatorSnapshot {
                price: 100.0,
                rsi,
                regime,
                ..IndicatorSnapshot::default()
            }),
        }
    }

    #[test]
    fn test_severity_and_confidence() {
        assert_eq!(severity(1.0, -2.0, 1.0), 1.0);
        assert!((severity(0.6, -0.5, 1.0) - 0.3).abs() < 1e-12);
        let c = confidence(20, 1.0);
        assert!((c - (0.5 * (1.0 - (-1.0_f64).exp()) + 0.5)).abs() < 1e-12);
        assert!((confidence(10, 0.4) - 0.5 * (1.0 - (-0.5_f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_regime_weakness_detected() {
        let mut trades: Vec<TradeRecord> = (0..20)
            .map(|_| record(TradeSide::Long, -1.5, Regime::Volatile, 50.0))
            .collect();
        trades.extend((0..10).map(|_| record(TradeSide::Short, 1.0, Regime::Trending, 50.0)));

        let found = analyze_bot("bot", &trades, &AdversarialConfig::default(), Utc::now());
        let regime = found
            .iter()
            .find(|w| w.kind == WeaknessKind::Regime)
            .unwrap();
        assert_eq!(regime.conditions, vec![WeaknessCondition::Regime { regime: Regime::Volatile }]);
        assert_eq!(regime.sample_size, 20);
        assert_eq!(regime.biased_side, TradeSide::Long);
        assert!(regime.severity > 0.0);
        assert!(found.iter().all(|w| w.bot_id == "bot"));
        // the profitable trending regime is not a weakness
        assert!(!found
            .iter()
            .any(|w| w.conditions.contains(&WeaknessCondition::Regime { regime: Regime::Trending })));
    }

    #[test]
    fn test_small_samples_are_ignored() {
        let trades: Vec<TradeRecord> = (0..4)
            .map(|_| record(TradeSide::Long, -3.0, Regime::Volatile, 20.0))
            .collect();
        assert!(analyze_bot("bot", &trades, &AdversarialConfig::default(), Utc::now()).is_empty());
    }

    #[test]
    fn test_rsi_blind_spot_and_tilt() {
        let mut trades = Vec::new();
        for i in 0..30 {
            // oversold entries always lose; others alternate
            if i % 3 == 0 {
                trades.push(record(TradeSide::Long, -2.0, Regime::Ranging, 20.0));
            } else {
                let r = if i % 2 == 0 { 0.5 } else { -0.4 };
                trades.push(record(TradeSide::Short, r, Regime::Ranging, 55.0));
            }
        }
        let found = analyze_bot("bot", &trades, &AdversarialConfig::default(), Utc::now());
        let blind = found
            .iter()
            .find(|w| w.conditions == vec![WeaknessCondition::RsiBelow { value: 30.0 }])
            .unwrap();
        assert_eq!(blind.kind, WeaknessKind::IndicatorBlindSpot);
        assert_eq!(blind.sample_size, 10);
        assert_eq!(blind.loss_rate, 1.0);

        for weakness in &found {
            assert!(weakness.sample_size >= 5);
            assert!(weakness.severity > AdversarialConfig::default().exploit_threshold);
        }
    }

    #[test]
    fn test_top_bots_by_pnl() {
        let mut by_bot = HashMap::new();
        by_bot.insert("a".to_string(), vec![record(TradeSide::Long, 1.0, Regime::Quiet, 50.0)]);
        by_bot.insert("b".to_string(), vec![record(TradeSide::Long, 5.0, Regime::Quiet, 50.0)]);
        by_bot.insert("c".to_string(), vec![record(TradeSide::Long, -5.0, Regime::Quiet, 50.0)]);
        assert_eq!(top_bots(&by_bot, 2), vec!["b".to_string(), "a".to_string()]);
    }
}
