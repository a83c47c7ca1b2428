//! Adversarial strategy generation
//!
//! Mines the trade histories of the strongest competitors for conditions
//! under which they reliably lose, then builds strategies that take the other
//! side of those trades.

pub mod counter;
pub mod weakness;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::AdversarialConfig;
use crate::types::ObservationEvent;
pub use counter::AdversarialStrategy;
pub use weakness::{BotWeakness, WeaknessCondition, WeaknessKind};

#[derive(Debug, Clone)]
pub struct AdversarialReport {
    pub analyzed_bots: Vec<String>,
    pub weaknesses: usize,
    pub strategies: Vec<AdversarialStrategy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdversarialStats {
    pub analyses: u64,
    pub active_weaknesses: usize,
    pub strategies: usize,
    pub composite_strategies: usize,
    pub strategies_generated: u64,
    pub last_analyzed_bots: Vec<String>,
}

pub struct AdversarialEngine {
    config: AdversarialConfig,
    weaknesses: Vec<BotWeakness>,
    strategies: Vec<AdversarialStrategy>,
    analyses: u64,
    generated: u64,
    last_analyzed: Vec<String>,
}

impl AdversarialEngine {
    pub fn new(config: AdversarialConfig) -> Self {
        Self {
            config,
            weaknesses: Vec::new(),
            strategies: Vec::new(),
            analyses: 0,
            generated: 0,
            last_analyzed: Vec::new(),
        }
    }

    /// Re-analyze the top bots and generate counter-strategies.
    ///
    /// The weakness set is replaced wholesale; strategies accumulate up to
    /// `max_strategies`, oldest dropped first.
    pub fn generate(&mut self, events: &[ObservationEvent], now: DateTime<Utc>) -> AdversarialReport {
        let histories = weakness::trades_by_bot(events);
        let targets = weakness::top_bots(&histories, self.config.top_k);

        let mut weaknesses = Vec::new();
        for bot in &targets {
            if let Some(trades) = histories.get(bot) {
                let found = weakness::analyze_bot(bot, trades, &self.config, now);
                debug!(bot = %bot, trades = trades.len(), weaknesses = found.len(), "Bot analyzed");
                weaknesses.extend(found);
            }
        }

        let mut strategies: Vec<AdversarialStrategy> = weaknesses
            .iter()
            .filter_map(|w| {
                let history = histories.get(&w.bot_id)?;
                counter::counter_strategy(w, history, &self.config, now)
            })
            .collect();
        strategies.extend(counter::shared_strategies(&weaknesses, &histories, &self.config, now));

        self.analyses += 1;
        self.generated += strategies.len() as u64;
        self.weaknesses = weaknesses;
        self.last_analyzed = targets.clone();
        self.strategies.extend(strategies.iter().cloned());
        if self.strategies.len() > self.config.max_strategies {
            let excess = self.strategies.len() - self.config.max_strategies;
            self.strategies.drain(..excess);
        }

        info!(
            bots = targets.len(),
            weaknesses = self.weaknesses.len(),
            strategies = strategies.len(),
            "Adversarial analysis complete"
        );

        AdversarialReport {
            analyzed_bots: targets,
            weaknesses: self.weaknesses.len(),
            strategies,
        }
    }

    pub fn weaknesses(&self) -> &[BotWeakness] {
        &self.weaknesses
    }

    pub fn strategies(&self) -> &[AdversarialStrategy] {
        &self.strategies
    }

    pub fn stats(&self) -> AdversarialStats {
        AdversarialStats {
            analyses: self.analyses,
            active_weaknesses: self.weaknesses.len(),
            strategies: self.strategies.len(),
            composite_strategies: self.strategies.iter().filter(|s| s.composite).count(),
            strategies_generated: self.generated,
            last_analyzed_bots: self.last_analyzed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventPayload, IndicatorSnapshot, Regime, TradePayload, TradeSide};

    fn trade(bot: &str, return_pct: f64, regime: Regime) -> ObservationEvent {
        ObservationEvent::new(
            Utc::now(),
            "test",
            EventPayload::Trade(TradePayload {
                bot_id: bot.to_string(),
                symbol: "BTC".to_string(),
                side: TradeSide::Long,
                price: 100.0,
                quantity: 1.0,
                pnl: return_pct * 10.0,
                return_pct,
            }),
            Some(IndicatorSnapshot {
                price: 100.0,
                regime,
                ..IndicatorSnapshot::default()
            }),
        )
    }

    #[test]
    fn test_generate_replaces_weaknesses() {
        let mut engine = AdversarialEngine::new(AdversarialConfig::default());
        let mut events: Vec<_> = (0..12).map(|_| trade("a", -1.0, Regime::Volatile)).collect();
        events.extend((0..12).map(|_| trade("b", -0.8, Regime::Volatile)));

        let report = engine.generate(&events, Utc::now());
        assert!(report.weaknesses > 0);
        assert!(report.strategies.iter().any(|s| s.composite));
        assert!(report.strategies.iter().all(|s| s.simulated_return > 0.0));
        for w in engine.weaknesses() {
            assert!(w.sample_size >= 5);
            assert!(w.severity > 0.05);
        }

        // the second pass sees only profitable trades: old findings are gone
        let profitable: Vec<_> = (0..12).map(|_| trade("a", 1.0, Regime::Volatile)).collect();
        let report = engine.generate(&profitable, Utc::now());
        assert_eq!(report.weaknesses, 0);
        assert!(engine.weaknesses().is_empty());
        assert_eq!(engine.stats().analyses, 2);
    }

    #[test]
    fn test_strategy_store_is_bounded() {
        let config = AdversarialConfig {
            max_strategies: 3,
            ..AdversarialConfig::default()
        };
        let mut engine = AdversarialEngine::new(config);
        let events: Vec<_> = (0..12).map(|_| trade("a", -1.0, Regime::Volatile)).collect();
        for _ in 0..5 {
            engine.generate(&events, Utc::now());
        }
        assert!(engine.strategies().len() <= 3);
    }
}
