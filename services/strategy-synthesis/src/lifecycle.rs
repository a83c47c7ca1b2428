//! Strategy lifecycle manager
//!
//! Authoritative registry of every candidate strategy and its stage:
//! BIRTH -> INCUBATION -> PAPER -> VALIDATION -> LIVE, with RETIRED reachable
//! from any stage after birth. Retirement is terminal and the transition
//! history of a record is append-only.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{IncubationCriteria, LifecycleConfig, PaperCriteria};
use crate::paper::PaperResult;
use crate::tree::StrategyNode;
use crate::types::StrategyMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    #[serde(alias = "birth")]
    Birth,
    #[serde(alias = "incubation")]
    Incubation,
    #[serde(alias = "paper")]
    Paper,
    #[serde(alias = "validation")]
    Validation,
    #[serde(alias = "live")]
    Live,
    #[serde(alias = "retired", alias = "RETIREMENT", alias = "retirement")]
    Retired,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Birth => "BIRTH",
            LifecycleStage::Incubation => "INCUBATION",
            LifecycleStage::Paper => "PAPER",
            LifecycleStage::Validation => "VALIDATION",
            LifecycleStage::Live => "LIVE",
            LifecycleStage::Retired => "RETIRED",
        }
    }

    /// Health decay alone never retires these stages
    fn decay_exempt(&self) -> bool {
        matches!(self, LifecycleStage::Birth | LifecycleStage::Incubation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategySource {
    Genetic,
    Factor,
    Adversarial,
    HallOfFame,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTransition {
    pub from: Option<LifecycleStage>,
    pub to: LifecycleStage,
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct StrategyLifecycle {
    pub id: String,
    pub stage: LifecycleStage,
    pub tree: Arc<StrategyNode>,
    pub source: StrategySource,
    pub birth_generation: u64,
    pub parents: Vec<String>,
    pub incubation_fitness: Option<f64>,
    pub incubation_metrics: Option<StrategyMetrics>,
    pub paper_result: Option<PaperResult>,
    pub validation_score: Option<f64>,
    pub history: Vec<StageTransition>,
    pub health: f64,
    /// Eligibility marker only; no capital is ever moved
    pub allocation: f64,
    pub born_at: DateTime<Utc>,
    pub stage_entered_at: DateTime<Utc>,
    pub last_evaluated_at: DateTime<Utc>,
    pub retirement_reason: Option<String>,
}

impl StrategyLifecycle {
    fn transition(&mut self, to: LifecycleStage, reason: &str, now: DateTime<Utc>) {
        self.history.push(StageTransition {
            from: Some(self.stage),
            to,
            at: now,
            reason: reason.to_string(),
        });
        self.stage = to;
        self.stage_entered_at = now;
    }

    /// Undecayed health from the best available evaluation
    fn base_health(&self, neutral: f64) -> f64 {
        if let Some(fitness) = self.incubation_fitness {
            return fitness.clamp(0.0, 1.0);
        }
        if let Some(result) = &self.paper_result {
            return paper_health(result.return_pct);
        }
        neutral.clamp(0.0, 1.0)
    }
}

/// Coarse profitability signal: neutral at 0%, saturating at ±10%
fn paper_health(return_pct: f64) -> f64 {
    (0.5 + return_pct / 20.0).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Birth {
        id: String,
        source: StrategySource,
        generation: u64,
        at: DateTime<Utc>,
    },
    Promoted {
        id: String,
        from: LifecycleStage,
        to: LifecycleStage,
        at: DateTime<Utc>,
    },
    Retired {
        id: String,
        from: LifecycleStage,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn id(&self) -> &str {
        match self {
            LifecycleEvent::Birth { id, .. }
            | LifecycleEvent::Promoted { id, .. }
            | LifecycleEvent::Retired { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleStats {
    pub active: usize,
    pub retired: usize,
    pub by_stage: BTreeMap<LifecycleStage, usize>,
    pub births: u64,
    pub promotions: u64,
    pub retirements: u64,
    pub average_health: f64,
    pub max_active: usize,
}

/// Criteria a strategy fails for promotion out of incubation
pub fn incubation_failures(
    criteria: &IncubationCriteria,
    fitness: f64,
    metrics: &StrategyMetrics,
) -> Vec<&'static str> {
    let mut failed = Vec::new();
    if fitness < criteria.min_fitness {
        failed.push("fitness");
    }
    if metrics.trade_count < criteria.min_trades {
        failed.push("trade_count");
    }
    if metrics.max_drawdown > criteria.max_drawdown {
        failed.push("max_drawdown");
    }
    if metrics.win_rate < criteria.min_win_rate {
        failed.push("win_rate");
    }
    if metrics.sharpe < criteria.min_sharpe {
        failed.push("sharpe");
    }
    if metrics.degradation_ratio < criteria.min_degradation_ratio {
        failed.push("degradation_ratio");
    }
    failed
}

/// Criteria a strategy fails for promotion out of paper trading
pub fn paper_failures(criteria: &PaperCriteria, result: &PaperResult, elapsed_hours: f64) -> Vec<&'static str> {
    let mut failed = Vec::new();
    if elapsed_hours < criteria.min_hours {
        failed.push("elapsed_hours");
    }
    if result.trade_count < criteria.min_trades {
        failed.push("trade_count");
    }
    if result.return_pct < criteria.min_return_pct {
        failed.push("return");
    }
    if result.max_drawdown_pct > criteria.max_drawdown_pct {
        failed.push("max_drawdown");
    }
    if result.win_rate < criteria.min_win_rate {
        failed.push("win_rate");
    }
    if result.sharpe < criteria.min_sharpe {
        failed.push("sharpe");
    }
    failed
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
}

pub struct LifecycleManager {
    config: LifecycleConfig,
    active: HashMap<String, StrategyLifecycle>,
    retired: HashMap<String, StrategyLifecycle>,
    births: u64,
    promotions: u64,
    retirements: u64,
}

impl LifecycleManager {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            active: HashMap::new(),
            retired: HashMap::new(),
            births: 0,
            promotions: 0,
            retirements: 0,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Register a new strategy and move it straight into incubation.
    ///
    /// Known ids (active or retired) are ignored.
    pub fn birth(
        &mut self,
        id: &str,
        tree: Arc<StrategyNode>,
        source: StrategySource,
        generation: u64,
        parents: Vec<String>,
        now: DateTime<Utc>,
    ) -> Vec<LifecycleEvent> {
        if self.active.contains_key(id) || self.retired.contains_key(id) {
            debug!(strategy = %id, "Birth ignored, strategy already known");
            return Vec::new();
        }

        let mut record = StrategyLifecycle {
            id: id.to_string(),
            stage: LifecycleStage::Birth,
            tree,
            source,
            birth_generation: generation,
            parents,
            incubation_fitness: None,
            incubation_metrics: None,
            paper_result: None,
            validation_score: None,
            history: vec![StageTransition {
                from: None,
                to: LifecycleStage::Birth,
                at: now,
                reason: "born".to_string(),
            }],
            health: self.config.initial_health.clamp(0.0, 1.0),
            allocation: 0.0,
            born_at: now,
            stage_entered_at: now,
            last_evaluated_at: now,
            retirement_reason: None,
        };
        record.transition(LifecycleStage::Incubation, "auto-advance", now);
        self.active.insert(id.to_string(), record);
        self.births += 1;
        self.promotions += 1;

        info!(strategy = %id, source = ?source, generation, "Strategy born");
        let mut events = vec![
            LifecycleEvent::Birth {
                id: id.to_string(),
                source,
                generation,
                at: now,
            },
            LifecycleEvent::Promoted {
                id: id.to_string(),
                from: LifecycleStage::Birth,
                to: LifecycleStage::Incubation,
                at: now,
            },
        ];
        events.extend(self.enforce_capacity(now));
        events
    }

    /// Record a fresh backtest for an incubating strategy
    pub fn update_incubation(
        &mut self,
        id: &str,
        fitness: f64,
        metrics: StrategyMetrics,
        current_generation: u64,
        now: DateTime<Utc>,
    ) -> Vec<LifecycleEvent> {
        let criteria = self.config.incubation.clone();
        let Some(record) = self.active.get_mut(id) else {
            return Vec::new();
        };
        if record.stage != LifecycleStage::Incubation {
            return Vec::new();
        }

        let failures = incubation_failures(&criteria, fitness, &metrics);
        record.incubation_fitness = Some(fitness);
        record.incubation_metrics = Some(metrics);
        record.last_evaluated_at = now;
        record.health = record.base_health(self.config.initial_health);

        let generations = current_generation.saturating_sub(record.birth_generation);
        if generations >= criteria.min_generations && failures.is_empty() {
            return self.promote(id, LifecycleStage::Paper, "incubation criteria met", now);
        }
        if generations >= criteria.max_generations {
            let reason = format!("incubation expired after {} generations", generations);
            return self.retire(id, &reason, now);
        }
        debug!(strategy = %id, generations, failed = ?failures, "Incubation continues");
        Vec::new()
    }

    /// Record the latest paper-trading result for a PAPER strategy
    pub fn update_paper(&mut self, id: &str, result: &PaperResult, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        let criteria = self.config.paper.clone();
        let Some(record) = self.active.get_mut(id) else {
            return Vec::new();
        };
        if record.stage != LifecycleStage::Paper {
            return Vec::new();
        }

        record.paper_result = Some(result.clone());
        record.last_evaluated_at = now;
        record.health = record.base_health(self.config.initial_health);
        let elapsed = hours_between(record.stage_entered_at, now);

        if result.return_pct < criteria.retire_return_floor_pct {
            let reason = format!("paper return {:.2}% below floor", result.return_pct);
            return self.retire(id, &reason, now);
        }
        if result.max_drawdown_pct > criteria.retire_drawdown_pct {
            let reason = format!("paper drawdown {:.2}% above cap", result.max_drawdown_pct);
            return self.retire(id, &reason, now);
        }

        let failures = paper_failures(&criteria, result, elapsed);
        if !failures.is_empty() {
            debug!(strategy = %id, elapsed_hours = elapsed, failed = ?failures, "Paper trading continues");
            return Vec::new();
        }

        let mut events = self.promote(id, LifecycleStage::Validation, "paper criteria met", now);
        // a score that arrived during paper trading is applied on entry
        let stored = self
            .active
            .get(id)
            .filter(|r| r.stage == LifecycleStage::Validation)
            .and_then(|r| r.validation_score);
        if let Some(score) = stored {
            events.extend(self.apply_validation_score(id, score, now));
        }
        events
    }

    /// Gate VALIDATION -> LIVE on an external score
    pub fn apply_validation_score(&mut self, id: &str, score: f64, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        if !score.is_finite() {
            return Vec::new();
        }
        let threshold = self.config.validation_threshold;
        let allocation = self.config.live_allocation;
        let Some(record) = self.active.get_mut(id) else {
            return Vec::new();
        };
        let stage = record.stage;
        if !matches!(stage, LifecycleStage::Paper | LifecycleStage::Validation) {
            return Vec::new();
        }
        record.validation_score = Some(score);

        if score < threshold {
            let reason = format!("validation score {:.2} below {:.2}", score, threshold);
            return self.retire(id, &reason, now);
        }
        if stage == LifecycleStage::Validation {
            let events = self.promote(id, LifecycleStage::Live, "validation passed", now);
            if let Some(record) = self.active.get_mut(id) {
                record.allocation = allocation;
            }
            return events;
        }
        debug!(strategy = %id, score, "Validation score stored until paper trading completes");
        Vec::new()
    }

    /// Exponential health decay over every active strategy
    pub fn decay_health(&mut self, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        let half_life = self.config.health_half_life_hours;
        let neutral = self.config.initial_health;
        let floor = self.config.retirement_health_floor;

        let mut doomed = Vec::new();
        for record in self.active.values_mut() {
            let hours = hours_between(record.last_evaluated_at, now);
            let decayed = record.base_health(neutral) * 0.5_f64.powf(hours / half_life);
            record.health = decayed.clamp(0.0, 1.0);
            if record.health < floor && !record.stage.decay_exempt() {
                doomed.push((record.id.clone(), record.health));
            }
        }

        doomed.sort_by(|a, b| a.0.cmp(&b.0));
        let mut events = Vec::new();
        for (id, health) in doomed {
            let reason = format!("health {:.3} below floor", health);
            events.extend(self.retire(&id, &reason, now));
        }
        events
    }

    /// Retire an active strategy; unknown or already retired ids are no-ops
    pub fn retire(&mut self, id: &str, reason: &str, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        let Some(mut record) = self.active.remove(id) else {
            return Vec::new();
        };
        let from = record.stage;
        record.transition(LifecycleStage::Retired, reason, now);
        record.retirement_reason = Some(reason.to_string());
        record.allocation = 0.0;
        self.retired.insert(id.to_string(), record);
        self.retirements += 1;

        info!(strategy = %id, from = from.as_str(), reason, "Strategy retired");
        vec![LifecycleEvent::Retired {
            id: id.to_string(),
            from,
            reason: reason.to_string(),
            at: now,
        }]
    }

    fn promote(&mut self, id: &str, to: LifecycleStage, reason: &str, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        let Some(record) = self.active.get_mut(id) else {
            return Vec::new();
        };
        let from = record.stage;
        record.transition(to, reason, now);
        self.promotions += 1;

        info!(strategy = %id, from = from.as_str(), to = to.as_str(), "Strategy promoted");
        let mut events = vec![LifecycleEvent::Promoted {
            id: id.to_string(),
            from,
            to,
            at: now,
        }];
        events.extend(self.enforce_capacity(now));
        events
    }

    /// Retire the least healthy strategies until back at capacity
    fn enforce_capacity(&mut self, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while self.active.len() > self.config.max_active_strategies {
            let weakest = self
                .active
                .values()
                .min_by(|a, b| {
                    a.health
                        .total_cmp(&b.health)
                        .then_with(|| a.born_at.cmp(&b.born_at))
                        .then_with(|| a.id.cmp(&b.id))
                })
                .map(|r| r.id.clone());
            let Some(id) = weakest else { break };
            events.extend(self.retire(&id, "capacity eviction", now));
        }
        events
    }

    /// Looks in both the active and retired sets
    pub fn get(&self, id: &str) -> Option<&StrategyLifecycle> {
        self.active.get(id).or_else(|| self.retired.get(id))
    }

    pub fn by_stage(&self, stage: LifecycleStage) -> Vec<&StrategyLifecycle> {
        let mut records: Vec<&StrategyLifecycle> = if stage == LifecycleStage::Retired {
            self.retired.values().collect()
        } else {
            self.active.values().filter(|r| r.stage == stage).collect()
        };
        records.sort_by(|a, b| a.born_at.cmp(&b.born_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    pub fn ids_in(&self, stage: LifecycleStage) -> Vec<String> {
        self.by_stage(stage).into_iter().map(|r| r.id.clone()).collect()
    }

    pub fn active(&self) -> impl Iterator<Item = &StrategyLifecycle> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_retired(&self, id: &str) -> bool {
        self.retired.contains_key(id)
    }

    pub fn stats(&self) -> LifecycleStats {
        let mut by_stage = BTreeMap::new();
        for record in self.active.values() {
            *by_stage.entry(record.stage).or_insert(0) += 1;
        }
        if !self.retired.is_empty() {
            by_stage.insert(LifecycleStage::Retired, self.retired.len());
        }
        let average_health = if self.active.is_empty() {
            0.0
        } else {
            self.active.values().map(|r| r.health).sum::<f64>() / self.active.len() as f64
        };

        LifecycleStats {
            active: self.active.len(),
            retired: self.retired.len(),
            by_stage,
            births: self.births,
            promotions: self.promotions,
            retirements: self.retirements,
            average_health,
            max_active: self.config.max_active_strategies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Action;
    use chrono::Duration;

    fn tree() -> Arc<StrategyNode> {
        Arc::new(StrategyNode::action(Action::Hold))
    }

    fn passing_metrics() -> StrategyMetrics {
        StrategyMetrics {
            total_return: 0.12,
            sharpe: 1.2,
            max_drawdown: 0.05,
            win_rate: 0.55,
            trade_count: 50,
            degradation_ratio: 0.7,
            ..StrategyMetrics::default()
        }
    }

    fn passing_paper(trades: usize) -> PaperResult {
        PaperResult {
            strategy_id: "s".to_string(),
            return_pct: 3.0,
            sharpe: 1.5,
            max_drawdown_pct: 4.0,
            win_rate: 0.6,
            profit_factor: 1.8,
            trade_count: trades,
            equity_curve: Vec::new(),
            started_at: Utc::now(),
            halted: false,
        }
    }

    fn manager() -> LifecycleManager {
        LifecycleManager::new(LifecycleConfig::default())
    }

    fn born(m: &mut LifecycleManager, id: &str, now: DateTime<Utc>) {
        m.birth(id, tree(), StrategySource::Genetic, 0, Vec::new(), now);
    }

    #[test]
    fn test_birth_is_idempotent_and_auto_advances() {
        let mut m = manager();
        let now = Utc::now();
        let events = m.birth("s1", tree(), StrategySource::Factor, 3, vec!["p".into()], now);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LifecycleEvent::Birth { .. }));
        assert_eq!(m.get("s1").unwrap().stage, LifecycleStage::Incubation);
        assert_eq!(m.get("s1").unwrap().history.len(), 2);

        assert!(m.birth("s1", tree(), StrategySource::Factor, 3, Vec::new(), now).is_empty());
        assert_eq!(m.active_count(), 1);
    }

    #[test]
    fn test_incubation_promotion_requires_all_criteria() {
        let mut m = manager();
        let now = Utc::now();
        born(&mut m, "s1", now);

        // too early
        assert!(m.update_incubation("s1", 0.9, passing_metrics(), 9, now).is_empty());

        // one failing criterion blocks promotion
        let mut weak = passing_metrics();
        weak.sharpe = 0.5;
        assert!(m.update_incubation("s1", 0.9, weak, 10, now).is_empty());
        assert_eq!(m.get("s1").unwrap().stage, LifecycleStage::Incubation);

        let events = m.update_incubation("s1", 0.9, passing_metrics(), 10, now);
        assert!(matches!(
            events[0],
            LifecycleEvent::Promoted { to: LifecycleStage::Paper, .. }
        ));
        assert_eq!(m.get("s1").unwrap().stage, LifecycleStage::Paper);
    }

    #[test]
    fn test_incubation_expires() {
        let mut m = manager();
        let now = Utc::now();
        born(&mut m, "s1", now);
        let events = m.update_incubation("s1", 0.1, StrategyMetrics::default(), 60, now);
        assert!(matches!(events[0], LifecycleEvent::Retired { .. }));
        assert!(m.is_retired("s1"));
    }

    #[test]
    fn test_paper_promotion_waits_for_window() {
        let mut m = manager();
        let now = Utc::now();
        born(&mut m, "s1", now);
        m.update_incubation("s1", 0.9, passing_metrics(), 10, now);

        assert!(m.update_paper("s1", &passing_paper(30), now + Duration::hours(2)).is_empty());
        let events = m.update_paper("s1", &passing_paper(30), now + Duration::hours(25));
        assert!(matches!(
            events[0],
            LifecycleEvent::Promoted { to: LifecycleStage::Validation, .. }
        ));
    }

    #[test]
    fn test_paper_early_retirement() {
        let mut m = manager();
        let now = Utc::now();
        born(&mut m, "s1", now);
        m.update_incubation("s1", 0.9, passing_metrics(), 10, now);

        let mut losing = passing_paper(5);
        losing.return_pct = -7.5;
        let events = m.update_paper("s1", &losing, now + Duration::hours(1));
        assert!(matches!(events[0], LifecycleEvent::Retired { .. }));
    }

    #[test]
    fn test_validation_score_gates_live() {
        let mut m = manager();
        let now = Utc::now();
        born(&mut m, "s1", now);
        m.update_incubation("s1", 0.9, passing_metrics(), 10, now);

        // a passing score during paper trading is stored, not acted on
        assert!(m.apply_validation_score("s1", 0.8, now).is_empty());
        assert_eq!(m.get("s1").unwrap().stage, LifecycleStage::Paper);

        let events = m.update_paper("s1", &passing_paper(30), now + Duration::hours(30));
        assert_eq!(events.len(), 2);
        let record = m.get("s1").unwrap();
        assert_eq!(record.stage, LifecycleStage::Live);
        assert!((record.allocation - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_low_validation_score_retires() {
        let mut m = manager();
        let now = Utc::now();
        born(&mut m, "s1", now);
        m.update_incubation("s1", 0.9, passing_metrics(), 10, now);
        assert_eq!(m.get("s1").unwrap().stage, LifecycleStage::Paper);

        let events = m.apply_validation_score("s1", 0.25, now);
        assert!(matches!(events[0], LifecycleEvent::Retired { .. }));
        let record = m.get("s1").unwrap();
        assert_eq!(record.stage, LifecycleStage::Retired);
        assert!(record.history.iter().all(|t| t.to != LifecycleStage::Live));
    }

    #[test]
    fn test_retired_never_reappear() {
        let mut m = manager();
        let now = Utc::now();
        born(&mut m, "s1", now);
        m.retire("s1", "manual", now);
        assert!(m.birth("s1", tree(), StrategySource::Genetic, 0, Vec::new(), now).is_empty());
        assert!(m.retire("s1", "again", now).is_empty());
        assert_eq!(m.active_count(), 0);
        assert_eq!(m.by_stage(LifecycleStage::Retired).len(), 1);
    }

    #[test]
    fn test_health_decay_bounds_and_exemptions() {
        let mut m = manager();
        let now = Utc::now();
        born(&mut m, "incubating", now);
        born(&mut m, "paper", now);
        m.update_incubation("paper", 0.9, passing_metrics(), 10, now);

        let later = now + Duration::hours(48);
        m.decay_health(later);
        let health = m.get("paper").unwrap().health;
        assert!((health - 0.45).abs() < 1e-6);

        let events = m.decay_health(now + Duration::hours(24 * 30));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id(), "paper");
        let incubating = m.get("incubating").unwrap();
        assert_eq!(incubating.stage, LifecycleStage::Incubation);
        assert!((0.0..=1.0).contains(&incubating.health));
    }

    #[test]
    fn test_capacity_evicts_lowest_health() {
        let config = LifecycleConfig {
            max_active_strategies: 3,
            ..LifecycleConfig::default()
        };
        let mut m = LifecycleManager::new(config);
        let now = Utc::now();
        for id in ["a", "b", "c"] {
            born(&mut m, id, now);
        }
        m.update_incubation("b", 0.1, StrategyMetrics::default(), 1, now);

        let events = m.birth("d", tree(), StrategySource::Genetic, 0, Vec::new(), now);
        assert!(events.iter().any(|e| matches!(e, LifecycleEvent::Retired { id, .. } if id == "b")));
        assert_eq!(m.active_count(), 3);
        assert!(m.is_retired("b"));
    }
}
