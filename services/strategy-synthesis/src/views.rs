//! Read-only views published by the synthesis cycle
//!
//! Query paths read these instead of locking the engines, so a long GP
//! generation or incubation pass never stalls them.

use crate::adversarial::{AdversarialEngine, AdversarialStats, AdversarialStrategy, BotWeakness};
use crate::factor::interpret::LatentFactor;
use crate::factor::{FactorEngine, FactorStats};
use crate::gp::{GpEngine, GpIndividual, GpStats};
use crate::lifecycle::{LifecycleManager, LifecycleStage, LifecycleStats, StrategyLifecycle};

#[derive(Debug, Clone)]
pub struct GpView {
    pub stats: GpStats,
    pub hall_of_fame: Vec<GpIndividual>,
}

impl GpView {
    pub fn capture(engine: &GpEngine) -> Self {
        Self {
            stats: engine.stats(),
            hall_of_fame: engine.hall_of_fame().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FactorView {
    pub stats: FactorStats,
    pub factors: Vec<LatentFactor>,
}

impl FactorView {
    pub fn capture(engine: &FactorEngine) -> Self {
        Self {
            stats: engine.stats(),
            factors: engine.factors().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdversarialView {
    pub stats: AdversarialStats,
    pub weaknesses: Vec<BotWeakness>,
    pub strategies: Vec<AdversarialStrategy>,
}

impl AdversarialView {
    pub fn capture(engine: &AdversarialEngine) -> Self {
        Self {
            stats: engine.stats(),
            weaknesses: engine.weaknesses().to_vec(),
            strategies: engine.strategies().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleView {
    pub stats: LifecycleStats,
    /// Active and retired records, oldest first
    records: Vec<StrategyLifecycle>,
}

impl LifecycleView {
    pub fn capture(manager: &LifecycleManager) -> Self {
        let mut records: Vec<StrategyLifecycle> = manager
            .active()
            .chain(manager.by_stage(LifecycleStage::Retired))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.born_at.cmp(&b.born_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            stats: manager.stats(),
            records,
        }
    }

    pub fn get(&self, id: &str) -> Option<&StrategyLifecycle> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn by_stage(&self, stage: LifecycleStage) -> Vec<&StrategyLifecycle> {
        self.records.iter().filter(|r| r.stage == stage).collect()
    }

    pub fn active(&self) -> impl Iterator<Item = &StrategyLifecycle> {
        self.records.iter().filter(|r| r.stage != LifecycleStage::Retired)
    }

    pub fn active_count(&self) -> usize {
        self.stats.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::lifecycle::StrategySource;
    use crate::tree::{Action, StrategyNode};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[test]
    fn test_lifecycle_view_keeps_retired_records() {
        let mut manager = LifecycleManager::new(LifecycleConfig::default());
        let now = Utc::now();
        let tree = Arc::new(StrategyNode::action(Action::Hold));
        manager.birth("a", Arc::clone(&tree), StrategySource::Genetic, 0, Vec::new(), now);
        manager.birth("b", tree, StrategySource::Factor, 0, Vec::new(), now + Duration::seconds(1));
        manager.retire("a", "manual", now);

        let view = LifecycleView::capture(&manager);
        assert_eq!(view.active_count(), 1);
        assert_eq!(view.active().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(view.by_stage(LifecycleStage::Retired).len(), 1);
        assert_eq!(view.get("a").map(|r| r.stage), Some(LifecycleStage::Retired));
        assert!(view.get("missing").is_none());

        // later changes to the manager do not leak into a captured view
        manager.retire("b", "manual", now);
        assert_eq!(view.active_count(), 1);
    }
}
