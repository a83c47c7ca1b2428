//! End-to-end behavior of the synthesis pipeline through its public API

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strategy_synthesis::adversarial::{WeaknessCondition, WeaknessKind};
use strategy_synthesis::config::{LifecycleConfig, NmfConfig};
use strategy_synthesis::factor::{FactorEngine, GenomeSnapshot, GENE_COUNT};
use strategy_synthesis::{
    Action, Config, LifecycleEvent, LifecycleManager, LifecycleStage, PaperResult, Regime, StrategyMetrics,
    StrategyNode, StrategySource, SynthesisContext, SynthesisNotification,
};

fn hold() -> Arc<StrategyNode> {
    Arc::new(StrategyNode::action(Action::Hold))
}

fn small_config() -> Config {
    let mut config = Config::default();
    config.gp.population_size = 24;
    config.gp.islands = 2;
    config
}

fn passing_metrics() -> StrategyMetrics {
    StrategyMetrics {
        sharpe: 1.2,
        max_drawdown: 0.05,
        win_rate: 0.55,
        trade_count: 50,
        degradation_ratio: 0.7,
        ..StrategyMetrics::default()
    }
}

fn losing_trade(bot: &str, i: usize) -> String {
    serde_json::json!({
        "type": "trade",
        "bot_id": bot,
        "symbol": "BTC/USD",
        "side": "buy",
        "price": 50_000.0 + i as f64 * 10.0,
        "quantity": 0.1,
        "pnl": -15.0,
        "return_pct": -1.2,
        "indicators": {
            "price": 50_000.0 + i as f64 * 10.0,
            "rsi": 55.0,
            "atr_pct": 1.0,
            "regime": "VOLATILE"
        }
    })
    .to_string()
}

#[test]
fn losing_volatile_trades_register_a_regime_weakness() {
    let mut config = small_config();
    config.orchestrator.adversarial_every = 1;
    config.orchestrator.factor_every = 1_000;
    let ctx = SynthesisContext::new(config);

    tokio_test::block_on(async {
        for i in 0..20 {
            ctx.ingest_raw(&losing_trade("botA", i)).await.unwrap();
        }
    });
    assert_eq!(ctx.buffer().blocking_read().len(), 20);

    let report = ctx.run_cycle();
    assert_eq!(report.events, 20);

    let adversarial = ctx.adversarial().blocking_lock();
    let weakness = adversarial
        .weaknesses()
        .iter()
        .find(|w| w.kind == WeaknessKind::Regime)
        .expect("regime weakness registered");
    assert_eq!(weakness.bot_id, "botA");
    assert!(weakness.severity > 0.0);
    assert!(weakness
        .conditions
        .contains(&WeaknessCondition::Regime { regime: Regime::Volatile }));
}

#[test]
fn pnl_only_losing_trades_register_a_regime_weakness() {
    let mut config = small_config();
    config.orchestrator.adversarial_every = 1;
    config.orchestrator.factor_every = 1_000;
    let ctx = SynthesisContext::new(config);

    tokio_test::block_on(async {
        for i in 0..20 {
            let mut trade: serde_json::Value = serde_json::from_str(&losing_trade("botA", i)).unwrap();
            trade.as_object_mut().unwrap().remove("return_pct");
            ctx.ingest_raw(&trade.to_string()).await.unwrap();
        }
    });

    let report = ctx.run_cycle();
    assert_eq!(report.events, 20);

    let adversarial = ctx.adversarial().blocking_lock();
    let weakness = adversarial
        .weaknesses()
        .iter()
        .find(|w| w.kind == WeaknessKind::Regime)
        .expect("regime weakness registered from pnl alone");
    assert!(weakness.severity > 0.0);
    assert!(weakness
        .conditions
        .contains(&WeaknessCondition::Regime { regime: Regime::Volatile }));
}

#[test]
fn gene_anti_correlated_with_fitness_names_an_anti_factor() {
    let mut rng = StdRng::seed_from_u64(7);
    let snapshots: Vec<GenomeSnapshot> = (0..40)
        .map(|i| {
            let mut genome: Vec<f64> = (0..GENE_COUNT).map(|_| rng.gen_range(0.02..0.08)).collect();
            genome[7] = rng.gen_range(0.0..1.0);
            GenomeSnapshot {
                bot_id: format!("bot-{}", i),
                fitness: 1.0 - genome[7] + rng.gen_range(-0.02..0.02),
                genome,
            }
        })
        .collect();

    let config = NmfConfig {
        rank: 2,
        ..NmfConfig::default()
    };
    let mut engine = FactorEngine::new(config);
    let report = engine.run_snapshots(&snapshots).unwrap();

    // the factor that concentrates most of its loading on gene 7
    let share = |loadings: &[f64]| loadings[7] / loadings.iter().sum::<f64>().max(1e-12);
    let factor = report
        .factors
        .iter()
        .max_by(|a, b| share(&a.loadings).total_cmp(&share(&b.loadings)))
        .unwrap();

    assert_eq!(factor.top_gene(), Some(7));
    assert!(factor.fitness_correlation < 0.0);
    assert!(factor.name.starts_with("Anti"), "factor named {}", factor.name);
}

#[test]
fn incubation_criteria_met_after_ten_generations_promotes_to_paper() {
    let mut manager = LifecycleManager::new(LifecycleConfig::default());
    let now = Utc::now();
    manager.birth("s1", hold(), StrategySource::Genetic, 0, Vec::new(), now);
    assert_eq!(manager.get("s1").unwrap().stage, LifecycleStage::Incubation);

    let events = manager.update_incubation("s1", 0.9, passing_metrics(), 10, now);
    assert!(events.iter().any(|e| matches!(
        e,
        LifecycleEvent::Promoted { to: LifecycleStage::Paper, .. }
    )));
    assert_eq!(manager.get("s1").unwrap().stage, LifecycleStage::Paper);
}

#[test]
fn failing_validation_score_in_paper_retires_without_reaching_live() {
    let mut manager = LifecycleManager::new(LifecycleConfig::default());
    let now = Utc::now();
    manager.birth("s1", hold(), StrategySource::Factor, 0, Vec::new(), now);
    manager.update_incubation("s1", 0.9, passing_metrics(), 10, now);
    assert_eq!(manager.get("s1").unwrap().stage, LifecycleStage::Paper);

    manager.apply_validation_score("s1", 0.25, now);

    let record = manager.get("s1").unwrap();
    assert_eq!(record.stage, LifecycleStage::Retired);
    assert!(record.history.iter().all(|t| t.to != LifecycleStage::Live));
    assert!(manager.is_retired("s1"));

    // a passing paper window afterwards changes nothing
    let later = now + Duration::hours(48);
    let result = PaperResult {
        strategy_id: "s1".to_string(),
        return_pct: 4.0,
        sharpe: 1.8,
        max_drawdown_pct: 2.0,
        win_rate: 0.6,
        profit_factor: 2.0,
        trade_count: 30,
        equity_curve: Vec::new(),
        started_at: now,
        halted: false,
    };
    assert!(manager.update_paper("s1", &result, later).is_empty());
    assert_eq!(manager.get("s1").unwrap().stage, LifecycleStage::Retired);
}

#[test]
fn birth_over_capacity_evicts_exactly_the_least_healthy() {
    let mut manager = LifecycleManager::new(LifecycleConfig::default());
    let now = Utc::now();
    for i in 0..30 {
        let id = format!("s{}", i);
        manager.birth(&id, hold(), StrategySource::Genetic, 0, Vec::new(), now);
        let fitness = if i == 17 { 0.1 } else { 0.6 + i as f64 * 0.01 };
        manager.update_incubation(&id, fitness, StrategyMetrics::default(), 1, now);
    }
    assert_eq!(manager.active_count(), 30);

    let events = manager.birth("newcomer", hold(), StrategySource::Adversarial, 1, Vec::new(), now);
    let retired: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            LifecycleEvent::Retired { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();

    assert_eq!(retired, vec!["s17"]);
    assert_eq!(manager.active_count(), 30);
    assert!(manager.get("newcomer").is_some());
    assert!(manager.is_retired("s17"));
}

#[test]
fn retired_strategy_cannot_be_born_again() {
    let mut manager = LifecycleManager::new(LifecycleConfig::default());
    let now = Utc::now();
    manager.birth("s1", hold(), StrategySource::HallOfFame, 3, Vec::new(), now);
    manager.retire("s1", "manual", now);

    assert!(manager
        .birth("s1", hold(), StrategySource::HallOfFame, 4, Vec::new(), now)
        .is_empty());
    assert!(manager.is_retired("s1"));
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn leaderboard_genomes_drive_a_factor_cycle() {
    let mut config = small_config();
    config.orchestrator.factor_every = 1;
    config.orchestrator.adversarial_every = 1_000;
    let ctx = Arc::new(SynthesisContext::new(config));
    let mut rx = ctx.bus().subscribe();

    let mut rng = StdRng::seed_from_u64(11);
    let entries: Vec<serde_json::Value> = (0..12)
        .map(|i| {
            let genome: Vec<f64> = (0..GENE_COUNT).map(|_| rng.gen_range(0.05..1.0)).collect();
            serde_json::json!({
                "bot_id": format!("bot-{}", i),
                "fitness": genome[2],
                "total_pnl": genome[2] * 100.0,
                "genome": genome,
            })
        })
        .collect();
    let msg = serde_json::json!({"type": "leaderboard", "entries": entries}).to_string();
    assert_eq!(ctx.ingest_raw(&msg).await.unwrap(), 12);

    let report = ctx.trigger_cycle().await.expect("cycle ran");
    assert!(report.step_failures.is_empty());

    let mut factorized = false;
    let mut completed = false;
    while let Ok(notification) = rx.try_recv() {
        match notification {
            SynthesisNotification::FactorizationComplete { factors, .. } => factorized = factors == 5,
            SynthesisNotification::CycleComplete(r) => completed = r.cycle == report.cycle,
            _ => {}
        }
    }
    assert!(factorized && completed);
    assert_eq!(ctx.factor().lock().await.factors().len(), 5);
}

#[tokio::test]
async fn submitted_validation_score_promotes_to_live() {
    let ctx = SynthesisContext::new(small_config());
    let start = Utc::now() - Duration::hours(48);
    {
        let mut lifecycle = ctx.lifecycle().lock().await;
        lifecycle.birth("s1", hold(), StrategySource::Genetic, 0, Vec::new(), start);
        lifecycle.update_incubation("s1", 0.9, passing_metrics(), 10, start);
        let result = PaperResult {
            strategy_id: "s1".to_string(),
            return_pct: 3.0,
            sharpe: 1.5,
            max_drawdown_pct: 2.0,
            win_rate: 0.6,
            profit_factor: 2.0,
            trade_count: 25,
            equity_curve: Vec::new(),
            started_at: start,
            halted: false,
        };
        lifecycle.update_paper("s1", &result, Utc::now());
        assert_eq!(lifecycle.get("s1").unwrap().stage, LifecycleStage::Validation);
    }

    let events = ctx.submit_validation_score("s1", 0.8).await.unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        LifecycleEvent::Promoted { to: LifecycleStage::Live, .. }
    )));

    let lifecycle = ctx.lifecycle().lock().await;
    let record = lifecycle.get("s1").unwrap();
    assert_eq!(record.stage, LifecycleStage::Live);
    assert!(record.allocation > 0.0);
    assert!(ctx.paper().lock().await.is_registered("s1"));
}
