//! Synthesis orchestrator
//!
//! [`SynthesisContext`] owns every engine, the event buffer, the notification
//! bus and the metrics collector. One synthesis cycle runs at a time on a
//! blocking worker; ingestion and the health sweep run as independent async
//! tasks. Lock order is always lifecycle before paper. Query paths read the
//! views published in [`crate::views`] and never wait on a running cycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::adversarial::AdversarialEngine;
use crate::buffer::EventBuffer;
use crate::bus::{EventBus, SynthesisNotification};
use crate::config::Config;
use crate::error::{Result, SynthesisError};
use crate::factor::FactorEngine;
use crate::gp::fitness::{self, MarketSeries};
use crate::gp::{CreationMethod, GpEngine};
use crate::ingest;
use crate::lifecycle::{LifecycleEvent, LifecycleManager, LifecycleStage, StrategyLifecycle, StrategySource};
use crate::observability::{metrics, Logger, MetricsCollector};
use crate::paper::{PaperNotification, PaperTradingEngine};
use crate::tree::StrategyNode;
use crate::types::ObservationEvent;
use crate::views::{AdversarialView, FactorView, GpView, LifecycleView};

/// External walk-forward / regime-stress validation
pub trait ValidationOracle: Send + Sync {
    /// Score in [0, 1] for a strategy awaiting validation, if one is available
    fn score(&self, strategy: &StrategyLifecycle) -> Option<f64>;
}

/// Oracle that never answers; scores arrive via
/// [`SynthesisContext::submit_validation_score`] instead
pub struct NoOracle;

impl ValidationOracle for NoOracle {
    fn score(&self, _strategy: &StrategyLifecycle) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub events: usize,
    pub generation: u64,
    pub best_fitness: f64,
    pub registered_best: Option<String>,
    pub factor_candidates: usize,
    pub adversarial_strategies: usize,
    pub hall_of_fame_candidates: usize,
    pub births: usize,
    pub promotions: usize,
    pub retirements: usize,
    pub paper_updates: usize,
    pub validations: usize,
    pub step_failures: Vec<String>,
}

impl CycleReport {
    fn new(cycle: u64, started_at: DateTime<Utc>, events: usize) -> Self {
        Self {
            cycle,
            started_at,
            duration_ms: 0,
            events,
            generation: 0,
            best_fitness: 0.0,
            registered_best: None,
            factor_candidates: 0,
            adversarial_strategies: 0,
            hall_of_fame_candidates: 0,
            births: 0,
            promotions: 0,
            retirements: 0,
            paper_updates: 0,
            validations: 0,
            step_failures: Vec::new(),
        }
    }

    fn tally(&mut self, events: &[LifecycleEvent]) {
        for event in events {
            match event {
                LifecycleEvent::Birth { .. } => self.births += 1,
                LifecycleEvent::Promoted { .. } => self.promotions += 1,
                LifecycleEvent::Retired { .. } => self.retirements += 1,
            }
        }
    }
}

/// A strategy waiting to be born this cycle
struct Candidate {
    id: String,
    tree: Arc<StrategyNode>,
    source: StrategySource,
    parents: Vec<String>,
}

pub struct SynthesisContext {
    config: Config,
    buffer: RwLock<EventBuffer>,
    gp: Mutex<GpEngine>,
    factor: Mutex<FactorEngine>,
    adversarial: Mutex<AdversarialEngine>,
    paper: Mutex<PaperTradingEngine>,
    lifecycle: Mutex<LifecycleManager>,
    bus: EventBus,
    metrics: MetricsCollector,
    oracle: Arc<dyn ValidationOracle>,
    gp_view: watch::Sender<Arc<GpView>>,
    factor_view: watch::Sender<Arc<FactorView>>,
    adversarial_view: watch::Sender<Arc<AdversarialView>>,
    lifecycle_view: watch::Sender<Arc<LifecycleView>>,
    cycles: AtomicU64,
    skipped: AtomicU64,
    in_flight: AtomicBool,
}

impl SynthesisContext {
    pub fn new(config: Config) -> Self {
        Self::with_oracle(config, Arc::new(NoOracle))
    }

    pub fn with_oracle(config: Config, oracle: Arc<dyn ValidationOracle>) -> Self {
        let gp = GpEngine::new(config.gp.clone());
        let factor = FactorEngine::new(config.nmf.clone());
        let adversarial = AdversarialEngine::new(config.adversarial.clone());
        let lifecycle = LifecycleManager::new(config.lifecycle.clone());
        let (gp_view, _) = watch::channel(Arc::new(GpView::capture(&gp)));
        let (factor_view, _) = watch::channel(Arc::new(FactorView::capture(&factor)));
        let (adversarial_view, _) = watch::channel(Arc::new(AdversarialView::capture(&adversarial)));
        let (lifecycle_view, _) = watch::channel(Arc::new(LifecycleView::capture(&lifecycle)));
        Self {
            buffer: RwLock::new(EventBuffer::new(config.buffer.capacity)),
            gp: Mutex::new(gp),
            factor: Mutex::new(factor),
            adversarial: Mutex::new(adversarial),
            paper: Mutex::new(PaperTradingEngine::new(config.paper.clone())),
            lifecycle: Mutex::new(lifecycle),
            bus: EventBus::new(config.server.push_buffer),
            metrics: MetricsCollector::new(),
            oracle,
            gp_view,
            factor_view,
            adversarial_view,
            lifecycle_view,
            cycles: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn buffer(&self) -> &RwLock<EventBuffer> {
        &self.buffer
    }

    pub fn gp(&self) -> &Mutex<GpEngine> {
        &self.gp
    }

    pub fn factor(&self) -> &Mutex<FactorEngine> {
        &self.factor
    }

    pub fn adversarial(&self) -> &Mutex<AdversarialEngine> {
        &self.adversarial
    }

    pub fn paper(&self) -> &Mutex<PaperTradingEngine> {
        &self.paper
    }

    pub fn lifecycle(&self) -> &Mutex<LifecycleManager> {
        &self.lifecycle
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// GP statistics and hall of fame as of the last completed step
    pub fn gp_view(&self) -> Arc<GpView> {
        self.gp_view.borrow().clone()
    }

    /// Latent factors of the last decomposition
    pub fn factor_view(&self) -> Arc<FactorView> {
        self.factor_view.borrow().clone()
    }

    /// Weaknesses and counter-strategies of the last adversarial pass
    pub fn adversarial_view(&self) -> Arc<AdversarialView> {
        self.adversarial_view.borrow().clone()
    }

    /// Lifecycle records as of the last lifecycle mutation
    pub fn lifecycle_view(&self) -> Arc<LifecycleView> {
        self.lifecycle_view.borrow().clone()
    }

    fn publish_gp_view(&self, gp: &GpEngine) {
        self.gp_view.send_replace(Arc::new(GpView::capture(gp)));
    }

    fn publish_lifecycle_view(&self, lifecycle: &LifecycleManager) {
        self.lifecycle_view.send_replace(Arc::new(LifecycleView::capture(lifecycle)));
    }

    /// Cycles started so far, including one in flight
    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn cycles_skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Buffer one event and run it through the paper portfolios
    pub async fn ingest(&self, event: ObservationEvent) {
        let notifications = {
            let mut paper = self.paper.lock().await;
            paper.process_event(&event)
        };
        self.buffer.write().await.push(event);
        self.metrics.increment(metrics::EVENTS_INGESTED, 1).await;
        self.record_paper_metrics(&notifications).await;
        self.bus.publish_all(notifications);
    }

    /// Normalize and ingest one raw feed message; returns the event count
    pub async fn ingest_raw(&self, text: &str) -> Result<usize> {
        let events = match ingest::normalize(text, &self.config.feed.source_name) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Dropping malformed feed message");
                self.metrics.increment(metrics::MESSAGES_DROPPED, 1).await;
                return Err(e);
            }
        };
        let count = events.len();
        for event in events {
            self.ingest(event).await;
        }
        Ok(count)
    }

    /// Feed an externally computed validation score to the lifecycle gate
    pub async fn submit_validation_score(&self, id: &str, score: f64) -> Result<Vec<LifecycleEvent>> {
        let now = Utc::now();
        let events = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.get(id).is_none() {
                return Err(SynthesisError::UnknownStrategy(id.to_string()));
            }
            let events = lifecycle.apply_validation_score(id, score, now);
            let mut paper = self.paper.lock().await;
            reconcile_paper(&lifecycle, &mut paper, now);
            self.publish_lifecycle_view(&lifecycle);
            events
        };
        self.record_lifecycle_metrics(&events).await;
        publish_lifecycle(&self.bus, &events);
        Ok(events)
    }

    /// Apply health decay and retire what falls below the floor
    pub async fn sweep_health(&self) -> Vec<LifecycleEvent> {
        let now = Utc::now();
        let (events, active) = {
            let mut lifecycle = self.lifecycle.lock().await;
            let events = lifecycle.decay_health(now);
            let mut paper = self.paper.lock().await;
            reconcile_paper(&lifecycle, &mut paper, now);
            self.publish_lifecycle_view(&lifecycle);
            (events, lifecycle.active_count())
        };
        debug!(retired = events.len(), active, "Health sweep complete");
        self.record_lifecycle_metrics(&events).await;
        self.metrics.gauge(metrics::ACTIVE_STRATEGIES, active as f64).await;
        publish_lifecycle(&self.bus, &events);
        events
    }

    /// Run one synthesis cycle on a blocking worker unless one is already running
    pub async fn trigger_cycle(self: &Arc<Self>) -> Option<CycleReport> {
        if !self.claim_cycle() {
            self.record_skip().await;
            return None;
        }
        self.run_claimed_cycle().await
    }

    fn claim_cycle(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs a cycle already claimed with `claim_cycle` and releases the claim
    async fn run_claimed_cycle(self: &Arc<Self>) -> Option<CycleReport> {
        let ctx = Arc::clone(self);
        let joined = tokio::task::spawn_blocking(move || ctx.run_cycle()).await;
        self.in_flight.store(false, Ordering::Release);

        match joined {
            Ok(report) => {
                self.record_cycle_metrics(&report).await;
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Synthesis cycle panicked");
                self.metrics.increment(metrics::STEP_FAILURES, 1).await;
                None
            }
        }
    }

    /// The five pipeline steps, sequentially, against one buffer snapshot.
    ///
    /// Blocks on the engine locks, so call it from a blocking context.
    pub fn run_cycle(&self) -> CycleReport {
        let timer = Instant::now();
        let now = Utc::now();
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let events = self.buffer.blocking_read().snapshot();
        let market = MarketSeries::from_events(&events);
        let orchestration = &self.config.orchestrator;

        let mut report = CycleReport::new(cycle, now, events.len());
        let mut lifecycle_events = Vec::new();
        let mut candidates = Vec::new();

        // 1. one GP generation
        let (generation, backtest) = {
            let mut gp = self.gp.blocking_lock();
            let generation = gp.evolve_on(&market);
            report.generation = generation.generation;
            report.best_fitness = generation.best_fitness;

            self.bus.publish(SynthesisNotification::GenerationComplete {
                generation: generation.generation,
                best_fitness: generation.best_fitness,
                mean_fitness: generation.mean_fitness,
                diversity: generation.diversity,
            });
            if generation.migrated {
                self.bus.publish(SynthesisNotification::MigrationComplete {
                    generation: generation.generation,
                    islands: gp.stats().islands,
                });
            }
            if generation.converged {
                self.bus.publish(SynthesisNotification::EvolutionConverged {
                    generation: generation.generation,
                    stagnant_generations: generation.stagnant_generations,
                });
            }

            if let Some(best) = generation.best.as_ref() {
                if best.fitness >= orchestration.min_register_fitness {
                    report.registered_best = Some(best.id.to_string());
                    candidates.push(Candidate {
                        id: best.id.to_string(),
                        tree: Arc::clone(&best.tree),
                        source: StrategySource::Genetic,
                        parents: best.lineage.parent_ids.iter().map(|p| p.to_string()).collect(),
                    });
                }
            }
            self.publish_gp_view(&gp);
            (gp.generation(), gp.backtest_config())
        };

        // 2. factor decomposition
        if cycle % orchestration.factor_every.max(1) == 0 {
            let outcome = {
                let mut factor = self.factor.blocking_lock();
                let outcome = factor.run(&events);
                self.factor_view.send_replace(Arc::new(FactorView::capture(&factor)));
                outcome
            };
            match outcome {
                Ok(factor_report) => {
                    self.bus.publish(SynthesisNotification::FactorizationComplete {
                        factors: factor_report.factors.len(),
                        iterations: factor_report.iterations,
                        final_error: factor_report.final_error,
                        final_objective: factor_report.final_objective,
                        converged: factor_report.converged,
                    });
                    self.bus.publish(SynthesisNotification::SynthesisComplete {
                        candidates: factor_report.candidates.len(),
                        qualifying: factor_report.qualifying.len(),
                    });
                    report.factor_candidates = factor_report.qualifying.len();

                    let mut gp = self.gp.blocking_lock();
                    for candidate in factor_report.qualifying {
                        if let Err(e) = gp.inject(Arc::clone(&candidate.tree), CreationMethod::Factor) {
                            debug!(candidate = %candidate.id, error = %e, "Factor candidate not injected");
                        }
                        candidates.push(Candidate {
                            id: candidate.id.to_string(),
                            tree: candidate.tree,
                            source: StrategySource::Factor,
                            parents: Vec::new(),
                        });
                    }
                    self.publish_gp_view(&gp);
                }
                Err(SynthesisError::InsufficientData(reason)) => {
                    debug!(cycle, reason = %reason, "Factor step skipped");
                }
                Err(e) => {
                    Logger::step_failure(cycle, "factor", &e.to_string());
                    report.step_failures.push(format!("factor: {}", e));
                }
            }
        }

        // 3. adversarial generation
        if cycle % orchestration.adversarial_every.max(1) == 0 {
            let adversarial_report = {
                let mut adversarial = self.adversarial.blocking_lock();
                let generated = adversarial.generate(&events, now);
                self.adversarial_view.send_replace(Arc::new(AdversarialView::capture(&adversarial)));
                generated
            };
            self.bus.publish(SynthesisNotification::WeaknessStrategiesGenerated {
                analyzed_bots: adversarial_report.analyzed_bots.clone(),
                weaknesses: adversarial_report.weaknesses,
                strategies: adversarial_report.strategies.len(),
            });
            report.adversarial_strategies = adversarial_report.strategies.len();

            let mut gp = self.gp.blocking_lock();
            for strategy in adversarial_report.strategies {
                if let Err(e) = gp.inject(Arc::clone(&strategy.tree), CreationMethod::Adversarial) {
                    Logger::step_failure(cycle, "adversarial", &e.to_string());
                    report.step_failures.push(format!("adversarial: {}", e));
                    continue;
                }
                candidates.push(Candidate {
                    id: strategy.id.to_string(),
                    tree: strategy.tree,
                    source: StrategySource::Adversarial,
                    parents: strategy.target_bots,
                });
            }
            self.publish_gp_view(&gp);
        }

        // 5. hall-of-fame elites, collected before the lifecycle lock is taken
        if cycle % orchestration.hall_of_fame_every.max(1) == 0 {
            let gp = self.gp.blocking_lock();
            for elite in gp
                .hall_of_fame()
                .iter()
                .filter(|e| e.fitness >= orchestration.min_register_fitness)
            {
                report.hall_of_fame_candidates += 1;
                candidates.push(Candidate {
                    id: elite.id.to_string(),
                    tree: Arc::clone(&elite.tree),
                    source: StrategySource::HallOfFame,
                    parents: elite.lineage.parent_ids.iter().map(|p| p.to_string()).collect(),
                });
            }
        }

        let incubating: Vec<(String, Arc<StrategyNode>)> = {
            let mut lifecycle = self.lifecycle.blocking_lock();
            for candidate in candidates {
                lifecycle_events.extend(lifecycle.birth(
                    &candidate.id,
                    candidate.tree,
                    candidate.source,
                    generation,
                    candidate.parents,
                    now,
                ));
            }
            self.publish_lifecycle_view(&lifecycle);
            if market.is_empty() {
                Vec::new()
            } else {
                lifecycle
                    .by_stage(LifecycleStage::Incubation)
                    .into_iter()
                    .map(|r| (r.id.clone(), Arc::clone(&r.tree)))
                    .collect()
            }
        };

        // incubating strategies are re-scored against the same corpus with no lock held
        let evaluations: Vec<_> = incubating
            .into_iter()
            .map(|(id, tree)| (id, fitness::evaluate(&tree, &market, &backtest)))
            .collect();

        {
            let mut lifecycle = self.lifecycle.blocking_lock();
            // records that left incubation meanwhile are ignored by update_incubation
            for (id, evaluation) in evaluations {
                lifecycle_events.extend(lifecycle.update_incubation(
                    &id,
                    evaluation.fitness,
                    evaluation.metrics,
                    generation,
                    now,
                ));
            }

            // 4. paper results and validation
            let mut paper = self.paper.blocking_lock();
            reconcile_paper(&lifecycle, &mut paper, now);
            for id in lifecycle.ids_in(LifecycleStage::Paper) {
                if let Some(result) = paper.get_result(&id) {
                    report.paper_updates += 1;
                    lifecycle_events.extend(lifecycle.update_paper(&id, &result, now));
                }
            }
            for id in lifecycle.ids_in(LifecycleStage::Validation) {
                let score = lifecycle.get(&id).and_then(|r| self.oracle.score(r));
                if let Some(score) = score {
                    report.validations += 1;
                    lifecycle_events.extend(lifecycle.apply_validation_score(&id, score, now));
                }
            }
            reconcile_paper(&lifecycle, &mut paper, now);
            self.publish_lifecycle_view(&lifecycle);
        }

        report.tally(&lifecycle_events);
        publish_lifecycle(&self.bus, &lifecycle_events);
        report.duration_ms = timer.elapsed().as_millis() as u64;
        Logger::cycle_event(cycle, report.duration_ms, report.births, report.retirements);
        self.bus.publish(SynthesisNotification::CycleComplete(report.clone()));
        report
    }

    /// Fixed-interval cycle driver; ticks that land on a running cycle are skipped
    pub async fn run_synthesis_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.orchestrator.cycle_interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick fires immediately; give the buffer one period to fill
        ticker.tick().await;

        info!(interval_secs = period.as_secs(), "Synthesis loop started");
        let mut running: Vec<tokio::task::JoinHandle<Option<CycleReport>>> = Vec::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    running.retain(|handle| !handle.is_finished());
                    if !self.claim_cycle() {
                        self.record_skip().await;
                        continue;
                    }
                    let ctx = Arc::clone(&self);
                    running.push(tokio::spawn(async move { ctx.run_claimed_cycle().await }));
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // never abort mid-generation
        for handle in running {
            if let Err(e) = handle.await {
                error!(error = %e, "In-flight cycle failed during shutdown");
            }
        }
        info!("Synthesis loop stopped");
    }

    pub async fn run_health_sweep(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.orchestrator.health_sweep_interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_health().await;
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Health sweep stopped");
    }

    /// Drain normalized feed events into the context
    pub async fn run_ingestion(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ObservationEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.ingest(event).await,
                    None => break,
                },
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Ingestion stopped");
    }

    async fn record_skip(&self) {
        let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(skipped, "Cycle still in flight, tick skipped");
        self.metrics.increment(metrics::CYCLES_SKIPPED, 1).await;
    }

    async fn record_cycle_metrics(&self, report: &CycleReport) {
        self.metrics.increment(metrics::CYCLES_COMPLETED, 1).await;
        self.metrics
            .increment(metrics::STEP_FAILURES, report.step_failures.len() as u64)
            .await;
        self.metrics.increment(metrics::STRATEGY_BIRTHS, report.births as u64).await;
        self.metrics
            .increment(metrics::STRATEGY_PROMOTIONS, report.promotions as u64)
            .await;
        self.metrics
            .increment(metrics::STRATEGY_RETIREMENTS, report.retirements as u64)
            .await;
        self.metrics.gauge(metrics::BEST_FITNESS, report.best_fitness).await;
        self.metrics
            .gauge(metrics::CYCLE_DURATION_MS, report.duration_ms as f64)
            .await;
        let active = self.lifecycle_view().active_count();
        self.metrics.gauge(metrics::ACTIVE_STRATEGIES, active as f64).await;
    }

    async fn record_lifecycle_metrics(&self, events: &[LifecycleEvent]) {
        let mut tally = CycleReport::new(0, Utc::now(), 0);
        tally.tally(events);
        self.metrics.increment(metrics::STRATEGY_PROMOTIONS, tally.promotions as u64).await;
        self.metrics.increment(metrics::STRATEGY_RETIREMENTS, tally.retirements as u64).await;
    }

    async fn record_paper_metrics(&self, notifications: &[PaperNotification]) {
        let orders = notifications
            .iter()
            .filter(|n| matches!(n, PaperNotification::OrderFilled { .. }))
            .count();
        let halts = notifications
            .iter()
            .filter(|n| matches!(n, PaperNotification::StrategyHalted { .. }))
            .count();
        self.metrics.increment(metrics::PAPER_ORDERS, orders as u64).await;
        self.metrics.increment(metrics::PAPER_HALTS, halts as u64).await;
    }
}

fn publish_lifecycle(bus: &EventBus, events: &[LifecycleEvent]) {
    for event in events {
        let (kind, details) = match event {
            LifecycleEvent::Birth { source, .. } => ("birth", format!("{:?}", source)),
            LifecycleEvent::Promoted { from, to, .. } => ("promoted", format!("{} -> {}", from.as_str(), to.as_str())),
            LifecycleEvent::Retired { reason, .. } => ("retired", reason.clone()),
        };
        Logger::strategy_event(event.id(), kind, &details);
        bus.publish(event.clone());
    }
}

/// Paper portfolios track exactly the strategies at PAPER or beyond
fn reconcile_paper(lifecycle: &LifecycleManager, paper: &mut PaperTradingEngine, now: DateTime<Utc>) {
    let wanted: HashSet<&str> = lifecycle
        .active()
        .filter(|r| {
            matches!(
                r.stage,
                LifecycleStage::Paper | LifecycleStage::Validation | LifecycleStage::Live
            )
        })
        .map(|r| r.id.as_str())
        .collect();

    for id in paper.registered_ids() {
        if !wanted.contains(id.as_str()) {
            paper.unregister_strategy(&id);
        }
    }
    for record in lifecycle.active() {
        if wanted.contains(record.id.as_str()) && !paper.is_registered(&record.id) {
            paper.register_strategy(&record.id, Arc::clone(&record.tree), now);
        }
    }
}
