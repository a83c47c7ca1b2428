//! Island-model genetic programming over strategy trees

pub mod fitness;
pub mod operators;

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GpConfig;
use crate::error::{Result, SynthesisError};
use crate::tree::{random_strategy, StrategyNode, TreeLimits};
use crate::types::{ObservationEvent, StrategyMetrics};
use fitness::{BacktestConfig, MarketSeries};

/// How an individual came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationMethod {
    Random,
    Crossover,
    Mutation,
    Reproduction,
    Migration,
    HallOfFame,
    Factor,
    Adversarial,
    DiversityInjection,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lineage {
    pub parent_ids: Vec<Uuid>,
    pub method: CreationMethod,
    pub island: usize,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct GpIndividual {
    pub id: Uuid,
    pub tree: Arc<StrategyNode>,
    pub fitness: f64,
    /// fitness − parsimony × node count
    pub adjusted_fitness: f64,
    pub metrics: StrategyMetrics,
    pub lineage: Lineage,
}

impl GpIndividual {
    fn new(tree: Arc<StrategyNode>, lineage: Lineage) -> Self {
        Self {
            id: Uuid::new_v4(),
            tree,
            fitness: 0.0,
            adjusted_fitness: f64::MIN,
            metrics: StrategyMetrics::default(),
            lineage,
        }
    }
}

/// Outcome of one generation
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub generation: u64,
    pub best: Option<GpIndividual>,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub diversity: f64,
    pub stagnant_generations: u32,
    pub migrated: bool,
    pub hall_of_fame_reinjected: bool,
    /// Stagnation triggered a diversity injection this generation
    pub converged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpStats {
    pub generation: u64,
    pub population: usize,
    pub islands: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub best_ever_fitness: f64,
    pub diversity: f64,
    pub stagnant_generations: u32,
    pub hall_of_fame_size: usize,
    pub market_bars: usize,
}

pub struct GpEngine {
    config: GpConfig,
    islands: Vec<Vec<GpIndividual>>,
    hall_of_fame: Vec<GpIndividual>,
    generation: u64,
    best_ever: f64,
    stagnant: u32,
    last_best: Option<GpIndividual>,
    last_mean: f64,
    last_diversity: f64,
    last_bars: usize,
    next_injection_island: usize,
    rng: StdRng,
}

impl GpEngine {
    pub fn new(config: GpConfig) -> Self {
        let mut rng = StdRng::from_entropy();
        let islands_n = config.islands.max(1);
        let per_island = (config.population_size / islands_n).max(1);

        let islands = (0..islands_n)
            .map(|island| {
                (0..per_island)
                    .map(|_| {
                        GpIndividual::new(
                            Arc::new(random_strategy(&mut rng, config.init_depth)),
                            Lineage {
                                parent_ids: vec![],
                                method: CreationMethod::Random,
                                island,
                                generation: 0,
                            },
                        )
                    })
                    .collect()
            })
            .collect();

        Self {
            config,
            islands,
            hall_of_fame: Vec::new(),
            generation: 0,
            best_ever: 0.0,
            stagnant: 0,
            last_best: None,
            last_mean: 0.0,
            last_diversity: 1.0,
            last_bars: 0,
            next_injection_island: 0,
            rng,
        }
    }

    pub fn limits(&self) -> TreeLimits {
        TreeLimits {
            max_depth: self.config.max_depth,
            max_nodes: self.config.max_nodes,
        }
    }

    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            commission_rate: self.config.commission_rate,
            in_sample_fraction: self.config.in_sample_fraction,
            min_trades: self.config.min_trades,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Evolve one generation against an event snapshot
    pub fn evolve_generation(&mut self, events: &[ObservationEvent]) -> GenerationReport {
        let market = MarketSeries::from_events(events);
        self.evolve_on(&market)
    }

    /// Evolve one generation against a prebuilt market series
    pub fn evolve_on(&mut self, market: &MarketSeries) -> GenerationReport {
        self.evaluate_population(market);

        let all: Vec<&GpIndividual> = self.islands.iter().flatten().collect();
        let best = all
            .iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
            .map(|i| (*i).clone());
        let best_fitness = best.as_ref().map(|b| b.fitness).unwrap_or(0.0);
        let mean_fitness = if all.is_empty() {
            0.0
        } else {
            all.iter().map(|i| i.fitness).sum::<f64>() / all.len() as f64
        };
        let diversity = diversity(&all);

        self.update_hall_of_fame();

        if best_fitness > self.best_ever + self.config.improvement_epsilon {
            self.best_ever = best_fitness;
            self.stagnant = 0;
        } else {
            self.stagnant += 1;
        }

        for island in 0..self.islands.len() {
            self.breed_island(island);
        }

        self.generation += 1;

        let migrated = self.config.migration_interval > 0
            && self.generation % self.config.migration_interval == 0
            && self.islands.len() > 1;
        if migrated {
            self.migrate();
        }

        let hall_of_fame_reinjected = self.config.hof_reinjection_interval > 0
            && self.generation % self.config.hof_reinjection_interval == 0
            && !self.hall_of_fame.is_empty();
        if hall_of_fame_reinjected {
            self.reinject_hall_of_fame();
        }

        let stagnant_generations = self.stagnant;
        let converged = self.stagnant >= self.config.stagnation_limit;
        if converged {
            info!(
                generation = self.generation,
                stagnant = self.stagnant,
                best_ever = self.best_ever,
                "GP population converged, injecting diversity"
            );
            self.inject_diversity();
            self.stagnant = 0;
        }

        self.last_best = best.clone();
        self.last_mean = mean_fitness;
        self.last_diversity = diversity;
        self.last_bars = market.total_bars();

        debug!(
            generation = self.generation,
            best_fitness,
            mean_fitness,
            diversity,
            bars = self.last_bars,
            "GP generation complete"
        );

        GenerationReport {
            generation: self.generation,
            best,
            best_fitness,
            mean_fitness,
            diversity,
            stagnant_generations,
            migrated,
            hall_of_fame_reinjected,
            converged,
        }
    }

    fn evaluate_population(&mut self, market: &MarketSeries) {
        let backtest = self.backtest_config();
        let parsimony = self.config.parsimony_pressure;
        for individual in self.islands.iter_mut().flatten() {
            let eval = fitness::evaluate(&individual.tree, market, &backtest);
            individual.fitness = eval.fitness;
            individual.adjusted_fitness = eval.fitness - parsimony * individual.tree.node_count() as f64;
            individual.metrics = eval.metrics;
        }
    }

    fn breed_island(&mut self, island: usize) {
        let mut ranked = std::mem::take(&mut self.islands[island]);
        let target = ranked.len();
        let elites = select_elites(&mut ranked, self.config.elite_count);

        let mut next = elites;
        while next.len() < target {
            let child = self.offspring(&ranked, island);
            next.push(child);
        }
        self.islands[island] = next;
    }

    fn offspring(&mut self, ranked: &[GpIndividual], island: usize) -> GpIndividual {
        let limits = self.limits();
        let total_rate = self.config.crossover_rate + self.config.mutation_rate + self.config.reproduction_rate;
        let generation = self.generation + 1;

        let lineage = |parent_ids: Vec<Uuid>, method: CreationMethod| Lineage {
            parent_ids,
            method,
            island,
            generation,
        };

        let mut fallback = None;
        for _ in 0..self.config.max_offspring_attempts.max(1) {
            let Some(parent) = operators::tournament_select(ranked, self.config.tournament_size, &mut self.rng) else {
                break;
            };
            fallback.get_or_insert_with(|| parent.clone());

            let roll = self.rng.gen::<f64>() * total_rate;
            if roll < self.config.crossover_rate {
                let Some(other) = operators::tournament_select(ranked, self.config.tournament_size, &mut self.rng)
                else {
                    continue;
                };
                if let Some(tree) = operators::crossover(&parent.tree, &other.tree, &limits, &mut self.rng) {
                    return GpIndividual::new(
                        Arc::new(tree),
                        lineage(vec![parent.id, other.id], CreationMethod::Crossover),
                    );
                }
            } else if roll < self.config.crossover_rate + self.config.mutation_rate {
                if let Some(tree) = operators::mutate(&parent.tree, &limits, self.config.init_depth, &mut self.rng) {
                    return GpIndividual::new(Arc::new(tree), lineage(vec![parent.id], CreationMethod::Mutation));
                }
            } else {
                return GpIndividual::new(parent.tree.clone(), lineage(vec![parent.id], CreationMethod::Reproduction));
            }
        }

        // every attempt produced an out-of-bounds child: copy a valid parent
        match fallback {
            Some(parent) => GpIndividual::new(parent.tree.clone(), lineage(vec![parent.id], CreationMethod::Reproduction)),
            None => GpIndividual::new(
                Arc::new(random_strategy(&mut self.rng, self.config.init_depth)),
                lineage(vec![], CreationMethod::Random),
            ),
        }
    }

    /// Copy each island's top-K to the next island in the ring, replacing its worst
    fn migrate(&mut self) {
        let n = self.islands.len();
        let mut migrants: Vec<Vec<GpIndividual>> = Vec::with_capacity(n);
        for island in &self.islands {
            let k = ((island.len() as f64) * self.config.migration_rate).ceil() as usize;
            let mut sorted = island.clone();
            sort_by_adjusted(&mut sorted);
            migrants.push(sorted.into_iter().take(k).collect());
        }

        for (source, group) in migrants.into_iter().enumerate() {
            let dest = (source + 1) % n;
            for migrant in group {
                let moved = GpIndividual {
                    id: Uuid::new_v4(),
                    lineage: Lineage {
                        parent_ids: vec![migrant.id],
                        method: CreationMethod::Migration,
                        island: dest,
                        generation: self.generation,
                    },
                    ..migrant
                };
                replace_worst(&mut self.islands[dest], moved);
            }
        }
        debug!(generation = self.generation, islands = n, "Island migration");
    }

    fn update_hall_of_fame(&mut self) {
        let mut seen: HashSet<String> = self.hall_of_fame.iter().map(|i| i.tree.to_string()).collect();
        for individual in self.islands.iter().flatten() {
            if individual.fitness <= 0.0 {
                continue;
            }
            if seen.insert(individual.tree.to_string()) {
                self.hall_of_fame.push(individual.clone());
            } else if let Some(existing) = self
                .hall_of_fame
                .iter_mut()
                .find(|h| h.tree.to_string() == individual.tree.to_string())
            {
                // keep the latest evaluation of a known tree
                if individual.fitness > existing.fitness {
                    *existing = individual.clone();
                }
            }
        }
        self.hall_of_fame.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        self.hall_of_fame.truncate(self.config.hall_of_fame_size);
    }

    fn reinject_hall_of_fame(&mut self) {
        let n = self.islands.len();
        let members = self.hall_of_fame.clone();
        for (i, member) in members.into_iter().enumerate() {
            let island = i % n;
            let copy = GpIndividual::new(
                member.tree.clone(),
                Lineage {
                    parent_ids: vec![member.id],
                    method: CreationMethod::HallOfFame,
                    island,
                    generation: self.generation,
                },
            );
            replace_worst(&mut self.islands[island], copy);
        }
        debug!(generation = self.generation, "Hall of Fame reinjected");
    }

    fn inject_diversity(&mut self) {
        let fraction = self.config.stagnation_replace_fraction;
        let depth = self.config.init_depth;
        let generation = self.generation;
        for (island_idx, island) in self.islands.iter_mut().enumerate() {
            let count = ((island.len() as f64) * fraction).ceil() as usize;
            sort_by_adjusted(island);
            let keep = island.len().saturating_sub(count);
            island.truncate(keep);
            for _ in 0..count {
                island.push(GpIndividual::new(
                    Arc::new(random_strategy(&mut self.rng, depth)),
                    Lineage {
                        parent_ids: vec![],
                        method: CreationMethod::DiversityInjection,
                        island: island_idx,
                        generation,
                    },
                ));
            }
        }
    }

    /// Admit an externally produced tree, replacing the worst individual of
    /// the next island in rotation
    pub fn inject(&mut self, tree: Arc<StrategyNode>, method: CreationMethod) -> Result<Uuid> {
        if !tree.within(&self.limits()) {
            return Err(SynthesisError::InvalidTree {
                depth: tree.depth(),
                nodes: tree.node_count(),
            });
        }
        let island = self.next_injection_island % self.islands.len();
        self.next_injection_island = self.next_injection_island.wrapping_add(1);

        let individual = GpIndividual::new(
            tree,
            Lineage {
                parent_ids: vec![],
                method,
                island,
                generation: self.generation,
            },
        );
        let id = individual.id;
        replace_worst(&mut self.islands[island], individual);
        Ok(id)
    }

    pub fn hall_of_fame(&self) -> &[GpIndividual] {
        &self.hall_of_fame
    }

    /// Best individual of the last evaluated generation
    pub fn best(&self) -> Option<&GpIndividual> {
        self.last_best.as_ref()
    }

    pub fn population_size(&self) -> usize {
        self.islands.iter().map(|i| i.len()).sum()
    }

    pub fn stats(&self) -> GpStats {
        GpStats {
            generation: self.generation,
            population: self.population_size(),
            islands: self.islands.len(),
            best_fitness: self.last_best.as_ref().map(|b| b.fitness).unwrap_or(0.0),
            mean_fitness: self.last_mean,
            best_ever_fitness: self.best_ever,
            diversity: self.last_diversity,
            stagnant_generations: self.stagnant,
            hall_of_fame_size: self.hall_of_fame.len(),
            market_bars: self.last_bars,
        }
    }
}

fn sort_by_adjusted(population: &mut [GpIndividual]) {
    population.sort_by(|a, b| b.adjusted_fitness.total_cmp(&a.adjusted_fitness));
}

/// Rank by adjusted fitness (best first) and return copies of the top `count`
pub fn select_elites(population: &mut [GpIndividual], count: usize) -> Vec<GpIndividual> {
    sort_by_adjusted(population);
    population.iter().take(count).cloned().collect()
}

fn replace_worst(island: &mut Vec<GpIndividual>, newcomer: GpIndividual) {
    let worst = island
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.adjusted_fitness.total_cmp(&b.adjusted_fitness))
        .map(|(i, _)| i);
    match worst {
        Some(i) => island[i] = newcomer,
        None => island.push(newcomer),
    }
}

/// Share of distinct trees in the population
fn diversity(population: &[&GpIndividual]) -> f64 {
    if population.is_empty() {
        return 0.0;
    }
    let distinct: HashSet<String> = population.iter().map(|i| i.tree.to_string()).collect();
    distinct.len() as f64 / population.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Action, Comparator, IndicatorKind};
    use crate::types::{EventPayload, IndicatorSnapshot, TradePayload, TradeSide};
    use chrono::{Duration, Utc};

    fn small_config() -> GpConfig {
        GpConfig {
            population_size: 30,
            islands: 3,
            elite_count: 2,
            min_trades: 1,
            migration_interval: 2,
            hof_reinjection_interval: 3,
            stagnation_limit: 4,
            ..GpConfig::default()
        }
    }

    fn market_events(n: i64) -> Vec<ObservationEvent> {
        (0..n)
            .map(|i| {
                let price = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05;
                let snapshot = IndicatorSnapshot {
                    price,
                    rsi: 50.0 + (i as f64 * 0.3).cos() * 30.0,
                    trend_strength: (i as f64 * 0.3).cos(),
                    ..IndicatorSnapshot::default()
                };
                ObservationEvent::new(
                    Utc::now() + Duration::seconds(i),
                    "test",
                    EventPayload::Trade(TradePayload {
                        bot_id: "bot".to_string(),
                        symbol: "ETH".to_string(),
                        side: TradeSide::Long,
                        price,
                        quantity: 1.0,
                        pnl: 0.0,
                        return_pct: 0.0,
                    }),
                    Some(snapshot),
                )
            })
            .collect()
    }

    fn individual(adjusted: f64) -> GpIndividual {
        let mut i = GpIndividual::new(
            Arc::new(StrategyNode::action(Action::Hold)),
            Lineage {
                parent_ids: vec![],
                method: CreationMethod::Random,
                island: 0,
                generation: 0,
            },
        );
        i.adjusted_fitness = adjusted;
        i
    }

    #[test]
    fn test_elites_dominate_non_elites() {
        let mut population: Vec<GpIndividual> = [0.3, 0.9, 0.1, 0.5, 0.7, 0.2].iter().map(|f| individual(*f)).collect();
        let elites = select_elites(&mut population, 2);

        let elite_ids: HashSet<Uuid> = elites.iter().map(|e| e.id).collect();
        let worst_elite = elites.iter().map(|e| e.adjusted_fitness).fold(f64::MAX, f64::min);
        for other in population.iter().filter(|p| !elite_ids.contains(&p.id)) {
            assert!(worst_elite >= other.adjusted_fitness);
        }
        assert_eq!(elites[0].adjusted_fitness, 0.9);
        assert_eq!(elites[1].adjusted_fitness, 0.7);
    }

    #[test]
    fn test_generations_keep_population_and_bounds() {
        let mut engine = GpEngine::new(small_config());
        let events = market_events(200);
        let limits = engine.limits();

        for _ in 0..12 {
            let report = engine.evolve_generation(&events);
            assert_eq!(engine.population_size(), 30);
            assert!(report.best_fitness >= 0.0 && report.best_fitness <= 1.0);
            for individual in engine.islands.iter().flatten() {
                assert!(individual.tree.within(&limits));
            }
        }

        assert_eq!(engine.generation(), 12);
        assert!(engine.hall_of_fame().len() <= 10);
        let stats = engine.stats();
        assert_eq!(stats.islands, 3);
        assert!(stats.market_bars > 0);

        // HoF is sorted and distinct
        let hof = engine.hall_of_fame();
        for pair in hof.windows(2) {
            assert!(pair[0].fitness >= pair[1].fitness);
        }
        let distinct: HashSet<String> = hof.iter().map(|h| h.tree.to_string()).collect();
        assert_eq!(distinct.len(), hof.len());
    }

    #[test]
    fn test_stagnation_triggers_convergence() {
        // no indicator data at all: fitness stays 0, so every generation is stagnant
        let mut engine = GpEngine::new(small_config());
        let reports: Vec<_> = (0..4).map(|_| engine.evolve_generation(&[])).collect();
        assert!(!reports[2].converged);
        assert!(reports[3].converged);
        assert_eq!(engine.stats().stagnant_generations, 0);
    }

    #[test]
    fn test_inject_validates_shape() {
        let mut engine = GpEngine::new(small_config());
        let good = StrategyNode::conditional(
            StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Lt, 30.0),
            StrategyNode::action(Action::Buy),
            StrategyNode::action(Action::Hold),
        );
        let id = engine.inject(Arc::new(good), CreationMethod::Factor).unwrap();
        assert!(engine.islands.iter().flatten().any(|i| i.id == id));
        assert_eq!(engine.population_size(), 30);

        let mut deep = StrategyNode::action(Action::Buy);
        for _ in 0..10 {
            deep = StrategyNode::conditional(
                StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Lt, 30.0),
                deep,
                StrategyNode::action(Action::Hold),
            );
        }
        assert!(matches!(
            engine.inject(Arc::new(deep), CreationMethod::Adversarial),
            Err(SynthesisError::InvalidTree { .. })
        ));
    }
}
