//! Latent factor mining over competitor genomes
//!
//! Each bot's latest parameter genome is one row of a non-negative gene
//! matrix. Factorizing it exposes groups of genes that move together across
//! the arena; correlating each bot's factor weights with its fitness tells us
//! which groups pay. New genomes are then synthesized in factor space and
//! mapped to strategy trees.

pub mod interpret;
pub mod nmf;
pub mod synthesis;

use std::collections::{BTreeMap, VecDeque};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::NmfConfig;
use crate::error::{Result, SynthesisError};
use crate::tree::{Action, Comparator, IndicatorKind, StrategyNode};
use crate::types::{EventPayload, ObservationEvent};
use interpret::{FactorSignature, LatentFactor};
use synthesis::{FactorCandidate, SynthesisInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneCategory {
    Risk,
    Trend,
    MeanReversion,
    Timing,
    Sizing,
}

impl GeneCategory {
    pub fn label(&self) -> &'static str {
        match self {
            GeneCategory::Risk => "Risk",
            GeneCategory::Trend => "Trend",
            GeneCategory::MeanReversion => "MeanReversion",
            GeneCategory::Timing => "Timing",
            GeneCategory::Sizing => "Sizing",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Gene {
    pub name: &'static str,
    pub category: GeneCategory,
}

pub const GENE_COUNT: usize = 16;

/// Genome layout shared with the arena
pub const GENES: [Gene; GENE_COUNT] = [
    Gene { name: "rsi_lower", category: GeneCategory::MeanReversion },
    Gene { name: "rsi_upper", category: GeneCategory::MeanReversion },
    Gene { name: "trend_weight", category: GeneCategory::Trend },
    Gene { name: "entry_threshold", category: GeneCategory::Timing },
    Gene { name: "exit_threshold", category: GeneCategory::Timing },
    Gene { name: "stop_loss", category: GeneCategory::Risk },
    Gene { name: "take_profit", category: GeneCategory::Risk },
    Gene { name: "max_drawdown_limit", category: GeneCategory::Risk },
    Gene { name: "position_size", category: GeneCategory::Sizing },
    Gene { name: "leverage", category: GeneCategory::Sizing },
    Gene { name: "mean_reversion_weight", category: GeneCategory::MeanReversion },
    Gene { name: "bb_width_threshold", category: GeneCategory::MeanReversion },
    Gene { name: "momentum_lookback", category: GeneCategory::Trend },
    Gene { name: "volatility_filter", category: GeneCategory::Risk },
    Gene { name: "hold_time", category: GeneCategory::Timing },
    Gene { name: "kelly_fraction", category: GeneCategory::Sizing },
];

/// One row of the gene matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenomeSnapshot {
    pub bot_id: String,
    pub genome: Vec<f64>,
    pub fitness: f64,
}

/// Latest genome and fitness per bot, from fitness and DNA events
pub fn extract_genome_snapshots(events: &[ObservationEvent]) -> Vec<GenomeSnapshot> {
    let mut latest: BTreeMap<String, (Option<Vec<f64>>, Option<f64>)> = BTreeMap::new();

    for event in events {
        match &event.payload {
            EventPayload::FitnessChange(p) => {
                let entry = latest.entry(p.bot_id.clone()).or_default();
                entry.1 = Some(p.fitness);
                if let Some(genome) = &p.genome {
                    entry.0 = Some(genome.clone());
                }
            }
            EventPayload::DnaMutation(p) => {
                let entry = latest.entry(p.bot_id.clone()).or_default();
                entry.0 = Some(p.genome.clone());
                if let Some(fitness) = p.fitness {
                    entry.1 = Some(fitness);
                }
            }
            _ => {}
        }
    }

    latest
        .into_iter()
        .filter_map(|(bot_id, (genome, fitness))| {
            let mut genome = genome?;
            genome.resize(GENE_COUNT, 0.0);
            Some(GenomeSnapshot {
                bot_id,
                genome: genome.into_iter().map(|g| g.max(0.0)).collect(),
                fitness: fitness?,
            })
        })
        .collect()
}

/// Deterministic genome → strategy mapping.
///
/// Genes 0–3 set the RSI band, trend weight and entry threshold. A
/// trend-weighted genome buys strength confirmed by RSI headroom; otherwise it
/// buys oversold dips that are not in a strong downtrend. Sells mirror buys.
pub fn genome_to_tree(genome: &[f64]) -> StrategyNode {
    let gene = |i: usize| genome.get(i).copied().unwrap_or(0.5).clamp(0.0, 1.0);
    let round = |v: f64| (v * 100.0).round() / 100.0;

    let rsi_lower = round(15.0 + gene(0) * 20.0);
    let rsi_upper = round(65.0 + gene(1) * 20.0);
    let trend_weight = gene(2);
    let entry = round(gene(3) * 0.5);

    let (buy, sell) = if trend_weight >= 0.5 {
        (
            StrategyNode::all_of(vec![
                StrategyNode::threshold(IndicatorKind::TrendStrength, Comparator::Gt, entry),
                StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Lt, rsi_upper),
            ]),
            StrategyNode::all_of(vec![
                StrategyNode::threshold(IndicatorKind::TrendStrength, Comparator::Lt, -entry),
                StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Gt, rsi_lower),
            ]),
        )
    } else {
        (
            StrategyNode::all_of(vec![
                StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Lt, rsi_lower),
                StrategyNode::threshold(IndicatorKind::TrendStrength, Comparator::Gt, -entry),
            ]),
            StrategyNode::all_of(vec![
                StrategyNode::threshold(IndicatorKind::Rsi, Comparator::Gt, rsi_upper),
                StrategyNode::threshold(IndicatorKind::TrendStrength, Comparator::Lt, entry),
            ]),
        )
    };

    StrategyNode::conditional(
        buy,
        StrategyNode::action(Action::Buy),
        StrategyNode::conditional(sell, StrategyNode::action(Action::Sell), StrategyNode::action(Action::Hold)),
    )
}

/// Result of one decomposition + synthesis pass
#[derive(Debug, Clone)]
pub struct FactorReport {
    pub factors: Vec<LatentFactor>,
    pub candidates: Vec<FactorCandidate>,
    pub qualifying: Vec<FactorCandidate>,
    pub snapshots: usize,
    pub iterations: usize,
    /// Squared reconstruction error ‖V − WH‖² at the last iteration
    pub final_error: f64,
    pub final_objective: f64,
    pub converged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorStats {
    pub decompositions: u64,
    pub factors: usize,
    pub history_depth: usize,
    pub last_snapshot_count: usize,
    pub last_error: Option<f64>,
    pub candidates_generated: u64,
    pub candidates_qualified: u64,
}

pub struct FactorEngine {
    config: NmfConfig,
    factors: Vec<LatentFactor>,
    history: VecDeque<Vec<FactorSignature>>,
    historical_elites: VecDeque<Vec<f64>>,
    decompositions: u64,
    last_snapshot_count: usize,
    last_error: Option<f64>,
    candidates_generated: u64,
    candidates_qualified: u64,
    rng: StdRng,
}

impl FactorEngine {
    pub fn new(config: NmfConfig) -> Self {
        Self {
            config,
            factors: Vec::new(),
            history: VecDeque::new(),
            historical_elites: VecDeque::new(),
            decompositions: 0,
            last_snapshot_count: 0,
            last_error: None,
            candidates_generated: 0,
            candidates_qualified: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Decompose the genomes in `events`, interpret the factors and synthesize candidates
    pub fn run(&mut self, events: &[ObservationEvent]) -> Result<FactorReport> {
        let snapshots = extract_genome_snapshots(events);
        self.run_snapshots(&snapshots)
    }

    pub fn run_snapshots(&mut self, snapshots: &[GenomeSnapshot]) -> Result<FactorReport> {
        if snapshots.len() < self.config.min_snapshots.max(2) {
            return Err(SynthesisError::InsufficientData(format!(
                "{} genome snapshots, need {}",
                snapshots.len(),
                self.config.min_snapshots
            )));
        }

        let v = gene_matrix(snapshots)?;
        let result = nmf::decompose(&v, &self.config, &mut self.rng)?;

        let history: Vec<Vec<FactorSignature>> = self.history.iter().cloned().collect();
        let factors = interpret::interpret(&result.w, &result.h, snapshots, &history);

        let elites: Vec<Vec<f64>> = self.historical_elites.iter().cloned().collect();
        let input = SynthesisInput {
            w: &result.w,
            h: &result.h,
            factors: &factors,
            snapshots,
            historical_elites: &elites,
        };
        let candidates = synthesis::synthesize(&input, &self.config, &mut self.rng);
        let qualifying = synthesis::qualifying(candidates.clone(), &self.config);

        self.history.push_back(interpret::signatures(&factors));
        if let Some(top) = snapshots.iter().max_by(|a, b| a.fitness.total_cmp(&b.fitness)) {
            self.historical_elites.push_back(top.genome.clone());
        }
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
        while self.historical_elites.len() > self.config.history_len {
            self.historical_elites.pop_front();
        }

        self.decompositions += 1;
        self.last_snapshot_count = snapshots.len();
        self.last_error = Some(result.final_error());
        self.candidates_generated += candidates.len() as u64;
        self.candidates_qualified += qualifying.len() as u64;
        self.factors = factors.clone();

        info!(
            snapshots = snapshots.len(),
            factors = factors.len(),
            iterations = result.iterations,
            error = result.final_error(),
            objective = result.final_objective(),
            candidates = candidates.len(),
            qualifying = qualifying.len(),
            "Factor decomposition complete"
        );
        for factor in &factors {
            debug!(
                factor = %factor.name,
                correlation = factor.fitness_correlation,
                trend = ?factor.trend,
                "Latent factor"
            );
        }

        Ok(FactorReport {
            factors,
            candidates,
            qualifying,
            snapshots: snapshots.len(),
            iterations: result.iterations,
            final_error: result.final_error(),
            final_objective: result.final_objective(),
            converged: result.converged,
        })
    }

    pub fn factors(&self) -> &[LatentFactor] {
        &self.factors
    }

    pub fn stats(&self) -> FactorStats {
        FactorStats {
            decompositions: self.decompositions,
            factors: self.factors.len(),
            history_depth: self.history.len(),
            last_snapshot_count: self.last_snapshot_count,
            last_error: self.last_error,
            candidates_generated: self.candidates_generated,
            candidates_qualified: self.candidates_qualified,
        }
    }
}

fn gene_matrix(snapshots: &[GenomeSnapshot]) -> Result<Array2<f64>> {
    let flat: Vec<f64> = snapshots
        .iter()
        .flat_map(|s| s.genome.iter().take(GENE_COUNT).map(|g| g.max(0.0)))
        .collect();
    Array2::from_shape_vec((snapshots.len(), GENE_COUNT), flat)
        .map_err(|e| SynthesisError::Factorization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DnaPayload, FitnessPayload, IndicatorSnapshot};
    use chrono::Utc;
    use rand::Rng;

    fn fitness_event(bot: &str, fitness: f64, genome: Option<Vec<f64>>) -> ObservationEvent {
        ObservationEvent::new(
            Utc::now(),
            "test",
            EventPayload::FitnessChange(FitnessPayload {
                bot_id: bot.to_string(),
                fitness,
                total_pnl: 0.0,
                win_rate: None,
                rank: None,
                round: None,
                genome,
            }),
            None,
        )
    }

    #[test]
    fn test_extract_latest_per_bot() {
        let events = vec![
            fitness_event("a", 0.2, Some(vec![0.1; 16])),
            fitness_event("a", 0.4, None),
            ObservationEvent::new(
                Utc::now(),
                "test",
                EventPayload::DnaMutation(DnaPayload {
                    bot_id: "a".to_string(),
                    generation: 2,
                    genome: vec![0.9; 4],
                    parent_ids: vec![],
                    mutation: None,
                    fitness: None,
                }),
                None,
            ),
            fitness_event("b", 0.5, None),
        ];
        let snapshots = extract_genome_snapshots(&events);
        // b never published a genome
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].fitness, 0.4);
        assert_eq!(snapshots[0].genome.len(), GENE_COUNT);
        assert_eq!(snapshots[0].genome[0], 0.9);
        assert_eq!(snapshots[0].genome[5], 0.0);
    }

    #[test]
    fn test_genome_to_tree_is_deterministic() {
        let genome = vec![0.5, 0.5, 0.2, 0.4, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let a = genome_to_tree(&genome);
        let b = genome_to_tree(&genome);
        assert_eq!(a, b);
        assert_eq!(
            a.to_string(),
            "IF ((RSI < 25) AND (TREND > -0.200)) THEN BUY ELSE IF ((RSI > 75) AND (TREND < 0.200)) THEN SELL ELSE HOLD"
        );

        let mut snapshot = IndicatorSnapshot::default();
        snapshot.rsi = 20.0;
        assert_eq!(a.decide(&snapshot), Action::Buy);
        snapshot.rsi = 80.0;
        assert_eq!(a.decide(&snapshot), Action::Sell);
        snapshot.rsi = 50.0;
        assert_eq!(a.decide(&snapshot), Action::Hold);
    }

    #[test]
    fn test_insufficient_snapshots() {
        let mut engine = FactorEngine::new(NmfConfig::default());
        let snapshots = vec![GenomeSnapshot {
            bot_id: "a".to_string(),
            genome: vec![0.5; GENE_COUNT],
            fitness: 0.5,
        }];
        assert!(matches!(
            engine.run_snapshots(&snapshots),
            Err(SynthesisError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_run_produces_factors_and_candidates() {
        let mut rng = rand::thread_rng();
        let snapshots: Vec<GenomeSnapshot> = (0..24)
            .map(|i| {
                let genome: Vec<f64> = (0..GENE_COUNT).map(|_| rng.gen_range(0.0..1.0)).collect();
                GenomeSnapshot {
                    bot_id: format!("bot-{}", i),
                    fitness: genome[2] * 0.8 + rng.gen_range(0.0..0.2),
                    genome,
                }
            })
            .collect();

        let mut engine = FactorEngine::new(NmfConfig::default());
        let first = engine.run_snapshots(&snapshots).unwrap();
        assert_eq!(first.factors.len(), 5);
        assert!(first.candidates.len() <= 4);
        for candidate in &first.candidates {
            assert!(candidate.genome.iter().all(|g| (0.0..=1.0).contains(g)));
            assert!(candidate.tree.depth() <= 8);
            assert!(candidate.expected_fitness > -1.0 && candidate.expected_fitness < 1.0);
        }

        // a second run has history, so temporal blending can fire
        let second = engine.run_snapshots(&snapshots).unwrap();
        assert_eq!(second.factors.len(), 5);
        assert_eq!(engine.stats().decompositions, 2);
        assert_eq!(engine.stats().history_depth, 2);
    }
}
