//! Genome synthesis in factor space

use std::sync::Arc;

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use super::interpret::LatentFactor;
use super::nmf::project;
use super::{genome_to_tree, GenomeSnapshot, GENE_COUNT};
use crate::config::NmfConfig;
use crate::tree::StrategyNode;

const PROJECTION_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Push the most fitness-positive factor beyond what top performers show
    Amplification,
    /// Force the least co-occurring factor pair high together
    NovelCombination,
    /// Sample factor space far from every observed genome
    GapFilling,
    /// Interpolate between a current and a historical top performer
    TemporalBlend,
}

impl SynthesisMode {
    pub const ALL: [SynthesisMode; 4] = [
        SynthesisMode::Amplification,
        SynthesisMode::NovelCombination,
        SynthesisMode::GapFilling,
        SynthesisMode::TemporalBlend,
    ];
}

#[derive(Debug, Clone)]
pub struct FactorCandidate {
    pub id: Uuid,
    pub mode: SynthesisMode,
    pub genome: Vec<f64>,
    pub factor_weights: Vec<f64>,
    pub novelty: f64,
    pub expected_fitness: f64,
    pub tree: Arc<StrategyNode>,
}

/// Everything synthesis needs from one decomposition
pub struct SynthesisInput<'a> {
    pub w: &'a Array2<f64>,
    pub h: &'a Array2<f64>,
    pub factors: &'a [LatentFactor],
    pub snapshots: &'a [GenomeSnapshot],
    /// Top-performer genomes of past decompositions, oldest first
    pub historical_elites: &'a [Vec<f64>],
}

impl SynthesisInput<'_> {
    fn genome_from_weights(&self, weights: &[f64]) -> Vec<f64> {
        let mut genome = vec![0.0; self.h.ncols()];
        for (k, weight) in weights.iter().enumerate() {
            for (g, value) in genome.iter_mut().enumerate() {
                *value += weight * self.h[[k, g]];
            }
        }
        genome.into_iter().map(|g| g.clamp(0.0, 1.0)).collect()
    }

    fn max_weights(&self) -> Vec<f64> {
        (0..self.w.ncols())
            .map(|k| self.w.column(k).iter().copied().fold(0.0, f64::max))
            .collect()
    }

    /// Mean factor weights of the best quarter of bots by fitness
    fn elite_weights(&self) -> Vec<f64> {
        let mut order: Vec<usize> = (0..self.snapshots.len()).collect();
        order.sort_by(|a, b| self.snapshots[*b].fitness.total_cmp(&self.snapshots[*a].fitness));
        let take = (order.len() / 4).max(1).min(order.len());
        let mut mean = vec![0.0; self.w.ncols()];
        for &row in order.iter().take(take) {
            for (k, m) in mean.iter_mut().enumerate() {
                *m += self.w[[row, k]] / take as f64;
            }
        }
        mean
    }

    fn top_performer(&self) -> Option<&GenomeSnapshot> {
        self.snapshots.iter().max_by(|a, b| a.fitness.total_cmp(&b.fitness))
    }
}

/// Generate up to `config.candidates_per_cycle` candidates, rotating through the modes
pub fn synthesize<R: Rng + ?Sized>(input: &SynthesisInput<'_>, config: &NmfConfig, rng: &mut R) -> Vec<FactorCandidate> {
    if input.snapshots.is_empty() || input.w.ncols() == 0 {
        return Vec::new();
    }
    (0..config.candidates_per_cycle)
        .filter_map(|i| {
            let mode = SynthesisMode::ALL[i % SynthesisMode::ALL.len()];
            let genome = match mode {
                SynthesisMode::Amplification => amplify(input, config, rng),
                SynthesisMode::NovelCombination => novel_combination(input, config, rng),
                SynthesisMode::GapFilling => fill_gap(input, config, rng),
                SynthesisMode::TemporalBlend => temporal_blend(input, config, rng),
            }?;
            Some(finish(input, mode, genome))
        })
        .collect()
}

/// Keep candidates that are novel enough and expected to be fit enough
pub fn qualifying(candidates: Vec<FactorCandidate>, config: &NmfConfig) -> Vec<FactorCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.novelty >= config.min_novelty && c.expected_fitness >= config.min_expected_fitness)
        .collect()
}

fn finish(input: &SynthesisInput<'_>, mode: SynthesisMode, genome: Vec<f64>) -> FactorCandidate {
    let factor_weights = project(&genome, input.h, PROJECTION_ITERATIONS);
    let existing: Vec<&[f64]> = input.snapshots.iter().map(|s| s.genome.as_slice()).collect();
    let novelty = novelty(&genome, &existing);
    let expected_fitness = expected_fitness(&factor_weights, input.factors);
    let tree = Arc::new(genome_to_tree(&genome));

    FactorCandidate {
        id: Uuid::new_v4(),
        mode,
        genome,
        factor_weights,
        novelty,
        expected_fitness,
        tree,
    }
}

fn amplify<R: Rng + ?Sized>(input: &SynthesisInput<'_>, config: &NmfConfig, rng: &mut R) -> Option<Vec<f64>> {
    let mut weights = amplified_weights(input, config.amplification_strength)?;
    jitter(&mut weights, config.jitter, rng);
    Some(input.genome_from_weights(&weights))
}

/// Elite weights scaled by `1 + strength × r` per factor, floored at zero
fn amplified_weights(input: &SynthesisInput<'_>, strength: f64) -> Option<Vec<f64>> {
    if input.factors.is_empty() {
        return None;
    }
    let mut weights = input.elite_weights();
    for factor in input.factors {
        if let Some(w) = weights.get_mut(factor.index) {
            *w = (*w * (1.0 + strength * factor.fitness_correlation)).max(0.0);
        }
    }
    Some(weights)
}

fn novel_combination<R: Rng + ?Sized>(input: &SynthesisInput<'_>, config: &NmfConfig, rng: &mut R) -> Option<Vec<f64>> {
    let mut weights = novel_weights(input)?;
    jitter(&mut weights, config.jitter, rng);
    Some(input.genome_from_weights(&weights))
}

/// Elite weights with the least co-occurring factor pair raised to their observed maxima
fn novel_weights(input: &SynthesisInput<'_>) -> Option<Vec<f64>> {
    let (i, j) = least_cooccurring_pair(input.w)?;
    let max = input.max_weights();
    let mut weights = input.elite_weights();
    weights[i] = max[i];
    weights[j] = max[j];
    Some(weights)
}

fn least_cooccurring_pair(w: &Array2<f64>) -> Option<(usize, usize)> {
    let rank = w.ncols();
    let mut weakest: Option<(usize, usize, f64)> = None;
    for i in 0..rank {
        for j in (i + 1)..rank {
            let co = cooccurrence(w, i, j);
            if weakest.map(|(_, _, best)| co < best).unwrap_or(true) {
                weakest = Some((i, j, co));
            }
        }
    }
    weakest.map(|(i, j, _)| (i, j))
}

fn fill_gap<R: Rng + ?Sized>(input: &SynthesisInput<'_>, config: &NmfConfig, rng: &mut R) -> Option<Vec<f64>> {
    let max = input.max_weights();
    let existing: Vec<&[f64]> = input.snapshots.iter().map(|s| s.genome.as_slice()).collect();
    let norm = (GENE_COUNT as f64).sqrt();

    for _ in 0..config.gap_fill_attempts {
        let weights: Vec<f64> = max.iter().map(|m| rng.gen_range(0.0..=m.max(1e-6))).collect();
        let genome = input.genome_from_weights(&weights);
        let nearest = existing
            .iter()
            .map(|e| distance(&genome, e))
            .fold(f64::MAX, f64::min);
        if nearest / norm >= config.novelty_threshold {
            return Some(genome);
        }
    }
    None
}

fn temporal_blend<R: Rng + ?Sized>(input: &SynthesisInput<'_>, config: &NmfConfig, rng: &mut R) -> Option<Vec<f64>> {
    let current = input.top_performer()?;
    let historical = input.historical_elites.choose(rng)?;
    let alpha = rng.gen_range(0.3..0.7);
    let mut genome: Vec<f64> = current
        .genome
        .iter()
        .zip(historical.iter())
        .map(|(c, h)| alpha * c + (1.0 - alpha) * h)
        .collect();
    jitter(&mut genome, config.jitter, rng);
    Some(genome.into_iter().map(|g| g.clamp(0.0, 1.0)).collect())
}

fn jitter<R: Rng + ?Sized>(values: &mut [f64], amount: f64, rng: &mut R) {
    if amount <= 0.0 {
        return;
    }
    for v in values.iter_mut() {
        *v = (*v + rng.gen_range(-amount..amount)).max(0.0);
    }
}

/// Normalized co-occurrence of two factors across bots
fn cooccurrence(w: &Array2<f64>, i: usize, j: usize) -> f64 {
    let a = w.column(i);
    let b = w.column(j);
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na <= 1e-12 || nb <= 1e-12 {
        0.0
    } else {
        dot / (na * nb)
    }
}

pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().max(b.len());
    (0..n)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0.0);
            let y = b.get(i).copied().unwrap_or(0.0);
            (x - y).powi(2)
        })
        .sum::<f64>()
        .sqrt()
}

/// Mean distance to existing genomes, normalized by √genes
pub fn novelty(genome: &[f64], existing: &[&[f64]]) -> f64 {
    if existing.is_empty() {
        return 1.0;
    }
    let total: f64 = existing.iter().map(|e| distance(genome, e)).sum();
    total / existing.len() as f64 / (GENE_COUNT as f64).sqrt()
}

/// tanh of factor weights dotted with factor-fitness correlations
pub fn expected_fitness(weights: &[f64], factors: &[LatentFactor]) -> f64 {
    let signal: f64 = factors
        .iter()
        .filter_map(|f| weights.get(f.index).map(|w| w * f.fitness_correlation))
        .sum();
    signal.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::interpret::FactorTrend;
    use crate::factor::GeneCategory;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    #[test]
    fn test_novelty_and_distance() {
        let a = vec![0.0; GENE_COUNT];
        let b = vec![1.0; GENE_COUNT];
        assert!((distance(&a, &b) - (GENE_COUNT as f64).sqrt()).abs() < 1e-12);
        assert!((novelty(&a, &[&b]) - 1.0).abs() < 1e-12);
        assert!((novelty(&a, &[&b, &a]) - 0.5).abs() < 1e-12);
    }

    fn factor(index: usize, fitness_correlation: f64) -> LatentFactor {
        LatentFactor {
            index,
            name: format!("F{}", index),
            interpretation: String::new(),
            loadings: vec![0.0; GENE_COUNT],
            ranked_genes: Vec::new(),
            dominant_category: GeneCategory::Risk,
            bot_weights: BTreeMap::new(),
            fitness_correlation,
            trend: FactorTrend::Stable,
        }
    }

    fn snapshot(i: usize, fitness: f64, value: f64) -> GenomeSnapshot {
        GenomeSnapshot {
            bot_id: format!("bot-{}", i),
            fitness,
            genome: vec![value; GENE_COUNT],
        }
    }

    fn quiet_config() -> NmfConfig {
        NmfConfig {
            jitter: 0.0,
            ..NmfConfig::default()
        }
    }

    #[test]
    fn test_amplify_follows_correlation_sign() {
        let w = Array2::from_elem((4, 3), 1.0);
        let h = Array2::from_elem((3, GENE_COUNT), 0.1);
        let factors = vec![factor(0, 0.8), factor(1, -0.8), factor(2, 0.0)];
        let snapshots: Vec<GenomeSnapshot> = (0..4).map(|i| snapshot(i, i as f64, 0.3)).collect();
        let input = SynthesisInput {
            w: &w,
            h: &h,
            factors: &factors,
            snapshots: &snapshots,
            historical_elites: &[],
        };

        let weights = amplified_weights(&input, 0.5).unwrap();
        assert!((weights[0] - 1.4).abs() < 1e-12);
        assert!((weights[1] - 0.6).abs() < 1e-12);
        assert!((weights[2] - 1.0).abs() < 1e-12);

        // a strong negative correlation floors at zero instead of flipping sign
        let weights = amplified_weights(&input, 2.0).unwrap();
        assert_eq!(weights[1], 0.0);

        let mut rng = StdRng::seed_from_u64(3);
        assert!(amplify(&input, &quiet_config(), &mut rng).is_some());
        let empty = SynthesisInput { factors: &[], ..input };
        assert!(amplified_weights(&empty, 0.5).is_none());
    }

    #[test]
    fn test_novel_combination_forces_least_cooccurring_pair_to_max() {
        // factors 0 and 2 never load on the same bot
        let w = Array2::from_shape_vec(
            (4, 3),
            vec![0.9, 0.5, 0.0, 0.4, 0.6, 0.0, 0.0, 0.5, 0.7, 0.0, 0.4, 0.3],
        )
        .unwrap();
        let h = Array2::from_elem((3, GENE_COUNT), 0.2);
        let factors = vec![factor(0, 0.1), factor(1, 0.1), factor(2, 0.1)];
        let snapshots: Vec<GenomeSnapshot> = (0..4).map(|i| snapshot(i, 4.0 - i as f64, 0.3)).collect();
        let input = SynthesisInput {
            w: &w,
            h: &h,
            factors: &factors,
            snapshots: &snapshots,
            historical_elites: &[],
        };

        assert_eq!(least_cooccurring_pair(&w), Some((0, 2)));
        let weights = novel_weights(&input).unwrap();
        assert_eq!(weights[0], 0.9);
        assert_eq!(weights[2], 0.7);
        // elite quarter is bot 0 alone
        assert_eq!(weights[1], 0.5);

        let single = Array2::from_elem((4, 1), 1.0);
        assert!(least_cooccurring_pair(&single).is_none());
    }

    #[test]
    fn test_gap_fill_lands_beyond_novelty_threshold() {
        let w = Array2::from_elem((4, 2), 1.0);
        let h = Array2::from_elem((2, GENE_COUNT), 0.5);
        let factors = vec![factor(0, 0.2), factor(1, 0.2)];
        let snapshots: Vec<GenomeSnapshot> = (0..4).map(|i| snapshot(i, 0.5, 0.0)).collect();
        let input = SynthesisInput {
            w: &w,
            h: &h,
            factors: &factors,
            snapshots: &snapshots,
            historical_elites: &[],
        };
        let config = quiet_config();

        let mut rng = StdRng::seed_from_u64(17);
        let genome = fill_gap(&input, &config, &mut rng).expect("gap found");
        let norm = (GENE_COUNT as f64).sqrt();
        for s in &snapshots {
            assert!(distance(&genome, &s.genome) / norm >= config.novelty_threshold);
        }
    }

    #[test]
    fn test_temporal_blend_lies_between_endpoints() {
        let w = Array2::from_elem((2, 1), 1.0);
        let h = Array2::from_elem((1, GENE_COUNT), 0.5);
        let factors = vec![factor(0, 0.2)];
        let snapshots = vec![snapshot(0, 0.9, 0.8), snapshot(1, 0.1, 0.5)];
        let historical = vec![vec![0.2; GENE_COUNT]];
        let input = SynthesisInput {
            w: &w,
            h: &h,
            factors: &factors,
            snapshots: &snapshots,
            historical_elites: &historical,
        };

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let genome = temporal_blend(&input, &quiet_config(), &mut rng).unwrap();
            assert!(genome.iter().all(|g| (0.2..=0.8).contains(g)));
            // alpha is drawn from [0.3, 0.7) so neither endpoint is reproduced
            assert!(genome.iter().all(|g| *g > 0.2 + 1e-9 && *g < 0.8 - 1e-9));
        }

        let no_history = SynthesisInput { historical_elites: &[], ..input };
        assert!(temporal_blend(&no_history, &quiet_config(), &mut rng).is_none());
    }

    #[test]
    fn test_cooccurrence_of_disjoint_factors() {
        let w = Array2::from_shape_vec((3, 2), vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0]).unwrap();
        assert_eq!(cooccurrence(&w, 0, 1), 0.0);
        assert!((cooccurrence(&w, 0, 0) - 1.0).abs() < 1e-12);
    }
}
