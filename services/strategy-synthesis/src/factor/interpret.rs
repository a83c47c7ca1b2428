//! Naming and tracking of latent factors

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::Serialize;

use super::{GeneCategory, GenomeSnapshot, GENES};

/// Correlation magnitude that earns a polarity prefix
const POLARITY_CUTOFF: f64 = 0.1;
/// Change in |correlation| that counts as a trend
const TREND_CUTOFF: f64 = 0.05;
/// Minimum loading similarity for two factors to be the same factor over time
const MATCH_SIMILARITY: f64 = 0.7;
const TOP_GENES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorTrend {
    Strengthening,
    Stable,
    Weakening,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneLoading {
    pub gene: usize,
    pub name: &'static str,
    pub category: GeneCategory,
    pub loading: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatentFactor {
    pub index: usize,
    pub name: String,
    pub interpretation: String,
    pub loadings: Vec<f64>,
    /// Genes ranked by loading, strongest first
    pub ranked_genes: Vec<GeneLoading>,
    pub dominant_category: GeneCategory,
    pub bot_weights: BTreeMap<String, f64>,
    pub fitness_correlation: f64,
    pub trend: FactorTrend,
}

impl LatentFactor {
    pub fn top_gene(&self) -> Option<usize> {
        self.ranked_genes.first().map(|g| g.gene)
    }
}

/// Factor summary kept across decompositions
#[derive(Debug, Clone)]
pub struct FactorSignature {
    pub loadings: Vec<f64>,
    pub abs_correlation: f64,
}

/// Interpret every factor of a decomposition
pub fn interpret(
    w: &Array2<f64>,
    h: &Array2<f64>,
    snapshots: &[GenomeSnapshot],
    history: &[Vec<FactorSignature>],
) -> Vec<LatentFactor> {
    let fitness: Vec<f64> = snapshots.iter().map(|s| s.fitness).collect();

    (0..h.nrows())
        .map(|k| {
            let loadings: Vec<f64> = h.row(k).to_vec();
            let weights: Vec<f64> = w.column(k).to_vec();
            let correlation = pearson(&weights, &fitness);

            let mut ranked_genes: Vec<GeneLoading> = loadings
                .iter()
                .enumerate()
                .map(|(gene, loading)| GeneLoading {
                    gene,
                    name: GENES.get(gene).map(|g| g.name).unwrap_or("unknown"),
                    category: GENES.get(gene).map(|g| g.category).unwrap_or(GeneCategory::Timing),
                    loading: *loading,
                })
                .collect();
            ranked_genes.sort_by(|a, b| b.loading.total_cmp(&a.loading));

            let dominant_category = dominant_category(&ranked_genes);
            let name = format!("{}-{}", polarity(correlation), dominant_category.label());
            let interpretation = describe(&ranked_genes, correlation);
            let trend = classify_trend(&loadings, correlation.abs(), history);

            let bot_weights = snapshots
                .iter()
                .zip(weights.iter())
                .map(|(s, w)| (s.bot_id.clone(), *w))
                .collect();

            LatentFactor {
                index: k,
                name,
                interpretation,
                loadings,
                ranked_genes,
                dominant_category,
                bot_weights,
                fitness_correlation: correlation,
                trend,
            }
        })
        .collect()
}

pub fn signatures(factors: &[LatentFactor]) -> Vec<FactorSignature> {
    factors
        .iter()
        .map(|f| FactorSignature {
            loadings: f.loadings.clone(),
            abs_correlation: f.fitness_correlation.abs(),
        })
        .collect()
}

fn polarity(correlation: f64) -> &'static str {
    if correlation > POLARITY_CUTOFF {
        "Pro"
    } else if correlation < -POLARITY_CUTOFF {
        "Anti"
    } else {
        "Neutral"
    }
}

/// Category with the largest summed loading among the top genes
fn dominant_category(ranked: &[GeneLoading]) -> GeneCategory {
    let mut totals: BTreeMap<GeneCategory, f64> = BTreeMap::new();
    for gene in ranked.iter().take(TOP_GENES) {
        *totals.entry(gene.category).or_insert(0.0) += gene.loading;
    }
    // ties go to the category of the strongest gene
    let strongest = ranked.first().map(|g| g.category).unwrap_or(GeneCategory::Timing);
    totals
        .into_iter()
        .fold((strongest, f64::MIN), |best, (category, total)| {
            if total > best.1 + 1e-12 {
                (category, total)
            } else {
                best
            }
        })
        .0
}

fn describe(ranked: &[GeneLoading], correlation: f64) -> String {
    let genes: Vec<&str> = ranked.iter().take(TOP_GENES).map(|g| g.name).collect();
    let direction = if correlation > POLARITY_CUTOFF {
        "associated with higher fitness"
    } else if correlation < -POLARITY_CUTOFF {
        "associated with lower fitness"
    } else {
        "not associated with fitness"
    };
    format!("High {} {} (r = {:.2})", genes.join(", "), direction, correlation)
}

/// Compare |correlation| against matched factors of past decompositions
fn classify_trend(loadings: &[f64], abs_correlation: f64, history: &[Vec<FactorSignature>]) -> FactorTrend {
    let matched: Vec<f64> = history
        .iter()
        .filter_map(|past| {
            past.iter()
                .map(|sig| (cosine(loadings, &sig.loadings), sig.abs_correlation))
                .filter(|(similarity, _)| *similarity >= MATCH_SIMILARITY)
                .max_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, corr)| corr)
        })
        .collect();

    if matched.is_empty() {
        return FactorTrend::Stable;
    }
    let baseline = matched.iter().sum::<f64>() / matched.len() as f64;
    let delta = abs_correlation - baseline;
    if delta > TREND_CUTOFF {
        FactorTrend::Strengthening
    } else if delta < -TREND_CUTOFF {
        FactorTrend::Weakening
    } else {
        FactorTrend::Stable
    }
}

pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx <= 1e-18 || vy <= 1e-18 {
        return 0.0;
    }
    cov / (vx.sqrt() * vy.sqrt())
}

pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na <= 1e-12 || nb <= 1e-12 {
        0.0
    } else {
        dot / (na * nb)
    }
}
