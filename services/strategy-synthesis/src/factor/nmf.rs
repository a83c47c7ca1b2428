//! Regularized non-negative matrix factorization
//!
//! Minimizes ½‖V − WH‖² + ½λ(‖W‖² + ‖H‖²) over W, H ≥ 0 with Lee–Seung
//! multiplicative updates. The objective is non-increasing; convergence is
//! judged on the squared reconstruction error ‖V − WH‖².

use ndarray::Array2;
use rand::Rng;

use crate::config::NmfConfig;
use crate::error::{Result, SynthesisError};

const EPS: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct NmfResult {
    /// samples × rank
    pub w: Array2<f64>,
    /// rank × features
    pub h: Array2<f64>,
    /// Squared reconstruction error after each iteration
    pub error_history: Vec<f64>,
    /// Regularized objective after each iteration
    pub objective_history: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl NmfResult {
    pub fn rank(&self) -> usize {
        self.h.nrows()
    }

    pub fn final_error(&self) -> f64 {
        self.error_history.last().copied().unwrap_or(0.0)
    }

    pub fn final_objective(&self) -> f64 {
        self.objective_history.last().copied().unwrap_or(0.0)
    }
}

pub fn decompose<R: Rng + ?Sized>(v: &Array2<f64>, config: &NmfConfig, rng: &mut R) -> Result<NmfResult> {
    let (rows, cols) = v.dim();
    if rows < 2 || cols == 0 {
        return Err(SynthesisError::InsufficientData(format!(
            "gene matrix is {}x{}, need at least 2 rows",
            rows, cols
        )));
    }
    if v.iter().any(|x| !x.is_finite() || *x < 0.0) {
        return Err(SynthesisError::Factorization(
            "gene matrix must be finite and non-negative".to_string(),
        ));
    }
    let rank = config.rank.min(rows).min(cols).max(1);
    let lambda = config.l2_lambda.max(0.0);

    let mean = v.mean().unwrap_or(0.0).max(EPS);
    let scale = (mean / rank as f64).sqrt();
    let mut w = Array2::from_shape_fn((rows, rank), |_| rng.gen_range(0.1..1.0) * scale);
    let mut h = Array2::from_shape_fn((rank, cols), |_| rng.gen_range(0.1..1.0) * scale);

    let mut error_history = Vec::with_capacity(config.max_iterations.min(1_000));
    let mut objective_history = Vec::with_capacity(config.max_iterations.min(1_000));
    let mut previous = reconstruction_error(v, &w, &h);
    let mut converged = false;
    let mut iterations = 0;

    for _ in 0..config.max_iterations {
        iterations += 1;

        // H ← H ∘ (WᵀV) / (WᵀWH + λH)
        let numerator = w.t().dot(v);
        let denominator = w.t().dot(&w).dot(&h) + &h * lambda;
        h = &h * &numerator / denominator.mapv(|x| x + EPS);

        // W ← W ∘ (VHᵀ) / (WHHᵀ + λW)
        let numerator = v.dot(&h.t());
        let denominator = w.dot(&h).dot(&h.t()) + &w * lambda;
        w = &w * &numerator / denominator.mapv(|x| x + EPS);

        let current = reconstruction_error(v, &w, &h);
        let regularized = objective(v, &w, &h, lambda);
        if !current.is_finite() || !regularized.is_finite() {
            return Err(SynthesisError::Factorization("objective diverged".to_string()));
        }
        error_history.push(current);
        objective_history.push(regularized);

        let relative = (previous - current).abs() / previous.max(EPS);
        previous = current;
        if relative < config.tolerance {
            converged = true;
            break;
        }
    }

    Ok(NmfResult {
        w,
        h,
        error_history,
        objective_history,
        iterations,
        converged,
    })
}

/// Non-negative weights expressing `genome` in terms of fixed factor loadings `h`
pub fn project(genome: &[f64], h: &Array2<f64>, iterations: usize) -> Vec<f64> {
    let rank = h.nrows();
    if rank == 0 || genome.len() != h.ncols() {
        return vec![0.0; rank];
    }
    let v = ndarray::Array1::from(genome.iter().map(|g| g.max(0.0)).collect::<Vec<_>>());
    let hv = h.dot(&v);
    let hht = h.dot(&h.t());
    let mut w = ndarray::Array1::from_elem(rank, 0.5);
    for _ in 0..iterations {
        let denominator = hht.dot(&w);
        w = &w * &hv / denominator.mapv(|x| x + EPS);
    }
    w.to_vec()
}

/// ‖V − WH‖²
fn reconstruction_error(v: &Array2<f64>, w: &Array2<f64>, h: &Array2<f64>) -> f64 {
    (v - &w.dot(h)).mapv(|x| x * x).sum()
}

fn objective(v: &Array2<f64>, w: &Array2<f64>, h: &Array2<f64>, lambda: f64) -> f64 {
    let penalty = w.mapv(|x| x * x).sum() + h.mapv(|x| x * x).sum();
    0.5 * reconstruction_error(v, w, h) + 0.5 * lambda * penalty
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_rank_matrix() -> Array2<f64> {
        let mut rng = rand::thread_rng();
        let a = Array2::from_shape_fn((30, 3), |_| rng.gen_range(0.0..1.0));
        let b = Array2::from_shape_fn((3, 16), |_| rng.gen_range(0.0..1.0));
        a.dot(&b)
    }

    #[test]
    fn test_objective_is_non_increasing() {
        let v = low_rank_matrix();
        let config = NmfConfig {
            rank: 3,
            tolerance: 0.0,
            max_iterations: 200,
            ..NmfConfig::default()
        };
        let result = decompose(&v, &config, &mut rand::thread_rng()).unwrap();
        assert_eq!(result.iterations, 200);
        assert_eq!(result.objective_history.len(), result.error_history.len());
        for pair in result.objective_history.windows(2) {
            assert!(pair[1] <= pair[0] * (1.0 + 1e-9) + 1e-12, "{} -> {}", pair[0], pair[1]);
        }
        assert!(result.w.iter().all(|x| *x >= 0.0));
        assert!(result.h.iter().all(|x| *x >= 0.0));
    }

    #[test]
    fn test_reported_error_is_squared_reconstruction_error() {
        let v = low_rank_matrix();
        let config = NmfConfig {
            rank: 3,
            l2_lambda: 0.1,
            tolerance: 0.0,
            max_iterations: 100,
            ..NmfConfig::default()
        };
        let result = decompose(&v, &config, &mut rand::thread_rng()).unwrap();
        let squared = (&v - &result.w.dot(&result.h)).mapv(|x| x * x).sum();
        assert!((result.final_error() - squared).abs() <= 1e-9 * squared.max(1.0));
        // the penalty term keeps the objective above half the fit
        assert!(result.final_objective() > 0.5 * result.final_error());

        // without regularization the reconstruction error itself never rises
        let unregularized = NmfConfig { l2_lambda: 0.0, ..config };
        let result = decompose(&v, &unregularized, &mut rand::thread_rng()).unwrap();
        for pair in result.error_history.windows(2) {
            assert!(pair[1] <= pair[0] * (1.0 + 1e-9) + 1e-12, "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_reconstruction_is_close() {
        let v = low_rank_matrix();
        let config = NmfConfig {
            rank: 3,
            l2_lambda: 0.0,
            tolerance: 0.0,
            max_iterations: 1_000,
            ..NmfConfig::default()
        };
        let result = decompose(&v, &config, &mut rand::thread_rng()).unwrap();
        let relative = (&v - &result.w.dot(&result.h)).mapv(|x| x * x).sum().sqrt() / v.mapv(|x| x * x).sum().sqrt();
        assert!(relative < 0.1, "relative error {}", relative);
    }

    #[test]
    fn test_rejects_bad_input() {
        let config = NmfConfig::default();
        let single = Array2::from_elem((1, 16), 0.5);
        assert!(matches!(
            decompose(&single, &config, &mut rand::thread_rng()),
            Err(SynthesisError::InsufficientData(_))
        ));
        let mut negative = Array2::from_elem((4, 16), 0.5);
        negative[[0, 0]] = -1.0;
        assert!(matches!(
            decompose(&negative, &config, &mut rand::thread_rng()),
            Err(SynthesisError::Factorization(_))
        ));
    }

    #[test]
    fn test_projection_recovers_weights() {
        let h = Array2::from_shape_vec((2, 4), vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]).unwrap();
        let weights = project(&[2.0, 2.0, 0.5, 0.5], &h, 200);
        assert!((weights[0] - 2.0).abs() < 1e-3);
        assert!((weights[1] - 0.5).abs() < 1e-3);
    }
}
