//! Stochastic fill model for paper orders

use rand::Rng;

use crate::config::PaperConfig;
use crate::types::TradeSide;

/// Simulated execution of one order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub fill_price: f64,
    pub slippage_bps: f64,
    pub latency_ms: f64,
    pub commission: f64,
}

#[derive(Debug, Clone)]
pub struct ExecutionModel {
    config: PaperConfig,
}

impl ExecutionModel {
    pub fn new(config: PaperConfig) -> Self {
        Self { config }
    }

    /// base + volatility term + size impact + half-spread
    pub fn slippage_bps(&self, volatility: f64, notional: f64) -> f64 {
        let c = &self.config;
        let size_ratio = notional.abs() / c.reference_liquidity.max(1.0);
        c.base_slippage_bps
            + c.volatility_slippage_multiplier * volatility.max(0.0)
            + c.size_impact_bps * size_ratio
            + c.half_spread_bps
    }

    /// base + jitter × U(0,1), occasionally multiplied by a spike factor
    pub fn latency_ms<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let c = &self.config;
        let mut latency = c.base_latency_ms + c.latency_jitter_ms * rng.gen::<f64>();
        if rng.gen_bool(c.latency_spike_probability.clamp(0.0, 1.0)) {
            latency *= c.latency_spike_multiplier;
        }
        latency
    }

    /// Move the requested price against the order
    pub fn fill_price(requested: f64, side: TradeSide, slippage_bps: f64) -> f64 {
        requested * (1.0 + side.sign() * slippage_bps / 10_000.0)
    }

    pub fn commission(&self, notional: f64) -> f64 {
        notional.abs() * self.config.commission_rate
    }

    pub fn simulate<R: Rng + ?Sized>(
        &self,
        side: TradeSide,
        requested_price: f64,
        quantity: f64,
        volatility: f64,
        rng: &mut R,
    ) -> Fill {
        let notional = requested_price * quantity;
        let slippage_bps = self.slippage_bps(volatility, notional);
        let fill_price = Self::fill_price(requested_price, side, slippage_bps);
        Fill {
            fill_price,
            slippage_bps,
            latency_ms: self.latency_ms(rng),
            commission: self.commission(fill_price * quantity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slippage_components() {
        let model = ExecutionModel::new(PaperConfig::default());
        // 2 base + 50×0.02 + 10×(10k/100k) + 1 half-spread
        let bps = model.slippage_bps(0.02, 10_000.0);
        assert!((bps - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_fill_moves_against_order() {
        assert!(ExecutionModel::fill_price(100.0, TradeSide::Long, 10.0) > 100.0);
        assert!(ExecutionModel::fill_price(100.0, TradeSide::Short, 10.0) < 100.0);
        assert!((ExecutionModel::fill_price(100.0, TradeSide::Long, 10.0) - 100.1).abs() < 1e-9);
    }

    #[test]
    fn test_latency_bounds() {
        let config = PaperConfig::default();
        let model = ExecutionModel::new(config.clone());
        let mut rng = rand::thread_rng();
        let ceiling = (config.base_latency_ms + config.latency_jitter_ms) * config.latency_spike_multiplier;
        for _ in 0..1_000 {
            let latency = model.latency_ms(&mut rng);
            assert!(latency >= config.base_latency_ms);
            assert!(latency <= ceiling);
        }
    }
}
