//! Service configuration
//!
//! Layered with the `config` crate: an optional TOML file (path from
//! `SYNTH_CONFIG`, default `synthesis.toml`) overridden by `SYNTH__SECTION__KEY`
//! environment variables. Every field has a default, so an empty environment
//! yields a runnable configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthesisError};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub buffer: BufferConfig,
    pub gp: GpConfig,
    pub nmf: NmfConfig,
    pub adversarial: AdversarialConfig,
    pub paper: PaperConfig,
    pub lifecycle: LifecycleConfig,
    pub orchestrator: OrchestratorConfig,
    pub feed: FeedConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load from file + environment and validate
    pub fn load() -> Result<Self> {
        let path = std::env::var("SYNTH_CONFIG").unwrap_or_else(|_| "synthesis.toml".to_string());

        let config: Config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("SYNTH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engines cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SynthesisError::Config(msg.to_string()));

        if self.buffer.capacity == 0 {
            return invalid("buffer.capacity must be positive");
        }
        if self.gp.islands == 0 {
            return invalid("gp.islands must be at least 1");
        }
        if self.gp.population_size < self.gp.islands * (self.gp.elite_count + 2) {
            return invalid("gp.population_size too small for islands and elite count");
        }
        if self.gp.crossover_rate + self.gp.mutation_rate + self.gp.reproduction_rate <= 0.0 {
            return invalid("gp operator rates must not all be zero");
        }
        if self.gp.tournament_size == 0 {
            return invalid("gp.tournament_size must be at least 1");
        }
        if !(0.0..1.0).contains(&self.gp.in_sample_fraction) || self.gp.in_sample_fraction <= 0.0 {
            return invalid("gp.in_sample_fraction must be in (0, 1)");
        }
        if self.gp.max_depth < 3 || self.gp.max_nodes < 5 {
            return invalid("gp tree limits too small to express a conditional strategy");
        }
        if self.nmf.rank == 0 {
            return invalid("nmf.rank must be at least 1");
        }
        if self.lifecycle.max_active_strategies == 0 {
            return invalid("lifecycle.max_active_strategies must be at least 1");
        }
        if self.lifecycle.health_half_life_hours <= 0.0 {
            return invalid("lifecycle.health_half_life_hours must be positive");
        }
        if self.orchestrator.cycle_interval_secs == 0 {
            return invalid("orchestrator.cycle_interval_secs must be positive");
        }
        if url::Url::parse(&self.feed.url).is_err() {
            return Err(SynthesisError::Config(format!("feed.url is not a valid URL: {}", self.feed.url)));
        }
        Ok(())
    }
}

/// Event corpus settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Hard capacity of the ring buffer
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: 5_000 }
    }
}

/// Genetic programming settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GpConfig {
    pub population_size: usize,
    pub islands: usize,
    /// Elites kept unchanged per island
    pub elite_count: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub reproduction_rate: f64,
    /// Fitness penalty per tree node
    pub parsimony_pressure: f64,
    pub max_depth: usize,
    pub max_nodes: usize,
    /// Depth used when growing fresh random trees
    pub init_depth: usize,
    pub migration_interval: u64,
    /// Fraction of an island that migrates each migration round
    pub migration_rate: f64,
    pub hall_of_fame_size: usize,
    pub hof_reinjection_interval: u64,
    pub stagnation_limit: u32,
    pub stagnation_replace_fraction: f64,
    /// Chronological share of each series used for fitness (rest is out-of-sample)
    pub in_sample_fraction: f64,
    pub min_trades: usize,
    pub commission_rate: f64,
    pub max_offspring_attempts: usize,
    /// Best-fitness gain that counts as improvement
    pub improvement_epsilon: f64,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            population_size: 120,
            islands: 3,
            elite_count: 2,
            tournament_size: 5,
            crossover_rate: 0.7,
            mutation_rate: 0.2,
            reproduction_rate: 0.1,
            parsimony_pressure: 0.002,
            max_depth: 8,
            max_nodes: 48,
            init_depth: 4,
            migration_interval: 5,
            migration_rate: 0.1,
            hall_of_fame_size: 10,
            hof_reinjection_interval: 10,
            stagnation_limit: 15,
            stagnation_replace_fraction: 0.3,
            in_sample_fraction: 0.7,
            min_trades: 5,
            commission_rate: 0.0005,
            max_offspring_attempts: 10,
            improvement_epsilon: 1e-4,
        }
    }
}

/// Factor engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NmfConfig {
    pub rank: usize,
    pub max_iterations: usize,
    /// Relative error change that counts as converged
    pub tolerance: f64,
    pub l2_lambda: f64,
    /// Number of past decompositions kept for trend classification
    pub history_len: usize,
    pub min_snapshots: usize,
    pub candidates_per_cycle: usize,
    /// Minimum distance to every existing genome for gap filling (normalized)
    pub novelty_threshold: f64,
    pub min_novelty: f64,
    pub min_expected_fitness: f64,
    pub gap_fill_attempts: usize,
    pub amplification_strength: f64,
    pub jitter: f64,
}

impl Default for NmfConfig {
    fn default() -> Self {
        Self {
            rank: 5,
            max_iterations: 500,
            tolerance: 1e-6,
            l2_lambda: 0.01,
            history_len: 10,
            min_snapshots: 8,
            candidates_per_cycle: 4,
            novelty_threshold: 0.15,
            min_novelty: 0.05,
            min_expected_fitness: 0.0,
            gap_fill_attempts: 200,
            amplification_strength: 0.5,
            jitter: 0.05,
        }
    }
}

/// Adversarial engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdversarialConfig {
    /// Number of top bots (by cumulative PnL) analysed
    pub top_k: usize,
    pub min_sample_size: usize,
    pub loss_rate_threshold: f64,
    pub regime_loss_rate_threshold: f64,
    /// Average return (percent) must be below this for a regime finding
    pub max_avg_return_pct: f64,
    /// Minimum severity for a weakness to be registered
    pub exploit_threshold: f64,
    pub severity_scale: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub high_atr_pct: f64,
    pub low_volume_ratio: f64,
    pub counter_trend_strength: f64,
    /// Consecutive losses that define a tilt state
    pub tilt_streak: usize,
    /// Net directional bias, |long - short| / total
    pub bias_threshold: f64,
    pub shared_multiplier: f64,
    /// Share of the weak bot's losses a counter-strategy is assumed to capture
    pub capture_ratio: f64,
    pub trend_exit_strength: f64,
    pub max_strategies: usize,
}

impl Default for AdversarialConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_sample_size: 5,
            loss_rate_threshold: 0.55,
            regime_loss_rate_threshold: 0.6,
            max_avg_return_pct: 0.0,
            exploit_threshold: 0.05,
            severity_scale: 1.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            high_atr_pct: 2.0,
            low_volume_ratio: 0.7,
            counter_trend_strength: 0.3,
            tilt_streak: 2,
            bias_threshold: 0.4,
            shared_multiplier: 1.5,
            capture_ratio: 0.7,
            trend_exit_strength: 0.5,
            max_strategies: 100,
        }
    }
}

/// Paper trading execution model
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaperConfig {
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub base_slippage_bps: f64,
    /// Extra bps per unit of realized volatility
    pub volatility_slippage_multiplier: f64,
    /// Extra bps per unit of notional / reference_liquidity
    pub size_impact_bps: f64,
    pub reference_liquidity: f64,
    pub half_spread_bps: f64,
    pub base_latency_ms: f64,
    pub latency_jitter_ms: f64,
    pub latency_spike_probability: f64,
    pub latency_spike_multiplier: f64,
    /// Max share of equity committed to a single position
    pub max_position_fraction: f64,
    /// Intraday equity loss that halts new entries
    pub daily_drawdown_limit: f64,
    pub max_recent_orders: usize,
    pub max_equity_points: usize,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            commission_rate: 0.001,
            base_slippage_bps: 2.0,
            volatility_slippage_multiplier: 50.0,
            size_impact_bps: 10.0,
            reference_liquidity: 100_000.0,
            half_spread_bps: 1.0,
            base_latency_ms: 40.0,
            latency_jitter_ms: 30.0,
            latency_spike_probability: 0.02,
            latency_spike_multiplier: 5.0,
            max_position_fraction: 0.2,
            daily_drawdown_limit: 0.05,
            max_recent_orders: 50,
            max_equity_points: 5_000,
        }
    }
}

/// INCUBATION → PAPER gate
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IncubationCriteria {
    pub min_generations: u64,
    pub min_fitness: f64,
    pub min_trades: usize,
    pub max_drawdown: f64,
    pub min_win_rate: f64,
    pub min_sharpe: f64,
    pub min_degradation_ratio: f64,
    /// Generations after which an unpromoted incubating strategy retires
    pub max_generations: u64,
}

impl Default for IncubationCriteria {
    fn default() -> Self {
        Self {
            min_generations: 10,
            min_fitness: 0.6,
            min_trades: 20,
            max_drawdown: 0.15,
            min_win_rate: 0.5,
            min_sharpe: 0.8,
            min_degradation_ratio: 0.5,
            max_generations: 60,
        }
    }
}

/// PAPER → VALIDATION gate and early-retirement limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaperCriteria {
    pub min_hours: f64,
    pub min_trades: usize,
    pub min_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub min_win_rate: f64,
    pub min_sharpe: f64,
    pub retire_return_floor_pct: f64,
    pub retire_drawdown_pct: f64,
}

impl Default for PaperCriteria {
    fn default() -> Self {
        Self {
            min_hours: 24.0,
            min_trades: 20,
            min_return_pct: 1.0,
            max_drawdown_pct: 10.0,
            min_win_rate: 0.52,
            min_sharpe: 1.0,
            retire_return_floor_pct: -5.0,
            retire_drawdown_pct: 15.0,
        }
    }
}

/// Lifecycle state machine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub max_active_strategies: usize,
    pub incubation: IncubationCriteria,
    pub paper: PaperCriteria,
    pub validation_threshold: f64,
    /// Allocation recorded for LIVE strategies (eligibility only)
    pub live_allocation: f64,
    pub health_half_life_hours: f64,
    pub retirement_health_floor: f64,
    pub initial_health: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_active_strategies: 30,
            incubation: IncubationCriteria::default(),
            paper: PaperCriteria::default(),
            validation_threshold: 0.6,
            live_allocation: 0.02,
            health_half_life_hours: 48.0,
            retirement_health_floor: 0.2,
            initial_health: 0.5,
        }
    }
}

/// Cycle cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub cycle_interval_secs: u64,
    pub health_sweep_interval_secs: u64,
    /// Best GP individual must reach this fitness to be registered
    pub min_register_fitness: f64,
    pub factor_every: u64,
    pub adversarial_every: u64,
    pub hall_of_fame_every: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 15,
            health_sweep_interval_secs: 60,
            min_register_fitness: 0.5,
            factor_every: 10,
            adversarial_every: 5,
            hall_of_fame_every: 20,
        }
    }
}

/// Arena feed connection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub channels: Vec<String>,
    pub source_name: String,
    pub channel_capacity: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8090/arena".to_string(),
            channels: vec![
                "trades".to_string(),
                "leaderboard".to_string(),
                "tournament".to_string(),
                "evolution".to_string(),
            ],
            source_name: "arena".to_string(),
            channel_capacity: 10_000,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.3,
        }
    }
}

/// HTTP query surface
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Capacity of the notification broadcast channel
    pub push_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8095,
            push_buffer: 1_024,
        }
    }
}
