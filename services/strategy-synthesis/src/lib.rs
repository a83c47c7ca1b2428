//! Strategy synthesis pipeline
//!
//! Observes a competitive trading arena, breeds candidate strategies with
//! island-model genetic programming, mines latent factors from winning
//! genomes, builds counter-strategies against the weaknesses of top bots,
//! and walks every candidate through incubation, paper trading and
//! validation before it is marked eligible for live allocation.

pub mod types;
pub mod error;
pub mod config;
pub mod tree;
pub mod buffer;
pub mod ingest;
pub mod gp;
pub mod factor;
pub mod adversarial;
pub mod paper;
pub mod lifecycle;
pub mod bus;
pub mod feed;
pub mod observability;
pub mod orchestrator;
pub mod views;

pub use types::*;
pub use error::{Result, SynthesisError};
pub use config::Config;
pub use tree::{Action, StrategyNode, TreeLimits};
pub use buffer::EventBuffer;
pub use gp::{GenerationReport, GpEngine, GpIndividual};
pub use factor::{FactorEngine, FactorReport};
pub use adversarial::{AdversarialEngine, AdversarialReport, AdversarialStrategy};
pub use paper::{PaperNotification, PaperResult, PaperTradingEngine};
pub use lifecycle::{LifecycleEvent, LifecycleManager, LifecycleStage, StrategyLifecycle, StrategySource};
pub use bus::{EventBus, SynthesisNotification};
pub use feed::ArenaFeedClient;
pub use observability::MetricsCollector;
pub use orchestrator::{CycleReport, NoOracle, SynthesisContext, ValidationOracle};
pub use views::{AdversarialView, FactorView, GpView, LifecycleView};
