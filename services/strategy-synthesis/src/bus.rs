//! Notification bus
//!
//! The orchestrator publishes, push sockets and tests subscribe. Publishing
//! never blocks and never fails when nobody is listening; slow subscribers
//! lag and skip instead of applying backpressure to the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::lifecycle::{LifecycleEvent, LifecycleStage, StrategySource};
use crate::orchestrator::CycleReport;
use crate::paper::{PaperNotification, VirtualOrder};
use crate::types::TradeSide;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SynthesisNotification {
    GenerationComplete {
        generation: u64,
        best_fitness: f64,
        mean_fitness: f64,
        diversity: f64,
    },
    EvolutionConverged {
        generation: u64,
        stagnant_generations: u32,
    },
    MigrationComplete {
        generation: u64,
        islands: usize,
    },
    FactorizationComplete {
        factors: usize,
        iterations: usize,
        final_error: f64,
        final_objective: f64,
        converged: bool,
    },
    SynthesisComplete {
        candidates: usize,
        qualifying: usize,
    },
    WeaknessStrategiesGenerated {
        analyzed_bots: Vec<String>,
        weaknesses: usize,
        strategies: usize,
    },
    OrderFilled {
        strategy_id: String,
        order: VirtualOrder,
    },
    PositionClosed {
        strategy_id: String,
        symbol: String,
        side: TradeSide,
        realized_pnl: Decimal,
        return_pct: f64,
    },
    StrategyHalted {
        strategy_id: String,
        daily_drawdown: f64,
        at: DateTime<Utc>,
    },
    Birth {
        id: String,
        source: StrategySource,
        generation: u64,
        at: DateTime<Utc>,
    },
    Promoted {
        id: String,
        from: LifecycleStage,
        to: LifecycleStage,
        at: DateTime<Utc>,
    },
    Retired {
        id: String,
        from: LifecycleStage,
        reason: String,
        at: DateTime<Utc>,
    },
    CycleComplete(CycleReport),
}

impl From<PaperNotification> for SynthesisNotification {
    fn from(n: PaperNotification) -> Self {
        match n {
            PaperNotification::OrderFilled { strategy_id, order } => {
                SynthesisNotification::OrderFilled { strategy_id, order }
            }
            PaperNotification::PositionClosed {
                strategy_id,
                symbol,
                side,
                realized_pnl,
                return_pct,
            } => SynthesisNotification::PositionClosed {
                strategy_id,
                symbol,
                side,
                realized_pnl,
                return_pct,
            },
            PaperNotification::StrategyHalted {
                strategy_id,
                daily_drawdown,
                at,
            } => SynthesisNotification::StrategyHalted {
                strategy_id,
                daily_drawdown,
                at,
            },
        }
    }
}

impl From<LifecycleEvent> for SynthesisNotification {
    fn from(e: LifecycleEvent) -> Self {
        match e {
            LifecycleEvent::Birth {
                id,
                source,
                generation,
                at,
            } => SynthesisNotification::Birth {
                id,
                source,
                generation,
                at,
            },
            LifecycleEvent::Promoted { id, from, to, at } => SynthesisNotification::Promoted { id, from, to, at },
            LifecycleEvent::Retired { id, from, reason, at } => {
                SynthesisNotification::Retired { id, from, reason, at }
            }
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SynthesisNotification>,
    published: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self {
            tx,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the number of subscribers that received the notification
    pub fn publish(&self, notification: impl Into<SynthesisNotification>) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.tx.send(notification.into()).unwrap_or(0)
    }

    pub fn publish_all<N: Into<SynthesisNotification>>(&self, notifications: impl IntoIterator<Item = N>) {
        for n in notifications {
            self.publish(n);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SynthesisNotification> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let delivered = bus.publish(SynthesisNotification::SynthesisComplete {
            candidates: 4,
            qualifying: 1,
        });
        assert_eq!(delivered, 1);
        match rx.recv().await.unwrap() {
            SynthesisNotification::SynthesisComplete { qualifying, .. } => assert_eq!(qualifying, 1),
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(
            bus.publish(SynthesisNotification::MigrationComplete {
                generation: 5,
                islands: 3
            }),
            0
        );
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn test_lifecycle_events_serialize_flat() {
        let event = LifecycleEvent::Retired {
            id: "s1".to_string(),
            from: LifecycleStage::Paper,
            reason: "validation score 0.25 below 0.60".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(SynthesisNotification::from(event)).unwrap();
        assert_eq!(json["type"], "retired");
        assert_eq!(json["from"], "PAPER");
        assert_eq!(json["id"], "s1");
    }
}
