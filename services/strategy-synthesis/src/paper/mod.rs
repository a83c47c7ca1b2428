//! Paper trading engine
//!
//! Runs registered strategies against live observation events inside
//! sandboxed portfolios. Fills are stochastic (slippage and latency drawn per
//! order), positions are sized as a fraction of equity, and a daily drawdown
//! breaker stops new entries until the next UTC day.

pub mod execution;
pub mod portfolio;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PaperConfig;
use crate::gp::fitness;
use crate::tree::{Action, StrategyNode};
use crate::types::{IndicatorSnapshot, ObservationEvent, TradeSide};
pub use execution::{ExecutionModel, Fill};
use portfolio::to_f64;
pub use portfolio::{EquityPoint, PaperPortfolio, PortfolioSnapshot, VirtualOrder, VirtualPosition};

/// Notifications raised while processing an event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaperNotification {
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
}

/// Performance summary consumed by the lifecycle manager
#[derive(Debug, Clone, Serialize)]
pub struct PaperResult {
    pub strategy_id: String,
    pub return_pct: f64,
    pub sharpe: f64,
    pub max_drawdown_pct: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
    pub equity_curve: Vec<EquityPoint>,
    pub started_at: DateTime<Utc>,
    pub halted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperStats {
    pub registered: usize,
    pub halted: usize,
    pub orders: u64,
    pub closed_trades: u64,
    pub halts: u64,
    pub events_processed: u64,
}

pub struct PaperTradingEngine {
    config: PaperConfig,
    model: ExecutionModel,
    portfolios: HashMap<String, PaperPortfolio>,
    rng: StdRng,
    orders: u64,
    closed_trades: u64,
    halts: u64,
    events_processed: u64,
}

impl PaperTradingEngine {
    pub fn new(config: PaperConfig) -> Self {
        Self {
            model: ExecutionModel::new(config.clone()),
            config,
            portfolios: HashMap::new(),
            rng: StdRng::from_entropy(),
            orders: 0,
            closed_trades: 0,
            halts: 0,
            events_processed: 0,
        }
    }

    /// Open a sandboxed portfolio; returns false if already registered
    pub fn register_strategy(&mut self, id: &str, tree: Arc<StrategyNode>, now: DateTime<Utc>) -> bool {
        if self.portfolios.contains_key(id) {
            return false;
        }
        let portfolio = PaperPortfolio::new(id, tree, self.config.initial_capital, now);
        self.portfolios.insert(id.to_string(), portfolio);
        info!(strategy = %id, capital = self.config.initial_capital, "Paper portfolio opened");
        true
    }

    /// Remove a portfolio, returning its final result
    pub fn unregister_strategy(&mut self, id: &str) -> Option<PaperResult> {
        let result = self.get_result(id);
        if self.portfolios.remove(id).is_some() {
            info!(strategy = %id, "Paper portfolio closed");
        }
        result
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.portfolios.contains_key(id)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.portfolios.keys().cloned().collect()
    }

    /// Evaluate every registered strategy against one event
    pub fn process_event(&mut self, event: &ObservationEvent) -> Vec<PaperNotification> {
        let (Some(snapshot), Some(symbol), Some(price)) = (event.indicators.as_ref(), event.symbol(), event.price())
        else {
            return Vec::new();
        };
        if !price.is_finite() || price <= 0.0 {
            return Vec::new();
        }
        self.events_processed += 1;

        let now = event.timestamp;
        let mut notifications = Vec::new();
        for portfolio in self.portfolios.values_mut() {
            if portfolio.roll_day(now) {
                info!(strategy = %portfolio.strategy_id, day = %portfolio.current_day(), "Paper trading resumed");
            }
            portfolio.mark(symbol, price);
            if let Some(n) = check_breaker(portfolio, self.config.daily_drawdown_limit, now) {
                self.halts += 1;
                notifications.push(n);
            }

            let target = match portfolio.tree.decide(snapshot) {
                Action::Buy => TradeSide::Long,
                Action::Sell => TradeSide::Short,
                Action::Hold => {
                    portfolio.record_equity(now, self.config.max_equity_points);
                    continue;
                }
            };

            let held = portfolio.position(symbol).map(|p| p.side);
            if held == Some(target) {
                portfolio.record_equity(now, self.config.max_equity_points);
                continue;
            }

            if let Some(open_side) = held {
                let quantity = portfolio
                    .position(symbol)
                    .map(|p| to_f64(p.quantity))
                    .unwrap_or(0.0);
                let fill = self.model.simulate(open_side.opposite(), price, quantity, snapshot.volatility, &mut self.rng);
                if let Some((order, closed)) =
                    portfolio.close(symbol, price, &fill, now, self.config.max_recent_orders)
                {
                    debug!(
                        strategy = %portfolio.strategy_id,
                        symbol,
                        pnl = %closed.realized_pnl,
                        return_pct = closed.return_pct,
                        "Paper position closed"
                    );
                    self.orders += 1;
                    self.closed_trades += 1;
                    notifications.push(PaperNotification::OrderFilled {
                        strategy_id: portfolio.strategy_id.clone(),
                        order,
                    });
                    notifications.push(PaperNotification::PositionClosed {
                        strategy_id: portfolio.strategy_id.clone(),
                        symbol: closed.symbol,
                        side: closed.side,
                        realized_pnl: closed.realized_pnl,
                        return_pct: closed.return_pct,
                    });
                }
            }

            if !portfolio.halted {
                if let Some(order) = open_entry(
                    portfolio,
                    &self.model,
                    &self.config,
                    &mut self.rng,
                    symbol,
                    target,
                    price,
                    snapshot,
                    now,
                ) {
                    self.orders += 1;
                    notifications.push(PaperNotification::OrderFilled {
                        strategy_id: portfolio.strategy_id.clone(),
                        order,
                    });
                }
            }

            if let Some(n) = check_breaker(portfolio, self.config.daily_drawdown_limit, now) {
                self.halts += 1;
                notifications.push(n);
            }
            portfolio.record_equity(now, self.config.max_equity_points);
        }
        notifications
    }

    pub fn get_result(&self, id: &str) -> Option<PaperResult> {
        let portfolio = self.portfolios.get(id)?;
        let initial = to_f64(portfolio.initial_capital);
        let equity = to_f64(portfolio.equity());
        let return_pct = if initial > 0.0 {
            (equity - initial) / initial * 100.0
        } else {
            0.0
        };
        let curve: Vec<f64> = portfolio.equity_curve.iter().map(|p| p.equity).collect();
        let returns = &portfolio.closed_returns;

        Some(PaperResult {
            strategy_id: id.to_string(),
            return_pct,
            sharpe: fitness::sharpe_ratio(returns),
            max_drawdown_pct: fitness::max_drawdown(&curve) * 100.0,
            win_rate: fitness::win_rate(returns),
            profit_factor: fitness::profit_factor(returns),
            trade_count: returns.len(),
            equity_curve: portfolio.equity_curve.iter().cloned().collect(),
            started_at: portfolio.started_at,
            halted: portfolio.halted,
        })
    }

    pub fn snapshot(&self, id: &str) -> Option<PortfolioSnapshot> {
        self.portfolios.get(id).map(|p| p.snapshot())
    }

    pub fn stats(&self) -> PaperStats {
        PaperStats {
            registered: self.portfolios.len(),
            halted: self.portfolios.values().filter(|p| p.halted).count(),
            orders: self.orders,
            closed_trades: self.closed_trades,
            halts: self.halts,
            events_processed: self.events_processed,
        }
    }
}

fn check_breaker(portfolio: &mut PaperPortfolio, limit: f64, now: DateTime<Utc>) -> Option<PaperNotification> {
    if portfolio.halted {
        return None;
    }
    let drawdown = portfolio.daily_drawdown();
    if drawdown < limit {
        return None;
    }
    portfolio.halted = true;
    warn!(strategy = %portfolio.strategy_id, drawdown, limit, "Daily drawdown breaker tripped, halting entries");
    Some(PaperNotification::StrategyHalted {
        strategy_id: portfolio.strategy_id.clone(),
        daily_drawdown: drawdown,
        at: now,
    })
}

#[allow(clippy::too_many_arguments)]
fn open_entry(
    portfolio: &mut PaperPortfolio,
    model: &ExecutionModel,
    config: &PaperConfig,
    rng: &mut StdRng,
    symbol: &str,
    side: TradeSide,
    price: f64,
    snapshot: &IndicatorSnapshot,
    now: DateTime<Utc>,
) -> Option<VirtualOrder> {
    let equity = to_f64(portfolio.equity());
    if equity <= 0.0 {
        return None;
    }
    let quantity = equity * config.max_position_fraction / price;
    if !quantity.is_finite() || quantity <= 0.0 {
        return None;
    }
    let fill = model.simulate(side, price, quantity, snapshot.volatility, rng);
    Some(portfolio.open(symbol, side, price, quantity, &fill, now, config.max_recent_orders))
}
