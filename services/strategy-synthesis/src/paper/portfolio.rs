//! Paper portfolio - sandboxed cash, positions and order ledger for one strategy

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::execution::Fill;
use crate::tree::StrategyNode;
use crate::types::TradeSide;

pub(crate) fn to_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or_default()
}

pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// A simulated order with requested vs filled price
#[derive(Debug, Clone, Serialize)]
pub struct VirtualOrder {
    pub id: Uuid,
    pub strategy_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub requested_price: Decimal,
    pub fill_price: Decimal,
    pub slippage_bps: f64,
    pub latency_ms: f64,
    pub commission: Decimal,
    /// True when the order closed an existing position
    pub closing: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VirtualPosition {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub entry_commission: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl VirtualPosition {
    pub fn unrealized_pnl(&self) -> Decimal {
        let diff = self.current_price - self.entry_price;
        match self.side {
            TradeSide::Long => diff * self.quantity,
            TradeSide::Short => -diff * self.quantity,
        }
    }

    /// Signed contribution to equity at the current mark
    fn market_value(&self) -> Decimal {
        match self.side {
            TradeSide::Long => self.quantity * self.current_price,
            TradeSide::Short => -(self.quantity * self.current_price),
        }
    }
}

/// Result of closing a position
#[derive(Debug, Clone, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub side: TradeSide,
    pub realized_pnl: Decimal,
    /// Net of both commissions, relative to entry notional
    pub return_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Portfolio snapshot for reporting
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSnapshot {
    pub strategy_id: String,
    pub strategy: String,
    pub cash: Decimal,
    pub equity: Decimal,
    pub positions: Vec<PositionSnapshot>,
    pub recent_orders: Vec<VirtualOrder>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub halted: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaperPortfolio {
    pub strategy_id: String,
    pub tree: Arc<StrategyNode>,
    pub initial_capital: Decimal,
    pub cash: Decimal,
    pub positions: HashMap<String, VirtualPosition>,
    pub realized_pnl: Decimal,
    pub recent_orders: VecDeque<VirtualOrder>,
    pub order_count: u64,
    pub closed_returns: Vec<f64>,
    pub equity_curve: VecDeque<EquityPoint>,
    pub started_at: DateTime<Utc>,
    pub halted: bool,
    current_day: NaiveDate,
    day_start_equity: Decimal,
}

impl PaperPortfolio {
    pub fn new(strategy_id: &str, tree: Arc<StrategyNode>, capital: f64, now: DateTime<Utc>) -> Self {
        let capital = to_decimal(capital);
        let mut equity_curve = VecDeque::new();
        equity_curve.push_back(EquityPoint {
            timestamp: now,
            equity: to_f64(capital),
        });
        Self {
            strategy_id: strategy_id.to_string(),
            tree,
            initial_capital: capital,
            cash: capital,
            positions: HashMap::new(),
            realized_pnl: Decimal::ZERO,
            recent_orders: VecDeque::new(),
            order_count: 0,
            closed_returns: Vec::new(),
            equity_curve,
            started_at: now,
            halted: false,
            current_day: now.date_naive(),
            day_start_equity: capital,
        }
    }

    pub fn equity(&self) -> Decimal {
        self.cash + self.positions.values().map(|p| p.market_value()).sum::<Decimal>()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl()).sum()
    }

    pub fn position(&self, symbol: &str) -> Option<&VirtualPosition> {
        self.positions.get(symbol)
    }

    pub fn mark(&mut self, symbol: &str, price: f64) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.current_price = to_decimal(price);
        }
    }

    /// Reset the daily drawdown baseline (and any halt) on a later UTC day.
    /// Timestamps from earlier days never roll back.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today <= self.current_day {
            return false;
        }
        self.current_day = today;
        self.day_start_equity = self.equity();
        let was_halted = self.halted;
        self.halted = false;
        was_halted
    }

    /// Fractional equity loss since the start of the current day
    pub fn daily_drawdown(&self) -> f64 {
        let start = to_f64(self.day_start_equity);
        if start <= 0.0 {
            return 0.0;
        }
        ((start - to_f64(self.equity())) / start).max(0.0)
    }

    pub fn current_day(&self) -> NaiveDate {
        self.current_day
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        symbol: &str,
        side: TradeSide,
        requested_price: f64,
        quantity: f64,
        fill: &Fill,
        now: DateTime<Utc>,
        max_recent: usize,
    ) -> VirtualOrder {
        let quantity = to_decimal(quantity);
        let fill_price = to_decimal(fill.fill_price);
        let commission = to_decimal(fill.commission);
        let notional = quantity * fill_price;

        match side {
            TradeSide::Long => self.cash -= notional + commission,
            TradeSide::Short => self.cash += notional - commission,
        }
        self.positions.insert(
            symbol.to_string(),
            VirtualPosition {
                symbol: symbol.to_string(),
                side,
                quantity,
                entry_price: fill_price,
                current_price: fill_price,
                entry_commission: commission,
                opened_at: now,
            },
        );

        debug!(strategy = %self.strategy_id, symbol, side = ?side, quantity = %quantity, price = %fill_price, "Paper position opened");
        self.record_order(symbol, side, quantity, requested_price, fill, false, now, max_recent)
    }

    /// Close the position on `symbol` at the simulated fill
    pub fn close(
        &mut self,
        symbol: &str,
        requested_price: f64,
        fill: &Fill,
        now: DateTime<Utc>,
        max_recent: usize,
    ) -> Option<(VirtualOrder, ClosedTrade)> {
        let position = self.positions.remove(symbol)?;
        let fill_price = to_decimal(fill.fill_price);
        let commission = to_decimal(fill.commission);
        let notional = position.quantity * fill_price;

        let gross = match position.side {
            TradeSide::Long => {
                self.cash += notional - commission;
                (fill_price - position.entry_price) * position.quantity
            }
            TradeSide::Short => {
                self.cash -= notional + commission;
                (position.entry_price - fill_price) * position.quantity
            }
        };
        let realized = gross - commission;
        self.realized_pnl += realized;

        let entry_notional = to_f64(position.entry_price * position.quantity);
        let net = to_f64(gross - commission - position.entry_commission);
        let return_pct = if entry_notional > 0.0 {
            net / entry_notional * 100.0
        } else {
            0.0
        };
        self.closed_returns.push(return_pct / 100.0);

        let order = self.record_order(
            symbol,
            position.side.opposite(),
            position.quantity,
            requested_price,
            fill,
            true,
            now,
            max_recent,
        );
        Some((
            order,
            ClosedTrade {
                symbol: symbol.to_string(),
                side: position.side,
                realized_pnl: realized,
                return_pct,
            },
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn record_order(
        &mut self,
        symbol: &str,
        side: TradeSide,
        quantity: Decimal,
        requested_price: f64,
        fill: &Fill,
        closing: bool,
        now: DateTime<Utc>,
        max_recent: usize,
    ) -> VirtualOrder {
        let order = VirtualOrder {
            id: Uuid::new_v4(),
            strategy_id: self.strategy_id.clone(),
            symbol: symbol.to_string(),
            side,
            quantity,
            requested_price: to_decimal(requested_price),
            fill_price: to_decimal(fill.fill_price),
            slippage_bps: fill.slippage_bps,
            latency_ms: fill.latency_ms,
            commission: to_decimal(fill.commission),
            closing,
            timestamp: now,
        };
        self.order_count += 1;
        self.recent_orders.push_back(order.clone());
        while self.recent_orders.len() > max_recent {
            self.recent_orders.pop_front();
        }
        order
    }

    pub fn record_equity(&mut self, now: DateTime<Utc>, max_points: usize) {
        self.equity_curve.push_back(EquityPoint {
            timestamp: now,
            equity: to_f64(self.equity()),
        });
        while self.equity_curve.len() > max_points.max(2) {
            self.equity_curve.pop_front();
        }
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        let positions = self
            .positions
            .values()
            .map(|p| PositionSnapshot {
                symbol: p.symbol.clone(),
                side: p.side,
                quantity: p.quantity,
                entry_price: p.entry_price,
                current_price: p.current_price,
                unrealized_pnl: p.unrealized_pnl(),
            })
            .collect();

        PortfolioSnapshot {
            strategy_id: self.strategy_id.clone(),
            strategy: self.tree.to_string(),
            cash: self.cash,
            equity: self.equity(),
            positions,
            recent_orders: self.recent_orders.iter().cloned().collect(),
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(),
            halted: self.halted,
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Action;

    fn fill(price: f64, commission: f64) -> Fill {
        Fill {
            fill_price: price,
            slippage_bps: 0.0,
            latency_ms: 50.0,
            commission,
        }
    }

    fn portfolio() -> PaperPortfolio {
        PaperPortfolio::new(
            "s1",
            Arc::new(StrategyNode::action(Action::Hold)),
            10_000.0,
            Utc::now(),
        )
    }

    #[test]
    fn test_long_round_trip() {
        let mut p = portfolio();
        p.open("BTC", TradeSide::Long, 100.0, 10.0, &fill(100.0, 1.0), Utc::now(), 10);
        assert_eq!(p.cash, Decimal::from(8_999));

        p.mark("BTC", 110.0);
        assert_eq!(p.unrealized_pnl(), Decimal::from(100));
        assert_eq!(p.equity(), Decimal::from(10_099));

        let (order, closed) = p.close("BTC", 110.0, &fill(110.0, 1.0), Utc::now(), 10).unwrap();
        assert!(order.closing);
        assert_eq!(order.side, TradeSide::Short);
        assert_eq!(closed.realized_pnl, Decimal::from(99));
        assert!((closed.return_pct - 9.8).abs() < 1e-9);
        assert_eq!(p.cash, Decimal::from(10_098));
        assert!(p.positions.is_empty());
    }

    #[test]
    fn test_short_round_trip() {
        let mut p = portfolio();
        p.open("ETH", TradeSide::Short, 50.0, 20.0, &fill(50.0, 0.0), Utc::now(), 10);
        p.mark("ETH", 45.0);
        assert_eq!(p.unrealized_pnl(), Decimal::from(100));
        assert_eq!(p.equity(), Decimal::from(10_100));

        let (_, closed) = p.close("ETH", 45.0, &fill(45.0, 0.0), Utc::now(), 10).unwrap();
        assert_eq!(closed.realized_pnl, Decimal::from(100));
        assert_eq!(p.cash, Decimal::from(10_100));
    }

    #[test]
    fn test_roll_day_only_moves_forward() {
        let now = Utc::now();
        let mut p = portfolio();
        p.halted = true;

        assert!(!p.roll_day(now - chrono::Duration::days(1)));
        assert!(p.halted);
        assert_eq!(p.current_day(), now.date_naive());

        assert!(p.roll_day(now + chrono::Duration::days(1)));
        assert!(!p.halted);
        assert_eq!(p.current_day(), (now + chrono::Duration::days(1)).date_naive());
    }

    #[test]
    fn test_recent_orders_bounded() {
        let mut p = portfolio();
        for _ in 0..5 {
            p.open("BTC", TradeSide::Long, 1.0, 1.0, &fill(1.0, 0.0), Utc::now(), 3);
            p.close("BTC", 1.0, &fill(1.0, 0.0), Utc::now(), 3);
        }
        assert_eq!(p.recent_orders.len(), 3);
        assert_eq!(p.order_count, 10);
        assert_eq!(p.closed_returns.len(), 5);
    }
}
