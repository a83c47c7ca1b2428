//! Core domain types shared by every engine
//!
//! Inbound arena notifications are normalized into [`ObservationEvent`]s whose
//! payload is a closed tagged union, one strongly-typed body per event type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Market regime classification attached to indicator snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    #[serde(alias = "trending")]
    Trending,
    #[default]
    #[serde(alias = "ranging")]
    Ranging,
    #[serde(alias = "volatile")]
    Volatile,
    #[serde(alias = "breakout")]
    Breakout,
    #[serde(alias = "event_driven")]
    EventDriven,
    #[serde(alias = "quiet")]
    Quiet,
}

impl Regime {
    pub const ALL: [Regime; 6] = [
        Regime::Trending,
        Regime::Ranging,
        Regime::Volatile,
        Regime::Breakout,
        Regime::EventDriven,
        Regime::Quiet,
    ];

    /// Stable numeric code used when a regime appears inside an expression tree
    pub fn code(&self) -> f64 {
        match self {
            Regime::Trending => 0.0,
            Regime::Ranging => 1.0,
            Regime::Volatile => 2.0,
            Regime::Breakout => 3.0,
            Regime::EventDriven => 4.0,
            Regime::Quiet => 5.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trending => "TRENDING",
            Regime::Ranging => "RANGING",
            Regime::Volatile => "VOLATILE",
            Regime::Breakout => "BREAKOUT",
            Regime::EventDriven => "EVENT_DRIVEN",
            Regime::Quiet => "QUIET",
        }
    }
}

/// Direction of a trade or position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    #[serde(alias = "buy", alias = "BUY", alias = "LONG")]
    Long,
    #[serde(alias = "sell", alias = "SELL", alias = "SHORT")]
    Short,
}

impl TradeSide {
    pub fn opposite(&self) -> Self {
        match self {
            TradeSide::Long => TradeSide::Short,
            TradeSide::Short => TradeSide::Long,
        }
    }

    /// +1 for long exposure, -1 for short exposure
    pub fn sign(&self) -> f64 {
        match self {
            TradeSide::Long => 1.0,
            TradeSide::Short => -1.0,
        }
    }
}

/// Indicator values observed alongside an event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub rsi: f64,
    pub macd_histogram: f64,
    /// ATR as a percentage of price
    pub atr_pct: f64,
    /// Position inside the Bollinger band, 0.0 = lower band, 1.0 = upper band
    pub bollinger_position: f64,
    /// Current volume relative to its rolling mean
    pub volume_ratio: f64,
    /// -1.0 (strong downtrend) to 1.0 (strong uptrend)
    pub trend_strength: f64,
    /// Realized volatility (fractional, e.g. 0.02 = 2%)
    pub volatility: f64,
    pub regime: Regime,
}

impl Default for IndicatorSnapshot {
    fn default() -> Self {
        Self {
            price: 0.0,
            rsi: 50.0,
            macd_histogram: 0.0,
            atr_pct: 1.0,
            bollinger_position: 0.5,
            volume_ratio: 1.0,
            trend_strength: 0.0,
            volatility: 0.01,
            regime: Regime::default(),
        }
    }
}

impl IndicatorSnapshot {
    pub fn is_finite(&self) -> bool {
        [
            self.price,
            self.rsi,
            self.macd_histogram,
            self.atr_pct,
            self.bollinger_position,
            self.volume_ratio,
            self.trend_strength,
            self.volatility,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Event type discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Trade,
    PositionUpdate,
    FitnessChange,
    DnaMutation,
}

/// A competitor trade execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePayload {
    pub bot_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub price: f64,
    pub quantity: f64,
    /// Realized PnL in quote currency
    pub pnl: f64,
    /// Realized return in percent (-1.5 = -1.5%)
    pub return_pct: f64,
}

impl TradePayload {
    /// Return in percent of traded notional, derived from PnL when the arena
    /// did not report one
    pub fn realized_return_pct(&self) -> f64 {
        if self.return_pct != 0.0 {
            return self.return_pct;
        }
        pnl_return_pct(self.pnl, self.price, self.quantity)
    }
}

/// `pnl / (price × quantity) × 100`, 0 when the notional is not positive
pub fn pnl_return_pct(pnl: f64, price: f64, quantity: f64) -> f64 {
    let notional = price * quantity.abs();
    if notional > 0.0 && notional.is_finite() {
        pnl / notional * 100.0
    } else {
        0.0
    }
}

/// A competitor position change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPayload {
    pub bot_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub size: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
}

/// A fitness observation from a leaderboard snapshot or tournament round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessPayload {
    pub bot_id: String,
    pub fitness: f64,
    pub total_pnl: f64,
    pub win_rate: Option<f64>,
    pub rank: Option<u32>,
    pub round: Option<u64>,
    /// Parameter genome, when the arena publishes it alongside fitness
    pub genome: Option<Vec<f64>>,
}

/// A genome mutation notice from the arena's evolution loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnaPayload {
    pub bot_id: String,
    pub generation: u64,
    pub genome: Vec<f64>,
    pub parent_ids: Vec<String>,
    pub mutation: Option<String>,
    pub fitness: Option<f64>,
}

/// Closed union of observation payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventPayload {
    Trade(TradePayload),
    PositionUpdate(PositionPayload),
    FitnessChange(FitnessPayload),
    DnaMutation(DnaPayload),
}

/// Normalized, immutable observation of arena activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: EventPayload,
    pub indicators: Option<IndicatorSnapshot>,
}

impl ObservationEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
        payload: EventPayload,
        indicators: Option<IndicatorSnapshot>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            source: source.into(),
            payload,
            indicators,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::Trade(_) => EventType::Trade,
            EventPayload::PositionUpdate(_) => EventType::PositionUpdate,
            EventPayload::FitnessChange(_) => EventType::FitnessChange,
            EventPayload::DnaMutation(_) => EventType::DnaMutation,
        }
    }

    pub fn bot_id(&self) -> &str {
        match &self.payload {
            EventPayload::Trade(p) => &p.bot_id,
            EventPayload::PositionUpdate(p) => &p.bot_id,
            EventPayload::FitnessChange(p) => &p.bot_id,
            EventPayload::DnaMutation(p) => &p.bot_id,
        }
    }

    /// Symbol the event refers to, if any
    pub fn symbol(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Trade(p) => Some(&p.symbol),
            EventPayload::PositionUpdate(p) => Some(&p.symbol),
            _ => None,
        }
    }

    /// Best available market price: indicator snapshot first, then the trade print
    pub fn price(&self) -> Option<f64> {
        let from_snapshot = self
            .indicators
            .as_ref()
            .map(|s| s.price)
            .filter(|p| *p > 0.0);
        from_snapshot.or(match &self.payload {
            EventPayload::Trade(p) if p.price > 0.0 => Some(p.price),
            _ => None,
        })
    }

    pub fn as_trade(&self) -> Option<&TradePayload> {
        match &self.payload {
            EventPayload::Trade(p) => Some(p),
            _ => None,
        }
    }
}

/// Backtest / evaluation metrics bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    /// Fractional total return (0.05 = 5%)
    pub total_return: f64,
    pub sharpe: f64,
    /// Fractional max drawdown (0.10 = 10%)
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
    pub regime_returns: BTreeMap<Regime, f64>,
    pub in_sample_return: f64,
    pub out_of_sample_return: f64,
    /// out_of_sample_return / in_sample_return
    pub degradation_ratio: f64,
}
