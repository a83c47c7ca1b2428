//! Arena feed normalization
//!
//! One inbound JSON message (discriminated by its `type` field) becomes zero or
//! more [`ObservationEvent`]s. Anything that fails validation is reported as
//! [`SynthesisError::MalformedMessage`] so the caller can log and drop it.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Result, SynthesisError};
use crate::types::{
    pnl_return_pct, DnaPayload, EventPayload, FitnessPayload, IndicatorSnapshot, ObservationEvent,
    PositionPayload, TradePayload, TradeSide,
};

/// Wire format published by the arena
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawFeedMessage {
    #[serde(alias = "trade_executed")]
    Trade(RawTrade),
    PositionUpdate(RawPosition),
    #[serde(alias = "leaderboard_snapshot")]
    Leaderboard(RawLeaderboard),
    #[serde(alias = "round_result")]
    TournamentRound(RawRound),
    #[serde(alias = "mutation", alias = "dna_mutation")]
    Evolution(RawEvolution),
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(alias = "botId")]
    bot_id: String,
    symbol: String,
    side: TradeSide,
    price: f64,
    #[serde(default, alias = "size")]
    quantity: f64,
    #[serde(default)]
    pnl: f64,
    #[serde(default, alias = "returnPct")]
    return_pct: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
    indicators: Option<IndicatorSnapshot>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    #[serde(alias = "botId")]
    bot_id: String,
    symbol: String,
    side: TradeSide,
    size: f64,
    entry_price: f64,
    #[serde(default)]
    unrealized_pnl: f64,
    timestamp: Option<DateTime<Utc>>,
    indicators: Option<IndicatorSnapshot>,
}

#[derive(Debug, Deserialize)]
struct RawStanding {
    #[serde(alias = "botId")]
    bot_id: String,
    fitness: f64,
    #[serde(default)]
    total_pnl: f64,
    win_rate: Option<f64>,
    rank: Option<u32>,
    genome: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct RawLeaderboard {
    #[serde(alias = "bots")]
    entries: Vec<RawStanding>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawRound {
    round: u64,
    results: Vec<RawStanding>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawEvolution {
    #[serde(alias = "botId")]
    bot_id: String,
    #[serde(default)]
    generation: u64,
    #[serde(alias = "dna")]
    genome: Vec<f64>,
    #[serde(default)]
    parent_ids: Vec<String>,
    mutation: Option<String>,
    fitness: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
}

/// Parse one feed message into observation events
pub fn normalize(text: &str, source: &str) -> Result<Vec<ObservationEvent>> {
    let raw: RawFeedMessage =
        serde_json::from_str(text).map_err(|e| SynthesisError::MalformedMessage(e.to_string()))?;

    match raw {
        RawFeedMessage::Trade(t) => {
            require_bot_id(&t.bot_id)?;
            require_finite("trade", &[t.price, t.quantity, t.pnl])?;
            if t.price <= 0.0 {
                return Err(malformed("trade price must be positive"));
            }
            let return_pct = match t.return_pct {
                Some(r) => {
                    require_finite("trade", &[r])?;
                    r
                }
                None => pnl_return_pct(t.pnl, t.price, t.quantity),
            };
            let indicators = validate_indicators(t.indicators)?;
            let payload = EventPayload::Trade(TradePayload {
                bot_id: t.bot_id,
                symbol: t.symbol,
                side: t.side,
                price: t.price,
                quantity: t.quantity,
                pnl: t.pnl,
                return_pct,
            });
            Ok(vec![ObservationEvent::new(
                t.timestamp.unwrap_or_else(Utc::now),
                source,
                payload,
                indicators,
            )])
        }
        RawFeedMessage::PositionUpdate(p) => {
            require_bot_id(&p.bot_id)?;
            require_finite("position", &[p.size, p.entry_price, p.unrealized_pnl])?;
            let indicators = validate_indicators(p.indicators)?;
            let payload = EventPayload::PositionUpdate(PositionPayload {
                bot_id: p.bot_id,
                symbol: p.symbol,
                side: p.side,
                size: p.size,
                entry_price: p.entry_price,
                unrealized_pnl: p.unrealized_pnl,
            });
            Ok(vec![ObservationEvent::new(
                p.timestamp.unwrap_or_else(Utc::now),
                source,
                payload,
                indicators,
            )])
        }
        RawFeedMessage::Leaderboard(board) => {
            let timestamp = board.timestamp.unwrap_or_else(Utc::now);
            board
                .entries
                .into_iter()
                .map(|entry| standing_event(entry, None, timestamp, source))
                .collect()
        }
        RawFeedMessage::TournamentRound(round) => {
            let timestamp = round.timestamp.unwrap_or_else(Utc::now);
            let number = round.round;
            round
                .results
                .into_iter()
                .map(|entry| standing_event(entry, Some(number), timestamp, source))
                .collect()
        }
        RawFeedMessage::Evolution(e) => {
            require_bot_id(&e.bot_id)?;
            let genome = sanitize_genome(e.genome)?;
            if let Some(f) = e.fitness {
                require_finite("evolution", &[f])?;
            }
            let payload = EventPayload::DnaMutation(DnaPayload {
                bot_id: e.bot_id,
                generation: e.generation,
                genome,
                parent_ids: e.parent_ids,
                mutation: e.mutation,
                fitness: e.fitness,
            });
            Ok(vec![ObservationEvent::new(
                e.timestamp.unwrap_or_else(Utc::now),
                source,
                payload,
                None,
            )])
        }
    }
}

fn standing_event(
    entry: RawStanding,
    round: Option<u64>,
    timestamp: DateTime<Utc>,
    source: &str,
) -> Result<ObservationEvent> {
    require_bot_id(&entry.bot_id)?;
    require_finite("standing", &[entry.fitness, entry.total_pnl])?;
    if let Some(w) = entry.win_rate {
        require_finite("standing", &[w])?;
    }
    let genome = entry.genome.map(sanitize_genome).transpose()?;

    Ok(ObservationEvent::new(
        timestamp,
        source,
        EventPayload::FitnessChange(FitnessPayload {
            bot_id: entry.bot_id,
            fitness: entry.fitness,
            total_pnl: entry.total_pnl,
            win_rate: entry.win_rate,
            rank: entry.rank,
            round,
            genome,
        }),
        None,
    ))
}

fn malformed(msg: &str) -> SynthesisError {
    SynthesisError::MalformedMessage(msg.to_string())
}

fn require_bot_id(bot_id: &str) -> Result<()> {
    if bot_id.trim().is_empty() {
        return Err(malformed("empty bot_id"));
    }
    Ok(())
}

fn require_finite(kind: &str, values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SynthesisError::MalformedMessage(format!(
            "non-finite numeric field in {} message",
            kind
        )))
    }
}

fn validate_indicators(snapshot: Option<IndicatorSnapshot>) -> Result<Option<IndicatorSnapshot>> {
    match snapshot {
        Some(s) if !s.is_finite() => Err(malformed("non-finite indicator value")),
        other => Ok(other),
    }
}

/// Genomes feed a non-negative factorization, so negatives clamp to zero
fn sanitize_genome(genome: Vec<f64>) -> Result<Vec<f64>> {
    if genome.is_empty() {
        return Err(malformed("empty genome"));
    }
    require_finite("genome", &genome)?;
    Ok(genome.into_iter().map(|g| g.max(0.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, Regime};

    #[test]
    fn test_trade_with_indicators() {
        let msg = r#"{
            "type": "trade_executed",
            "bot_id": "bot-a",
            "symbol": "BTC/USD",
            "side": "sell",
            "price": 50000.0,
            "quantity": 0.1,
            "pnl": -12.5,
            "return_pct": -0.8,
            "indicators": {"price": 50000.0, "rsi": 72.0, "regime": "VOLATILE"}
        }"#;

        let events = normalize(msg, "arena").unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type(), EventType::Trade);
        assert_eq!(event.bot_id(), "bot-a");

        let trade = event.as_trade().unwrap();
        assert_eq!(trade.side, TradeSide::Short);
        assert_eq!(trade.return_pct, -0.8);

        let snapshot = event.indicators.unwrap();
        assert_eq!(snapshot.regime, Regime::Volatile);
        assert_eq!(snapshot.rsi, 72.0);
        // unspecified fields fall back to neutral defaults
        assert_eq!(snapshot.bollinger_position, 0.5);
    }

    #[test]
    fn test_trade_without_return_derives_it_from_pnl() {
        let msg = r#"{
            "type": "trade",
            "bot_id": "bot-a",
            "symbol": "BTC/USD",
            "side": "buy",
            "price": 50000.0,
            "quantity": 0.1,
            "pnl": -15.0
        }"#;

        let events = normalize(msg, "arena").unwrap();
        let trade = events[0].as_trade().unwrap();
        assert!((trade.return_pct - (-0.3)).abs() < 1e-9);
        assert!(trade.realized_return_pct() < 0.0);
    }

    #[test]
    fn test_leaderboard_fans_out() {
        let msg = r#"{
            "type": "leaderboard",
            "entries": [
                {"bot_id": "a", "fitness": 0.8, "total_pnl": 120.0, "genome": [0.1, -0.5, 0.9]},
                {"bot_id": "b", "fitness": 0.3, "rank": 2}
            ]
        }"#;

        let events = normalize(msg, "arena").unwrap();
        assert_eq!(events.len(), 2);
        match &events[0].payload {
            EventPayload::FitnessChange(p) => {
                assert_eq!(p.genome.as_deref(), Some(&[0.1, 0.0, 0.9][..]));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_tournament_round_carries_round_number() {
        let msg = r#"{"type": "round_result", "round": 7, "results": [{"bot_id": "x", "fitness": 0.4}]}"#;
        let events = normalize(msg, "arena").unwrap();
        match &events[0].payload {
            EventPayload::FitnessChange(p) => assert_eq!(p.round, Some(7)),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_evolution_message() {
        let msg = r#"{"type": "mutation", "bot_id": "c", "generation": 4, "dna": [0.2, 0.4], "parent_ids": ["a", "b"]}"#;
        let events = normalize(msg, "arena").unwrap();
        assert_eq!(events[0].event_type(), EventType::DnaMutation);
    }

    #[test]
    fn test_rejects_malformed() {
        let cases = [
            "not json",
            r#"{"type": "unknown_kind"}"#,
            r#"{"type": "trade", "bot_id": "", "symbol": "X", "side": "buy", "price": 1.0}"#,
            r#"{"type": "trade", "bot_id": "a", "symbol": "X", "side": "buy", "price": -1.0}"#,
            r#"{"type": "evolution", "bot_id": "a", "genome": []}"#,
            r#"{"type": "leaderboard", "entries": [{"bot_id": " ", "fitness": 0.1}]}"#,
        ];
        for case in cases {
            assert!(
                matches!(normalize(case, "arena"), Err(SynthesisError::MalformedMessage(_))),
                "expected rejection for {}",
                case
            );
        }
    }
}
