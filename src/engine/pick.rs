use super::odds::american_to_probability;
use crate::error::ResultError;
use crate::feed::types::MarketKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Star rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Confidence(u8);

impl Confidence {
    pub const MIN: Confidence = Confidence(1);
    pub const MAX: Confidence = Confidence(5);

    pub fn new(stars: u8) -> Option<Self> {
        (1..=5).contains(&stars).then_some(Confidence(stars))
    }

    /// Clamp any count into the valid star range.
    pub fn saturating(stars: u8) -> Self {
        Confidence(stars.clamp(1, 5))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// "⭐⭐⭐" for display.
    pub fn stars(self) -> String {
        "⭐".repeat(self.0 as usize)
    }
}

impl TryFrom<u8> for Confidence {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Confidence::new(value).ok_or_else(|| format!("confidence must be 1-5, got {value}"))
    }
}

impl From<Confidence> for u8 {
    fn from(c: Confidence) -> u8 {
        c.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}★", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickResult {
    Pending,
    Win,
    Loss,
    Push,
}

impl PickResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickResult::Pending => "Pending",
            PickResult::Win => "Win",
            PickResult::Loss => "Loss",
            PickResult::Push => "Push",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(PickResult::Pending),
            "win" | "w" => Some(PickResult::Win),
            "loss" | "l" => Some(PickResult::Loss),
            "push" | "p" => Some(PickResult::Push),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PickResult::Pending)
    }
}

impl fmt::Display for PickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted recommendation produced by the consensus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    /// Store row id; `None` until appended.
    pub id: Option<i64>,
    pub game_id: String,
    pub sport: String,
    pub market: MarketKind,
    pub side: String,
    pub line: Option<f64>,
    pub odds_american: Option<f64>,
    pub confidence: Confidence,
    pub rationale: String,
    pub result: PickResult,
    pub commence_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pick {
    /// Selection as shown to users, e.g. "Boston Celtics -3.5" or "Over 221".
    pub fn selection(&self) -> String {
        match (self.market, self.line) {
            (MarketKind::Spread, Some(line)) => format!("{} {:+}", self.side, line),
            (MarketKind::Total, Some(line)) => format!("{} {}", self.side, line),
            _ => self.side.clone(),
        }
    }

    /// Implied win probability of the recorded price.
    pub fn implied_probability(&self) -> Option<f64> {
        self.odds_american.map(american_to_probability)
    }

    /// Move a pending pick to its terminal result. Only allowed once.
    pub fn resolve(&mut self, result: PickResult, now: DateTime<Utc>) -> Result<(), ResultError> {
        if !result.is_terminal() {
            return Err(ResultError::NotTerminal);
        }
        if self.result.is_terminal() {
            return Err(ResultError::AlreadyResolved {
                id: self.id.unwrap_or_default(),
                result: self.result,
            });
        }
        self.result = result;
        self.updated_at = now;
        Ok(())
    }
}
