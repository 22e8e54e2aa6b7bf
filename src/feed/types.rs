use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized internal types used by the engine (provider-agnostic).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "oddsshark", alias = "OddsShark")]
    OddsShark,
    #[serde(rename = "oddstrader", alias = "OddsTrader")]
    OddsTrader,
    #[serde(rename = "cbs_sports", alias = "CBSSports")]
    CbsSports,
    #[serde(rename = "kalshi", alias = "Kalshi")]
    Kalshi,
    /// Sportsbook consensus line; the reference price, not an opinion.
    #[serde(rename = "market", alias = "Market")]
    Market,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OddsShark => "OddsShark",
            Provider::OddsTrader => "OddsTrader",
            Provider::CbsSports => "CBSSports",
            Provider::Kalshi => "Kalshi",
            Provider::Market => "Market",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    #[serde(alias = "h2h")]
    Moneyline,
    #[serde(alias = "spreads")]
    Spread,
    #[serde(alias = "totals")]
    Total,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Moneyline => "moneyline",
            MarketKind::Spread => "spread",
            MarketKind::Total => "total",
        }
    }

    /// Parse either our names or the-odds-api market keys.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "moneyline" | "h2h" | "ml" => Some(MarketKind::Moneyline),
            "spread" | "spreads" => Some(MarketKind::Spread),
            "total" | "totals" => Some(MarketKind::Total),
            _ => None,
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific confidence attached to a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    /// Star sub-rating published by the source (e.g. OddsTrader 3-4 stars).
    Stars(u8),
    /// Prediction-market sentiment.
    Prediction {
        implied_prob: f64,
        volume_24h: u64,
        open_interest: u64,
    },
}

/// One opinion about one game+market from one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSignal {
    pub game_id: String,
    pub provider: Provider,
    pub market: MarketKind,
    pub side: String,
    #[serde(default)]
    pub line: Option<f64>,
    /// American odds quoted for this side, when the source has a price.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub strength: Option<SignalStrength>,
    #[serde(default)]
    pub commence_time: Option<DateTime<Utc>>,
}

impl SourceSignal {
    pub fn new(game_id: &str, provider: Provider, market: MarketKind, side: &str) -> Self {
        Self {
            game_id: game_id.to_string(),
            provider,
            market,
            side: side.to_string(),
            line: None,
            price: None,
            strength: None,
            commence_time: None,
        }
    }

    pub fn with_line(mut self, line: f64) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_strength(mut self, strength: SignalStrength) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn with_commence_time(mut self, commence_time: DateTime<Utc>) -> Self {
        self.commence_time = Some(commence_time);
        self
    }
}

/// A scheduled game as seen by the odds feed; used to attach Kalshi markets.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRef {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
}

/// Output of one feed fetch.
#[derive(Debug, Clone, Default)]
pub struct FeedBatch {
    pub games: Vec<GameRef>,
    pub signals: Vec<SourceSignal>,
}

/// the-odds-api.com v4 response: top-level array of events
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct TheOddsApiEvent {
    pub id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: String,
    #[serde(default)]
    pub bookmakers: Vec<TheOddsApiBookmaker>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct TheOddsApiBookmaker {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub markets: Vec<TheOddsApiMarket>,
}

#[derive(Debug, Deserialize)]
pub struct TheOddsApiMarket {
    pub key: String,
    pub outcomes: Vec<TheOddsApiOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct TheOddsApiOutcome {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
}

/// API usage quota info extracted from response headers.
#[derive(Debug, Clone, Default)]
pub struct ApiQuota {
    pub requests_used: u64,
    pub requests_remaining: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_json_uses_provider_keys() {
        let json = r#"{
            "game_id": "Memphis Grizzlies @ Washington Wizards",
            "provider": "cbs_sports",
            "market": "totals",
            "side": "Under",
            "line": 240.5
        }"#;
        let signal: SourceSignal = serde_json::from_str(json).unwrap();
        assert_eq!(signal.provider, Provider::CbsSports);
        assert_eq!(signal.market, MarketKind::Total);
        assert_eq!(signal.line, Some(240.5));
        assert!(signal.strength.is_none());
    }

    #[test]
    fn test_prediction_strength_deserializes() {
        let json = r#"{
            "game_id": "g1",
            "provider": "kalshi",
            "market": "total",
            "side": "Over",
            "strength": {"prediction": {"implied_prob": 0.72, "volume_24h": 800, "open_interest": 3000}}
        }"#;
        let signal: SourceSignal = serde_json::from_str(json).unwrap();
        assert_eq!(
            signal.strength,
            Some(SignalStrength::Prediction {
                implied_prob: 0.72,
                volume_24h: 800,
                open_interest: 3000,
            })
        );
    }

    #[test]
    fn test_market_kind_parse() {
        assert_eq!(MarketKind::parse("h2h"), Some(MarketKind::Moneyline));
        assert_eq!(MarketKind::parse(" Spreads "), Some(MarketKind::Spread));
        assert_eq!(MarketKind::parse("props"), None);
    }
}
