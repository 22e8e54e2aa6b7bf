//! Public Kalshi market data, read as prediction-market sentiment.
//!
//! Only the unauthenticated `/markets` endpoint is used. Each game with a priced
//! winner market becomes one moneyline signal on the side Kalshi favours.

use super::types::*;
use super::SignalFeed;
use crate::engine::normalize::team_matches;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
pub struct MarketsResponse {
    #[serde(default)]
    pub markets: Vec<KalshiMarket>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarket {
    pub ticker: String,
    #[serde(default)]
    pub event_ticker: String,
    #[serde(default)]
    pub title: String,
    /// Team the YES contract pays out on.
    #[serde(default)]
    pub yes_sub_title: String,
    /// Cents.
    pub last_price: Option<u32>,
    #[serde(default)]
    pub volume_24h: u64,
    #[serde(default)]
    pub open_interest: u64,
    pub close_time: Option<String>,
    #[serde(default)]
    pub status: String,
}

/// Kalshi series ticker holding single-game winner markets for a sport.
pub fn series_for_sport(sport: &str) -> Option<&'static str> {
    match sport {
        "american-football" => Some("KXNFLGAME"),
        "college-football" => Some("KXNCAAFGAME"),
        "baseball" => Some("KXMLBGAME"),
        "basketball" => Some("KXNBAGAME"),
        _ => None,
    }
}

fn parse_close_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Find the game a team plays in and whether it is the home side. When a team
/// appears in several games, the first one starting before the market closes wins.
fn find_game<'a>(
    team: &str,
    games: &'a [GameRef],
    close_time: DateTime<Utc>,
) -> Option<(&'a GameRef, bool)> {
    games.iter().find_map(|g| {
        if g.commence_time.is_some_and(|t| t > close_time) {
            return None;
        }
        if team_matches(team, &g.home_team) {
            Some((g, true))
        } else if team_matches(team, &g.away_team) {
            Some((g, false))
        } else {
            None
        }
    })
}

/// Convert open markets into Kalshi signals attached to known games.
///
/// A winner market lists one YES contract per team, so each game yields at most
/// one signal: on the favourite, priced at `max(p, 1 - p)`. Markets that already
/// closed, have never traded, or match no game are dropped.
pub fn markets_to_signals(
    markets: &[KalshiMarket],
    games: &[GameRef],
    now: DateTime<Utc>,
) -> Vec<SourceSignal> {
    let mut signals = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for m in markets {
        let Some(close_time) = m.close_time.as_deref().and_then(parse_close_time) else {
            continue;
        };
        if close_time <= now {
            continue;
        }
        let Some(price) = m.last_price.filter(|p| (1..=100).contains(p)) else {
            continue;
        };
        let team = m.yes_sub_title.trim();
        if team.is_empty() {
            continue;
        }
        let Some((game, yes_is_home)) = find_game(team, games, close_time) else {
            tracing::debug!(ticker = %m.ticker, team, "no game for kalshi market");
            continue;
        };
        if !seen.insert(game.game_id.as_str()) {
            continue;
        }

        let (favourite_is_home, cents) = if price >= 50 {
            (yes_is_home, price)
        } else {
            (!yes_is_home, 100 - price)
        };
        let side = if favourite_is_home { &game.home_team } else { &game.away_team };

        let mut signal =
            SourceSignal::new(&game.game_id, Provider::Kalshi, MarketKind::Moneyline, side)
                .with_strength(SignalStrength::Prediction {
                    implied_prob: cents as f64 / 100.0,
                    volume_24h: m.volume_24h,
                    open_interest: m.open_interest,
                });
        signal.commence_time = game.commence_time;
        signals.push(signal);
    }
    signals
}

pub struct KalshiFeed {
    client: Client,
    base_url: String,
    games: Vec<GameRef>,
}

impl KalshiFeed {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            games: Vec::new(),
        }
    }

    /// Games that fetched markets are attached to.
    pub fn set_games(&mut self, games: Vec<GameRef>) {
        self.games = games;
    }

    /// Fetch all open markets for a series ticker. Paginates automatically.
    pub async fn get_markets_by_series(&self, series_ticker: &str) -> Result<Vec<KalshiMarket>> {
        let mut all_markets = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/trade-api/v2/markets?series_ticker={}&limit=200&status=open",
                self.base_url, series_ticker
            );
            if let Some(ref c) = cursor {
                url.push_str(&format!("&cursor={}", c));
            }

            let resp = self.client.get(&url).send().await.context("GET markets failed")?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("GET markets failed ({}): {}", status, body);
            }

            let parsed: MarketsResponse = resp.json().await
                .context("failed to parse markets response")?;

            let done = parsed.markets.is_empty()
                || parsed.cursor.as_deref().map_or(true, |c| c.is_empty());
            all_markets.extend(parsed.markets);
            if done {
                break;
            }
            cursor = parsed.cursor;
        }

        Ok(all_markets)
    }
}

#[async_trait]
impl SignalFeed for KalshiFeed {
    fn name(&self) -> &'static str {
        "kalshi"
    }

    async fn fetch(&mut self, sport: &str) -> Result<FeedBatch> {
        let Some(series) = series_for_sport(sport) else {
            tracing::info!(sport, "no kalshi series for sport");
            return Ok(FeedBatch::default());
        };
        let markets = self.get_markets_by_series(series).await?;
        let signals = markets_to_signals(&markets, &self.games, Utc::now());
        tracing::info!(
            sport,
            series,
            markets = markets.len(),
            signals = signals.len(),
            "kalshi markets fetched"
        );
        Ok(FeedBatch {
            games: Vec::new(),
            signals,
        })
    }
}
