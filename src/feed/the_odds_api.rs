use super::types::*;
use super::SignalFeed;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

const MARKETS: &str = "h2h,spreads,totals";

pub struct TheOddsApi {
    client: Client,
    api_key: String,
    base_url: String,
    regions: String,
    bookmakers: String,
    last_quota: Option<ApiQuota>,
}

/// Map our internal sport key to the-odds-api.com sport key.
pub fn api_sport_key(sport: &str) -> &str {
    match sport {
        "basketball" => "basketball_nba",
        "american-football" => "americanfootball_nfl",
        "college-football" => "americanfootball_ncaaf",
        "baseball" => "baseball_mlb",
        "ice-hockey" => "icehockey_nhl",
        _ => sport,
    }
}

/// Parse a quota header that may be an integer or float (e.g. "14527.0").
fn parse_quota_header(headers: &reqwest::header::HeaderMap, name: &str) -> u64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as u64)
        .unwrap_or(0)
}

fn parse_commence(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(commence_time = raw, error = %e, "unparseable commence time");
            None
        }
    }
}

/// Turn the-odds-api events into games plus one Market signal per bookmaker
/// outcome. Game ids are "Away @ Home".
pub fn parse_events(events: Vec<TheOddsApiEvent>) -> FeedBatch {
    let mut batch = FeedBatch::default();

    for event in events {
        let game_id = format!("{} @ {}", event.away_team, event.home_team);
        let commence_time = parse_commence(&event.commence_time);

        for bm in &event.bookmakers {
            for market in &bm.markets {
                let Some(kind) = MarketKind::parse(&market.key) else {
                    continue;
                };
                for outcome in &market.outcomes {
                    let mut signal = SourceSignal::new(&game_id, Provider::Market, kind, &outcome.name)
                        .with_price(outcome.price);
                    if kind != MarketKind::Moneyline {
                        if let Some(point) = outcome.point {
                            signal = signal.with_line(point);
                        }
                    }
                    signal.commence_time = commence_time;
                    batch.signals.push(signal);
                }
            }
        }

        batch.games.push(GameRef {
            game_id,
            home_team: event.home_team,
            away_team: event.away_team,
            commence_time,
        });
    }

    batch
}

impl TheOddsApi {
    pub fn new(api_key: String, base_url: &str, regions: &str, bookmakers: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            regions: regions.to_string(),
            bookmakers: bookmakers.to_string(),
            last_quota: None,
        }
    }

    pub fn last_quota(&self) -> Option<ApiQuota> {
        self.last_quota.clone()
    }
}

#[async_trait]
impl SignalFeed for TheOddsApi {
    fn name(&self) -> &'static str {
        "the-odds-api"
    }

    async fn fetch(&mut self, sport: &str) -> Result<FeedBatch> {
        let api_sport = api_sport_key(sport);

        let mut url = format!(
            "{}/v4/sports/{}/odds?apiKey={}&regions={}&markets={}&oddsFormat=american",
            self.base_url, api_sport, self.api_key, self.regions, MARKETS,
        );
        if !self.bookmakers.is_empty() {
            url.push_str(&format!("&bookmakers={}", self.bookmakers));
        }

        let resp = self.client.get(&url).send().await
            .context("the-odds-api request failed")?;

        let used = parse_quota_header(resp.headers(), "x-requests-used");
        let remaining = parse_quota_header(resp.headers(), "x-requests-remaining");
        self.last_quota = Some(ApiQuota {
            requests_used: used,
            requests_remaining: remaining,
        });

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("the-odds-api {} ({}): {}", api_sport, status, body);
        }

        let events: Vec<TheOddsApiEvent> = resp.json().await
            .context("failed to parse the-odds-api response")?;

        let batch = parse_events(events);
        tracing::info!(
            sport,
            games = batch.games.len(),
            signals = batch.signals.len(),
            quota_remaining = remaining,
            "odds fetched"
        );
        Ok(batch)
    }
}
