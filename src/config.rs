use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DB_PATH_ENV: &str = "SQLITE_DB_PATH";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub picks: PicksConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub kalshi: KalshiConfig,
    pub odds_feed: Option<OddsFeedConfig>,
    #[serde(default)]
    pub sports: SportsConfig,
}

/// Thresholds used by the consensus engine.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Max spread-line distance for two signals to count as the same side.
    pub spread_tolerance: f64,
    /// Max total-line distance for two signals to count as the same side.
    pub total_tolerance: f64,
    pub spread_boost_points: f64,
    pub total_boost_points: f64,
    pub kalshi_strong_high: f64,
    pub kalshi_strong_low: f64,
    pub kalshi_min_volume_24h: u64,
    pub kalshi_min_open_interest: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            spread_tolerance: 0.5,
            total_tolerance: 2.0,
            spread_boost_points: 2.0,
            total_boost_points: 3.0,
            kalshi_strong_high: 0.65,
            kalshi_strong_low: 0.35,
            kalshi_min_volume_24h: 500,
            kalshi_min_open_interest: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PicksConfig {
    /// Ratings below this many stars are not persisted.
    pub min_confidence: u8,
    /// Picks priced outside -max_abs_odds..=+max_abs_odds are rejected.
    pub max_abs_odds: f64,
}

impl Default for PicksConfig {
    fn default() -> Self {
        Self {
            min_confidence: 3,
            max_abs_odds: 150.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bets.db"),
        }
    }
}

impl StoreConfig {
    /// Database path, with `SQLITE_DB_PATH` taking precedence over the file.
    pub fn resolved_path(&self) -> PathBuf {
        match std::env::var(DB_PATH_ENV) {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p.trim()),
            _ => self.path.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KalshiConfig {
    pub api_base: String,
}

impl Default for KalshiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elections.kalshi.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OddsFeedConfig {
    pub base_url: String,
    #[serde(default = "default_regions")]
    pub regions: String,
    pub bookmakers: String,
}

fn default_regions() -> String {
    "us".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SportsConfig {
    #[serde(default)]
    pub basketball: bool,
    #[serde(default, alias = "american-football")]
    pub american_football: bool,
    #[serde(default, alias = "college-football")]
    pub college_football: bool,
    #[serde(default)]
    pub baseball: bool,
    #[serde(default, alias = "ice-hockey")]
    pub ice_hockey: bool,
}

impl Default for SportsConfig {
    fn default() -> Self {
        Self {
            basketball: true,
            american_football: true,
            college_football: true,
            baseball: true,
            ice_hockey: false,
        }
    }
}

impl SportsConfig {
    /// Return the list of enabled sport keys (using the hyphenated names).
    pub fn enabled_keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.basketball { out.push("basketball".to_string()); }
        if self.american_football { out.push("american-football".to_string()); }
        if self.college_football { out.push("college-football".to_string()); }
        if self.baseball { out.push("baseball".to_string()); }
        if self.ice_hockey { out.push("ice-hockey".to_string()); }
        out
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        if !(1..=5).contains(&config.picks.min_confidence) {
            anyhow::bail!(
                "picks.min_confidence must be 1-5, got {}",
                config.picks.min_confidence
            );
        }
        Ok(config)
    }

    /// Load .env into the process environment. Real env vars take precedence.
    pub fn load_env_file() {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "failed to read .env file");
            }
        }
    }

    pub fn odds_api_key() -> Result<String> {
        match std::env::var("ODDS_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(sanitize_key(&key)),
            _ => anyhow::bail!("ODDS_API_KEY is not set (add it to the environment or .env)"),
        }
    }
}

/// Strip carriage returns, BOM, and other invisible chars from a key value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}
