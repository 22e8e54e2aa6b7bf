use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use clap::{Parser, Subcommand};
use consensus_picks::config::Config;
use consensus_picks::engine::pick::{Pick, PickResult};
use consensus_picks::engine::ConsensusEngine;
use consensus_picks::error::ConsensusError;
use consensus_picks::feed::file::load_signals;
use consensus_picks::feed::kalshi::KalshiFeed;
use consensus_picks::feed::the_odds_api::TheOddsApi;
use consensus_picks::feed::types::{FeedBatch, SourceSignal};
use consensus_picks::feed::SignalFeed;
use consensus_picks::pipeline::{align_games, group_signals, PickGenerator};
use consensus_picks::store::PickStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Consensus betting picks from independent expert sources.
#[derive(Parser)]
#[command(name = "picks", about = "Consensus betting picks")]
struct Cli {
    /// Path to config.toml.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch signals, rate every game+market and store new picks.
    Generate {
        /// Only this sport (e.g. basketball, college-football).
        #[arg(long)]
        sport: Option<String>,
        /// Scraper output (JSON array of signals) for --sport.
        #[arg(long, requires = "sport")]
        signals: Option<PathBuf>,
        /// Skip the odds and Kalshi feeds.
        #[arg(long)]
        offline: bool,
    },
    /// Rate a signals file without storing anything.
    Rate { file: PathBuf },
    /// Show the featured pick of the day.
    Featured,
    /// Record the final result of a pick.
    Resolve {
        id: i64,
        #[arg(value_parser = parse_result)]
        result: PickResult,
    },
    /// Win/loss record over recent picks.
    Record {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Most recent picks.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_result(s: &str) -> Result<PickResult, String> {
    match PickResult::parse(s) {
        Some(r) if r.is_terminal() => Ok(r),
        _ => Err(format!("expected win, loss or push, got {s:?}")),
    }
}

fn eastern() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).unwrap_or_else(|| Utc.fix())
}

fn format_et(t: DateTime<Utc>) -> String {
    format!("{} ET", t.with_timezone(&eastern()).format("%a %b %d %-I:%M %p"))
}

fn format_odds(odds: Option<f64>) -> String {
    match odds {
        Some(o) if o > 0.0 => format!("+{o:.0}"),
        Some(o) => format!("{o:.0}"),
        None => "n/a".to_string(),
    }
}

fn print_pick(pick: &Pick) {
    let implied = pick
        .implied_probability()
        .map(|p| format!(", {:.0}% implied", p * 100.0))
        .unwrap_or_default();
    println!(
        "  {} {}  {} ({}{})",
        pick.confidence.stars(),
        pick.confidence,
        pick.selection(),
        format_odds(pick.odds_american),
        implied,
    );
    let when = pick.commence_time.map(format_et).unwrap_or_else(|| "TBD".to_string());
    println!("  {} · {} · {}", pick.game_id, pick.market, when);
    println!("  {}", pick.rationale);
}

/// Fetch games and signals for one sport from the live feeds.
async fn fetch_sport(config: &Config, sport: &str, odds_api_key: Option<&str>) -> FeedBatch {
    let mut signals = Vec::new();
    let mut games = Vec::new();

    if let (Some(feed_cfg), Some(key)) = (config.odds_feed.as_ref(), odds_api_key) {
        let mut odds = TheOddsApi::new(
            key.to_string(),
            &feed_cfg.base_url,
            &feed_cfg.regions,
            &feed_cfg.bookmakers,
        );
        match odds.fetch(sport).await {
            Ok(batch) => {
                games = batch.games;
                signals.extend(batch.signals);
            }
            Err(e) => tracing::warn!(sport, feed = odds.name(), error = %e, "odds fetch failed"),
        }
        if let Some(quota) = odds.last_quota() {
            if quota.requests_remaining < 50 {
                tracing::warn!(
                    used = quota.requests_used,
                    remaining = quota.requests_remaining,
                    "odds API quota running low"
                );
            }
        }
    }

    let mut kalshi = KalshiFeed::new(&config.kalshi.api_base);
    kalshi.set_games(games.clone());
    match kalshi.fetch(sport).await {
        Ok(batch) => signals.extend(batch.signals),
        Err(e) => tracing::warn!(sport, feed = kalshi.name(), error = %e, "kalshi fetch failed"),
    }

    FeedBatch { games, signals }
}

async fn generate(
    config: &Config,
    store: &PickStore,
    sport: Option<String>,
    signals_file: Option<PathBuf>,
    offline: bool,
) -> Result<()> {
    let sports = match sport {
        Some(s) => vec![s],
        None => config.sports.enabled_keys(),
    };

    let odds_api_key = if offline || config.odds_feed.is_none() {
        None
    } else {
        match Config::odds_api_key() {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(error = %e, "odds feed disabled");
                None
            }
        }
    };

    let mut per_sport: Vec<FeedBatch> = if offline {
        vec![FeedBatch::default(); sports.len()]
    } else {
        let fetches = sports
            .iter()
            .map(|sport| fetch_sport(config, sport, odds_api_key.as_deref()));
        futures_util::future::join_all(fetches).await
    };

    if let Some(path) = signals_file {
        let mut scraped = load_signals(&path).await?;
        if let Some(first) = per_sport.first_mut() {
            let moved = align_games(&mut scraped, &first.games);
            tracing::info!(moved, "scraped games aligned to feed games");
            // Scraped opinions lead so their side names anchor the buckets.
            let market = std::mem::take(&mut first.signals);
            first.signals.extend(scraped);
            first.signals.extend(market);
        }
    }

    let generator = PickGenerator::new(
        ConsensusEngine::new(config.consensus.clone()),
        config.picks.clone(),
    );
    let now = Utc::now();
    let mut created = 0;
    for (sport, batch) in sports.iter().zip(per_sport) {
        let signals: Vec<SourceSignal> = batch.signals;
        if signals.is_empty() {
            tracing::info!(sport = %sport, "no signals");
            continue;
        }
        let report = generator.generate(store, sport, signals, now)?;
        created += report.created.len();
    }

    println!("  {created} new pick(s)");
    Ok(())
}

async fn rate(config: &Config, path: &Path) -> Result<()> {
    let engine = ConsensusEngine::new(config.consensus.clone());
    let signals = load_signals(path).await?;
    for group in group_signals(signals) {
        let game_id = group[0].game_id.clone();
        match engine.rate(&group) {
            Ok(rating) => println!("  {} {}  {}", rating.confidence.stars(), game_id, rating.rationale),
            Err(ConsensusError::InsufficientData) => println!("  -  {game_id}  no usable signals"),
            Err(e) => println!("  !  {game_id}  {e}"),
        }
    }
    Ok(())
}

fn record(store: &PickStore, days: i64) -> Result<()> {
    let summary = store.record_since(Utc::now() - Duration::days(days))?;
    println!(
        "  Last {days} days: {}-{}-{}  {:+.2}u  win rate {:.1}%  ROI {:+.1}%",
        summary.wins, summary.losses, summary.pushes, summary.units, summary.win_rate, summary.roi,
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("consensus_picks=info,picks=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    // Load saved keys from .env (real env vars take precedence)
    Config::load_env_file();
    let config = Config::load(&cli.config)?;

    if let Command::Rate { file } = &cli.command {
        return rate(&config, file).await;
    }

    let store_path = config.store.resolved_path();
    let store = PickStore::open(&store_path)
        .with_context(|| format!("opening pick store {}", store_path.display()))?;

    match cli.command {
        Command::Generate { sport, signals, offline } => {
            generate(&config, &store, sport, signals, offline).await?
        }
        Command::Rate { .. } => {}
        Command::Featured => match store.featured(Utc::now())? {
            Some(pick) => print_pick(&pick),
            None => println!("  No picks yet"),
        },
        Command::Resolve { id, result } => {
            let pick = store.record_result(id, result, Utc::now())?;
            println!("  #{id} {} → {}", pick.selection(), pick.result);
        }
        Command::Record { days } => record(&store, days)?,
        Command::List { limit } => {
            for pick in store.list_recent(limit)? {
                let id = pick.id.unwrap_or_default();
                println!(
                    "  #{id:<5} {:<8} {} {}  [{}]",
                    pick.result.as_str(),
                    pick.confidence,
                    pick.selection(),
                    pick.game_id,
                );
            }
        }
    }

    Ok(())
}
