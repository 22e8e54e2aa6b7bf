use crate::config::PicksConfig;
use crate::engine::conflict::{conflicts, Selection};
use crate::engine::normalize::{normalize_game, team_matches};
use crate::engine::odds::within_odds_window;
use crate::engine::pick::{Pick, PickResult};
use crate::engine::ConsensusEngine;
use crate::error::ConsensusError;
use crate::feed::types::{GameRef, MarketKind, SourceSignal};
use crate::store::PickStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Outcome counts for one generation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    pub groups: usize,
    /// Row ids of the picks stored in this pass.
    pub created: Vec<i64>,
    pub insufficient: usize,
    pub below_confidence: usize,
    pub odds_out_of_range: usize,
    pub not_upcoming: usize,
    pub duplicates: usize,
    pub conflicts: usize,
}

impl GenerationReport {
    pub fn skipped(&self) -> usize {
        self.insufficient
            + self.below_confidence
            + self.odds_out_of_range
            + self.not_upcoming
            + self.duplicates
            + self.conflicts
    }
}

/// Split a flat signal list into one group per (game, market), keeping the
/// order in which each group and each signal was first seen.
pub fn group_signals(signals: Vec<SourceSignal>) -> Vec<Vec<SourceSignal>> {
    let mut index: HashMap<(String, MarketKind), usize> = HashMap::new();
    let mut groups: Vec<Vec<SourceSignal>> = Vec::new();
    for signal in signals {
        let key = (normalize_game(&signal.game_id), signal.market);
        match index.get(&key) {
            Some(&idx) => groups[idx].push(signal),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![signal]);
            }
        }
    }
    groups
}

/// Rewrite scraped "Away @ Home" labels onto the feed's game ids when both teams
/// match a known game, and fill a missing commence time from it. Returns how many
/// signals were moved.
pub fn align_games(signals: &mut [SourceSignal], games: &[GameRef]) -> usize {
    let mut moved = 0;
    for signal in signals.iter_mut() {
        let key = normalize_game(&signal.game_id);
        if let Some(game) = games.iter().find(|g| normalize_game(&g.game_id) == key) {
            if signal.commence_time.is_none() {
                signal.commence_time = game.commence_time;
            }
            continue;
        }
        let Some((away, home)) = signal.game_id.split_once('@') else {
            continue;
        };
        let found = games
            .iter()
            .find(|g| team_matches(away, &g.away_team) && team_matches(home, &g.home_team));
        match found {
            Some(game) => {
                signal.game_id = game.game_id.clone();
                if signal.commence_time.is_none() {
                    signal.commence_time = game.commence_time;
                }
                moved += 1;
            }
            None => {
                tracing::debug!(game = %signal.game_id, provider = %signal.provider, "no feed game for signal");
            }
        }
    }
    moved
}

/// Rates grouped signals and appends the picks that pass every filter.
pub struct PickGenerator {
    engine: ConsensusEngine,
    config: PicksConfig,
}

impl PickGenerator {
    pub fn new(engine: ConsensusEngine, config: PicksConfig) -> Self {
        Self { engine, config }
    }

    pub fn generate(
        &self,
        store: &PickStore,
        sport: &str,
        signals: Vec<SourceSignal>,
        now: DateTime<Utc>,
    ) -> Result<GenerationReport> {
        let mut report = GenerationReport::default();

        for group in group_signals(signals) {
            report.groups += 1;
            let game_id = group[0].game_id.clone();

            let rating = match self.engine.rate(&group) {
                Ok(r) => r,
                Err(ConsensusError::InsufficientData) => {
                    tracing::debug!(sport, game = %game_id, "no usable signals");
                    report.insufficient += 1;
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to rate {game_id}"));
                }
            };

            if rating.confidence.get() < self.config.min_confidence {
                tracing::debug!(
                    sport,
                    game = %game_id,
                    market = %rating.market,
                    stars = rating.confidence.get(),
                    "below minimum confidence"
                );
                report.below_confidence += 1;
                continue;
            }

            if let Some(odds) = rating.odds_american {
                if !within_odds_window(odds, self.config.max_abs_odds) {
                    tracing::debug!(sport, game = %game_id, odds, "odds outside window");
                    report.odds_out_of_range += 1;
                    continue;
                }
            }

            let commence_time = match group.iter().find_map(|s| s.commence_time) {
                Some(t) if t > now => t,
                other => {
                    tracing::debug!(sport, game = %game_id, commence = ?other, "game not upcoming");
                    report.not_upcoming += 1;
                    continue;
                }
            };

            let existing = store.pending_for(&game_id, rating.market)?;
            if existing.iter().any(|p| p.commence_time == Some(commence_time)) {
                report.duplicates += 1;
                continue;
            }
            let selections: Vec<Selection<'_>> = existing
                .iter()
                .map(|p| Selection { side: &p.side, line: p.line })
                .collect();
            let candidate = Selection { side: &rating.side, line: rating.line };
            if conflicts(rating.market, &candidate, &selections) {
                tracing::info!(
                    sport,
                    game = %game_id,
                    market = %rating.market,
                    side = %rating.side,
                    "skipping pick that conflicts with a pending pick"
                );
                report.conflicts += 1;
                continue;
            }

            let pick = Pick {
                id: None,
                game_id: game_id.clone(),
                sport: sport.to_string(),
                market: rating.market,
                side: rating.side,
                line: rating.line,
                odds_american: rating.odds_american,
                confidence: rating.confidence,
                rationale: rating.rationale,
                result: PickResult::Pending,
                commence_time: Some(commence_time),
                created_at: now,
                updated_at: now,
            };

            match store.append(&pick)? {
                Some(id) => {
                    tracing::info!(
                        sport,
                        id,
                        game = %game_id,
                        selection = %pick.selection(),
                        stars = pick.confidence.get(),
                        "pick created"
                    );
                    report.created.push(id);
                }
                None => report.duplicates += 1,
            }
        }

        tracing::info!(
            sport,
            groups = report.groups,
            created = report.created.len(),
            skipped = report.skipped(),
            "generation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::Provider;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 2, 15, 0, 0).unwrap()
    }

    fn spread(game: &str, provider: Provider, side: &str, line: f64) -> SourceSignal {
        SourceSignal::new(game, provider, MarketKind::Spread, side)
            .with_line(line)
            .with_price(-110.0)
            .with_commence_time(now() + Duration::hours(3))
    }

    fn generator() -> PickGenerator {
        PickGenerator::new(ConsensusEngine::default(), PicksConfig::default())
    }

    #[test]
    fn test_group_signals_preserves_first_seen_order() {
        let signals = vec![
            spread("Heat @ Magic", Provider::OddsShark, "Magic", -2.5),
            SourceSignal::new("Knicks @ Celtics", Provider::Market, MarketKind::Total, "Over"),
            spread("heat @ magic", Provider::CbsSports, "Magic", -2.5),
            spread("Knicks @ Celtics", Provider::OddsShark, "Celtics", -4.5),
        ];
        let groups = group_signals(signals);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0][1].provider, Provider::CbsSports);
        assert_eq!(groups[1][0].market, MarketKind::Total);
        assert_eq!(groups[2][0].market, MarketKind::Spread);
    }

    #[test]
    fn test_align_games_maps_short_names() {
        let kickoff = now() + Duration::hours(5);
        let games = vec![GameRef {
            game_id: "New York Knicks @ Boston Celtics".to_string(),
            home_team: "Boston Celtics".to_string(),
            away_team: "New York Knicks".to_string(),
            commence_time: Some(kickoff),
        }];
        let mut signals = vec![
            SourceSignal::new("Knicks @ Celtics", Provider::OddsShark, MarketKind::Spread, "Boston Celtics")
                .with_line(-4.5),
            SourceSignal::new("new york knicks @ boston celtics", Provider::CbsSports, MarketKind::Spread, "Celtics")
                .with_line(-4.0),
            SourceSignal::new("Heat @ Magic", Provider::OddsShark, MarketKind::Spread, "Magic").with_line(-2.5),
            // Home and away swapped: not the same fixture.
            SourceSignal::new("Celtics @ Knicks", Provider::OddsShark, MarketKind::Spread, "Knicks").with_line(1.5),
        ];

        assert_eq!(align_games(&mut signals, &games), 1);
        assert_eq!(signals[0].game_id, "New York Knicks @ Boston Celtics");
        assert_eq!(signals[0].commence_time, Some(kickoff));
        assert_eq!(signals[1].commence_time, Some(kickoff));
        assert_eq!(signals[2].game_id, "Heat @ Magic");
        assert!(signals[2].commence_time.is_none());
        assert_eq!(signals[3].game_id, "Celtics @ Knicks");

        let mut market = vec![
            SourceSignal::new("New York Knicks @ Boston Celtics", Provider::Market, MarketKind::Spread, "Boston Celtics")
                .with_line(-4.5)
                .with_price(-110.0),
        ];
        market.extend(signals);
        assert_eq!(group_signals(market)[0].len(), 3);
    }

    #[test]
    fn test_generate_creates_agreeing_pick() {
        let store = PickStore::open_in_memory().unwrap();
        let signals = vec![
            spread("Knicks @ Celtics", Provider::OddsShark, "Boston Celtics", -4.5),
            spread("Knicks @ Celtics", Provider::CbsSports, "Boston Celtics", -4.0),
        ];
        let report = generator().generate(&store, "basketball", signals, now()).unwrap();
        assert_eq!(report.created.len(), 1);

        let stored = store.get(report.created[0]).unwrap().unwrap();
        assert_eq!(stored.confidence.get(), 4);
        assert_eq!(stored.sport, "basketball");
        assert_eq!(stored.commence_time, Some(now() + Duration::hours(3)));
    }

    #[test]
    fn test_generate_skips_low_confidence() {
        let store = PickStore::open_in_memory().unwrap();
        let signals = vec![spread("Knicks @ Celtics", Provider::Market, "Boston Celtics", -4.5)];
        let report = generator().generate(&store, "basketball", signals, now()).unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.below_confidence, 1);
    }

    #[test]
    fn test_generate_skips_started_and_long_odds() {
        let store = PickStore::open_in_memory().unwrap();
        let started = SourceSignal::new("A @ B", Provider::OddsShark, MarketKind::Spread, "B")
            .with_line(-3.0)
            .with_commence_time(now() - Duration::minutes(5));
        let no_time = SourceSignal::new("C @ D", Provider::OddsShark, MarketKind::Spread, "D")
            .with_line(-3.0);
        let long_shot = SourceSignal::new("E @ F", Provider::OddsShark, MarketKind::Moneyline, "F")
            .with_price(240.0)
            .with_commence_time(now() + Duration::hours(2));
        let report = generator()
            .generate(&store, "basketball", vec![started, no_time, long_shot], now())
            .unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.not_upcoming, 2);
        assert_eq!(report.odds_out_of_range, 1);
    }

    #[test]
    fn test_second_run_is_duplicate() {
        let store = PickStore::open_in_memory().unwrap();
        let signals = vec![spread("Knicks @ Celtics", Provider::OddsShark, "Boston Celtics", -4.5)];
        let gen = generator();
        let first = gen.generate(&store, "basketball", signals.clone(), now()).unwrap();
        assert_eq!(first.created.len(), 1);

        let second = gen.generate(&store, "basketball", signals, now()).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.duplicates, 1);
        assert_eq!(store.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_conflicting_side_not_stored() {
        let store = PickStore::open_in_memory().unwrap();
        let gen = generator();
        let first = vec![spread("Knicks @ Celtics", Provider::OddsShark, "Boston Celtics", -4.5)];
        gen.generate(&store, "basketball", first, now()).unwrap();

        // Same game re-listed with a new tip-off, now favouring the other side.
        let flipped = vec![
            SourceSignal::new("Knicks @ Celtics", Provider::CbsSports, MarketKind::Spread, "New York Knicks")
                .with_line(4.5)
                .with_commence_time(now() + Duration::hours(4)),
        ];
        let report = gen.generate(&store, "basketball", flipped, now()).unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(store.pending().unwrap().len(), 1);
    }
}
