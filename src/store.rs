//! SQLite-backed pick store.
//!
//! The store is the single long-lived owner of pick rows. Rows are appended by
//! the pick pipeline and only ever updated to record a final result.

use crate::engine::normalize::normalize_game;
use crate::engine::pick::{Confidence, Pick, PickResult};
use crate::engine::record::RecordSummary;
use crate::engine::selector::select_featured;
use crate::error::ResultError;
use crate::feed::types::MarketKind;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS picks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id TEXT NOT NULL,
    game_key TEXT NOT NULL,
    sport TEXT NOT NULL,
    market TEXT NOT NULL,
    side TEXT NOT NULL,
    line REAL,
    odds_american REAL,
    confidence INTEGER NOT NULL CHECK (confidence BETWEEN 1 AND 5),
    rationale TEXT NOT NULL,
    result TEXT NOT NULL DEFAULT 'Pending',
    commence_time TIMESTAMP,
    created_at TIMESTAMP NOT NULL,
    -- Epoch millis of created_at; range filters compare on this, not on text.
    created_ts INTEGER NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    UNIQUE (game_key, market, commence_time)
);
CREATE INDEX IF NOT EXISTS idx_picks_result ON picks(result);
CREATE INDEX IF NOT EXISTS idx_picks_game_market ON picks(game_key, market);
CREATE INDEX IF NOT EXISTS idx_picks_created_ts ON picks(created_ts);
"#;

const PICK_COLUMNS: &str = "id, game_id, sport, market, side, line, odds_american, confidence, \
     rationale, result, commence_time, created_at, updated_at";

pub struct PickStore {
    conn: Connection,
}

impl PickStore {
    /// Open or create the database at the given path and ensure the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open pick store at {}", path.display()))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA_SQL)
            .context("failed to initialize pick schema")?;
        Ok(())
    }

    /// Append a pick. Returns the new row id, or `None` when a pick for the same
    /// (game, market, commence time) is already stored.
    pub fn append(&self, pick: &Pick) -> Result<Option<i64>> {
        let changed = self
            .conn
            .execute(
                r#"
                INSERT OR IGNORE INTO picks
                (game_id, game_key, sport, market, side, line, odds_american, confidence,
                 rationale, result, commence_time, created_at, created_ts, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    pick.game_id,
                    normalize_game(&pick.game_id),
                    pick.sport,
                    pick.market.as_str(),
                    pick.side,
                    pick.line,
                    pick.odds_american,
                    pick.confidence.get(),
                    pick.rationale,
                    pick.result.as_str(),
                    pick.commence_time,
                    pick.created_at,
                    pick.created_at.timestamp_millis(),
                    pick.updated_at,
                ],
            )
            .context("failed to insert pick")?;

        if changed == 0 {
            tracing::debug!(game = %pick.game_id, market = %pick.market, "duplicate pick ignored");
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    pub fn get(&self, id: i64) -> Result<Option<Pick>> {
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE id = ?1");
        self.conn
            .query_row(&sql, params![id], row_to_pick)
            .optional()
            .with_context(|| format!("failed to load pick {id}"))
    }

    /// Most recently created picks first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Pick>> {
        let sql = format!(
            "SELECT {PICK_COLUMNS} FROM picks ORDER BY created_ts DESC, id DESC LIMIT ?1"
        );
        self.query(&sql, params![limit as i64])
    }

    /// All pending picks in insertion order.
    pub fn pending(&self) -> Result<Vec<Pick>> {
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE result = 'Pending' ORDER BY id");
        self.query(&sql, [])
    }

    /// Pending picks for one game+market.
    pub fn pending_for(&self, game_id: &str, market: MarketKind) -> Result<Vec<Pick>> {
        let sql = format!(
            "SELECT {PICK_COLUMNS} FROM picks \
             WHERE result = 'Pending' AND game_key = ?1 AND market = ?2 ORDER BY id"
        );
        self.query(&sql, params![normalize_game(game_id), market.as_str()])
    }

    /// The pick to feature at `now`, if any. Reads a snapshot; never writes.
    pub fn featured(&self, now: DateTime<Utc>) -> Result<Option<Pick>> {
        let pending = self.pending()?;
        Ok(select_featured(&pending, now).cloned())
    }

    /// Record the final result of a pending pick. A pick resolves exactly once.
    pub fn record_result(&self, id: i64, result: PickResult, now: DateTime<Utc>) -> Result<Pick> {
        let mut pick = self.get(id)?.ok_or(ResultError::UnknownPick(id))?;
        pick.resolve(result, now)?;

        let changed = self
            .conn
            .execute(
                "UPDATE picks SET result = ?1, updated_at = ?2 WHERE id = ?3 AND result = 'Pending'",
                params![result.as_str(), now, id],
            )
            .with_context(|| format!("failed to update pick {id}"))?;
        if changed == 0 {
            // Resolved by someone else between our read and write.
            let current = self.get(id)?.map(|p| p.result).unwrap_or(result);
            return Err(ResultError::AlreadyResolved { id, result: current }.into());
        }

        tracing::info!(id, result = %result, game = %pick.game_id, "pick resolved");
        Ok(pick)
    }

    /// Record over picks created at or after `since`.
    pub fn record_since(&self, since: DateTime<Utc>) -> Result<RecordSummary> {
        let mut stmt = self.conn.prepare(
            "SELECT result, odds_american FROM picks \
             WHERE created_ts >= ?1 AND result IN ('Win', 'Loss', 'Push')",
        )?;
        let rows = stmt
            .query_map(params![since.timestamp_millis()], |row| {
                let result: String = row.get(0)?;
                let odds: Option<f64> = row.get(1)?;
                Ok((parse_result(0, &result)?, odds))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load graded picks")?;
        Ok(RecordSummary::from_results(rows))
    }

    fn query<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Pick>> {
        let mut stmt = self.conn.prepare(sql)?;
        let picks = stmt
            .query_map(params, row_to_pick)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load picks")?;
        Ok(picks)
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_result(idx: usize, s: &str) -> rusqlite::Result<PickResult> {
    PickResult::parse(s).ok_or_else(|| conversion_error(idx, format!("unknown result {s:?}")))
}

fn row_to_pick(row: &Row<'_>) -> rusqlite::Result<Pick> {
    let market: String = row.get(3)?;
    let market = MarketKind::parse(&market)
        .ok_or_else(|| conversion_error(3, format!("unknown market {market:?}")))?;
    let stars: u8 = row.get(7)?;
    let confidence = Confidence::new(stars)
        .ok_or_else(|| conversion_error(7, format!("confidence out of range: {stars}")))?;
    let result: String = row.get(9)?;

    Ok(Pick {
        id: Some(row.get(0)?),
        game_id: row.get(1)?,
        sport: row.get(2)?,
        market,
        side: row.get(4)?,
        line: row.get(5)?,
        odds_american: row.get(6)?,
        confidence,
        rationale: row.get(8)?,
        result: parse_result(9, &result)?,
        commence_time: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 2, 15, 0, 0).unwrap()
    }

    fn pick(game: &str, market: MarketKind, stars: u8, commence_h: i64) -> Pick {
        Pick {
            id: None,
            game_id: game.to_string(),
            sport: "basketball".to_string(),
            market,
            side: "Boston Celtics".to_string(),
            line: Some(-4.5),
            odds_american: Some(-110.0),
            confidence: Confidence::new(stars).unwrap(),
            rationale: "OddsShark, CBSSports on Boston Celtics -4.5".to_string(),
            result: PickResult::Pending,
            commence_time: Some(t0() + Duration::hours(commence_h)),
            created_at: t0(),
            updated_at: t0(),
        }
    }

    #[test]
    fn test_append_and_get_roundtrip() {
        let store = PickStore::open_in_memory().unwrap();
        let original = pick("Knicks @ Celtics", MarketKind::Spread, 4, 4);
        let id = store.append(&original).unwrap().unwrap();

        let loaded = store.get(id).unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.game_id, original.game_id);
        assert_eq!(loaded.market, MarketKind::Spread);
        assert_eq!(loaded.confidence.get(), 4);
        assert_eq!(loaded.line, Some(-4.5));
        assert_eq!(loaded.commence_time, original.commence_time);
        assert_eq!(loaded.created_at, original.created_at);
        assert_eq!(loaded.result, PickResult::Pending);
    }

    #[test]
    fn test_duplicate_game_market_time_ignored() {
        let store = PickStore::open_in_memory().unwrap();
        assert!(store.append(&pick("Knicks @ Celtics", MarketKind::Spread, 4, 4)).unwrap().is_some());
        // Same game written differently still collides.
        assert!(store.append(&pick("knicks  @ celtics", MarketKind::Spread, 5, 4)).unwrap().is_none());
        // Different market is a different pick.
        assert!(store.append(&pick("Knicks @ Celtics", MarketKind::Total, 3, 4)).unwrap().is_some());
        assert_eq!(store.pending().unwrap().len(), 2);
    }

    #[test]
    fn test_pending_for_filters_game_and_market() {
        let store = PickStore::open_in_memory().unwrap();
        store.append(&pick("Knicks @ Celtics", MarketKind::Spread, 4, 4)).unwrap();
        store.append(&pick("Knicks @ Celtics", MarketKind::Total, 3, 4)).unwrap();
        store.append(&pick("Heat @ Magic", MarketKind::Spread, 3, 4)).unwrap();

        let found = store.pending_for("Knicks @ Celtics", MarketKind::Spread).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].market, MarketKind::Spread);
    }

    #[test]
    fn test_featured_reads_pending_snapshot() {
        let store = PickStore::open_in_memory().unwrap();
        store.append(&pick("A @ B", MarketKind::Spread, 4, 2)).unwrap();
        let best = store.append(&pick("C @ D", MarketKind::Spread, 5, 5)).unwrap().unwrap();
        let graded = store.append(&pick("E @ F", MarketKind::Spread, 5, 1)).unwrap().unwrap();
        store.record_result(graded, PickResult::Win, t0()).unwrap();

        let featured = store.featured(t0()).unwrap().unwrap();
        assert_eq!(featured.id, Some(best));
        assert_eq!(store.featured(t0()).unwrap().unwrap().id, Some(best));
        assert!(store.featured(t0() + Duration::hours(6)).unwrap().is_none());
    }

    #[test]
    fn test_record_result_only_once() {
        let store = PickStore::open_in_memory().unwrap();
        let id = store.append(&pick("A @ B", MarketKind::Spread, 4, 2)).unwrap().unwrap();
        let later = t0() + Duration::hours(5);

        let resolved = store.record_result(id, PickResult::Loss, later).unwrap();
        assert_eq!(resolved.result, PickResult::Loss);
        assert_eq!(store.get(id).unwrap().unwrap().updated_at, later);

        let err = store.record_result(id, PickResult::Win, later).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResultError>(),
            Some(&ResultError::AlreadyResolved { id, result: PickResult::Loss })
        );
        assert_eq!(store.get(id).unwrap().unwrap().result, PickResult::Loss);
    }

    #[test]
    fn test_record_result_unknown_and_pending() {
        let store = PickStore::open_in_memory().unwrap();
        let err = store.record_result(99, PickResult::Win, t0()).unwrap_err();
        assert_eq!(err.downcast_ref::<ResultError>(), Some(&ResultError::UnknownPick(99)));

        let id = store.append(&pick("A @ B", MarketKind::Spread, 4, 2)).unwrap().unwrap();
        let err = store.record_result(id, PickResult::Pending, t0()).unwrap_err();
        assert_eq!(err.downcast_ref::<ResultError>(), Some(&ResultError::NotTerminal));
    }

    #[test]
    fn test_record_since() {
        let store = PickStore::open_in_memory().unwrap();
        let win = store.append(&pick("A @ B", MarketKind::Spread, 4, 2)).unwrap().unwrap();
        let loss = store.append(&pick("C @ D", MarketKind::Spread, 4, 2)).unwrap().unwrap();
        store.append(&pick("E @ F", MarketKind::Spread, 4, 2)).unwrap();
        store.record_result(win, PickResult::Win, t0()).unwrap();
        store.record_result(loss, PickResult::Loss, t0()).unwrap();

        let summary = store.record_since(t0() - Duration::days(7)).unwrap();
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.pushes, 0);
        assert_eq!(summary.units, -0.09);

        let empty = store.record_since(t0() + Duration::days(1)).unwrap();
        assert_eq!(empty.graded(), 0);
    }

    #[test]
    fn test_record_since_compares_instants() {
        let store = PickStore::open_in_memory().unwrap();
        let mut early = pick("A @ B", MarketKind::Spread, 4, 2);
        early.created_at = Utc.with_ymd_and_hms(2025, 11, 2, 9, 0, 0).unwrap();
        let id = store.append(&early).unwrap().unwrap();
        store.record_result(id, PickResult::Win, t0()).unwrap();

        // Same instant written with a non-UTC offset.
        let eastern = chrono::FixedOffset::west_opt(5 * 3600).unwrap();
        let since = eastern.with_ymd_and_hms(2025, 11, 2, 4, 0, 0).unwrap().with_timezone(&Utc);
        assert_eq!(store.record_since(since).unwrap().wins, 1);

        let after = since + Duration::milliseconds(1);
        assert_eq!(store.record_since(after).unwrap().graded(), 0);
    }

    #[test]
    fn test_list_recent_orders_newest_first() {
        let store = PickStore::open_in_memory().unwrap();
        let mut older = pick("A @ B", MarketKind::Spread, 3, 2);
        older.created_at = t0() - Duration::hours(1);
        store.append(&older).unwrap();
        store.append(&pick("C @ D", MarketKind::Spread, 4, 2)).unwrap();

        let recent = store.list_recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].game_id, "C @ D");
        assert_eq!(store.list_recent(1).unwrap().len(), 1);
    }
}
