//! SQLite storage for match records and derived statistics
//!
//! All derived tables use natural-key upserts: recomputing a key replaces
//! the stored row in place. Keys absent from the latest run are left
//! untouched (no soft delete); callers that need a clean bucket should
//! clear it explicitly before re-aggregating.

use crate::{
    CounterRecord, MatchRecord, PairRecord, RatingSource, Result, Side, Slug, TimeBucket,
    TopEntry, UsageRecord,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::path::Path;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS replays (
                replay_id TEXT PRIMARY KEY,
                format_id TEXT NOT NULL,
                rating_estimate INTEGER,
                rating_source TEXT NOT NULL DEFAULT 'unknown',
                played_at TEXT,
                team_a TEXT NOT NULL,
                team_b TEXT NOT NULL,
                winner_side TEXT
            );

            CREATE TABLE IF NOT EXISTS pokemon_usage (
                format_id TEXT NOT NULL,
                time_bucket TEXT NOT NULL,
                cutoff INTEGER NOT NULL,
                slug TEXT NOT NULL,
                usage_rate REAL NOT NULL,
                rank INTEGER NOT NULL,
                sample_size INTEGER NOT NULL,
                top_moves TEXT NOT NULL DEFAULT '[]',
                top_items TEXT NOT NULL DEFAULT '[]',
                top_abilities TEXT NOT NULL DEFAULT '[]',
                top_tera TEXT NOT NULL DEFAULT '[]',
                top_spreads TEXT NOT NULL DEFAULT '[]',
                UNIQUE(format_id, time_bucket, cutoff, slug)
            );

            CREATE TABLE IF NOT EXISTS pair_synergy (
                format_id TEXT NOT NULL,
                time_bucket TEXT NOT NULL,
                cutoff INTEGER NOT NULL,
                slug_a TEXT NOT NULL,
                slug_b TEXT NOT NULL,
                pair_rate REAL NOT NULL,
                pair_sample_size INTEGER NOT NULL,
                top_third_partners TEXT NOT NULL DEFAULT '[]',
                top_fourth_partners TEXT NOT NULL DEFAULT '[]',
                common_leads TEXT NOT NULL DEFAULT '[]',
                UNIQUE(format_id, time_bucket, cutoff, slug_a, slug_b)
            );

            CREATE TABLE IF NOT EXISTS counters (
                format_id TEXT NOT NULL,
                time_bucket TEXT NOT NULL,
                cutoff INTEGER NOT NULL,
                target TEXT NOT NULL,
                answer_type TEXT NOT NULL,
                answer_key TEXT NOT NULL,
                effectiveness_score REAL NOT NULL,
                loss_appearance_rate REAL NOT NULL,
                win_appearance_rate REAL NOT NULL,
                n_wins INTEGER NOT NULL,
                n_losses INTEGER NOT NULL,
                answer_in_wins INTEGER NOT NULL,
                answer_in_losses INTEGER NOT NULL,
                UNIQUE(format_id, time_bucket, cutoff, target, answer_type, answer_key)
            );

            CREATE INDEX IF NOT EXISTS idx_replays_format ON replays(format_id);
            CREATE INDEX IF NOT EXISTS idx_usage_rate
                ON pokemon_usage(format_id, time_bucket, cutoff, usage_rate);
            "#,
        )?;
        Ok(())
    }

    // ==================== Match ingestion ====================

    /// Insert or replace a match record by replay id
    pub fn upsert_match(&self, record: &MatchRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO replays
                (replay_id, format_id, rating_estimate, rating_source, played_at,
                 team_a, team_b, winner_side)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(replay_id) DO UPDATE SET
                format_id = excluded.format_id,
                rating_estimate = excluded.rating_estimate,
                rating_source = excluded.rating_source,
                played_at = excluded.played_at,
                team_a = excluded.team_a,
                team_b = excluded.team_b,
                winner_side = excluded.winner_side
            "#,
            params![
                record.replay_id,
                record.format_id,
                record.rating,
                record.rating_source.code(),
                record.played_at.map(|t| t.format(DATETIME_FORMAT).to_string()),
                serde_json::to_string(&record.team_a)?,
                serde_json::to_string(&record.team_b)?,
                record.winner.map(|s| match s {
                    Side::A => "a",
                    Side::B => "b",
                }),
            ],
        )?;
        Ok(())
    }

    /// Insert a batch of match records inside one transaction
    pub fn upsert_matches(&self, records: &[MatchRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for record in records {
            self.upsert_match(record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Snapshot all matches for a format.
    ///
    /// One read per run: the aggregators work off this immutable vector so
    /// a concurrent ingester cannot change their view mid-aggregation.
    pub fn get_matches(&self, format_id: &str) -> Result<Vec<MatchRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT replay_id, format_id, rating_estimate, rating_source, played_at,
                   team_a, team_b, winner_side
            FROM replays
            WHERE format_id = ?1
            ORDER BY replay_id
            "#,
        )?;

        let records = stmt
            .query_map(params![format_id], |row| {
                let played_at: Option<String> = row.get(4)?;
                let team_a: String = row.get(5)?;
                let team_b: String = row.get(6)?;
                let winner: Option<String> = row.get(7)?;
                let rating_source: String = row.get(3)?;
                Ok(MatchRecord {
                    replay_id: row.get(0)?,
                    format_id: row.get(1)?,
                    rating: row.get(2)?,
                    rating_source: RatingSource::from_code(&rating_source),
                    played_at: played_at
                        .and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).ok()),
                    team_a: serde_json::from_str(&team_a).unwrap_or_default(),
                    team_b: serde_json::from_str(&team_b).unwrap_or_default(),
                    winner: winner.as_deref().and_then(|w| match w {
                        "a" => Some(Side::A),
                        "b" => Some(Side::B),
                        _ => None,
                    }),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn match_count(&self, format_id: &str) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM replays WHERE format_id = ?1",
            params![format_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Derived record upserts ====================

    /// Insert or replace a usage record on its natural key
    pub fn upsert_usage(&self, record: &UsageRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO pokemon_usage
                (format_id, time_bucket, cutoff, slug, usage_rate, rank, sample_size,
                 top_moves, top_items, top_abilities, top_tera, top_spreads)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(format_id, time_bucket, cutoff, slug) DO UPDATE SET
                usage_rate = excluded.usage_rate,
                rank = excluded.rank,
                sample_size = excluded.sample_size,
                top_moves = excluded.top_moves,
                top_items = excluded.top_items,
                top_abilities = excluded.top_abilities,
                top_tera = excluded.top_tera,
                top_spreads = excluded.top_spreads
            "#,
            params![
                record.format_id,
                record.time_bucket.as_str(),
                record.cutoff,
                record.slug.as_str(),
                record.usage_rate,
                record.rank,
                record.sample_size,
                serde_json::to_string(&record.top_moves)?,
                serde_json::to_string(&record.top_items)?,
                serde_json::to_string(&record.top_abilities)?,
                serde_json::to_string(&record.top_tera)?,
                serde_json::to_string(&record.top_spreads)?,
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a pair record on its natural key
    pub fn upsert_pair(&self, record: &PairRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO pair_synergy
                (format_id, time_bucket, cutoff, slug_a, slug_b, pair_rate,
                 pair_sample_size, top_third_partners, top_fourth_partners, common_leads)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(format_id, time_bucket, cutoff, slug_a, slug_b) DO UPDATE SET
                pair_rate = excluded.pair_rate,
                pair_sample_size = excluded.pair_sample_size,
                top_third_partners = excluded.top_third_partners,
                top_fourth_partners = excluded.top_fourth_partners,
                common_leads = excluded.common_leads
            "#,
            params![
                record.format_id,
                record.time_bucket.as_str(),
                record.cutoff,
                record.slug_a.as_str(),
                record.slug_b.as_str(),
                record.pair_rate,
                record.sample_size,
                serde_json::to_string(&record.top_third_partners)?,
                serde_json::to_string(&record.top_fourth_partners)?,
                serde_json::to_string(&record.common_leads)?,
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a counter record on its natural key
    pub fn upsert_counter(&self, record: &CounterRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO counters
                (format_id, time_bucket, cutoff, target, answer_type, answer_key,
                 effectiveness_score, loss_appearance_rate, win_appearance_rate,
                 n_wins, n_losses, answer_in_wins, answer_in_losses)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(format_id, time_bucket, cutoff, target, answer_type, answer_key)
            DO UPDATE SET
                effectiveness_score = excluded.effectiveness_score,
                loss_appearance_rate = excluded.loss_appearance_rate,
                win_appearance_rate = excluded.win_appearance_rate,
                n_wins = excluded.n_wins,
                n_losses = excluded.n_losses,
                answer_in_wins = excluded.answer_in_wins,
                answer_in_losses = excluded.answer_in_losses
            "#,
            params![
                record.format_id,
                record.time_bucket.as_str(),
                record.cutoff,
                record.target.as_str(),
                record.answer_type,
                record.answer.as_str(),
                record.effectiveness_score,
                record.loss_appearance_rate,
                record.win_appearance_rate,
                record.n_wins,
                record.n_losses,
                record.answer_in_wins,
                record.answer_in_losses,
            ],
        )?;
        Ok(())
    }

    /// Apply one run's derived records inside a single transaction.
    ///
    /// Upserts are idempotent on their natural keys, so the transaction is
    /// not needed for correctness; it gives clients polling the derived
    /// tables a consistent view of the run.
    pub fn store_run(
        &self,
        usage: &[UsageRecord],
        pairs: &[PairRecord],
        counters: &[CounterRecord],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for record in usage {
            self.upsert_usage(record)?;
        }
        for record in pairs {
            self.upsert_pair(record)?;
        }
        for record in counters {
            self.upsert_counter(record)?;
        }
        tx.commit()?;
        Ok(())
    }

    // ==================== Derived record reads ====================

    /// Slugs at or above a usage-rate floor, best first, capped.
    ///
    /// Used to pre-select counter targets from the previous usage pass.
    pub fn top_usage_slugs(
        &self,
        format_id: &str,
        bucket: &TimeBucket,
        cutoff: u32,
        min_usage: f64,
        limit: usize,
    ) -> Result<Vec<Slug>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT slug FROM pokemon_usage
            WHERE format_id = ?1 AND time_bucket = ?2 AND cutoff = ?3
              AND usage_rate >= ?4
            ORDER BY usage_rate DESC, slug ASC
            LIMIT ?5
            "#,
        )?;

        let slugs = stmt
            .query_map(
                params![format_id, bucket.as_str(), cutoff, min_usage, limit as i64],
                |row| {
                    let slug: String = row.get(0)?;
                    Ok(Slug::from_normalized(slug))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(slugs)
    }

    /// All usage records under a run key, rank order
    pub fn get_usage_records(
        &self,
        format_id: &str,
        bucket: &TimeBucket,
        cutoff: u32,
    ) -> Result<Vec<UsageRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT format_id, time_bucket, cutoff, slug, usage_rate, rank, sample_size,
                   top_moves, top_items, top_abilities, top_tera, top_spreads
            FROM pokemon_usage
            WHERE format_id = ?1 AND time_bucket = ?2 AND cutoff = ?3
            ORDER BY rank
            "#,
        )?;

        let records = stmt
            .query_map(params![format_id, bucket.as_str(), cutoff], |row| {
                let bucket: String = row.get(1)?;
                let slug: String = row.get(3)?;
                Ok(UsageRecord {
                    format_id: row.get(0)?,
                    time_bucket: TimeBucket::new(bucket),
                    cutoff: row.get(2)?,
                    slug: Slug::from_normalized(slug),
                    usage_rate: row.get(4)?,
                    rank: row.get(5)?,
                    sample_size: row.get(6)?,
                    top_moves: read_entries(row.get(7)?),
                    top_items: read_entries(row.get(8)?),
                    top_abilities: read_entries(row.get(9)?),
                    top_tera: read_entries(row.get(10)?),
                    top_spreads: read_entries(row.get(11)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// All pair records under a run key, highest sample first
    pub fn get_pair_records(
        &self,
        format_id: &str,
        bucket: &TimeBucket,
        cutoff: u32,
    ) -> Result<Vec<PairRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT format_id, time_bucket, cutoff, slug_a, slug_b, pair_rate,
                   pair_sample_size, top_third_partners, top_fourth_partners, common_leads
            FROM pair_synergy
            WHERE format_id = ?1 AND time_bucket = ?2 AND cutoff = ?3
            ORDER BY pair_sample_size DESC, slug_a ASC, slug_b ASC
            "#,
        )?;

        let records = stmt
            .query_map(params![format_id, bucket.as_str(), cutoff], |row| {
                let bucket: String = row.get(1)?;
                let slug_a: String = row.get(3)?;
                let slug_b: String = row.get(4)?;
                Ok(PairRecord {
                    format_id: row.get(0)?,
                    time_bucket: TimeBucket::new(bucket),
                    cutoff: row.get(2)?,
                    slug_a: Slug::from_normalized(slug_a),
                    slug_b: Slug::from_normalized(slug_b),
                    pair_rate: row.get(5)?,
                    sample_size: row.get(6)?,
                    top_third_partners: read_entries(row.get(7)?),
                    top_fourth_partners: read_entries(row.get(8)?),
                    common_leads: read_entries(row.get(9)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// All counter records under a run key, target then score order
    pub fn get_counter_records(
        &self,
        format_id: &str,
        bucket: &TimeBucket,
        cutoff: u32,
    ) -> Result<Vec<CounterRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT format_id, time_bucket, cutoff, target, answer_type, answer_key,
                   effectiveness_score, loss_appearance_rate, win_appearance_rate,
                   n_wins, n_losses, answer_in_wins, answer_in_losses
            FROM counters
            WHERE format_id = ?1 AND time_bucket = ?2 AND cutoff = ?3
            ORDER BY target ASC, effectiveness_score DESC, answer_key ASC
            "#,
        )?;

        let records = stmt
            .query_map(params![format_id, bucket.as_str(), cutoff], |row| {
                let bucket: String = row.get(1)?;
                let target: String = row.get(3)?;
                let answer: String = row.get(5)?;
                Ok(CounterRecord {
                    format_id: row.get(0)?,
                    time_bucket: TimeBucket::new(bucket),
                    cutoff: row.get(2)?,
                    target: Slug::from_normalized(target),
                    answer_type: row.get(4)?,
                    answer: Slug::from_normalized(answer),
                    effectiveness_score: row.get(6)?,
                    loss_appearance_rate: row.get(7)?,
                    win_appearance_rate: row.get(8)?,
                    n_wins: row.get(9)?,
                    n_losses: row.get(10)?,
                    answer_in_wins: row.get(11)?,
                    answer_in_losses: row.get(12)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Row counts per derived table for a run key (for status reporting)
    pub fn derived_counts(
        &self,
        format_id: &str,
        bucket: &TimeBucket,
        cutoff: u32,
    ) -> Result<(u64, u64, u64)> {
        let count = |table: &str| -> Result<u64> {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE format_id = ?1 AND time_bucket = ?2 AND cutoff = ?3",
                table
            );
            let n: u64 = self.conn.query_row(
                &sql,
                params![format_id, bucket.as_str(), cutoff],
                |row| row.get(0),
            )?;
            Ok(n)
        };
        Ok((
            count("pokemon_usage")?,
            count("pair_synergy")?,
            count("counters")?,
        ))
    }
}

fn read_entries(json: String) -> Vec<TopEntry> {
    serde_json::from_str(&json).unwrap_or_default()
}
