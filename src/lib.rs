//! VGC meta analytics aggregation engine
//!
//! Turns a corpus of competitive match records into usage, pair-synergy and
//! counter-effectiveness statistics, keyed by (format, time bucket, rating
//! cutoff).

pub mod aggregate;
pub mod data;
pub mod engine;
pub mod normalize;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Answer type tag for counter records produced by this engine.
///
/// The schema reserves other tags (`mechanic`, `archetype`) for curated
/// rows; the aggregator only ever emits per-entity answers.
pub const ANSWER_TYPE_POKEMON: &str = "pokemon";

/// Normalized entity identifier for one Pokemon+form combination.
///
/// Only the normalizer (or the storage layer reading back previously
/// normalized values) constructs these; the rest of the crate treats them
/// as opaque ordered keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Wrap a string that is already in normalized form.
    pub(crate) fn from_normalized(s: String) -> Self {
        Slug(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of a match a team occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Provenance of a match's rating estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingSource {
    Official,
    Estimated,
    Unknown,
}

impl RatingSource {
    pub fn code(&self) -> &'static str {
        match self {
            RatingSource::Official => "official",
            RatingSource::Estimated => "estimated",
            RatingSource::Unknown => "unknown",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "official" => RatingSource::Official,
            "estimated" => RatingSource::Estimated,
            _ => RatingSource::Unknown,
        }
    }
}

/// A single completed match from the ingestion boundary
///
/// Team lists are deduplicated and capped at six entries before a record is
/// ever constructed; the aggregators rely on both invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub replay_id: String,
    pub format_id: String,
    pub rating: Option<u32>,
    pub rating_source: RatingSource,
    pub played_at: Option<NaiveDateTime>,
    pub team_a: Vec<Slug>,
    pub team_b: Vec<Slug>,
    /// `None` means the winner could not be determined (never guessed)
    pub winner: Option<Side>,
}

impl MatchRecord {
    pub fn team(&self, side: Side) -> &[Slug] {
        match side {
            Side::A => &self.team_a,
            Side::B => &self.team_b,
        }
    }

    /// The side a slug appears on, if it appears on exactly one side.
    ///
    /// Returns `None` both when the slug is absent and when it appears on
    /// both sides (mirror matches are excluded from counter analysis).
    pub fn exclusive_side_of(&self, slug: &Slug) -> Option<Side> {
        let in_a = self.team_a.contains(slug);
        let in_b = self.team_b.contains(slug);
        match (in_a, in_b) {
            (true, false) => Some(Side::A),
            (false, true) => Some(Side::B),
            _ => None,
        }
    }

    /// Check whether the given side won this match
    pub fn did_win(&self, side: Side) -> Option<bool> {
        self.winner.map(|w| w == side)
    }
}

/// Calendar-month reporting period, formatted `YYYY-MM`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeBucket(String);

impl TimeBucket {
    pub fn new(bucket: impl Into<String>) -> Self {
        TimeBucket(bucket.into())
    }

    /// The bucket for the current calendar month
    pub fn current() -> Self {
        let now = Utc::now().naive_utc().date();
        TimeBucket(format!("{:04}-{:02}", now.year(), now.month()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Half-open `[start, end)` window covering the bucket's month.
    ///
    /// Returns an error for buckets that are not valid `YYYY-MM` strings.
    pub fn window(&self) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let (year, month) = self
            .0
            .split_once('-')
            .and_then(|(y, m)| Some((y.parse::<i32>().ok()?, m.parse::<u32>().ok()?)))
            .ok_or_else(|| CompassError::InvalidBucket(self.0.clone()))?;

        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| CompassError::InvalidBucket(self.0.clone()))?;
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| CompassError::InvalidBucket(self.0.clone()))?;

        Ok((
            start.and_hms_opt(0, 0, 0).unwrap_or_default(),
            end.and_hms_opt(0, 0, 0).unwrap_or_default(),
        ))
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a ranked top-K breakdown (moves, items, partners, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopEntry {
    pub key: String,
    pub count: u64,
    /// Share of the full distribution, percent, two decimals
    pub pct: f64,
    pub rank: u32,
}

/// Derived per-entity usage statistics
///
/// Keyed by (format, bucket, cutoff, slug); recomputing for the same key
/// replaces the stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub format_id: String,
    pub time_bucket: TimeBucket,
    pub cutoff: u32,
    pub slug: Slug,
    /// Percentage of samples the entity appeared in, 0-100, two decimals
    pub usage_rate: f64,
    /// Dense 1-based rank, ties broken by slug ascending
    pub rank: u32,
    pub sample_size: u64,
    pub top_moves: Vec<TopEntry>,
    pub top_items: Vec<TopEntry>,
    pub top_abilities: Vec<TopEntry>,
    pub top_tera: Vec<TopEntry>,
    pub top_spreads: Vec<TopEntry>,
}

/// Derived co-occurrence statistics for a canonical entity pair
///
/// Invariant: `slug_a < slug_b` lexicographically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub format_id: String,
    pub time_bucket: TimeBucket,
    pub cutoff: u32,
    pub slug_a: Slug,
    pub slug_b: Slug,
    /// Teams containing both entities over all eligible teams, percent
    pub pair_rate: f64,
    pub sample_size: u64,
    pub top_third_partners: Vec<TopEntry>,
    pub top_fourth_partners: Vec<TopEntry>,
    pub common_leads: Vec<TopEntry>,
}

/// Derived counter-effectiveness statistics for one (target, answer) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub format_id: String,
    pub time_bucket: TimeBucket,
    pub cutoff: u32,
    pub target: Slug,
    pub answer_type: String,
    pub answer: Slug,
    /// loss_appearance_rate - win_appearance_rate, typically in [-1, 1]
    pub effectiveness_score: f64,
    pub loss_appearance_rate: f64,
    pub win_appearance_rate: f64,
    pub n_wins: u64,
    pub n_losses: u64,
    pub answer_in_wins: u64,
    pub answer_in_losses: u64,
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum CompassError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid time bucket: {0}")]
    InvalidBucket(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CompassError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub data: DataConfig,
}

/// Parameters for one aggregation run, threaded through every aggregator
/// call; nothing is read from ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub format_id: String,
    pub time_bucket: String,
    /// Minimum rating estimate for a match to count (boundary inclusive)
    pub min_rating: u32,
    /// Restrict the corpus to matches played inside the bucket's month
    pub restrict_to_bucket: bool,
    /// Minimum co-occurrence count for a pair to be stored
    pub pair_min_sample: u64,
    /// Minimum combined appearance count for a counter answer to be stored
    pub counter_min_sample: u64,
    /// Number of counter answers kept per target
    pub counter_top_n: usize,
    /// Usage-rate floor for counter target pre-selection, percent
    pub counter_min_usage: f64,
    /// Cap on the number of counter targets per run
    pub counter_max_targets: usize,
    /// Breakdown size for moves, items, abilities and tera types
    pub top_k: usize,
    /// Breakdown size for stat spreads
    pub top_k_spreads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig {
                format_id: "reg-f".to_string(),
                time_bucket: TimeBucket::current().as_str().to_string(),
                min_rating: 1760,
                restrict_to_bucket: false,
                pair_min_sample: 3,
                counter_min_sample: 20,
                counter_top_n: 15,
                counter_min_usage: 10.0,
                counter_max_targets: 30,
                top_k: 10,
                top_k_spreads: 5,
            },
            data: DataConfig {
                database_path: "data/compass.db".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompassError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| CompassError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CompassError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn bucket(&self) -> TimeBucket {
        TimeBucket::new(self.engine.time_bucket.clone())
    }
}
