//! Statistical aggregation over the match corpus
//!
//! A shared corpus filter plus the three aggregators (usage, pair synergy,
//! counter effectiveness). Each aggregator is a pure function of the
//! filtered corpus; all of them see the corpus through the same
//! [`CorpusFilter`] so their views stay consistent within one run.

pub mod counters;
pub mod pairs;
pub mod usage;

pub use counters::aggregate_counters;
pub use pairs::aggregate_pairs;
pub use usage::{aggregate_usage, aggregate_usage_snapshot};

use crate::{EngineConfig, MatchRecord, Result, TimeBucket, TopEntry};
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Eligibility rules shared by every aggregator in a run.
///
/// A match is eligible iff its format matches exactly and its rating
/// estimate is present and at or above the cutoff. Matches with no rating
/// are always excluded; only rated data above the quality threshold counts.
/// An optional `[start, end)` window additionally restricts to matches with
/// a known played-at timestamp inside the reporting month.
#[derive(Debug, Clone)]
pub struct CorpusFilter {
    format_id: String,
    min_rating: u32,
    window: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl CorpusFilter {
    pub fn new(format_id: impl Into<String>, min_rating: u32) -> Self {
        CorpusFilter {
            format_id: format_id.into(),
            min_rating,
            window: None,
        }
    }

    /// Build the filter for one run from the engine configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut filter = CorpusFilter::new(&config.format_id, config.min_rating);
        if config.restrict_to_bucket {
            let bucket = TimeBucket::new(config.time_bucket.clone());
            filter.window = Some(bucket.window()?);
        }
        Ok(filter)
    }

    pub fn with_window(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.window = Some((start, end));
        self
    }

    pub fn is_eligible(&self, record: &MatchRecord) -> bool {
        if record.format_id != self.format_id {
            return false;
        }
        match record.rating {
            Some(rating) if rating >= self.min_rating => {}
            _ => return false,
        }
        if let Some((start, end)) = self.window {
            match record.played_at {
                Some(at) if at >= start && at < end => {}
                _ => return false,
            }
        }
        true
    }

    /// Keep only eligible matches
    pub fn apply(&self, mut matches: Vec<MatchRecord>) -> Vec<MatchRecord> {
        matches.retain(|m| self.is_eligible(m));
        matches
    }
}

/// The (format, bucket, cutoff) triple every derived record of one run is
/// keyed under
#[derive(Debug, Clone)]
pub struct RunKey {
    pub format_id: String,
    pub time_bucket: TimeBucket,
    pub cutoff: u32,
}

impl RunKey {
    pub fn from_config(config: &EngineConfig) -> Self {
        RunKey {
            format_id: config.format_id.clone(),
            time_bucket: TimeBucket::new(config.time_bucket.clone()),
            cutoff: config.min_rating,
        }
    }
}

/// Round to two decimal places (all stored percentages use this)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Ranked top-K extraction from a count distribution.
///
/// Keys are sorted by count descending with ties broken by key ascending;
/// the first `k` survive. Percentages are taken against the sum of the
/// whole distribution, not just the kept entries.
pub fn top_k(counts: &HashMap<String, u64>, k: usize) -> Vec<TopEntry> {
    let total: u64 = counts.values().sum();
    if total == 0 || k == 0 {
        return Vec::new();
    }

    let mut entries: Vec<(&String, u64)> = counts.iter().map(|(key, &n)| (key, n)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.truncate(k);

    entries
        .into_iter()
        .enumerate()
        .map(|(i, (key, count))| TopEntry {
            key: key.clone(),
            count,
            pct: round2(count as f64 / total as f64 * 100.0),
            rank: (i + 1) as u32,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::normalize::normalize;
    use crate::{MatchRecord, RatingSource, Side, Slug};

    pub fn slugs(names: &[&str]) -> Vec<Slug> {
        names.iter().map(|n| normalize(n)).collect()
    }

    pub fn make_match(
        id: &str,
        rating: Option<u32>,
        team_a: &[&str],
        team_b: &[&str],
        winner: Option<Side>,
    ) -> MatchRecord {
        MatchRecord {
            replay_id: id.to_string(),
            format_id: "reg-f".to_string(),
            rating,
            rating_source: if rating.is_some() {
                RatingSource::Official
            } else {
                RatingSource::Unknown
            },
            played_at: None,
            team_a: slugs(team_a),
            team_b: slugs(team_b),
            winner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::make_match;
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_rating_boundary_inclusive() {
        let filter = CorpusFilter::new("reg-f", 1760);

        let at_cutoff = make_match("r1", Some(1760), &["a"], &["b"], None);
        let below = make_match("r2", Some(1759), &["a"], &["b"], None);
        let unrated = make_match("r3", None, &["a"], &["b"], None);

        assert!(filter.is_eligible(&at_cutoff));
        assert!(!filter.is_eligible(&below));
        assert!(!filter.is_eligible(&unrated));
    }

    #[test]
    fn test_format_must_match_exactly() {
        let filter = CorpusFilter::new("reg-f", 1000);
        let mut m = make_match("r1", Some(1800), &["a"], &["b"], None);
        m.format_id = "reg-g".to_string();
        assert!(!filter.is_eligible(&m));
    }

    #[test]
    fn test_window_filtering() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let filter = CorpusFilter::new("reg-f", 1000).with_window(start, end);

        let mut inside = make_match("r1", Some(1800), &["a"], &["b"], None);
        inside.played_at = NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0);
        assert!(filter.is_eligible(&inside));

        // End of window is exclusive
        let mut at_end = inside.clone();
        at_end.played_at = Some(end);
        assert!(!filter.is_eligible(&at_end));

        // No timestamp at all: excluded once a window is set
        let mut unknown = inside.clone();
        unknown.played_at = None;
        assert!(!filter.is_eligible(&unknown));
    }

    #[test]
    fn test_top_k_ordering_and_pct() {
        let mut counts = HashMap::new();
        counts.insert("protect".to_string(), 50);
        counts.insert("fake-out".to_string(), 30);
        counts.insert("u-turn".to_string(), 30);
        counts.insert("taunt".to_string(), 10);

        let top = top_k(&counts, 3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].key, "protect");
        assert_eq!(top[0].pct, 41.67);
        assert_eq!(top[0].rank, 1);
        // Tie between fake-out and u-turn: key ascending
        assert_eq!(top[1].key, "fake-out");
        assert_eq!(top[2].key, "u-turn");
        assert_eq!(top[2].rank, 3);
    }

    #[test]
    fn test_top_k_empty() {
        assert!(top_k(&HashMap::new(), 10).is_empty());
    }
}
