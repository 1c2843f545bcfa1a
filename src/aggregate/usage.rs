//! Usage aggregation
//!
//! Computes appearance frequency and ranked attribute breakdowns per
//! entity, from either raw match teams or a pre-aggregated provider
//! snapshot.

use crate::aggregate::{round2, top_k, RunKey};
use crate::{MatchRecord, Slug, UsageRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pre-aggregated usage data from an external statistics provider.
///
/// Fractions are raw shares of `total_samples`; breakdown maps are
/// (possibly weighted, pre-rounded) occurrence counts per key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub total_samples: u64,
    pub entities: HashMap<Slug, SnapshotEntity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotEntity {
    /// Fraction of samples the entity appeared in, 0-1
    pub fraction: f64,
    pub moves: HashMap<String, u64>,
    pub items: HashMap<String, u64>,
    pub abilities: HashMap<String, u64>,
    pub tera: HashMap<String, u64>,
    pub spreads: HashMap<String, u64>,
}

/// Aggregate usage from raw match teams.
///
/// Occurrences are counted once per team slot across both sides of every
/// match; `total_samples` is the sample base the caller wants rates
/// expressed against (normally the eligible match count). Raw matches
/// carry no moveset data, so breakdowns are empty in this shape.
pub fn aggregate_usage(
    matches: &[MatchRecord],
    total_samples: u64,
    key: &RunKey,
) -> Vec<UsageRecord> {
    if total_samples == 0 {
        return Vec::new();
    }

    let mut occurrences: HashMap<Slug, u64> = HashMap::new();
    for record in matches {
        for slug in record.team_a.iter().chain(record.team_b.iter()) {
            *occurrences.entry(slug.clone()).or_default() += 1;
        }
    }

    let mut records: Vec<UsageRecord> = occurrences
        .into_iter()
        .filter(|&(_, count)| count > 0)
        .map(|(slug, count)| UsageRecord {
            format_id: key.format_id.clone(),
            time_bucket: key.time_bucket.clone(),
            cutoff: key.cutoff,
            slug,
            usage_rate: round2(count as f64 / total_samples as f64 * 100.0),
            rank: 0,
            sample_size: count,
            top_moves: Vec::new(),
            top_items: Vec::new(),
            top_abilities: Vec::new(),
            top_tera: Vec::new(),
            top_spreads: Vec::new(),
        })
        .collect();

    assign_ranks(&mut records);
    records
}

/// Aggregate usage from a provider snapshot.
///
/// `usage_rate` is the raw fraction scaled to a percentage and the sample
/// size is estimated as `round(total_samples * fraction)`; breakdowns come
/// from the snapshot's count maps via the shared top-K extraction.
pub fn aggregate_usage_snapshot(
    snapshot: &UsageSnapshot,
    key: &RunKey,
    k: usize,
    k_spreads: usize,
) -> Vec<UsageRecord> {
    let mut records: Vec<UsageRecord> = snapshot
        .entities
        .iter()
        .filter(|(_, entity)| entity.fraction > 0.0)
        .map(|(slug, entity)| UsageRecord {
            format_id: key.format_id.clone(),
            time_bucket: key.time_bucket.clone(),
            cutoff: key.cutoff,
            slug: slug.clone(),
            usage_rate: round2(entity.fraction * 100.0),
            rank: 0,
            sample_size: (snapshot.total_samples as f64 * entity.fraction).round() as u64,
            top_moves: top_k(&entity.moves, k),
            top_items: top_k(&entity.items, k),
            top_abilities: top_k(&entity.abilities, k),
            top_tera: top_k(&entity.tera, k),
            top_spreads: top_k(&entity.spreads, k_spreads),
        })
        .collect();

    assign_ranks(&mut records);
    records
}

/// Sort by usage rate descending (slug ascending on ties) and assign
/// contiguous 1-based ranks in that order.
fn assign_ranks(records: &mut [UsageRecord]) {
    records.sort_by(|a, b| {
        b.usage_rate
            .partial_cmp(&a.usage_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.slug.cmp(&b.slug))
    });
    for (i, record) in records.iter_mut().enumerate() {
        record.rank = (i + 1) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::test_support::make_match;
    use crate::normalize::normalize;
    use crate::TimeBucket;

    fn key() -> RunKey {
        RunKey {
            format_id: "reg-f".to_string(),
            time_bucket: TimeBucket::new("2026-01"),
            cutoff: 1760,
        }
    }

    #[test]
    fn test_raw_usage_counting() {
        let matches = vec![
            make_match("r1", Some(1800), &["a", "b"], &["c"], None),
            make_match("r2", Some(1800), &["a"], &["b"], None),
        ];

        let records = aggregate_usage(&matches, 2, &key());
        assert_eq!(records.len(), 3);

        let a = records.iter().find(|r| r.slug.as_str() == "a").unwrap();
        assert_eq!(a.sample_size, 2);
        assert_eq!(a.usage_rate, 100.0);

        let c = records.iter().find(|r| r.slug.as_str() == "c").unwrap();
        assert_eq!(c.sample_size, 1);
        assert_eq!(c.usage_rate, 50.0);
    }

    #[test]
    fn test_rank_ties_broken_alphabetically() {
        // Occurrence counts {a: 10, b: 10, c: 5} over 20 samples
        let mut snapshot = UsageSnapshot {
            total_samples: 20,
            entities: HashMap::new(),
        };
        for (name, fraction) in [("b", 0.5), ("a", 0.5), ("c", 0.25)] {
            snapshot.entities.insert(
                normalize(name),
                SnapshotEntity {
                    fraction,
                    ..Default::default()
                },
            );
        }

        let records = aggregate_usage_snapshot(&snapshot, &key(), 10, 5);
        let ranked: Vec<(&str, u32)> = records
            .iter()
            .map(|r| (r.slug.as_str(), r.rank))
            .collect();
        assert_eq!(ranked, vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn test_snapshot_sample_size_rounding() {
        let mut snapshot = UsageSnapshot {
            total_samples: 1000,
            entities: HashMap::new(),
        };
        snapshot.entities.insert(
            normalize("flutter-mane"),
            SnapshotEntity {
                fraction: 0.4973,
                ..Default::default()
            },
        );

        let records = aggregate_usage_snapshot(&snapshot, &key(), 10, 5);
        assert_eq!(records[0].usage_rate, 49.73);
        assert_eq!(records[0].sample_size, 497);
    }

    #[test]
    fn test_zero_occurrence_not_emitted() {
        let mut snapshot = UsageSnapshot {
            total_samples: 100,
            entities: HashMap::new(),
        };
        snapshot.entities.insert(
            normalize("unused"),
            SnapshotEntity {
                fraction: 0.0,
                ..Default::default()
            },
        );
        assert!(aggregate_usage_snapshot(&snapshot, &key(), 10, 5).is_empty());

        assert!(aggregate_usage(&[], 0, &key()).is_empty());
    }

    #[test]
    fn test_snapshot_breakdowns() {
        let mut moves = HashMap::new();
        moves.insert("protect".to_string(), 80);
        moves.insert("fake-out".to_string(), 20);

        let mut snapshot = UsageSnapshot {
            total_samples: 100,
            entities: HashMap::new(),
        };
        snapshot.entities.insert(
            normalize("incineroar"),
            SnapshotEntity {
                fraction: 0.5,
                moves,
                ..Default::default()
            },
        );

        let records = aggregate_usage_snapshot(&snapshot, &key(), 1, 5);
        let top = &records[0].top_moves;
        // k = 1 keeps only the leader, but pct is against the full sum
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key, "protect");
        assert_eq!(top[0].pct, 80.0);
        assert_eq!(top[0].rank, 1);
    }
}
