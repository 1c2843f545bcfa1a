//! Pair synergy aggregation
//!
//! Counts co-occurrence of entity pairs within single teams and derives
//! pair rates plus partner/lead breakdowns.

use crate::aggregate::{round2, top_k, RunKey};
use crate::{MatchRecord, PairRecord, Slug};
use std::collections::HashMap;

/// Canonical form of an unordered pair: the lexicographically smaller slug
/// first. `canonical(a, b) == canonical(b, a)` for all inputs.
pub fn canonical(a: &Slug, b: &Slug) -> (Slug, Slug) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Default)]
struct PairAccumulator {
    count: u64,
    /// Indices into the flattened team list of every team holding the pair
    team_indices: Vec<usize>,
    thirds: HashMap<String, u64>,
    leads: HashMap<String, u64>,
}

/// Aggregate pair synergy over the eligible corpus.
///
/// Each match contributes its two teams independently; every unordered
/// pair of distinct entities on a team increments the canonical pair's
/// counter (a full 6-entity team yields 15 pairs). The pair rate is the
/// share of teams containing both entities among all eligible teams, each
/// match counting two team slots. Pairs below `min_sample` co-occurrences
/// are dropped entirely, not stored as zero.
pub fn aggregate_pairs(
    matches: &[MatchRecord],
    key: &RunKey,
    min_sample: u64,
    k: usize,
) -> Vec<PairRecord> {
    let teams: Vec<&[Slug]> = matches
        .iter()
        .flat_map(|m| [m.team_a.as_slice(), m.team_b.as_slice()])
        .collect();
    let total_teams = teams.len() as u64;
    if total_teams == 0 {
        return Vec::new();
    }

    let mut pairs: HashMap<(Slug, Slug), PairAccumulator> = HashMap::new();
    for (team_index, team) in teams.iter().enumerate() {
        for i in 0..team.len() {
            for j in (i + 1)..team.len() {
                // Teams are deduplicated at ingestion, so self-pairs are
                // impossible by construction; guard anyway
                if team[i] == team[j] {
                    continue;
                }
                let acc = pairs.entry(canonical(&team[i], &team[j])).or_default();
                acc.count += 1;
                acc.team_indices.push(team_index);
                for member in team.iter() {
                    if *member != team[i] && *member != team[j] {
                        *acc.thirds.entry(member.as_str().to_string()).or_default() += 1;
                    }
                }
                if let Some(lead) = team.first() {
                    *acc.leads.entry(lead.as_str().to_string()).or_default() += 1;
                }
            }
        }
    }

    let mut records: Vec<PairRecord> = pairs
        .into_iter()
        .filter(|(_, acc)| acc.count >= min_sample)
        .map(|((slug_a, slug_b), acc)| {
            let rate = acc.count as f64 / total_teams as f64 * 100.0;

            // Fourth partners: teammates of the pair plus its most common
            // third partner, over the teams holding all three
            let fourths = acc
                .thirds
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(third, _)| {
                    let mut counts: HashMap<String, u64> = HashMap::new();
                    for &team_index in &acc.team_indices {
                        let team = teams[team_index];
                        if !team.iter().any(|s| s.as_str() == third) {
                            continue;
                        }
                        for member in team {
                            let name = member.as_str();
                            if name != third
                                && *member != slug_a
                                && *member != slug_b
                            {
                                *counts.entry(name.to_string()).or_default() += 1;
                            }
                        }
                    }
                    counts
                })
                .unwrap_or_default();

            PairRecord {
                format_id: key.format_id.clone(),
                time_bucket: key.time_bucket.clone(),
                cutoff: key.cutoff,
                slug_a,
                slug_b,
                pair_rate: round2(rate.clamp(0.0, 100.0)),
                sample_size: acc.count,
                top_third_partners: top_k(&acc.thirds, k),
                top_fourth_partners: top_k(&fourths, k),
                common_leads: top_k(&acc.leads, k),
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.sample_size
            .cmp(&a.sample_size)
            .then_with(|| a.slug_a.cmp(&b.slug_a))
            .then_with(|| a.slug_b.cmp(&b.slug_b))
    });
    records
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
    fn test_canonical_is_symmetric() {
        let a = normalize("rillaboom");
        let b = normalize("incineroar");
        assert_eq!(canonical(&a, &b), canonical(&b, &a));
        let (first, second) = canonical(&a, &b);
        assert!(first <= second);
        assert_eq!(first.as_str(), "incineroar");
    }

    #[test]
    fn test_pair_rate_over_team_slots() {
        // 5 matches = 10 team slots; a+b co-occur on 4 of them
        let matches = vec![
            make_match("r1", Some(1800), &["a", "b"], &["c", "d"], None),
            make_match("r2", Some(1800), &["a", "b"], &["c", "d"], None),
            make_match("r3", Some(1800), &["c", "d"], &["a", "b"], None),
            make_match("r4", Some(1800), &["a", "b"], &["c", "d"], None),
            make_match("r5", Some(1800), &["a", "c"], &["b", "d"], None),
        ];

        let records = aggregate_pairs(&matches, &key(), 3, 10);
        let ab = records
            .iter()
            .find(|r| r.slug_a.as_str() == "a" && r.slug_b.as_str() == "b")
            .unwrap();
        assert_eq!(ab.sample_size, 4);
        assert_eq!(ab.pair_rate, 40.0);

        // Same corpus, min_sample 5: the pair is dropped, not zero-filled
        let records = aggregate_pairs(&matches, &key(), 5, 10);
        assert!(!records
            .iter()
            .any(|r| r.slug_a.as_str() == "a" && r.slug_b.as_str() == "b"));
    }

    #[test]
    fn test_six_entity_team_yields_fifteen_pairs() {
        let matches = vec![make_match(
            "r1",
            Some(1800),
            &["a", "b", "c", "d", "e", "f"],
            &[],
            None,
        )];
        let records = aggregate_pairs(&matches, &key(), 1, 10);
        assert_eq!(records.len(), 15);
    }

    #[test]
    fn test_no_self_pairs() {
        let matches = vec![make_match("r1", Some(1800), &["a", "b", "c"], &[], None)];
        let records = aggregate_pairs(&matches, &key(), 1, 10);
        assert!(records.iter().all(|r| r.slug_a != r.slug_b));
    }

    #[test]
    fn test_partner_and_lead_breakdowns() {
        let matches = vec![
            make_match("r1", Some(1800), &["a", "b", "c", "d"], &[], None),
            make_match("r2", Some(1800), &["a", "b", "c", "e"], &[], None),
        ];

        let records = aggregate_pairs(&matches, &key(), 2, 10);
        let ab = records
            .iter()
            .find(|r| r.slug_a.as_str() == "a" && r.slug_b.as_str() == "b")
            .unwrap();

        // c appears with the pair on both teams, d and e once each
        assert_eq!(ab.top_third_partners[0].key, "c");
        assert_eq!(ab.top_third_partners[0].count, 2);

        // Fourth partners: teams holding a+b+c contribute d and e
        let fourth_keys: Vec<&str> = ab
            .top_fourth_partners
            .iter()
            .map(|e| e.key.as_str())
            .collect();
        assert_eq!(fourth_keys, vec!["d", "e"]);

        // Both teams lead with a
        assert_eq!(ab.common_leads[0].key, "a");
        assert_eq!(ab.common_leads[0].count, 2);
    }
}
