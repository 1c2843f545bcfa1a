//! Counter effectiveness aggregation
//!
//! For each target entity, measures which opposing entities are
//! disproportionately present in the target's losses versus its wins.
//! The score is a plain appearance-rate difference; keeping it free of
//! confidence intervals or shrinkage is a deliberate choice so values stay
//! comparable with historical records.

use crate::aggregate::RunKey;
use crate::{CounterRecord, MatchRecord, Slug, ANSWER_TYPE_POKEMON};
use rayon::prelude::*;
use std::collections::HashMap;

#[derive(Default)]
struct AnswerCounts {
    in_wins: u64,
    in_losses: u64,
}

/// Aggregate counter effectiveness for a set of targets.
///
/// Targets are independent, so they are processed in parallel over the
/// shared read-only corpus; output order follows the target list.
pub fn aggregate_counters(
    matches: &[MatchRecord],
    targets: &[Slug],
    key: &RunKey,
    min_sample: u64,
    top_n: usize,
) -> Vec<CounterRecord> {
    targets
        .par_iter()
        .flat_map(|target| counters_for_target(matches, target, key, min_sample, top_n))
        .collect()
}

/// Counter records for a single target entity.
///
/// Only matches with a known winner where the target appears on exactly
/// one side participate; mirror matches are excluded entirely.
pub fn counters_for_target(
    matches: &[MatchRecord],
    target: &Slug,
    key: &RunKey,
    min_sample: u64,
    top_n: usize,
) -> Vec<CounterRecord> {
    let mut n_wins = 0u64;
    let mut n_losses = 0u64;
    let mut answers: HashMap<Slug, AnswerCounts> = HashMap::new();

    for record in matches {
        let Some(side) = record.exclusive_side_of(target) else {
            continue;
        };
        let Some(target_won) = record.did_win(side) else {
            continue;
        };

        if target_won {
            n_wins += 1;
        } else {
            n_losses += 1;
        }

        for opponent in record.team(side.opposite()) {
            // The target cannot be its own counter (it is never on the
            // opposing side here, but the invariant is worth enforcing)
            if opponent == target {
                continue;
            }
            let counts = answers.entry(opponent.clone()).or_default();
            if target_won {
                counts.in_wins += 1;
            } else {
                counts.in_losses += 1;
            }
        }
    }

    let mut records: Vec<CounterRecord> = answers
        .into_iter()
        .filter(|(_, counts)| counts.in_wins + counts.in_losses >= min_sample)
        .map(|(answer, counts)| {
            let loss_rate = rate(counts.in_losses, n_losses);
            let win_rate = rate(counts.in_wins, n_wins);
            CounterRecord {
                format_id: key.format_id.clone(),
                time_bucket: key.time_bucket.clone(),
                cutoff: key.cutoff,
                target: target.clone(),
                answer_type: ANSWER_TYPE_POKEMON.to_string(),
                answer,
                effectiveness_score: loss_rate - win_rate,
                loss_appearance_rate: loss_rate,
                win_appearance_rate: win_rate,
                n_wins,
                n_losses,
                answer_in_wins: counts.in_wins,
                answer_in_losses: counts.in_losses,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.effectiveness_score
            .partial_cmp(&a.effectiveness_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.answer.cmp(&b.answer))
    });
    records.truncate(top_n);
    records
}

fn rate(appearances: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        appearances as f64 / total as f64
    }
}
