//! Ingestion boundary
//!
//! Parses already-downloaded replay dumps and provider usage snapshots
//! into typed records. Structurally invalid files fail fast; individual
//! malformed entries are skipped and counted, never fatal to a run.
//! All entity names pass through the normalizer here, so nothing past
//! this module ever sees a raw name.

use crate::aggregate::usage::UsageSnapshot;
use crate::normalize::normalize;
use crate::{MatchRecord, RatingSource, Result, Side, Slug};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashMap;

/// Maximum team size; the aggregators rely on this cap
pub const MAX_TEAM_SIZE: usize = 6;

/// Outcome of one ingestion pass
#[derive(Debug, Default)]
pub struct IngestReport {
    pub records: Vec<MatchRecord>,
    pub skipped: usize,
}

/// Raw replay entry as exported by the fetch pipeline
#[derive(Debug, Deserialize)]
struct RawReplay {
    replay_id: String,
    format_id: Option<String>,
    rating_estimate: Option<u32>,
    rating_source: Option<String>,
    played_at: Option<String>,
    p1_team: Vec<String>,
    p2_team: Vec<String>,
    winner_side: Option<u8>,
}

/// Parse a replay dump (JSON array) into match records.
///
/// Entries missing their required fields, or with no team data at all,
/// are skipped; `default_format` fills in records that predate per-entry
/// format tagging.
pub fn parse_replay_dump(json: &str, default_format: &str) -> Result<IngestReport> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;

    let mut report = IngestReport::default();
    for entry in entries {
        let raw: RawReplay = match serde_json::from_value(entry) {
            Ok(raw) => raw,
            Err(_) => {
                report.skipped += 1;
                continue;
            }
        };

        let team_a = normalize_team(&raw.p1_team);
        let team_b = normalize_team(&raw.p2_team);
        if raw.replay_id.is_empty() || (team_a.is_empty() && team_b.is_empty()) {
            report.skipped += 1;
            continue;
        }

        report.records.push(MatchRecord {
            replay_id: raw.replay_id,
            format_id: raw
                .format_id
                .unwrap_or_else(|| default_format.to_string()),
            rating: raw.rating_estimate,
            rating_source: raw
                .rating_source
                .as_deref()
                .map(RatingSource::from_code)
                .unwrap_or(RatingSource::Unknown),
            played_at: raw.played_at.as_deref().and_then(parse_timestamp),
            team_a,
            team_b,
            winner: match raw.winner_side {
                Some(1) => Some(Side::A),
                Some(2) => Some(Side::B),
                _ => None,
            },
        });
    }

    Ok(report)
}

/// Normalize, deduplicate and cap a raw team list
pub fn normalize_team(names: &[String]) -> Vec<Slug> {
    let mut team = Vec::with_capacity(MAX_TEAM_SIZE);
    for name in names {
        let slug = normalize(name);
        if slug.is_empty() || team.contains(&slug) {
            continue;
        }
        team.push(slug);
        if team.len() == MAX_TEAM_SIZE {
            break;
        }
    }
    team
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    // Pipeline exports vary between space- and T-separated timestamps
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Extract a player's team from a Showdown battle log.
///
/// Team preview lines look like `|poke|p1|Flutter Mane, L50, F|item`; the
/// name segment before the first comma is the identity.
pub fn team_from_log(log: &str, player: u8) -> Vec<Slug> {
    let prefix = format!("|poke|p{}|", player);
    let names: Vec<String> = log
        .lines()
        .filter_map(|line| line.strip_prefix(prefix.as_str()))
        .filter_map(|rest| rest.split('|').next())
        .map(|name| name.to_string())
        .collect();
    normalize_team(&names)
}

/// Extract the winner side from a Showdown battle log.
///
/// The `|win|NAME` line names the winning player; the `|player|pN|NAME|`
/// lines map that name back to a side. No win line means unknown winner,
/// never a guess.
pub fn winner_from_log(log: &str) -> Option<Side> {
    let winner_name = log
        .lines()
        .find_map(|line| line.strip_prefix("|win|"))?
        .trim();

    for line in log.lines() {
        if let Some(rest) = line.strip_prefix("|player|p1|") {
            if rest.split('|').next() == Some(winner_name) {
                return Some(Side::A);
            }
        }
        if let Some(rest) = line.strip_prefix("|player|p2|") {
            if rest.split('|').next() == Some(winner_name) {
                return Some(Side::B);
            }
        }
    }
    None
}

/// Smogon "chaos" usage file
#[derive(Debug, Deserialize)]
struct ChaosFile {
    info: ChaosInfo,
    data: HashMap<String, ChaosEntity>,
}

#[derive(Debug, Deserialize)]
struct ChaosInfo {
    #[serde(rename = "number of battles")]
    number_of_battles: f64,
}

#[derive(Debug, Deserialize)]
struct ChaosEntity {
    #[serde(rename = "Usage")]
    usage: f64,
    #[serde(rename = "Moves", default)]
    moves: HashMap<String, f64>,
    #[serde(rename = "Items", default)]
    items: HashMap<String, f64>,
    #[serde(rename = "Abilities", default)]
    abilities: HashMap<String, f64>,
    #[serde(rename = "Tera Types", default)]
    tera: HashMap<String, f64>,
    #[serde(rename = "Spreads", default)]
    spreads: HashMap<String, f64>,
}

/// Parse a provider chaos JSON file into a usage snapshot.
///
/// Entity names are normalized on entry; raw names that collapse to the
/// same slug (verbose form suffixes) have their fractions and counts
/// merged. The provider's weighted counts are rounded to integers.
pub fn parse_usage_snapshot(json: &str) -> Result<UsageSnapshot> {
    let chaos: ChaosFile = serde_json::from_str(json)?;

    let mut snapshot = UsageSnapshot {
        total_samples: chaos.info.number_of_battles.round() as u64,
        entities: HashMap::new(),
    };

    for (name, data) in chaos.data {
        let slug = normalize(&name);
        if slug.is_empty() {
            continue;
        }
        let entity = snapshot.entities.entry(slug).or_default();
        entity.fraction += data.usage;
        merge_counts(&mut entity.moves, data.moves);
        merge_counts(&mut entity.items, data.items);
        merge_counts(&mut entity.abilities, data.abilities);
        merge_counts(&mut entity.tera, data.tera);
        merge_counts(&mut entity.spreads, data.spreads);
    }

    Ok(snapshot)
}

fn merge_counts(into: &mut HashMap<String, u64>, from: HashMap<String, f64>) {
    for (key, weight) in from {
        let rounded = weight.round();
        if rounded <= 0.0 {
            continue;
        }
        *into.entry(key).or_default() += rounded as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_replay_dump_skips_malformed() {
        let json = r#"[
            {
                "replay_id": "gen9vgc2026regf-100",
                "format_id": "reg-f",
                "rating_estimate": 1801,
                "rating_source": "official",
                "played_at": "2026-01-15 12:30:00",
                "p1_team": ["Incineroar", "Flutter Mane"],
                "p2_team": ["Rillaboom"],
                "winner_side": 2
            },
            { "not_a_replay": true },
            {
                "replay_id": "gen9vgc2026regf-101",
                "p1_team": [],
                "p2_team": []
            }
        ]"#;

        let report = parse_replay_dump(json, "reg-f").unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.skipped, 2);

        let m = &report.records[0];
        assert_eq!(m.format_id, "reg-f");
        assert_eq!(m.rating, Some(1801));
        assert_eq!(m.rating_source, RatingSource::Official);
        assert_eq!(m.winner, Some(Side::B));
        assert_eq!(m.team_a[1].as_str(), "flutter-mane");
        assert!(m.played_at.is_some());
    }

    #[test]
    fn test_parse_replay_dump_rejects_non_array() {
        assert!(parse_replay_dump("{\"oops\": 1}", "reg-f").is_err());
    }

    #[test]
    fn test_normalize_team_dedups_and_caps() {
        let names: Vec<String> = [
            "Incineroar",
            "Incineroar", // duplicate
            "Flutter Mane",
            "Rillaboom",
            "Pelipper",
            "Amoonguss",
            "Urshifu-Rapid-Strike-Style",
            "Dragonite", // over the cap
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let team = normalize_team(&names);
        assert_eq!(team.len(), MAX_TEAM_SIZE);
        assert_eq!(team[0].as_str(), "incineroar");
        assert_eq!(team[5].as_str(), "urshifu-rapid-strike");
    }

    #[test]
    fn test_team_and_winner_from_log() {
        let log = "\
|player|p1|TrainerRed|1
|player|p2|TrainerBlue|2
|poke|p1|Incineroar, M|item
|poke|p1|Flutter Mane, L50|item
|poke|p2|Rillaboom, F|
|teampreview
|win|TrainerBlue";

        let p1 = team_from_log(log, 1);
        assert_eq!(p1.len(), 2);
        assert_eq!(p1[0].as_str(), "incineroar");
        assert_eq!(p1[1].as_str(), "flutter-mane");

        let p2 = team_from_log(log, 2);
        assert_eq!(p2[0].as_str(), "rillaboom");

        assert_eq!(winner_from_log(log), Some(Side::B));
    }

    #[test]
    fn test_winner_unknown_without_win_line() {
        let log = "|player|p1|Red|1\n|player|p2|Blue|2\n|poke|p1|Pikachu|";
        assert_eq!(winner_from_log(log), None);
    }

    #[test]
    fn test_parse_usage_snapshot() {
        let json = r#"{
            "info": { "number of battles": 1000.0 },
            "data": {
                "Flutter Mane": {
                    "Usage": 0.4973,
                    "Moves": { "moonblast": 800.2, "protect": 600.0 },
                    "Items": { "booster-energy": 900.0 },
                    "Abilities": { "protosynthesis": 994.0 },
                    "Tera Types": { "fairy": 500.0 },
                    "Spreads": { "timid:0/0/0/252/4/252": 300.0 }
                },
                "Landorus-Therian-Forme": {
                    "Usage": 0.25
                }
            }
        }"#;

        let snapshot = parse_usage_snapshot(json).unwrap();
        assert_eq!(snapshot.total_samples, 1000);

        let flutter = &snapshot.entities[&normalize("flutter-mane")];
        assert_eq!(flutter.fraction, 0.4973);
        assert_eq!(flutter.moves["moonblast"], 800);

        // Verbose form name collapses through the normalizer
        assert!(snapshot
            .entities
            .contains_key(&normalize("landorus-therian")));
    }
}
