//! Run orchestration
//!
//! Wires the storage layer to the aggregators: snapshot the corpus once,
//! filter it, run the three aggregators over the same immutable view and
//! store the derived records in one transaction.

use crate::aggregate::{
    aggregate_counters, aggregate_pairs, aggregate_usage, aggregate_usage_snapshot, CorpusFilter,
    RunKey,
};
use crate::aggregate::usage::UsageSnapshot;
use crate::data::Database;
use crate::{EngineConfig, MatchRecord, Result, Slug, UsageRecord};

/// Row counts produced by one aggregation run
#[derive(Debug, Default, Clone, Copy)]
pub struct RunReport {
    pub eligible_matches: u64,
    pub usage_rows: usize,
    pub pair_rows: usize,
    pub counter_rows: usize,
}

/// One run's worth of aggregation against a database
pub struct Engine<'a> {
    db: &'a Database,
    config: EngineConfig,
    key: RunKey,
}

impl<'a> Engine<'a> {
    pub fn new(db: &'a Database, config: EngineConfig) -> Self {
        let key = RunKey::from_config(&config);
        Engine { db, config, key }
    }

    pub fn key(&self) -> &RunKey {
        &self.key
    }

    /// Read and filter the corpus for this run.
    ///
    /// One read per run; every aggregator works off the returned vector so
    /// concurrent ingestion cannot shift their view mid-run.
    pub fn corpus(&self) -> Result<Vec<MatchRecord>> {
        let matches = self.db.get_matches(&self.config.format_id)?;
        let total = matches.len();
        let filter = CorpusFilter::from_config(&self.config)?;
        let eligible = filter.apply(matches);
        log::debug!(
            "corpus: {} of {} matches eligible for {}",
            eligible.len(),
            total,
            self.config.format_id
        );
        Ok(eligible)
    }

    /// Usage from raw match teams, stored under this run's key
    pub fn run_usage(&self) -> Result<RunReport> {
        let corpus = self.corpus()?;
        let records = aggregate_usage(&corpus, corpus.len() as u64, &self.key);
        self.db.store_run(&records, &[], &[])?;
        Ok(RunReport {
            eligible_matches: corpus.len() as u64,
            usage_rows: records.len(),
            ..Default::default()
        })
    }

    /// Usage from a provider snapshot, stored under this run's key.
    ///
    /// Snapshot-derived rows replace raw-derived rows for the same slugs,
    /// since both live under the same natural key.
    pub fn run_usage_snapshot(&self, snapshot: &UsageSnapshot) -> Result<RunReport> {
        let records = aggregate_usage_snapshot(
            snapshot,
            &self.key,
            self.config.top_k,
            self.config.top_k_spreads,
        );
        self.db.store_run(&records, &[], &[])?;
        Ok(RunReport {
            usage_rows: records.len(),
            ..Default::default()
        })
    }

    /// Pair synergy, stored under this run's key
    pub fn run_pairs(&self) -> Result<RunReport> {
        let corpus = self.corpus()?;
        let records = aggregate_pairs(
            &corpus,
            &self.key,
            self.config.pair_min_sample,
            self.config.top_k,
        );
        self.db.store_run(&[], &records, &[])?;
        Ok(RunReport {
            eligible_matches: corpus.len() as u64,
            pair_rows: records.len(),
            ..Default::default()
        })
    }

    /// Counter effectiveness for the given targets, or for targets drawn
    /// from stored usage when none are given
    pub fn run_counters(&self, targets: Option<Vec<Slug>>) -> Result<RunReport> {
        let targets = match targets {
            Some(targets) => targets,
            None => self.stored_targets()?,
        };
        let corpus = self.corpus()?;
        let records = aggregate_counters(
            &corpus,
            &targets,
            &self.key,
            self.config.counter_min_sample,
            self.config.counter_top_n,
        );
        self.db.store_run(&[], &[], &records)?;
        Ok(RunReport {
            eligible_matches: corpus.len() as u64,
            counter_rows: records.len(),
            ..Default::default()
        })
    }

    /// Full pipeline over one corpus snapshot.
    ///
    /// Counter targets come from the usage results computed in this same
    /// run, not from previously stored rows, so a full run is
    /// self-contained. All derived rows land in a single transaction.
    pub fn run_all(&self) -> Result<RunReport> {
        let corpus = self.corpus()?;

        let usage = aggregate_usage(&corpus, corpus.len() as u64, &self.key);
        let pairs = aggregate_pairs(
            &corpus,
            &self.key,
            self.config.pair_min_sample,
            self.config.top_k,
        );
        let targets = self.targets_from_usage(&usage);
        let counters = aggregate_counters(
            &corpus,
            &targets,
            &self.key,
            self.config.counter_min_sample,
            self.config.counter_top_n,
        );

        self.db.store_run(&usage, &pairs, &counters)?;
        log::info!(
            "run {}/{} (cutoff {}): {} usage, {} pair, {} counter rows",
            self.key.format_id,
            self.key.time_bucket,
            self.key.cutoff,
            usage.len(),
            pairs.len(),
            counters.len()
        );
        Ok(RunReport {
            eligible_matches: corpus.len() as u64,
            usage_rows: usage.len(),
            pair_rows: pairs.len(),
            counter_rows: counters.len(),
        })
    }

    /// Counter targets from freshly computed usage records (already in rank
    /// order)
    fn targets_from_usage(&self, usage: &[UsageRecord]) -> Vec<Slug> {
        usage
            .iter()
            .filter(|r| r.usage_rate >= self.config.counter_min_usage)
            .take(self.config.counter_max_targets)
            .map(|r| r.slug.clone())
            .collect()
    }

    /// Counter targets from the stored usage table under this run's key
    fn stored_targets(&self) -> Result<Vec<Slug>> {
        self.db.top_usage_slugs(
            &self.key.format_id,
            &self.key.time_bucket,
            self.key.cutoff,
            self.config.counter_min_usage,
            self.config.counter_max_targets,
        )
    }
}
