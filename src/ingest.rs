use serde_json::Value;
use std::fmt;
use tracing::{error, info, warn};

use crate::error::{IngestError, Result};
use crate::fetch::{Fetcher, Transport};
use crate::parser::clean_record;
use crate::report::{Phase, Reporter};
use crate::store::{PlanetAction, Store, UpsertMode, UpsertOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    pub mode: UpsertMode,
}

/// Counts for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Raw records read from upstream
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Every record not written: invalid, conflicting, failed or left alone
    pub skipped: u64,
    pub invalid: u64,
    pub conflicts: u64,
    pub failed: u64,
    pub climates_created: u64,
    pub terrains_created: u64,
}

impl IngestSummary {
    fn record_outcome(&mut self, outcome: &UpsertOutcome) {
        match outcome.action {
            PlanetAction::Created => self.created += 1,
            PlanetAction::Updated => self.updated += 1,
            PlanetAction::Unchanged => self.unchanged += 1,
            PlanetAction::SkippedExisting => self.skipped += 1,
        }
        self.climates_created += outcome.climates_created as u64;
        self.terrains_created += outcome.terrains_created as u64;
    }

    fn record_error(&mut self, err: &IngestError) {
        self.skipped += 1;
        match err {
            IngestError::InvalidRecord { .. } => self.invalid += 1,
            IngestError::StorageConflict { .. } => self.conflicts += 1,
            _ => self.failed += 1,
        }
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "Created: {}", self.created)?;
        writeln!(f, "Updated: {}", self.updated)?;
        writeln!(f, "Unchanged: {}", self.unchanged)?;
        writeln!(
            f,
            "Skipped: {} (invalid: {}, conflicts: {}, failed: {})",
            self.skipped, self.invalid, self.conflicts, self.failed
        )?;
        writeln!(f, "Total processed: {}", self.fetched)?;
        write!(
            f,
            "New climates: {}, new terrains: {}",
            self.climates_created, self.terrains_created
        )
    }
}

/// Run one ingestion pass: fetch, clean and upsert every record in turn.
///
/// A bad record is logged and counted, then the run moves on. Only a fetch
/// failure ends the run early; records already written stay committed.
pub fn run_ingest<T: Transport>(
    fetcher: &Fetcher<T>,
    store: &mut Store,
    options: &IngestOptions,
    reporter: &mut impl Reporter,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    reporter.set_phase(Phase::Fetching);

    for item in fetcher.records() {
        let raw = match item {
            Ok(raw) => raw,
            Err(e) => {
                error!(
                    kind = e.kind(),
                    error = %e,
                    processed = summary.fetched,
                    "aborting ingestion"
                );
                reporter.set_phase(Phase::Complete);
                return Err(e);
            }
        };

        if summary.fetched == 0 {
            reporter.set_phase(Phase::Ingesting);
        }
        summary.fetched += 1;

        let raw_name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();

        match clean_record(&raw).and_then(|record| store.upsert_planet(&record, options.mode)) {
            Ok(outcome) => {
                info!(planet = %outcome.planet.name, action = ?outcome.action, "processed record");
                reporter.set_progress(
                    summary.fetched,
                    format!("{}: {}", action_label(outcome.action), outcome.planet.name),
                );
                summary.record_outcome(&outcome);
            }
            Err(e) => {
                warn!(name = %raw_name, kind = e.kind(), error = %e, "skipping record");
                reporter.log(format!("Skipped {:?}: {}", raw_name, e));
                summary.record_error(&e);
            }
        }
    }

    reporter.set_phase(Phase::Complete);
    info!(
        fetched = summary.fetched,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "ingestion finished"
    );
    Ok(summary)
}

fn action_label(action: PlanetAction) -> &'static str {
    match action {
        PlanetAction::Created => "Created",
        PlanetAction::Updated => "Updated",
        PlanetAction::Unchanged => "Unchanged",
        PlanetAction::SkippedExisting => "Skipped",
    }
}
