/// Batch tally import with sub-batch transactions and partial success.
use crate::database::{DatabaseError, ElectionDatabase};
use crate::model::election::TallyInput;
use crate::results::ResultsService;
use crate::validation::{ValidationError, VoteSumGuard};
use colored::*;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Batches above this size are split and committed in independent
/// transactions, so one bad sub-batch never rolls back the rest.
pub const SUB_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRecord {
    #[serde(rename = "stationCode")]
    pub station_code: String,
    #[serde(flatten)]
    pub tally: TallyInput,
}

#[derive(Debug, Serialize)]
pub struct ImportRecordError {
    #[serde(rename = "stationCode")]
    pub station_code: String,
    pub error: String,
}

/// Partial success is the normal outcome: bad records land in `errors`
/// while the rest import.
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: u64,
    pub errors: Vec<ImportRecordError>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "recordsPerSecond")]
    pub records_per_second: f64,
}

impl ImportSummary {
    pub fn print(&self) {
        println!("\n{}", "Import complete".bright_green().bold());
        println!(
            "{}: {}",
            "Imported".bright_white().bold(),
            self.imported.to_string().bright_green()
        );
        println!(
            "{}: {}",
            "Errors".bright_white().bold(),
            self.errors.len().to_string().bright_yellow()
        );
        for err in &self.errors {
            println!("  {} {}: {}", "✗".red(), err.station_code.cyan(), err.error);
        }
        println!(
            "{}: {} ms ({:.2} records/sec)",
            "Duration".bright_white().bold(),
            self.duration_ms,
            self.records_per_second
        );
    }
}

pub struct BatchImporter {
    db: ElectionDatabase,
    guard: VoteSumGuard,
    results: Arc<ResultsService>,
}

impl BatchImporter {
    pub fn new(db: ElectionDatabase, results: Arc<ResultsService>) -> Self {
        let guard = VoteSumGuard::new(db.clone());
        Self { db, guard, results }
    }

    /// Import a batch of parsed records. Each sub-batch is validated record
    /// by record, then committed as one transaction; the national cache is
    /// invalidated after every committed sub-batch.
    pub async fn import_records(
        &self,
        records: &[ImportRecord],
    ) -> Result<ImportSummary, DatabaseError> {
        let started = Instant::now();
        let mut imported = 0u64;
        let mut errors = Vec::new();
        let mut seen_stations: HashSet<String> = HashSet::new();

        for chunk in records.chunks(SUB_BATCH_SIZE) {
            let mut valid: Vec<(i64, &ImportRecord)> = Vec::new();

            for record in chunk {
                match self.validate_record(record, &mut seen_stations).await {
                    Ok(station_id) => valid.push((station_id, record)),
                    Err(e) => {
                        warn!(station = %record.station_code, error = %e, "import record rejected");
                        errors.push(ImportRecordError {
                            station_code: record.station_code.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            if valid.is_empty() {
                continue;
            }

            match self.commit_sub_batch(&valid).await {
                Ok(()) => {
                    imported += valid.len() as u64;
                    self.results.invalidate_national();
                }
                Err(e) => {
                    // Already-committed sub-batches stand; only this one rolls back.
                    warn!(records = valid.len(), error = %e, "sub-batch aborted");
                    for (_, record) in &valid {
                        errors.push(ImportRecordError {
                            station_code: record.station_code.clone(),
                            error: format!("sub-batch aborted: {}", e),
                        });
                    }
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let summary = ImportSummary {
            imported,
            errors,
            duration_ms,
            records_per_second: if duration_ms > 0 {
                (records.len() as f64 * 1000.0) / duration_ms as f64
            } else {
                0.0
            },
        };
        info!(
            imported = summary.imported,
            errors = summary.errors.len(),
            "batch import finished"
        );
        Ok(summary)
    }

    async fn validate_record(
        &self,
        record: &ImportRecord,
        seen_stations: &mut HashSet<String>,
    ) -> Result<i64, ValidationError> {
        if !seen_stations.insert(record.station_code.clone()) {
            return Err(ValidationError::DuplicateTally(record.station_code.clone()));
        }

        let mut seen_lists = HashSet::new();
        for line in &record.tally.lines {
            if !seen_lists.insert(line.list_id) {
                return Err(ValidationError::DuplicateTally(format!(
                    "{} (list {} repeated)",
                    record.station_code, line.list_id
                )));
            }
        }

        self.guard.check_non_negative(&record.tally)?;

        let station = self
            .db
            .find_station_by_code(&record.station_code)
            .await?
            .ok_or_else(|| {
                ValidationError::Database(DatabaseError::Integrity(format!(
                    "station {} not found",
                    record.station_code
                )))
            })?;

        // An already-tallied station is a hard per-record error, never an
        // implicit update.
        if self.db.find_tally_for_station(station.id).await?.is_some() {
            return Err(ValidationError::DuplicateTally(record.station_code.clone()));
        }

        self.guard
            .check_sum_within_capacity(&station, &record.tally, None)
            .await?;

        Ok(station.id)
    }

    async fn commit_sub_batch(&self, valid: &[(i64, &ImportRecord)]) -> Result<(), DatabaseError> {
        let mut tx = self.db.pool().begin().await?;
        for (station_id, record) in valid {
            ElectionDatabase::insert_tally_with_lines(&mut tx, *station_id, &record.tally).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
