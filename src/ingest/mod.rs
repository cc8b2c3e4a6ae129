pub mod import;

use crate::database::ElectionDatabase;
use crate::model::election::TallyInput;
use crate::results::ResultsService;
use crate::validation::{Result, ValidationError, VoteSumGuard};
use std::sync::Arc;
use tracing::info;

/// Orchestrates the single-record write path: validation, the transactional
/// commit, then cache invalidation as an explicit post-commit step.
pub struct TallyWriter {
    db: ElectionDatabase,
    guard: VoteSumGuard,
    results: Arc<ResultsService>,
}

impl TallyWriter {
    pub fn new(db: ElectionDatabase, results: Arc<ResultsService>) -> Self {
        let guard = VoteSumGuard::new(db.clone());
        Self { db, guard, results }
    }

    /// Validate a proposed tally and persist it. With `exclude_tally_id` the
    /// write replaces that tally (an update); without it a new tally is
    /// created and a station that already has one is rejected.
    pub async fn validate_and_persist(
        &self,
        station_id: i64,
        tally: &TallyInput,
        exclude_tally_id: Option<i64>,
    ) -> Result<i64> {
        self.guard.check_non_negative(tally)?;

        let station = self
            .db
            .find_station(station_id)
            .await?
            .ok_or(ValidationError::StationNotFound(station_id))?;

        self.guard
            .check_sum_within_capacity(&station, tally, exclude_tally_id)
            .await?;

        let tally_id = match exclude_tally_id {
            Some(tally_id) => {
                // The excluded tally must be this station's own; the capacity
                // check above ran against this station, so writing anywhere
                // else would bypass it.
                let existing = self
                    .db
                    .find_tally_for_station(station_id)
                    .await?
                    .ok_or_else(|| ValidationError::TallyNotFound(station.code.clone()))?;
                if existing.id != tally_id {
                    return Err(ValidationError::TallyNotFound(station.code.clone()));
                }
                self.db.replace_tally_lines(tally_id, tally).await?;
                tally_id
            }
            None => {
                if self.db.find_tally_for_station(station_id).await?.is_some() {
                    return Err(ValidationError::DuplicateTally(station.code));
                }
                self.db.create_tally_with_lines(station_id, tally).await?
            }
        };

        self.results.invalidate_national();
        info!(station = %station.code, tally_id, "tally persisted");
        Ok(tally_id)
    }

    /// Retract a station's tally. Deletes only ever reduce sums, so no
    /// capacity check runs.
    pub async fn delete_tally(&self, station_id: i64) -> Result<()> {
        let station = self
            .db
            .find_station(station_id)
            .await?
            .ok_or(ValidationError::StationNotFound(station_id))?;
        let tally = self
            .db
            .find_tally_for_station(station_id)
            .await?
            .ok_or_else(|| ValidationError::TallyNotFound(station.code.clone()))?;

        self.db.delete_tally(tally.id).await?;
        self.results.invalidate_national();
        info!(station = %station.code, tally_id = tally.id, "tally deleted");
        Ok(())
    }
}
