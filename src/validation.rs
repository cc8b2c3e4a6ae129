use crate::database::{DatabaseError, ElectionDatabase, StationRow};
use crate::model::election::TallyInput;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("negative vote count in field '{0}'")]
    NegativeField(String),
    #[error("station {station_code}: total votes {total} exceed registered electors {capacity}")]
    CapacityExceeded {
        total: i64,
        capacity: i64,
        station_code: String,
    },
    #[error("station {0} not found")]
    StationNotFound(i64),
    #[error("station {0} has no matching tally")]
    TallyNotFound(String),
    #[error("tally has no vote lines")]
    NoVoteLines,
    #[error("station {0} already has a tally")]
    DuplicateTally(String),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Pre-commit checks for tally writes. Holds no state beyond the store it
/// reads persisted sums from.
pub struct VoteSumGuard {
    db: ElectionDatabase,
}

impl VoteSumGuard {
    pub fn new(db: ElectionDatabase) -> Self {
        Self { db }
    }

    /// Reject any negative count before the capacity check runs. A tally
    /// owns one or more vote lines, so an empty set is rejected here too.
    pub fn check_non_negative(&self, tally: &TallyInput) -> Result<()> {
        if tally.lines.is_empty() {
            return Err(ValidationError::NoVoteLines);
        }
        if tally.blank_votes < 0 {
            return Err(ValidationError::NegativeField("blankVotes".to_string()));
        }
        if tally.null_votes < 0 {
            return Err(ValidationError::NegativeField("nullVotes".to_string()));
        }
        if tally.contested_votes < 0 {
            return Err(ValidationError::NegativeField("contestedVotes".to_string()));
        }
        for line in &tally.lines {
            if line.lower_votes < 0 {
                return Err(ValidationError::NegativeField(format!(
                    "lowerChamberVotes[list {}]",
                    line.list_id
                )));
            }
            if line.upper_votes < 0 {
                return Err(ValidationError::NegativeField(format!(
                    "upperChamberVotes[list {}]",
                    line.list_id
                )));
            }
        }
        Ok(())
    }

    /// Verify the proposed tally plus everything already persisted for the
    /// station stays within its registered elector count. During an update
    /// the row being replaced is excluded so it cannot count against itself.
    pub async fn check_sum_within_capacity(
        &self,
        station: &StationRow,
        tally: &TallyInput,
        exclude_tally_id: Option<i64>,
    ) -> Result<()> {
        let persisted = self
            .db
            .sum_votes_for_station(station.id, exclude_tally_id)
            .await?;
        let total = persisted + tally.total_votes();

        if total > station.registered_electors {
            warn!(
                station = %station.code,
                total,
                capacity = station.registered_electors,
                "tally rejected: over capacity"
            );
            return Err(ValidationError::CapacityExceeded {
                total,
                capacity: station.registered_electors,
                station_code: station.code.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::election::{Office, VoteLineInput};

    fn tally(lines: Vec<(i64, i64)>, blank: i64, null: i64, contested: i64) -> TallyInput {
        TallyInput {
            blank_votes: blank,
            null_votes: null,
            contested_votes: contested,
            operator: "op-test".to_string(),
            lines: lines
                .into_iter()
                .map(|(list_id, lower)| VoteLineInput {
                    list_id,
                    lower_votes: lower,
                    upper_votes: 0,
                })
                .collect(),
        }
    }

    async fn setup() -> (ElectionDatabase, i64, i64) {
        let db = ElectionDatabase::create_in_memory().await.unwrap();
        let province = db.insert_province("Buenos Aires", "BA").await.unwrap();
        let list = db
            .insert_list(province, "Lista A", Office::LowerChamber, None)
            .await
            .unwrap();
        (db, province, list)
    }

    #[tokio::test]
    async fn rejects_negative_category_counts() {
        let (db, _, list) = setup().await;
        let guard = VoteSumGuard::new(db);

        let err = guard
            .check_non_negative(&tally(vec![(list, 10)], -1, 0, 0))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NegativeField(f) if f == "blankVotes"));

        let err = guard
            .check_non_negative(&tally(vec![(list, -5)], 0, 0, 0))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NegativeField(_)));
    }

    #[tokio::test]
    async fn over_capacity_tally_is_rejected_with_diagnostics() {
        let (db, province, list) = setup().await;
        let station_id = db.insert_station(province, "0001", 100).await.unwrap();
        let station = db.find_station(station_id).await.unwrap().unwrap();
        let guard = VoteSumGuard::new(db);

        // 80 + 50 + 10 + 5 + 2 = 147 against a capacity of 100
        let proposed = tally(vec![(list, 80), (list + 1, 50)], 10, 5, 2);
        let err = guard
            .check_sum_within_capacity(&station, &proposed, None)
            .await
            .unwrap_err();
        match err {
            ValidationError::CapacityExceeded {
                total,
                capacity,
                station_code,
            } => {
                assert_eq!(total, 147);
                assert_eq!(capacity, 100);
                assert_eq!(station_code, "0001");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn tally_without_vote_lines_is_rejected() {
        let (db, _, _) = setup().await;
        let guard = VoteSumGuard::new(db);

        let err = guard
            .check_non_negative(&tally(vec![], 10, 5, 2))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NoVoteLines));
    }

    #[tokio::test]
    async fn tally_at_exact_capacity_passes() {
        let (db, province, list) = setup().await;
        let station_id = db.insert_station(province, "0002", 100).await.unwrap();
        let station = db.find_station(station_id).await.unwrap().unwrap();
        let guard = VoteSumGuard::new(db);

        let proposed = tally(vec![(list, 90)], 5, 3, 2);
        guard
            .check_sum_within_capacity(&station, &proposed, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_exclusion_ignores_own_contribution() {
        let (db, province, list) = setup().await;
        let station_id = db.insert_station(province, "0003", 100).await.unwrap();
        let station = db.find_station(station_id).await.unwrap().unwrap();

        let existing = tally(vec![(list, 90)], 5, 0, 0);
        let tally_id = db
            .create_tally_with_lines(station_id, &existing)
            .await
            .unwrap();
        let guard = VoteSumGuard::new(db);

        // Re-submitting the same totals would double-count without the
        // exclusion and appear to reach 190.
        let replacement = tally(vec![(list, 90)], 5, 0, 0);
        guard
            .check_sum_within_capacity(&station, &replacement, Some(tally_id))
            .await
            .unwrap();

        let err = guard
            .check_sum_within_capacity(&station, &replacement, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::CapacityExceeded { .. }));
    }
}
