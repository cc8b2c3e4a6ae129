use crate::database::DatabaseError;
use crate::model::election::{InvalidOffice, Office};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod aggregation;
pub mod allocation;
pub mod cache;

use aggregation::AggregationEngine;
use cache::TtlCache;

#[derive(Debug, thiserror::Error)]
pub enum ResultError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    InvalidOffice(#[from] InvalidOffice),
    #[error("province {0} not found")]
    ProvinceNotFound(i64),
}

pub type QueryResult<T> = std::result::Result<T, ResultError>;

/// One list's share of a provincial result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvincialListResult {
    #[serde(rename = "listId")]
    pub list_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance: Option<String>,
    pub votes: i64,
    pub percentage: f64,
    /// Present for lower-chamber results only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvincialResult {
    #[serde(rename = "provinceId")]
    pub province_id: i64,
    pub office: Office,
    #[serde(rename = "listResults")]
    pub list_results: Vec<ProvincialListResult>,
    #[serde(rename = "totalValidVotes")]
    pub total_valid_votes: i64,
}

/// One merged (name, alliance) row of the national result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NationalListResult {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance: Option<String>,
    pub votes: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NationalResult {
    pub office: Office,
    #[serde(rename = "listResults")]
    pub list_results: Vec<NationalListResult>,
    #[serde(rename = "totalValidVotes")]
    pub total_valid_votes: i64,
}

/// How long aggregate results may be served from cache.
pub const RESULT_TTL: Duration = Duration::from_secs(600);

/// Cache-aside front for the aggregation engine. National entries are
/// evicted on every tally mutation; provincial entries ride out their TTL,
/// so provincial views may lag a write by up to [`RESULT_TTL`].
pub struct ResultsService {
    engine: AggregationEngine,
    provincial_cache: TtlCache<(i64, Office), ProvincialResult>,
    national_cache: TtlCache<Office, NationalResult>,
}

impl ResultsService {
    pub fn new(engine: AggregationEngine) -> Self {
        Self::with_ttl(engine, RESULT_TTL)
    }

    pub fn with_ttl(engine: AggregationEngine, ttl: Duration) -> Self {
        Self {
            engine,
            provincial_cache: TtlCache::new(ttl),
            national_cache: TtlCache::new(ttl),
        }
    }

    pub async fn provincial(
        &self,
        province_id: i64,
        office: Office,
    ) -> QueryResult<ProvincialResult> {
        self.provincial_cache
            .get_or_compute((province_id, office), || {
                self.engine.provincial_result(province_id, office)
            })
            .await
    }

    pub async fn national(&self, office: Office) -> QueryResult<NationalResult> {
        self.national_cache
            .get_or_compute(office, || self.engine.national_result(office))
            .await
    }

    /// Called by the write path after every successful tally mutation.
    pub fn invalidate_national(&self) {
        self.national_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeatsTable;
    use crate::database::ElectionDatabase;
    use crate::model::election::{TallyInput, VoteLineInput};

    fn tally(list_id: i64, lower: i64) -> TallyInput {
        TallyInput {
            blank_votes: 0,
            null_votes: 0,
            contested_votes: 0,
            operator: "op-test".to_string(),
            lines: vec![VoteLineInput {
                list_id,
                lower_votes: lower,
                upper_votes: 0,
            }],
        }
    }

    async fn service_fixture() -> (ResultsService, ElectionDatabase, i64, i64) {
        let db = ElectionDatabase::create_in_memory().await.unwrap();
        let province = db.insert_province("Buenos Aires", "BA").await.unwrap();
        let list = db
            .insert_list(province, "Lista A", Office::LowerChamber, None)
            .await
            .unwrap();
        let engine = AggregationEngine::new(db.clone(), SeatsTable::default());
        (ResultsService::new(engine), db, province, list)
    }

    #[tokio::test]
    async fn national_invalidation_recomputes_after_write() {
        let (service, db, province, list) = service_fixture().await;
        let s1 = db.insert_station(province, "0001", 1000).await.unwrap();
        let s2 = db.insert_station(province, "0002", 1000).await.unwrap();

        db.create_tally_with_lines(s1, &tally(list, 100)).await.unwrap();
        let first = service.national(Office::LowerChamber).await.unwrap();
        assert_eq!(first.total_valid_votes, 100);

        db.create_tally_with_lines(s2, &tally(list, 50)).await.unwrap();
        // Still cached until the write path invalidates.
        let cached = service.national(Office::LowerChamber).await.unwrap();
        assert_eq!(cached.total_valid_votes, 100);

        service.invalidate_national();
        let fresh = service.national(Office::LowerChamber).await.unwrap();
        assert_eq!(fresh.total_valid_votes, 150);
    }

    #[tokio::test]
    async fn provincial_entries_stay_cached_across_invalidation() {
        let (service, db, province, list) = service_fixture().await;
        let s1 = db.insert_station(province, "0001", 1000).await.unwrap();
        let s2 = db.insert_station(province, "0002", 1000).await.unwrap();

        db.create_tally_with_lines(s1, &tally(list, 100)).await.unwrap();
        let first = service
            .provincial(province, Office::LowerChamber)
            .await
            .unwrap();
        assert_eq!(first.total_valid_votes, 100);

        db.create_tally_with_lines(s2, &tally(list, 50)).await.unwrap();
        service.invalidate_national();

        // Provincial views tolerate TTL staleness by design.
        let stale = service
            .provincial(province, Office::LowerChamber)
            .await
            .unwrap();
        assert_eq!(stale.total_valid_votes, 100);
    }

    #[tokio::test]
    async fn provincial_entries_expire_by_ttl() {
        let db = ElectionDatabase::create_in_memory().await.unwrap();
        let province = db.insert_province("Salta", "SA").await.unwrap();
        let list = db
            .insert_list(province, "Lista A", Office::LowerChamber, None)
            .await
            .unwrap();
        let s1 = db.insert_station(province, "0001", 1000).await.unwrap();
        let engine = AggregationEngine::new(db.clone(), SeatsTable::default());
        let service = ResultsService::with_ttl(engine, Duration::from_millis(0));

        let empty = service
            .provincial(province, Office::LowerChamber)
            .await
            .unwrap();
        assert_eq!(empty.total_valid_votes, 0);

        db.create_tally_with_lines(s1, &tally(list, 100)).await.unwrap();
        let fresh = service
            .provincial(province, Office::LowerChamber)
            .await
            .unwrap();
        assert_eq!(fresh.total_valid_votes, 100);
    }

    #[test]
    fn provincial_result_serializes_with_wire_field_names() {
        let result = ProvincialResult {
            province_id: 1,
            office: Office::LowerChamber,
            list_results: vec![ProvincialListResult {
                list_id: 7,
                name: "Lista A".to_string(),
                alliance: None,
                votes: 750,
                percentage: 75.0,
                seats: Some(2),
            }],
            total_valid_votes: 1000,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["provinceId"], 1);
        assert_eq!(json["office"], "DIPUTADOS");
        assert_eq!(json["totalValidVotes"], 1000);
        assert_eq!(json["listResults"][0]["listId"], 7);
        assert_eq!(json["listResults"][0]["seats"], 2);
        assert!(json["listResults"][0].get("alliance").is_none());
    }
}
