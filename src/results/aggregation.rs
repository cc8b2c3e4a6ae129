use super::{
    allocation, NationalListResult, NationalResult, ProvincialListResult, ProvincialResult,
    QueryResult, ResultError,
};
use crate::config::SeatsTable;
use crate::database::ElectionDatabase;
use crate::model::election::Office;
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// Computes provincial and national result views from the store. Read-only;
/// callers front it with the result cache.
pub struct AggregationEngine {
    db: ElectionDatabase,
    seats: SeatsTable,
}

impl AggregationEngine {
    pub fn new(db: ElectionDatabase, seats: SeatsTable) -> Self {
        Self { db, seats }
    }

    /// Per-list sums for one province. Lower-chamber queries also carry the
    /// D'Hondt seat distribution for the province's configured budget.
    pub async fn provincial_result(
        &self,
        province_id: i64,
        office: Office,
    ) -> QueryResult<ProvincialResult> {
        let province = self
            .db
            .find_province(province_id)
            .await?
            .ok_or(ResultError::ProvinceNotFound(province_id))?;

        let rows = self.db.sum_votes_by_list(Some(province_id), office).await?;
        let total_valid_votes: i64 = rows.iter().map(|r| r.total_votes).sum();

        // The query's votes-descending order doubles as the allocator's
        // deterministic iteration order.
        let seat_counts: Option<HashMap<i64, u32>> = match office {
            Office::LowerChamber => {
                let budget = self.seats.seats_for(&province.code);
                let pairs: Vec<(i64, i64)> =
                    rows.iter().map(|r| (r.list_id, r.total_votes)).collect();
                Some(allocation::allocate(&pairs, budget, 0.0))
            }
            Office::UpperChamber => None,
        };

        let list_results = rows
            .into_iter()
            .map(|row| ProvincialListResult {
                list_id: row.list_id,
                name: row.list_name,
                alliance: row.alliance,
                votes: row.total_votes,
                percentage: percentage(row.total_votes, total_valid_votes),
                seats: seat_counts
                    .as_ref()
                    .map(|counts| counts.get(&row.list_id).copied().unwrap_or(0)),
            })
            .collect();

        debug!(province_id, %office, total_valid_votes, "provincial result computed");
        Ok(ProvincialResult {
            province_id,
            office,
            list_results,
            total_valid_votes,
        })
    }

    /// Country-wide sums, merging lists that share a name and alliance across
    /// provinces into a single row. No seat allocation at this level.
    pub async fn national_result(&self, office: Office) -> QueryResult<NationalResult> {
        let rows = self.db.sum_votes_by_list(None, office).await?;

        let mut merged: Vec<(String, Option<String>, i64)> = Vec::new();
        let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();
        for row in rows {
            let key = (row.list_name.clone(), row.alliance.clone());
            match index.get(&key) {
                Some(&i) => merged[i].2 += row.total_votes,
                None => {
                    index.insert(key, merged.len());
                    merged.push((row.list_name, row.alliance, row.total_votes));
                }
            }
        }

        let total_valid_votes: i64 = merged.iter().map(|(_, _, v)| *v).sum();
        let list_results: Vec<NationalListResult> = merged
            .into_iter()
            .enumerate()
            .sorted_by_key(|(first_seen, (_, _, votes))| (std::cmp::Reverse(*votes), *first_seen))
            .map(|(_, (name, alliance, votes))| NationalListResult {
                name,
                alliance,
                votes,
                percentage: percentage(votes, total_valid_votes),
            })
            .collect();

        debug!(%office, total_valid_votes, "national result computed");
        Ok(NationalResult {
            office,
            list_results,
            total_valid_votes,
        })
    }
}

/// Share of the valid vote, rounded to two decimals; 0.0 on an empty total.
fn percentage(votes: i64, total_valid_votes: i64) -> f64 {
    if total_valid_votes == 0 {
        return 0.0;
    }
    (votes as f64 / total_valid_votes as f64 * 100.0 * 100.0).round() / 100.0
}
