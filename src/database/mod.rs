pub mod schema;

use crate::model::election::{Office, TallyInput};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Data integrity error: {0}")]
    Integrity(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Durable store for provinces, lists, stations and per-station tallies.
/// All aggregate reads and transactional tally writes go through here.
#[derive(Clone)]
pub struct ElectionDatabase {
    pool: SqlitePool,
}

impl ElectionDatabase {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// In-memory database with the schema applied; a single connection so
    /// every query sees the same memory store.
    pub async fn create_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        schema::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a province, returning its ID
    pub async fn insert_province(&self, name: &str, code: &str) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO provinces (name, code)
            VALUES (?, ?)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Insert an electoral list, returning its ID
    pub async fn insert_list(
        &self,
        province_id: i64,
        name: &str,
        office: Office,
        alliance: Option<&str>,
    ) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO lists (province_id, name, office, alliance)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(province_id)
        .bind(name)
        .bind(office.as_str())
        .bind(alliance)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Insert a polling station, returning its ID
    pub async fn insert_station(
        &self,
        province_id: i64,
        code: &str,
        registered_electors: i64,
    ) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO stations (province_id, code, registered_electors)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(province_id)
        .bind(code)
        .bind(registered_electors)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn find_province(&self, province_id: i64) -> Result<Option<ProvinceRow>> {
        let province = sqlx::query_as::<_, ProvinceRow>(
            r#"
            SELECT id, name, code
            FROM provinces
            WHERE id = ?
            "#,
        )
        .bind(province_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(province)
    }

    pub async fn list_all_provinces(&self) -> Result<Vec<ProvinceRow>> {
        let provinces = sqlx::query_as::<_, ProvinceRow>(
            r#"
            SELECT id, name, code
            FROM provinces
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(provinces)
    }

    pub async fn find_station(&self, station_id: i64) -> Result<Option<StationRow>> {
        let station = sqlx::query_as::<_, StationRow>(
            r#"
            SELECT id, province_id, code, registered_electors
            FROM stations
            WHERE id = ?
            "#,
        )
        .bind(station_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(station)
    }

    pub async fn find_station_by_code(&self, code: &str) -> Result<Option<StationRow>> {
        let station = sqlx::query_as::<_, StationRow>(
            r#"
            SELECT id, province_id, code, registered_electors
            FROM stations
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(station)
    }

    /// The station's current tally, if one has been entered.
    pub async fn find_tally_for_station(&self, station_id: i64) -> Result<Option<TallyRow>> {
        let tally = sqlx::query_as::<_, TallyRow>(
            r#"
            SELECT id, station_id, blank_votes, null_votes, contested_votes, operator, created_at
            FROM tallies
            WHERE station_id = ?
            "#,
        )
        .bind(station_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tally)
    }

    /// Sum the office's vote column grouped by list. With a province the sums
    /// cover that province's stations only; without one they span the whole
    /// country. Rows come back votes-descending, list id as the tie key, so
    /// downstream seat allocation sees a deterministic order.
    pub async fn sum_votes_by_list(
        &self,
        province_id: Option<i64>,
        office: Office,
    ) -> Result<Vec<ListVotesRow>> {
        let column = office.vote_column();

        let rows = match province_id {
            Some(province_id) => {
                let sql = format!(
                    "SELECT l.id AS list_id, l.name AS list_name, l.alliance AS alliance, \
                            COALESCE(SUM(tv.{column}), 0) AS total_votes \
                     FROM lists l \
                     JOIN tally_votes tv ON tv.list_id = l.id \
                     JOIN tallies t ON tv.tally_id = t.id \
                     JOIN stations s ON t.station_id = s.id \
                     WHERE l.office = ? AND s.province_id = ? \
                     GROUP BY l.id \
                     ORDER BY total_votes DESC, l.id ASC"
                );
                sqlx::query_as::<_, ListVotesRow>(&sql)
                    .bind(office.as_str())
                    .bind(province_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT l.id AS list_id, l.name AS list_name, l.alliance AS alliance, \
                            COALESCE(SUM(tv.{column}), 0) AS total_votes \
                     FROM lists l \
                     JOIN tally_votes tv ON tv.list_id = l.id \
                     JOIN tallies t ON tv.tally_id = t.id \
                     WHERE l.office = ? \
                     GROUP BY l.id \
                     ORDER BY total_votes DESC, l.id ASC"
                );
                sqlx::query_as::<_, ListVotesRow>(&sql)
                    .bind(office.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows)
    }

    /// Total persisted votes attributed to a station: every vote-line office
    /// field plus the blank/null/contested categories. `exclude_tally_id`
    /// leaves out the tally being replaced during an update.
    pub async fn sum_votes_for_station(
        &self,
        station_id: i64,
        exclude_tally_id: Option<i64>,
    ) -> Result<i64> {
        let categories: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(blank_votes + null_votes + contested_votes), 0)
            FROM tallies
            WHERE station_id = ? AND (? IS NULL OR id <> ?)
            "#,
        )
        .bind(station_id)
        .bind(exclude_tally_id)
        .bind(exclude_tally_id)
        .fetch_one(&self.pool)
        .await?;

        let lines: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(tv.lower_votes + tv.upper_votes), 0)
            FROM tally_votes tv
            JOIN tallies t ON tv.tally_id = t.id
            WHERE t.station_id = ? AND (? IS NULL OR t.id <> ?)
            "#,
        )
        .bind(station_id)
        .bind(exclude_tally_id)
        .bind(exclude_tally_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(categories + lines)
    }

    /// Create a tally and all its vote lines in one transaction.
    pub async fn create_tally_with_lines(
        &self,
        station_id: i64,
        tally: &TallyInput,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let tally_id = Self::insert_tally_with_lines(&mut tx, station_id, tally).await?;
        tx.commit().await?;
        debug!(station_id, tally_id, lines = tally.lines.len(), "tally created");
        Ok(tally_id)
    }

    /// Insert a tally and its lines on an open transaction. Batch import uses
    /// this to commit whole sub-batches together.
    pub async fn insert_tally_with_lines(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        station_id: i64,
        tally: &TallyInput,
    ) -> Result<i64> {
        let tally_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tallies (station_id, blank_votes, null_votes, contested_votes, operator)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(station_id)
        .bind(tally.blank_votes)
        .bind(tally.null_votes)
        .bind(tally.contested_votes)
        .bind(&tally.operator)
        .fetch_one(&mut **tx)
        .await?;

        for line in &tally.lines {
            sqlx::query(
                r#"
                INSERT INTO tally_votes (tally_id, list_id, lower_votes, upper_votes)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(tally_id)
            .bind(line.list_id)
            .bind(line.lower_votes)
            .bind(line.upper_votes)
            .execute(&mut **tx)
            .await?;
        }

        Ok(tally_id)
    }

    /// Replace a tally's counts and all its vote lines in one transaction.
    pub async fn replace_tally_lines(&self, tally_id: i64, tally: &TallyInput) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE tallies
            SET blank_votes = ?, null_votes = ?, contested_votes = ?, operator = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(tally.blank_votes)
        .bind(tally.null_votes)
        .bind(tally.contested_votes)
        .bind(&tally.operator)
        .bind(tally_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tally_votes WHERE tally_id = ?")
            .bind(tally_id)
            .execute(&mut *tx)
            .await?;

        for line in &tally.lines {
            sqlx::query(
                r#"
                INSERT INTO tally_votes (tally_id, list_id, lower_votes, upper_votes)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(tally_id)
            .bind(line.list_id)
            .bind(line.lower_votes)
            .bind(line.upper_votes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(tally_id, lines = tally.lines.len(), "tally replaced");
        Ok(())
    }

    /// Delete a tally and its vote lines together.
    pub async fn delete_tally(&self, tally_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tally_votes WHERE tally_id = ?")
            .bind(tally_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM tallies WHERE id = ?")
            .bind(tally_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(tally_id, "tally deleted");
        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProvinceRow {
    pub id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StationRow {
    pub id: i64,
    pub province_id: i64,
    pub code: String,
    pub registered_electors: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TallyRow {
    pub id: i64,
    pub station_id: i64,
    pub blank_votes: i64,
    pub null_votes: i64,
    pub contested_votes: i64,
    pub operator: String,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListVotesRow {
    pub list_id: i64,
    pub list_name: String,
    pub alliance: Option<String>,
    pub total_votes: i64,
}
