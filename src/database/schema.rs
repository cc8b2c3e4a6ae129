/// Database schema definitions and migration helpers
use crate::database::{DatabaseError, Result};
use sqlx::SqlitePool;

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Create provinces table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provinces (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT UNIQUE NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create lists table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lists (
            id INTEGER PRIMARY KEY,
            province_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            office TEXT NOT NULL CHECK (office IN ('DIPUTADOS', 'SENADORES')),
            alliance TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (province_id) REFERENCES provinces(id),
            UNIQUE(name, province_id, office)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create stations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stations (
            id INTEGER PRIMARY KEY,
            province_id INTEGER NOT NULL,
            code TEXT UNIQUE NOT NULL,
            registered_electors INTEGER NOT NULL CHECK (registered_electors > 0),
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (province_id) REFERENCES provinces(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create tallies table; one tally per station
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tallies (
            id INTEGER PRIMARY KEY,
            station_id INTEGER UNIQUE NOT NULL,
            blank_votes INTEGER NOT NULL,
            null_votes INTEGER NOT NULL,
            contested_votes INTEGER NOT NULL,
            operator TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (station_id) REFERENCES stations(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create tally_votes table; a list appears at most once per tally
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tally_votes (
            id INTEGER PRIMARY KEY,
            tally_id INTEGER NOT NULL,
            list_id INTEGER NOT NULL,
            lower_votes INTEGER NOT NULL,
            upper_votes INTEGER NOT NULL,
            FOREIGN KEY (tally_id) REFERENCES tallies(id),
            FOREIGN KEY (list_id) REFERENCES lists(id),
            UNIQUE(tally_id, list_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for performance
    create_indexes(pool).await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = vec![
        "CREATE INDEX IF NOT EXISTS idx_lists_province ON lists(province_id)",
        "CREATE INDEX IF NOT EXISTS idx_stations_province ON stations(province_id)",
        "CREATE INDEX IF NOT EXISTS idx_tallies_station ON tallies(station_id)",
        "CREATE INDEX IF NOT EXISTS idx_tally_votes_tally ON tally_votes(tally_id)",
        "CREATE INDEX IF NOT EXISTS idx_tally_votes_list ON tally_votes(list_id)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    Ok(())
}

/// Verify database schema integrity
pub async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    // Check that all expected tables exist
    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(pool)
            .await?;

    let expected_tables = vec!["lists", "provinces", "stations", "tallies", "tally_votes"];

    for expected in &expected_tables {
        if !tables.iter().any(|name| name == expected) {
            return Err(DatabaseError::Integrity(format!(
                "Missing table: {}",
                expected
            )));
        }
    }

    Ok(())
}
