mod config;
mod database;
mod ingest;
mod model;
mod results;
mod validation;

use crate::config::SeatsTable;
use crate::database::{schema, ElectionDatabase};
use crate::ingest::import::{BatchImporter, ImportRecord};
use crate::ingest::TallyWriter;
use crate::model::election::{Office, TallyInput};
use crate::results::aggregation::AggregationEngine;
use crate::results::{ResultError, ResultsService};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Opts {
    /// SQLite database path
    #[clap(long, default_value = "escrutinio.db")]
    database: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema.
    Init,
    /// Register a province.
    AddProvince { name: String, code: String },
    /// List registered provinces.
    Provinces,
    /// Register an electoral list in a province.
    AddList {
        province_id: i64,
        name: String,
        /// DIPUTADOS or SENADORES
        office: String,
        #[clap(long)]
        alliance: Option<String>,
    },
    /// Register a polling station.
    AddStation {
        province_id: i64,
        code: String,
        registered_electors: i64,
    },
    /// Enter or correct one station's tally from a JSON file.
    Tally {
        station_id: i64,
        /// JSON file with the tally counts and vote lines
        input: PathBuf,
        /// Replace the station's existing tally instead of failing
        #[clap(long)]
        replace: bool,
    },
    /// Retract a station's tally.
    DeleteTally { station_id: i64 },
    /// Batch-import tallies from a JSON file (array of records).
    Import { input: PathBuf },
    /// Provincial results for one office.
    Provincial {
        province_id: i64,
        /// DIPUTADOS or SENADORES
        office: String,
        /// JSON seats table for lower-chamber allocation
        #[clap(long)]
        seats: Option<PathBuf>,
    },
    /// National results for one office.
    National {
        /// DIPUTADOS or SENADORES
        office: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    if let Err(e) = run(opts).await {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(opts: Opts) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database(&opts.database).await?;

    match opts.command {
        Command::Init => {
            schema::create_schema(db.pool()).await?;
            schema::verify_schema(db.pool()).await?;
            println!(
                "{} {}",
                "Database initialized:".bright_green(),
                opts.database.display()
            );
        }
        Command::AddProvince { name, code } => {
            let id = db.insert_province(&name, &code).await?;
            println!("Province {} registered with id {}", name.cyan(), id);
        }
        Command::Provinces => {
            for province in db.list_all_provinces().await? {
                println!("{:>4}  {}  {}", province.id, province.code.cyan(), province.name);
            }
        }
        Command::AddList {
            province_id,
            name,
            office,
            alliance,
        } => {
            let office = Office::parse(&office)?;
            let id = db
                .insert_list(province_id, &name, office, alliance.as_deref())
                .await?;
            println!("List {} ({}) registered with id {}", name.cyan(), office, id);
        }
        Command::AddStation {
            province_id,
            code,
            registered_electors,
        } => {
            let id = db
                .insert_station(province_id, &code, registered_electors)
                .await?;
            println!("Station {} registered with id {}", code.cyan(), id);
        }
        Command::Tally {
            station_id,
            input,
            replace,
        } => {
            let tally: TallyInput = serde_json::from_str(&std::fs::read_to_string(&input)?)?;
            let results = results_service(&db, SeatsTable::default());
            let writer = TallyWriter::new(db.clone(), results);

            let exclude = if replace {
                db.find_tally_for_station(station_id).await?.map(|t| t.id)
            } else {
                None
            };
            let tally_id = writer
                .validate_and_persist(station_id, &tally, exclude)
                .await?;
            println!(
                "{} tally {} for station {}",
                (if exclude.is_some() { "Replaced" } else { "Recorded" }).bright_green(),
                tally_id,
                station_id
            );
        }
        Command::DeleteTally { station_id } => {
            let results = results_service(&db, SeatsTable::default());
            let writer = TallyWriter::new(db.clone(), results);
            writer.delete_tally(station_id).await?;
            println!("{} tally for station {}", "Deleted".bright_green(), station_id);
        }
        Command::Import { input } => {
            let records: Vec<ImportRecord> =
                serde_json::from_str(&std::fs::read_to_string(&input)?)?;
            let results = results_service(&db, SeatsTable::default());
            let importer = BatchImporter::new(db.clone(), results);
            let summary = importer.import_records(&records).await?;
            summary.print();
        }
        Command::Provincial {
            province_id,
            office,
            seats,
        } => {
            let office = Office::parse(&office).map_err(ResultError::from)?;
            let seats_table = match seats {
                Some(path) => SeatsTable::from_file(&path)?,
                None => SeatsTable::default(),
            };
            let results = results_service(&db, seats_table);
            let result = results.provincial(province_id, office).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::National { office } => {
            let office = Office::parse(&office).map_err(ResultError::from)?;
            let results = results_service(&db, SeatsTable::default());
            let result = results.national(office).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn results_service(db: &ElectionDatabase, seats: SeatsTable) -> Arc<ResultsService> {
    let engine = AggregationEngine::new(db.clone(), seats);
    Arc::new(ResultsService::new(engine))
}

async fn open_database(path: &Path) -> Result<ElectionDatabase, Box<dyn std::error::Error>> {
    let database_url = format!("sqlite:{}?mode=rwc", path.display());
    Ok(ElectionDatabase::new(&database_url).await?)
}
