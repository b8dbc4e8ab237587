use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use cloudscope::config::Settings;
use cloudscope::database::connection::{establish_connection, get_database_url};
use cloudscope::database::{migrations::Migrator, sample_data};
use cloudscope::model::{Provider, ScanType};
use cloudscope::server::{self, MigrateDirection};
use cloudscope::services::ScanService;
use sea_orm_migration::MigratorTrait;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API with the background scan scheduler.
    Serve {
        #[clap(short, long)]
        port: Option<u16>,
        #[clap(short, long)]
        database: Option<String>,
        #[clap(long)]
        cors_origin: Option<String>,
    },
    /// Run one scan of the configured providers and print the outcome.
    Scan {
        /// Comma-delimited provider subset, e.g. "aws,gcp". Defaults to
        /// every provider with credentials in the environment.
        #[clap(short, long, value_delimiter = ',')]
        providers: Vec<String>,
        #[clap(short, long)]
        database: Option<String>,
    },
    /// Load the labeled demo fleet into the database.
    SampleData {
        #[clap(short, long)]
        database: Option<String>,
    },
    Db {
        #[clap(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    Migrate {
        #[clap(subcommand)]
        direction: MigrateDirection,
        #[clap(short, long)]
        database: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    let mut settings = Settings::from_env()?;

    match args.command {
        Commands::Serve {
            port,
            database,
            cors_origin,
        } => {
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(database) = database {
                settings.database_url = get_database_url(Some(&database));
            }
            if cors_origin.is_some() {
                settings.cors_origin = cors_origin;
            }
            info!("Starting server on port {}", settings.port);
            server::start_server(settings).await?;
        }
        Commands::Scan {
            providers,
            database,
        } => {
            if let Some(database) = database {
                settings.database_url = get_database_url(Some(&database));
            }
            let providers = if providers.is_empty() {
                settings.configured_providers()
            } else {
                providers
                    .iter()
                    .map(|name| name.parse::<Provider>().map_err(anyhow::Error::msg))
                    .collect::<Result<Vec<_>>>()?
            };

            let adapters = providers
                .iter()
                .map(|provider| settings.adapter_for(*provider))
                .collect::<Result<Vec<_>, _>>()?;

            let db = establish_connection(&settings.database_url).await?;
            Migrator::up(&db, None).await?;

            let scans = ScanService::new(db);
            let outcome = scans.scan_all(adapters, ScanType::OnDemand).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::SampleData { database } => {
            if let Some(database) = database {
                settings.database_url = get_database_url(Some(&database));
            }
            let db = establish_connection(&settings.database_url).await?;
            Migrator::up(&db, None).await?;
            let loaded = sample_data::load_sample_data(&db).await?;
            info!("Loaded {loaded} sample assets");
        }
        Commands::Db { command } => match command {
            DbCommands::Migrate {
                direction,
                database,
            } => {
                if let Some(database) = database {
                    settings.database_url = get_database_url(Some(&database));
                }
                info!("Running database migration: {:?}", direction);
                server::migrate_database(&settings.database_url, direction).await?;
            }
        },
    }

    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sqlx=warn,{}", log_level)))
        .init();
}
