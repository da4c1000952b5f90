use anyhow::{anyhow, Context, Result};
use catalog_import::database_ops::db::Db;
use catalog_import::logging::{init_tracing, DEFAULT_FILTER};
use catalog_import::orchestrator::{import_batch, parse_batch};
use catalog_import::schema::SchemaRegistry;
use catalog_import::util::env;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog_cli", version, about = "Catalog import admin CLI")]
struct Cli {
    /// Optional override for the database URL
    #[arg(long, global = true)]
    db_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Create any missing catalog tables
    InitDb,
    /// Import a JSON file holding an array of `{"<Type>": {...}}` records
    Import {
        file: PathBuf,
    },
    /// Print every row of a type as JSON
    List {
        model_name: String,
    },
    /// Print one row of a type as JSON
    Show {
        model_name: String,
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    let _ = init_tracing(DEFAULT_FILTER);

    let cli = Cli::parse();
    let database_url = cli.db_url.clone().unwrap_or_else(env::db_url);
    let db = Db::connect(&database_url, env::env_parse("DB_MAX_CONNS", 5u32)).await?;
    let registry = SchemaRegistry::catalog();

    match cli.command {
        Commands::InitDb => {
            db.ensure_schema(&registry).await?;
        }
        Commands::Import { file } => {
            db.ensure_schema(&registry).await?;
            let body = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let records = parse_batch(&body)?;
            let summary = import_batch(&db, &registry, &records).await?;
            info!(
                file = %file.display(),
                records = summary.records,
                created = summary.created,
                updated = summary.updated,
                "import: completed"
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::List { model_name } => {
            let entity = registry
                .resolve(&model_name)
                .ok_or_else(|| anyhow!("Invalid model name: {model_name}"))?;
            let rows = db.list_all(entity).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::Show { model_name, id } => {
            let entity = registry
                .resolve(&model_name)
                .ok_or_else(|| anyhow!("Invalid model name: {model_name}"))?;
            let row = db
                .get_by_id(entity, id)
                .await?
                .ok_or_else(|| anyhow!("{} with ID {} does not exist", entity.verbose_name, id))?;
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
    }

    Ok(())
}
