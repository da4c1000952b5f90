// HTTP API server binary for catalog imports

use anyhow::Result;
use catalog_import::api::ApiServer;
use catalog_import::database_ops::db::Db;
use catalog_import::logging::{init_tracing, DEFAULT_FILTER};
use catalog_import::schema::SchemaRegistry;
use catalog_import::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;

    tracing::info!("Initializing catalog import API server");

    // Load configuration from environment
    let server = ApiServer::from_env()?;

    let database_url = env_util::db_url();
    let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 5u32);
    let db = Db::connect(&database_url, max_connections).await?;

    // Built once, shared read-only by every worker
    let registry = SchemaRegistry::catalog();
    if env_util::env_flag("AUTO_SCHEMA", true) {
        db.ensure_schema(&registry).await?;
    } else {
        tracing::info!("AUTO_SCHEMA disabled; expecting tables to exist");
    }

    tracing::info!("Database connected successfully");

    server.run(db, registry).await?;

    Ok(())
}
