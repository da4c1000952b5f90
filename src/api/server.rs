// API server implementation using actix-web

use crate::api::{middleware, routes};
use crate::database_ops::db::Db;
use crate::schema::SchemaRegistry;
use crate::util::env::{env_opt, env_parse, init_env};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    /// Upper bound on an import request body.
    pub max_body_bytes: usize,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        init_env();

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = env_opt("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .context("Invalid API_PORT")?;

        let allowed_origins =
            env_opt("ALLOWED_ORIGINS").unwrap_or_else(|| "http://localhost:3000".to_string());

        let max_body_bytes = env_parse("IMPORT_MAX_BODY_BYTES", 16 * 1024 * 1024usize);

        Ok(Self {
            host,
            port,
            allowed_origins,
            max_body_bytes,
        })
    }

    /// Start the HTTP server
    pub async fn run(self, db: Db, registry: SchemaRegistry) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            "Starting catalog import API server"
        );

        let db_data = web::Data::new(db);
        let registry_data = web::Data::new(registry);
        let allowed_origins = self.allowed_origins.clone();
        let max_body_bytes = self.max_body_bytes;

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);

            App::new()
                .app_data(db_data.clone())
                .app_data(registry_data.clone())
                .app_data(web::PayloadConfig::new(max_body_bytes))
                .wrap(middleware::normalize_path())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
