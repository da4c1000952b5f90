// HTTP request handlers for API endpoints

use crate::api::error::ApiError;
use crate::api::models::*;
use crate::database_ops::db::Db;
use crate::orchestrator::{import_batch, parse_batch};
use crate::schema::SchemaRegistry;
use actix_web::{web, HttpResponse};

/// Health check endpoint
pub async fn health_check(db: web::Data<Db>) -> HttpResponse {
    let db_status = if db.ping().await {
        "connected"
    } else {
        "disconnected"
    };

    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
    })
}

/// Import a JSON array of `{"<Type>": {...}}` records, stopping at the first failure
pub async fn import_objects(
    body: web::Bytes,
    db: web::Data<Db>,
    registry: web::Data<SchemaRegistry>,
) -> Result<HttpResponse, ApiError> {
    let records = parse_batch(&body)?;
    let summary = import_batch(&db, &registry, &records).await?;

    tracing::info!(
        records = summary.records,
        created = summary.created,
        updated = summary.updated,
        "import request completed"
    );

    Ok(HttpResponse::Ok().json(StatusResponse::success()))
}

/// List every row of a type
pub async fn list_objects(
    path: web::Path<String>,
    db: web::Data<Db>,
    registry: web::Data<SchemaRegistry>,
) -> Result<HttpResponse, ApiError> {
    let model_name = path.into_inner();
    let entity = registry
        .resolve(&model_name)
        .ok_or_else(|| ApiError::invalid_model(&model_name))?;

    let rows = db.list_all(entity).await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Detail of a single row, including its many-to-many id lists
pub async fn object_detail(
    path: web::Path<(String, i64)>,
    db: web::Data<Db>,
    registry: web::Data<SchemaRegistry>,
) -> Result<HttpResponse, ApiError> {
    let (model_name, pk) = path.into_inner();
    let entity = registry
        .resolve(&model_name)
        .ok_or_else(|| ApiError::invalid_model(&model_name))?;

    match db.get_by_id(entity, pk).await? {
        Some(row) => Ok(HttpResponse::Ok().json(row)),
        None => Err(ApiError::NotFound(format!(
            "{} with ID {} does not exist",
            entity.verbose_name, pk
        ))),
    }
}
