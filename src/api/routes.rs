// API route configuration
//
// Paths are declared without trailing slashes; `middleware::normalize_path`
// trims them from incoming requests so `/import/` and `/import` both match.

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // Batch import
        .route("/import", web::post().to(handlers::import_objects))
        // Reads
        .route(
            "/detail/{model_name}",
            web::get().to(handlers::list_objects),
        )
        .route(
            "/detail/{model_name}/{pk}",
            web::get().to(handlers::object_detail),
        );
}
