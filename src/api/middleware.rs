// Middleware for logging, compression, path normalization and CORS

use actix_web::middleware::{Compress, Logger, NormalizePath};

pub fn setup_middleware() -> (Logger, Compress) {
    let logger = Logger::default();
    let compress = Compress::default();
    (logger, compress)
}

/// Strip trailing slashes so `/detail/Product/5/` and `/detail/Product/5` route alike.
pub fn normalize_path() -> NormalizePath {
    NormalizePath::trim()
}

// CORS configuration
use actix_cors::Cors;
use actix_web::http::header;

pub fn setup_cors(allowed_origins: &str) -> Cors {
    let origins: Vec<&str> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .collect();

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600);

    for origin in origins {
        cors = cors.allowed_origin(origin);
    }

    cors
}
