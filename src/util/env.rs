//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

/// Fallback store when no database URL is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://catalog.db?mode=rwc";

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        // Load .env from the working directory; if missing, try the project root.
        if dotenv::dotenv().is_err() {
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Database URL: DATABASE_URL, then DB_URL, then the local SQLite file.
pub fn db_url() -> String {
    for k in ["DATABASE_URL", "DB_URL"] {
        if let Some(v) = env_opt(k) {
            return v;
        }
    }
    info!(target = "env", url = DEFAULT_DATABASE_URL, "no database URL set; using default");
    DEFAULT_DATABASE_URL.to_string()
}
