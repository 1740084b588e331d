//! Configuration loader
//!
//! Loads [`QuerySettings`] from environment variables or a file.
//!
//! ## Environment Variables
//! Every variable is optional; unset ones keep the default.
//! - `FRESHET_STALE_TIME`: seconds before a record is stale
//! - `FRESHET_CACHE_TIME`: seconds of unobserved idleness before eviction
//! - `FRESHET_RETRY_MAX_ATTEMPTS`: fetch attempts per operation (0 = once)
//! - `FRESHET_RETRY_MAX_DELAY`: cap of the doubling backoff, in seconds
//! - `FRESHET_REFETCH_ON_FOCUS`: refetch on foreground (true/false)
//! - `FRESHET_GC_INTERVAL`: eviction sweep period in seconds
//! - `FRESHET_FOCUS_ACTIVITY_MARGIN`: seconds a record must have been quiet
//!   before a foreground refetch picks it up
//!
//! ## File Formats
//! `.toml` and `.json`, detected by extension. Field names match
//! [`QuerySettings`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use freshet_common::CommonError;
use tracing::{debug, info};

use super::QuerySettings;
use crate::error::{QueryError, QueryResult};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    ///
    /// # Errors
    /// Returns `QueryError::Config` for missing or unsupported extensions.
    pub fn from_path(path: &Path) -> QueryResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(QueryError::config(CommonError::config(format!(
                "Unsupported config format: {}",
                other.unwrap_or("<none>")
            )))),
        }
    }
}

/// Load settings from `FRESHET_*` environment variables
///
/// # Errors
/// Returns `QueryError::Config` if a set variable cannot be parsed.
pub fn load_from_env() -> QueryResult<QuerySettings> {
    let defaults = QuerySettings::default();

    let settings = QuerySettings {
        stale_time: env_secs("FRESHET_STALE_TIME")?.unwrap_or(defaults.stale_time),
        cache_time: env_secs("FRESHET_CACHE_TIME")?.unwrap_or(defaults.cache_time),
        retry_max_attempts: env_parse("FRESHET_RETRY_MAX_ATTEMPTS")?
            .unwrap_or(defaults.retry_max_attempts),
        retry_max_delay: env_secs("FRESHET_RETRY_MAX_DELAY")?.unwrap_or(defaults.retry_max_delay),
        refetch_on_focus: env_bool("FRESHET_REFETCH_ON_FOCUS", defaults.refetch_on_focus),
        gc_interval: env_secs("FRESHET_GC_INTERVAL")?.unwrap_or(defaults.gc_interval),
        focus_activity_margin: env_secs("FRESHET_FOCUS_ACTIVITY_MARGIN")?
            .unwrap_or(defaults.focus_activity_margin),
    };

    debug!(?settings, "Query settings loaded from environment");
    Ok(settings)
}

/// Load settings from a `.toml` or `.json` file
///
/// # Errors
/// Returns `QueryError::Config` if the file is missing, unreadable, of an
/// unsupported format or malformed.
pub fn load_from_file(path: &Path) -> QueryResult<QuerySettings> {
    if !path.exists() {
        return Err(QueryError::config(CommonError::config(format!(
            "Config file not found: {}",
            path.display()
        ))));
    }

    let format = ConfigFormat::from_path(path)?;
    info!(path = %path.display(), ?format, "Loading query settings from file");

    let contents = std::fs::read_to_string(path).map_err(|e| {
        QueryError::config(CommonError::io_path(path.display().to_string(), e.to_string()))
    })?;

    parse_settings(&contents, format)
}

/// Parse settings from string content
///
/// # Errors
/// Returns `QueryError::Config` wrapping the serialization error.
pub fn parse_settings(contents: &str, format: ConfigFormat) -> QueryResult<QuerySettings> {
    let parsed = match format {
        ConfigFormat::Toml => toml::from_str(contents).map_err(CommonError::from),
        ConfigFormat::Json => serde_json::from_str(contents).map_err(CommonError::from),
    };
    parsed.map_err(QueryError::config)
}

fn env_parse<V>(key: &str) -> QueryResult<Option<V>>
where
    V: FromStr,
    V::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<V>().map(Some).map_err(|e| {
            QueryError::config(CommonError::validation_with_value(key, e.to_string(), raw))
        }),
        Err(_) => Ok(None),
    }
}

fn env_secs(key: &str) -> QueryResult<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_secs))
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use tempfile::Builder;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ALL_VARS: [&str; 7] = [
        "FRESHET_STALE_TIME",
        "FRESHET_CACHE_TIME",
        "FRESHET_RETRY_MAX_ATTEMPTS",
        "FRESHET_RETRY_MAX_DELAY",
        "FRESHET_REFETCH_ON_FOCUS",
        "FRESHET_GC_INTERVAL",
        "FRESHET_FOCUS_ACTIVITY_MARGIN",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("FRESHET_TEST_BOOL_ON", "ON");
        std::env::set_var("FRESHET_TEST_BOOL_NO", "no");

        assert!(env_bool("FRESHET_TEST_BOOL_ON", false));
        assert!(!env_bool("FRESHET_TEST_BOOL_NO", true));
        assert!(env_bool("FRESHET_TEST_BOOL_MISSING", true));

        std::env::remove_var("FRESHET_TEST_BOOL_ON");
        std::env::remove_var("FRESHET_TEST_BOOL_NO");
    }

    #[test]
    fn test_load_from_env_defaults_when_unset() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let settings = load_from_env().expect("defaults load");
        assert_eq!(settings, QuerySettings::default());
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("FRESHET_STALE_TIME", "60");
        std::env::set_var("FRESHET_CACHE_TIME", "600");
        std::env::set_var("FRESHET_RETRY_MAX_ATTEMPTS", "5");
        std::env::set_var("FRESHET_RETRY_MAX_DELAY", "10");
        std::env::set_var("FRESHET_REFETCH_ON_FOCUS", "false");
        std::env::set_var("FRESHET_GC_INTERVAL", "2");
        std::env::set_var("FRESHET_FOCUS_ACTIVITY_MARGIN", "20");

        let result = load_from_env();
        clear_env();

        let settings = result.expect("env settings load");
        assert_eq!(settings.stale_time, Duration::from_secs(60));
        assert_eq!(settings.cache_time, Duration::from_secs(600));
        assert_eq!(settings.retry_max_attempts, 5);
        assert_eq!(settings.retry_max_delay, Duration::from_secs(10));
        assert!(!settings.refetch_on_focus);
        assert_eq!(settings.gc_interval, Duration::from_secs(2));
        assert_eq!(settings.focus_activity_margin, Duration::from_secs(20));
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("FRESHET_CACHE_TIME", "ten minutes");

        let result = load_from_env();
        clear_env();

        let err = result.expect_err("invalid number rejected");
        assert!(matches!(err, QueryError::Config(CommonError::Validation { .. })));
        assert!(err.to_string().contains("FRESHET_CACHE_TIME"));
    }

    #[test]
    fn test_load_from_file_toml() {
        let mut file = Builder::new().suffix(".toml").tempfile().expect("temp file");
        writeln!(file, "stale_time = 60\ncache_time = 600\nrefetch_on_focus = false")
            .expect("write config");

        let settings = load_from_file(file.path()).expect("toml loads");
        assert_eq!(settings.stale_time, Duration::from_secs(60));
        assert_eq!(settings.cache_time, Duration::from_secs(600));
        assert!(!settings.refetch_on_focus);
        assert_eq!(settings.retry_max_attempts, 3);
    }

    #[test]
    fn test_load_from_file_json() {
        let mut file = Builder::new().suffix(".json").tempfile().expect("temp file");
        write!(file, r#"{{"retry_max_attempts": 1, "gc_interval": 9}}"#).expect("write config");

        let settings = load_from_file(file.path()).expect("json loads");
        assert_eq!(settings.retry_max_attempts, 1);
        assert_eq!(settings.gc_interval, Duration::from_secs(9));
        assert_eq!(settings.stale_time, Duration::from_secs(30));
    }

    #[test]
    fn test_load_from_file_missing() {
        let err = load_from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = Builder::new().suffix(".yaml").tempfile().expect("temp file");
        let err = load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported config format: yaml"));
    }

    #[test]
    fn test_parse_settings_malformed() {
        let err = parse_settings("stale_time = \"soon\"", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, QueryError::Config(CommonError::Serialization { .. })));
    }
}
