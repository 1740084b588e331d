//! Integration tests for loading configuration into a running client

use std::io::Write;
use std::time::Duration;

use freshet_core::config::loader::{load_from_file, parse_settings, ConfigFormat};
use freshet_core::{QueryClient, QueryError, QueryStatus};

/// Verifies a TOML file drives the client's staleness and retry behaviour.
///
/// # Test Steps
/// 1. Write a settings file disabling retries
/// 2. Load it and build a client whose fetch always fails
/// 3. Assert a single attempt and the configured stale time
#[tokio::test]
async fn test_file_settings_configure_client() -> anyhow::Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        "stale_time = 120\ncache_time = 900\nretry_max_attempts = 0\nfocus_activity_margin = 30"
    )?;

    let config = load_from_file(file.path())?.into_config()?;
    assert_eq!(config.stale_time, Duration::from_secs(120));
    assert_eq!(config.cache_time, Duration::from_secs(900));
    assert_eq!(config.focus_activity_margin, Duration::from_secs(30));

    let client = QueryClient::from_fn(config, |_: u8| async {
        Err::<u8, _>(std::io::Error::new(std::io::ErrorKind::Other, "unreachable host"))
    })?;
    client.ensure_query(&1).await;

    let record = client.read(&1).ok_or_else(|| anyhow::anyhow!("record missing"))?;
    assert_eq!(record.status, QueryStatus::Error);
    Ok(())
}

/// Verifies invalid settings surface as configuration errors.
#[test]
fn test_zero_cache_time_rejected() -> anyhow::Result<()> {
    let settings = parse_settings(r#"{"cache_time": 0}"#, ConfigFormat::Json)?;
    let err = settings.into_config().expect_err("zero cache time rejected");
    assert!(matches!(err, QueryError::Config(_)));
    Ok(())
}
