/// Dispatcher configuration
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default 5)
/// - `DISPATCH_POLL_INTERVAL_SECS`: poll interval (default 5)
/// - `DISPATCH_BATCH_SIZE`: due orders per cycle (default 20)
/// - `DISPATCH_MAX_ATTEMPTS`: attempts before an order needs manual dispatch (default 10)
/// - `DISPATCH_BACKOFF_BASE_SECS` / `DISPATCH_BACKOFF_CAP_SECS`: retry backoff (default 60 / 3600)
/// - `DISPATCH_OFFER_TIMEOUT_MINUTES`: offer expiry (default 30)
/// - `STORE_SYNC_URL`, `STORE_SYNC_TIMEOUT_MS`: store integration (optional)

use makrx_shared::dispatch::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub poll_interval_secs: u64,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub offer_timeout_minutes: i64,
    pub store_sync_url: Option<String>,
    pub store_sync_timeout_ms: u64,
}

impl DispatcherConfig {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Fails when `DATABASE_URL` is missing or a numeric variable is invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through `lookup`
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let config = Self {
            database_url,
            max_connections: parse_or(get("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", 5)?,
            poll_interval_secs: parse_or(get("DISPATCH_POLL_INTERVAL_SECS"), "DISPATCH_POLL_INTERVAL_SECS", 5)?,
            batch_size: parse_or(get("DISPATCH_BATCH_SIZE"), "DISPATCH_BATCH_SIZE", 20)?,
            max_attempts: parse_or(get("DISPATCH_MAX_ATTEMPTS"), "DISPATCH_MAX_ATTEMPTS", 10)?,
            backoff_base_secs: parse_or(get("DISPATCH_BACKOFF_BASE_SECS"), "DISPATCH_BACKOFF_BASE_SECS", 60)?,
            backoff_cap_secs: parse_or(get("DISPATCH_BACKOFF_CAP_SECS"), "DISPATCH_BACKOFF_CAP_SECS", 3600)?,
            offer_timeout_minutes: parse_or(
                get("DISPATCH_OFFER_TIMEOUT_MINUTES"),
                "DISPATCH_OFFER_TIMEOUT_MINUTES",
                30,
            )?,
            store_sync_url: get("STORE_SYNC_URL"),
            store_sync_timeout_ms: parse_or(get("STORE_SYNC_TIMEOUT_MS"), "STORE_SYNC_TIMEOUT_MS", 3000)?,
        };

        if config.poll_interval_secs == 0 {
            anyhow::bail!("DISPATCH_POLL_INTERVAL_SECS must be at least 1");
        }
        if config.batch_size < 1 {
            anyhow::bail!("DISPATCH_BATCH_SIZE must be at least 1");
        }
        if config.backoff_cap_secs < config.backoff_base_secs {
            anyhow::bail!("DISPATCH_BACKOFF_CAP_SECS must not be below DISPATCH_BACKOFF_BASE_SECS");
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn offer_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.offer_timeout_minutes)
    }

    pub fn store_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.store_sync_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_secs: self.backoff_base_secs,
            cap_secs: self.backoff_cap_secs,
            max_attempts: self.max_attempts,
        }
    }
}

fn parse_or<T>(raw: Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{name} is invalid: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<DispatcherConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        DispatcherConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgresql://localhost/makrx")]).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.offer_timeout(), chrono::Duration::minutes(30));
        assert!(config.store_sync_url.is_none());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_database_url_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/makrx"),
            ("DISPATCH_POLL_INTERVAL_SECS", "2"),
            ("DISPATCH_MAX_ATTEMPTS", "3"),
            ("DISPATCH_BACKOFF_BASE_SECS", "10"),
            ("DISPATCH_BACKOFF_CAP_SECS", "40"),
            ("STORE_SYNC_URL", "https://store.makrx.test"),
        ])
        .unwrap();

        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.delay_for(3), chrono::Duration::seconds(40));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.store_sync_url.as_deref(), Some("https://store.makrx.test"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = ("DATABASE_URL", "postgresql://localhost/makrx");

        assert!(load(&[base, ("DISPATCH_BATCH_SIZE", "lots")]).is_err());
        assert!(load(&[base, ("DISPATCH_POLL_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[base, ("DISPATCH_BACKOFF_BASE_SECS", "100"), ("DISPATCH_BACKOFF_CAP_SECS", "50")]).is_err());
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[("DATABASE_URL", "postgresql://localhost/makrx"), ("DISPATCH_BATCH_SIZE", "  ")]).unwrap();
        assert_eq!(config.batch_size, 20);
    }
}
