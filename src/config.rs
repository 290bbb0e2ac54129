use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

const DEFAULT_EXPORT_FILE_NAME: &str = "obciazenie_filtrowane.csv";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_file_size: usize,
    pub upload_cache_capacity: u64,
    pub upload_cache_ttl: Duration,
    pub export_file_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_file_size: default_max_file_size(),
            upload_cache_capacity: 64,
            upload_cache_ttl: Duration::from_secs(15 * 60),
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}={:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let defaults = Config::default();
        Ok(Config {
            bind_addr: env_or("DASHBOARD_BIND_ADDR", defaults.bind_addr)?,
            max_file_size: env_or("MAX_FILE_SIZE", defaults.max_file_size)?,
            upload_cache_capacity: env_or("UPLOAD_CACHE_CAPACITY", defaults.upload_cache_capacity)?,
            upload_cache_ttl: Duration::from_secs(env_or(
                "UPLOAD_CACHE_TTL_SECS",
                defaults.upload_cache_ttl.as_secs(),
            )?),
            export_file_name: std::env::var("EXPORT_FILE_NAME").unwrap_or(defaults.export_file_name),
        })
    }
}

pub fn load_config() -> Result<Config> {
    let config = Config::new()?;
    tracing::info!(
        "Loaded config: bind {}, max file {}KB, cache {} entries for {:?}",
        config.bind_addr,
        config.max_file_size / 1024,
        config.upload_cache_capacity,
        config.upload_cache_ttl
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_dashboard() {
        let config = Config::default();
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.export_file_name, "obciazenie_filtrowane.csv");
        assert_eq!(config.bind_addr.port(), 3000);
    }

    #[test]
    fn unparsable_env_value_is_an_error() {
        std::env::set_var("DEVICE_LOAD_TEST_NUMBER", "ten");
        assert!(env_or::<usize>("DEVICE_LOAD_TEST_NUMBER", 1).is_err());
        std::env::set_var("DEVICE_LOAD_TEST_NUMBER", " 12 ");
        assert_eq!(env_or::<usize>("DEVICE_LOAD_TEST_NUMBER", 1).unwrap(), 12);
        assert_eq!(env_or::<usize>("DEVICE_LOAD_TEST_UNSET", 7).unwrap(), 7);
    }
}
