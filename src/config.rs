use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::engine::router::{RouterConfig, DEFAULT_PAGE_SIZE};
use crate::engine::scheduler::SchedulerConfig;
use crate::lifecycle::LifecycleConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// PostgreSQL connection string. Without one the in-memory store is used.
    pub database_url: Option<String>,
    pub port: u16,
    pub tick_secs: u64,
    pub page_size: usize,
    pub run_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8080,
            tick_secs: 60,
            page_size: DEFAULT_PAGE_SIZE,
            run_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Reads a TOML file, then lets `MUNINN_*` environment variables override it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config.merge_env())
    }

    fn merge_env(mut self) -> Self {
        if let Ok(url) = std::env::var("MUNINN_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(port) = env_parse("MUNINN_PORT") {
            self.port = port;
        }
        if let Some(secs) = env_parse("MUNINN_TICK_SECS") {
            self.tick_secs = secs;
        }
        if let Some(size) = env_parse("MUNINN_PAGE_SIZE") {
            self.page_size = size;
        }
        if let Some(secs) = env_parse("MUNINN_RUN_TIMEOUT_SECS") {
            self.run_timeout_secs = Some(secs);
        }
        self
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(self.tick_secs.max(1)),
            router: RouterConfig {
                page_size: self.page_size.max(1),
            },
            lifecycle: LifecycleConfig {
                run_timeout: self.run_timeout_secs.map(Duration::from_secs),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring unparseable {}={}", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.page_size, 25);
        assert!(config.database_url.is_none());

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.tick_interval, Duration::from_secs(60));
        assert_eq!(scheduler.router.page_size, 25);
        assert!(scheduler.lifecycle.run_timeout.is_none());
    }

    #[test]
    fn test_from_file_with_partial_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9090\nrun_timeout_secs = 30").unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.tick_secs, 60);
        assert_eq!(
            config.scheduler_config().lifecycle.run_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("parsing config file"));
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file(Path::new("/nonexistent/muninn.toml")).is_err());
    }
}
