//! Engine, storage and automation settings loaded from the environment.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use browserflow_automation::{AutomationCapability, HttpAutomationClient, SimulatedCapability};

/// Default stream URL; `{session_id}` is replaced per run.
pub const DEFAULT_STREAM_URL_TEMPLATE: &str = "ws://localhost:9222/devtools/browser/{session_id}";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Read `name`, falling back to `default` when unset.
pub fn env_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => parse_value(name, &value),
        Err(_) => Ok(default),
    }
}

/// Read `name` as an optional, non-empty string.
pub fn env_opt(name: &'static str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_value<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn positive(name: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Dispatcher and worker pool settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of tasks executed concurrently by one pool.
    pub worker_concurrency: usize,
    /// Hard limit on a single automation call.
    pub task_timeout: Duration,
    /// How often a running task re-reads the store to notice a stop.
    pub cancel_poll_interval: Duration,
    /// Capacity of the in-memory queue.
    pub queue_capacity: usize,
    pub stream_url_template: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            task_timeout: Duration::from_secs(30 * 60),
            cancel_poll_interval: Duration::from_secs(5),
            queue_capacity: 256,
            stream_url_template: DEFAULT_STREAM_URL_TEMPLATE.to_string(),
        }
    }
}

impl EngineConfig {
    /// | Env Var                     | Default                                              |
    /// |-----------------------------|------------------------------------------------------|
    /// | `WORKER_CONCURRENCY`        | `4`                                                  |
    /// | `TASK_TIMEOUT_SECS`         | `1800`                                               |
    /// | `CANCEL_POLL_INTERVAL_SECS` | `5`                                                  |
    /// | `QUEUE_CAPACITY`            | `256`                                                |
    /// | `STREAM_URL_TEMPLATE`       | `ws://localhost:9222/devtools/browser/{session_id}`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            worker_concurrency: positive(
                "WORKER_CONCURRENCY",
                env_or("WORKER_CONCURRENCY", defaults.worker_concurrency as u64)?,
            )? as usize,
            task_timeout: Duration::from_secs(positive(
                "TASK_TIMEOUT_SECS",
                env_or("TASK_TIMEOUT_SECS", defaults.task_timeout.as_secs())?,
            )?),
            cancel_poll_interval: Duration::from_secs(positive(
                "CANCEL_POLL_INTERVAL_SECS",
                env_or(
                    "CANCEL_POLL_INTERVAL_SECS",
                    defaults.cancel_poll_interval.as_secs(),
                )?,
            )?),
            queue_capacity: positive(
                "QUEUE_CAPACITY",
                env_or("QUEUE_CAPACITY", defaults.queue_capacity as u64)?,
            )? as usize,
            stream_url_template: env_opt("STREAM_URL_TEMPLATE")
                .unwrap_or(defaults.stream_url_template),
        })
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Where projects and tasks live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `None` selects the in-memory store and queue.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub queue_poll_interval: Duration,
    /// A claimed task not acked within this window is redelivered.
    pub queue_visibility_timeout: Duration,
}

impl StorageConfig {
    /// | Env Var                         | Default                  |
    /// |---------------------------------|--------------------------|
    /// | `DATABASE_URL`                  | unset (in-memory)        |
    /// | `DB_MAX_CONNECTIONS`            | `20`                     |
    /// | `QUEUE_POLL_INTERVAL_MS`        | `1000`                   |
    /// | `QUEUE_VISIBILITY_TIMEOUT_SECS` | task timeout + `60`      |
    ///
    /// The visibility timeout must exceed `engine.task_timeout`.
    pub fn from_env(engine: &EngineConfig) -> Result<Self, ConfigError> {
        let visibility_default = engine.task_timeout.as_secs() + 60;
        Ok(Self {
            database_url: env_opt("DATABASE_URL"),
            max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            queue_poll_interval: Duration::from_millis(positive(
                "QUEUE_POLL_INTERVAL_MS",
                env_or("QUEUE_POLL_INTERVAL_MS", 1000)?,
            )?),
            queue_visibility_timeout: outlasting_task(
                Duration::from_secs(env_or(
                    "QUEUE_VISIBILITY_TIMEOUT_SECS",
                    visibility_default,
                )?),
                engine.task_timeout,
            )?,
        })
    }
}

/// A redelivery must only happen once the first claim is overdue, otherwise
/// the duplicate is skipped, acked, and nothing is left to reap the task.
fn outlasting_task(visibility: Duration, task_timeout: Duration) -> Result<Duration, ConfigError> {
    if visibility <= task_timeout {
        return Err(ConfigError::Invalid {
            name: "QUEUE_VISIBILITY_TIMEOUT_SECS",
            value: visibility.as_secs().to_string(),
            reason: format!(
                "must be greater than TASK_TIMEOUT_SECS ({})",
                task_timeout.as_secs()
            ),
        });
    }
    Ok(visibility)
}

// ---------------------------------------------------------------------------
// AutomationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// `None` selects the simulated capability.
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub simulation_delay: Duration,
}

impl AutomationConfig {
    /// | Env Var                 | Default              |
    /// |-------------------------|----------------------|
    /// | `AUTOMATION_URL`        | unset (simulated)    |
    /// | `AUTOMATION_API_KEY`    | unset                |
    /// | `SIMULATION_DELAY_SECS` | `10`                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_opt("AUTOMATION_URL"),
            api_key: env_opt("AUTOMATION_API_KEY"),
            simulation_delay: Duration::from_secs(env_or("SIMULATION_DELAY_SECS", 10)?),
        })
    }

    pub fn build_capability(&self) -> Arc<dyn AutomationCapability> {
        match &self.url {
            Some(url) => {
                tracing::info!(url = %url, "Using remote automation service");
                Arc::new(HttpAutomationClient::new(url.clone(), self.api_key.clone()))
            }
            None => {
                tracing::warn!(
                    delay_secs = self.simulation_delay.as_secs(),
                    "AUTOMATION_URL not set, running in simulation mode"
                );
                Arc::new(SimulatedCapability::new(self.simulation_delay))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.task_timeout, Duration::from_secs(1800));
        assert_eq!(config.cancel_poll_interval, Duration::from_secs(5));
        assert_eq!(config.queue_capacity, 256);
        assert!(config.stream_url_template.contains("{session_id}"));
    }

    #[test]
    fn unparsable_value_names_the_variable() {
        let err = parse_value::<u64>("TASK_TIMEOUT_SECS", "soon").unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "TASK_TIMEOUT_SECS", .. });
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn zero_is_rejected_where_positive_required() {
        assert_matches!(
            positive("WORKER_CONCURRENCY", 0),
            Err(ConfigError::Invalid { name: "WORKER_CONCURRENCY", .. })
        );
        assert_eq!(positive("WORKER_CONCURRENCY", 2).unwrap(), 2);
    }

    #[test]
    fn visibility_timeout_must_outlast_task_timeout() {
        let task_timeout = Duration::from_secs(1800);

        for visibility in [0, 60, 1800] {
            assert_matches!(
                outlasting_task(Duration::from_secs(visibility), task_timeout),
                Err(ConfigError::Invalid { name: "QUEUE_VISIBILITY_TIMEOUT_SECS", .. })
            );
        }
        assert_eq!(
            outlasting_task(Duration::from_secs(1860), task_timeout).unwrap(),
            Duration::from_secs(1860)
        );
    }
}
