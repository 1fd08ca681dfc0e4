//! Service configuration.
//!
//! Loaded from a YAML file by the embedding process, with `${VAR}`
//! references expanded from the environment. Every knob has a default so an
//! absent file yields a runnable configuration.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config
// ============================================================================

/// Which session-lifecycle strategy a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleMode {
    /// Persistent event subscription with periodic offline-presence pushes.
    #[default]
    Persistent,
    /// Connect, fetch unread, dispatch, stay offline; no standing
    /// subscription.
    Polling,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoReplyConfig {
    /// Lower bound of the randomized presence-cycle interval, seconds.
    #[serde(default = "default_presence_min")]
    pub presence_min_secs: u64,

    /// Upper bound of the randomized presence-cycle interval, seconds.
    #[serde(default = "default_presence_max")]
    pub presence_max_secs: u64,

    /// Fixed health-check interval, seconds.
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    /// Direct-message reply cooldown window, seconds.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Auto-release TTL for in-flight dispatch markers, seconds.
    #[serde(default = "default_in_flight_ttl")]
    pub in_flight_ttl_secs: u64,

    /// Interval of the background sweep over expired gate entries, seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Depth of the inbound-event queue.
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,

    #[serde(default)]
    pub lifecycle: LifecycleMode,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            presence_min_secs: default_presence_min(),
            presence_max_secs: default_presence_max(),
            health_interval_secs: default_health_interval(),
            cooldown_secs: default_cooldown(),
            in_flight_ttl_secs: default_in_flight_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            event_queue_depth: default_event_queue_depth(),
            lifecycle: LifecycleMode::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,

    #[error("presence_min_secs ({min}) must not exceed presence_max_secs ({max})")]
    InvertedJitterBounds { min: u64, max: u64 },

    #[error("{field} must be non-zero")]
    ZeroInterval { field: &'static str },
}

impl AutoReplyConfig {
    /// Load from a YAML file, expanding `${VAR}` references.
    ///
    /// A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path.as_ref()).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        let config: Self = serde_saphyr::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the loops cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.presence_min_secs > self.presence_max_secs {
            return Err(ConfigError::InvertedJitterBounds {
                min: self.presence_min_secs,
                max: self.presence_max_secs,
            });
        }
        for (field, value) in [
            ("presence_min_secs", self.presence_min_secs),
            ("health_interval_secs", self.health_interval_secs),
            ("cooldown_secs", self.cooldown_secs),
            ("in_flight_ttl_secs", self.in_flight_ttl_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { field });
            }
        }
        Ok(())
    }

    pub fn presence_jitter(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.presence_min_secs),
            Duration::from_secs(self.presence_max_secs),
        )
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn cooldown_window(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn in_flight_ttl(&self) -> Duration {
        Duration::from_secs(self.in_flight_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// ============================================================================
// Env expansion
// ============================================================================

/// Replace `${VAR}` references with environment values.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::UnclosedVarReference);
        };
        let name = &after[..end];
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

// ============================================================================
// Serde defaults
// ============================================================================

fn default_presence_min() -> u64 {
    8
}

fn default_presence_max() -> u64 {
    12
}

fn default_health_interval() -> u64 {
    120
}

fn default_cooldown() -> u64 {
    30 * 60
}

fn default_in_flight_ttl() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    5 * 60
}

fn default_event_queue_depth() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let config = AutoReplyConfig::default();
        assert_eq!(config.presence_min_secs, 8);
        assert_eq!(config.presence_max_secs, 12);
        assert_eq!(config.health_interval_secs, 120);
        assert_eq!(config.cooldown_secs, 1800);
        assert_eq!(config.in_flight_ttl_secs, 30);
        assert_eq!(config.lifecycle, LifecycleMode::Persistent);
        config.validate().unwrap();
    }

    #[test]
    fn inverted_jitter_bounds_rejected() {
        let config = AutoReplyConfig {
            presence_min_secs: 20,
            presence_max_secs: 10,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedJitterBounds { .. })
        ));
    }

    #[test]
    fn zero_interval_rejected() {
        let config = AutoReplyConfig {
            cooldown_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval { .. })
        ));
    }

    #[test]
    fn expand_env_vars_substitutes() {
        // SAFETY: test-local variable with no concurrent reader.
        unsafe { std::env::set_var("NIGHTWATCH_TEST_VAR", "42") };
        let out = expand_env_vars("cooldown_secs: ${NIGHTWATCH_TEST_VAR}").unwrap();
        assert_eq!(out, "cooldown_secs: 42");
    }

    #[test]
    fn expand_env_vars_rejects_unclosed() {
        assert!(matches!(
            expand_env_vars("value: ${OOPS"),
            Err(ConfigError::UnclosedVarReference)
        ));
    }

    #[tokio::test]
    async fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AutoReplyConfig::load(dir.path().join("absent.yaml"))
            .await
            .unwrap();
        assert_eq!(config.cooldown_secs, 1800);
    }

    #[tokio::test]
    async fn load_parses_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightwatch.yaml");
        std::fs::write(&path, "cooldown_secs: 60\nlifecycle: polling\n").unwrap();

        let config = AutoReplyConfig::load(&path).await.unwrap();
        assert_eq!(config.cooldown_secs, 60);
        assert_eq!(config.lifecycle, LifecycleMode::Polling);
        // untouched knobs keep their defaults
        assert_eq!(config.health_interval_secs, 120);
    }
}
