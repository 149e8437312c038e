//! Engine configuration.
//!
//! JSON ファイル（任意）→ 環境変数の順で上書きします。全フィールドに既定値があるので
//! `{}` だけでも有効な設定です。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{JobLimits, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("environment variable {key}={value:?} is not a valid value")]
    Env { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-target attempt budget and deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttemptConfig {
    pub max_attempts: u32,

    /// Hard deadline of one attempt, from context request to verdict.
    pub timeout_ms: u64,

    pub retry_base_delay_ms: u64,
    pub retry_multiplier: f64,
}

impl Default for AttemptConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 30_000,
            retry_base_delay_ms: 2_000,
            retry_multiplier: 2.0,
        }
    }
}

/// Waits and polls inside one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Wait after opening a context before the first readiness check.
    pub ready_initial_delay_ms: u64,
    pub ready: RetryPolicy,

    pub content_area: RetryPolicy,
    pub send_control: RetryPolicy,

    /// Wait after each injection strategy before checking its post-condition.
    pub strategy_settle_ms: u64,

    /// Interval between simulated keystrokes.
    pub typing_interval_ms: u64,

    /// Upper bound for typing one payload. Long payloads type faster so that they fit.
    pub typing_budget_ms: u64,

    /// Wait between injection and submission.
    pub pre_submit_settle_ms: u64,

    /// Wait between submission and the first verification.
    pub verify_settle_ms: u64,
    pub verify: RetryPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            ready_initial_delay_ms: 2_000,
            ready: RetryPolicy::constant(20, Duration::from_secs(1)),
            content_area: RetryPolicy::constant(5, Duration::from_millis(500)),
            send_control: RetryPolicy::constant(3, Duration::from_millis(200)),
            strategy_settle_ms: 100,
            typing_interval_ms: 10,
            typing_budget_ms: 10_000,
            pre_submit_settle_ms: 500,
            verify_settle_ms: 2_000,
            verify: RetryPolicy::constant(3, Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Origin of the target surface, without trailing slash.
    pub surface_base: String,
    pub limits: JobLimits,
    pub attempt: AttemptConfig,
    pub polling: PollingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            surface_base: "https://web.whatsapp.com".to_string(),
            limits: JobLimits::default(),
            attempt: AttemptConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Apply `HERALD_MAX_ATTEMPTS`, `HERALD_ATTEMPT_TIMEOUT_MS` and `HERALD_SETTLE_MS`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = parse_var(&lookup, "HERALD_MAX_ATTEMPTS")? {
            self.attempt.max_attempts =
                u32::try_from(v).map_err(|_| ConfigError::Env {
                    key: "HERALD_MAX_ATTEMPTS",
                    value: v.to_string(),
                })?;
        }
        if let Some(v) = parse_var(&lookup, "HERALD_ATTEMPT_TIMEOUT_MS")? {
            self.attempt.timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "HERALD_SETTLE_MS")? {
            self.polling.verify_settle_ms = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempt.max_attempts == 0 {
            return Err(ConfigError::Invalid("attempt.max_attempts must be >= 1".into()));
        }
        if self.attempt.timeout_ms == 0 {
            return Err(ConfigError::Invalid("attempt.timeout_ms must be > 0".into()));
        }
        if self.limits.min_delay_ms > self.limits.max_delay_ms {
            return Err(ConfigError::Invalid(
                "limits.min_delay_ms must not exceed limits.max_delay_ms".into(),
            ));
        }
        if self.limits.max_targets == 0 {
            return Err(ConfigError::Invalid("limits.max_targets must be >= 1".into()));
        }
        if self.surface_base.trim().is_empty() {
            return Err(ConfigError::Invalid("surface_base is empty".into()));
        }

        let attempt_policy = self.attempt_retry_policy();
        let policies = [
            ("attempt.retry_multiplier", &attempt_policy),
            ("polling.ready.multiplier", &self.polling.ready),
            ("polling.content_area.multiplier", &self.polling.content_area),
            ("polling.send_control.multiplier", &self.polling.send_control),
            ("polling.verify.multiplier", &self.polling.verify),
        ];
        for (name, policy) in policies {
            if !policy.has_valid_multiplier() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and >= 1.0, got {}",
                    policy.multiplier
                )));
            }
        }

        if self.polling.typing_budget_ms >= self.attempt.timeout_ms {
            return Err(ConfigError::Invalid(
                "polling.typing_budget_ms must be below attempt.timeout_ms".into(),
            ));
        }
        Ok(())
    }

    /// Retry policy for whole attempts against one target.
    pub fn attempt_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.attempt.max_attempts,
            Duration::from_millis(self.attempt.retry_base_delay_ms),
            self.attempt.retry_multiplier,
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt.timeout_ms)
    }
}

fn parse_var(
    lookup: &impl Fn(&'static str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Env { key, value }),
    }
}
