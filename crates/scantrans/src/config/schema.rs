use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::PoolPolicy;
use crate::secrets::expand_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_database_path() -> String {
    "~/.scantrans/data/scantrans.db".to_string()
}

fn default_max_concurrent_runs() -> usize {
    num_cpus::get()
}

impl Config {
    /// Database path with a leading `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.database_path))
    }

    pub fn pool_policy(&self) -> PoolPolicy {
        PoolPolicy::new(self.credentials.max_errors, self.credentials.cooldown_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_days.saturating_mul(24 * 60 * 60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.call_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: default_database_path(),
            max_concurrent_runs: default_max_concurrent_runs(),
            orchestrator: OrchestratorSection::default(),
            credentials: CredentialsConfig::default(),
            cache: CacheConfig::default(),
            executor: ExecutorConfig::default(),
            translation: TranslationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_retries() -> u32 {
    3
}

fn default_event_capacity() -> usize {
    256
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub keys: Vec<CredentialKeyConfig>,
}

fn default_max_errors() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    300
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
            cooldown_secs: default_cooldown_secs(),
            keys: Vec::new(),
        }
    }
}

/// One provider key. Exactly one of `value`, `valueFile`, `valueEnvVar` is set.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialKeyConfig {
    pub label: String,
    #[serde(default, skip_serializing)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_file: Option<String>,
    #[serde(default)]
    pub value_env_var: Option<String>,
}

impl fmt::Debug for CredentialKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialKeyConfig")
            .field("label", &self.label)
            .field("value", &self.value.as_ref().map(|_| "[REDACTED]"))
            .field("value_file", &self.value_file)
            .field("value_env_var", &self.value_env_var)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_hot_capacity")]
    pub hot_capacity: u64,
}

fn default_ttl_days() -> u64 {
    crate::cache::DEFAULT_TTL_DAYS
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_hot_capacity() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
            hot_capacity: default_hot_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    60
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

fn default_model() -> String {
    "standard".to_string()
}

fn default_models() -> Vec<String> {
    vec![default_model()]
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            models: default_models(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
