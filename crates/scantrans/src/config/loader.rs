use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;

use crate::config::schema::Config;
use crate::credentials::CredentialEntry;
use crate::error::ConfigError;
use crate::secrets::resolve_secret;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Checks the rules the schema cannot express. Limits, the model list and
/// key secret sources are covered by `schema/config-v1.json`.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let models = &config.translation.models;
    if !models.iter().any(|m| *m == config.translation.default_model) {
        return Err(invalid(format!(
            "Default model '{}' is not in translation.models",
            config.translation.default_model
        )));
    }

    let mut labels = HashSet::new();
    for key in &config.credentials.keys {
        if !labels.insert(key.label.as_str()) {
            return Err(ConfigError::InvalidKey {
                label: key.label.clone(),
                reason: "Duplicate key label".to_string(),
            });
        }
    }

    Ok(())
}

/// Resolves every configured key into a pool entry.
///
/// Ids are derived from the label so health persisted for a key survives a
/// restart.
pub fn build_credentials(config: &Config) -> Result<Vec<CredentialEntry>, ConfigError> {
    let now = Utc::now();
    config
        .credentials
        .keys
        .iter()
        .map(|key| {
            let secret = resolve_secret(
                key.value.as_deref(),
                key.value_file.as_deref(),
                key.value_env_var.as_deref(),
            )
            .map_err(|source| ConfigError::Secret {
                label: key.label.clone(),
                source,
            })?;
            Ok(CredentialEntry::with_id(
                format!("config:{}", key.label),
                key.label.clone(),
                secret,
                now,
            ))
        })
        .collect()
}
