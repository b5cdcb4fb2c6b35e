use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScantransError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Credential pool error: {0}")]
    Pool(#[from] crate::credentials::PoolError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Orchestration error: {0}")]
    Orchestrator(#[from] crate::pipeline::OrchestratorError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid credential key '{label}': {reason}")]
    InvalidKey { label: String, reason: String },

    #[error("Failed to resolve credential key '{label}': {source}")]
    Secret {
        label: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

pub type Result<T> = std::result::Result<T, ScantransError>;
