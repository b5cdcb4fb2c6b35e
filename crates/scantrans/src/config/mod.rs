pub mod loader;
pub mod schema;

pub use loader::{build_credentials, load_config, load_config_from_str, validate_config};
pub use schema::{
    CacheConfig, Config, CredentialKeyConfig, CredentialsConfig, ExecutorConfig, LogFormat,
    LoggingConfig, OrchestratorSection, TranslationConfig,
};
