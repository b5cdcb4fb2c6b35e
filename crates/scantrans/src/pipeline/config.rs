use crate::config::Config;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Re-entries of a stage's in-progress state after a retryable failure.
    pub max_retries: u32,
    /// Capacity of the status broadcast channel.
    pub event_capacity: usize,
    /// Runs allowed to execute stages at the same time.
    pub max_concurrent_runs: usize,
    pub default_model: String,
    /// Authoritative model catalog.
    pub models: Vec<String>,
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.orchestrator.max_retries,
            event_capacity: config.orchestrator.event_capacity,
            max_concurrent_runs: config.max_concurrent_runs,
            default_model: config.translation.default_model.clone(),
            models: config.translation.models.clone(),
        }
    }

    /// Resolves the requested model against the catalog.
    pub fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        let model = requested.unwrap_or(&self.default_model);
        self.models.iter().any(|m| m == model).then_some(model)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_concurrent_runs: num_cpus::get().max(1),
            default_model: "standard".to_string(),
            models: vec!["standard".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model() {
        let config = OrchestratorConfig {
            models: vec!["standard".into(), "premium".into()],
            ..Default::default()
        };
        assert_eq!(config.resolve_model(None), Some("standard"));
        assert_eq!(config.resolve_model(Some("premium")), Some("premium"));
        assert_eq!(config.resolve_model(Some("legacy")), None);
    }
}
