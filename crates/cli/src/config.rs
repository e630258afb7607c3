use std::path::Path;

use anyhow::Context;
use llm::LlmSettings;
use nodes::EngineConfig;
use serde::Deserialize;

/// Contents of `schemasense.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub llm: LlmSettings,
}

impl CliConfig {
    /// Loads `path`, or returns defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = CliConfig::parse(
            r#"
            [engine]
            worker_concurrency = 4

            [llm.default]
            base_url = "http://localhost:11434/v1"
            model = "llama3.1"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.worker_concurrency, 4);
        assert_eq!(config.engine.heartbeat_interval_secs, 30);
        let llm = config.llm.default.unwrap();
        assert_eq!(llm.model, "llama3.1");
        assert_eq!(llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_empty_config_leaves_llm_unconfigured() {
        let config = CliConfig::parse("").unwrap();
        assert!(config.llm.default.is_none());
        assert_eq!(config.engine, EngineConfig::default());
    }
}
