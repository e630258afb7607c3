use std::sync::Arc;

use async_trait::async_trait;
use ontology::ports::{LlmClient, LlmClientFactory};
use ontology::{LlmError, ProjectId};
use tracing::warn;

use crate::{ChatCompletionClient, LlmSettings};

/// Builds clients from [`LlmSettings`], reading API keys from the
/// environment at request time.
#[derive(Debug, Clone)]
pub struct ConfiguredLlmFactory {
    settings: LlmSettings,
    http: reqwest::Client,
}

impl ConfiguredLlmFactory {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClientFactory for ConfiguredLlmFactory {
    async fn client_for(&self, project: ProjectId) -> Result<Arc<dyn LlmClient>, LlmError> {
        let config = self
            .settings
            .for_project(project)
            .ok_or(LlmError::NotConfigured { project })?;
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                warn!(%project, env = %config.api_key_env, "LLM API key not set");
                return Err(LlmError::NotConfigured { project });
            }
        };
        Ok(Arc::new(ChatCompletionClient::new(
            self.http.clone(),
            config,
            api_key,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LlmConfig;

    #[tokio::test]
    async fn test_unconfigured_project_is_refused() {
        let factory = ConfiguredLlmFactory::new(LlmSettings::default());
        let project = ProjectId::new_random();
        let err = factory.client_for(project).await.err().unwrap();
        assert_eq!(err, LlmError::NotConfigured { project });
    }

    #[tokio::test]
    async fn test_missing_api_key_is_refused() {
        let factory = ConfiguredLlmFactory::new(LlmSettings {
            default: Some(LlmConfig {
                api_key_env: "SCHEMASENSE_TEST_KEY_NEVER_SET".into(),
                ..LlmConfig::default()
            }),
            ..LlmSettings::default()
        });
        let err = factory.client_for(ProjectId::new_random()).await.err().unwrap();
        assert!(matches!(err, LlmError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn test_client_built_when_key_present() {
        std::env::set_var("SCHEMASENSE_TEST_KEY_PRESENT", "sk-test");
        let factory = ConfiguredLlmFactory::new(LlmSettings {
            default: Some(LlmConfig {
                api_key_env: "SCHEMASENSE_TEST_KEY_PRESENT".into(),
                ..LlmConfig::default()
            }),
            ..LlmSettings::default()
        });
        assert!(factory.client_for(ProjectId::new_random()).await.is_ok());
    }
}
