use std::collections::HashMap;
use std::time::Duration;

use ontology::ProjectId;
use serde::{Deserialize, Serialize};

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_json_mode() -> bool {
    true
}

/// One LLM access point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API, without `/chat/completions`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key. The key itself never
    /// appears in configuration files.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ask the provider for a JSON object response.
    #[serde(default = "default_json_mode")]
    pub json_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            json_mode: default_json_mode(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// The `[llm]` configuration section: a default access point plus
/// per-project overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Used for projects without an override. `None` leaves such projects
    /// unconfigured.
    #[serde(default)]
    pub default: Option<LlmConfig>,

    #[serde(default)]
    pub projects: HashMap<ProjectId, LlmConfig>,
}

impl LlmSettings {
    pub fn for_project(&self, project: ProjectId) -> Option<&LlmConfig> {
        self.projects.get(&project).or(self.default.as_ref())
    }
}
