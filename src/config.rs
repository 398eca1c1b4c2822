use std::collections::BTreeMap;

use crate::model::ModelVariant;
use crate::{Result, VitaError};

/// Built-in mesh-provider bases, tried in order after any configured base.
pub const DEFAULT_MESH_BASES: &[&str] = &["https://api.meshy.ai/v1", "https://api.meshy.ai/v2"];

pub const DEFAULT_VISION_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment lookup with an optional dotenv overlay. Clients never read
/// ambient variables directly; everything goes through a config struct built
/// from one of these, which keeps construction testable.
#[derive(Debug, Clone, Default)]
pub struct Env {
    dotenv: BTreeMap<String, String>,
}

impl Env {
    pub fn parse_dotenv(contents: &str) -> Self {
        let mut dotenv = BTreeMap::<String, String>::new();
        for raw_line in contents.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line).trim();
            let Some((raw_key, raw_value)) = line.split_once('=') else {
                continue;
            };
            let value = raw_value
                .trim()
                .trim_matches('"')
                .trim_matches('\'')
                .to_string();
            if !value.is_empty() {
                dotenv.insert(raw_key.trim().to_string(), value);
            }
        }
        Self { dotenv }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.dotenv.get(key) {
            return Some(value.clone());
        }
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Configuration for the mesh-generation client.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub api_key: String,
    /// Configured default base, tried before the built-in fallback list.
    pub preferred_base: Option<String>,
    pub fallback_bases: Vec<String>,
}

impl MeshConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            preferred_base: None,
            fallback_bases: DEFAULT_MESH_BASES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_env(env: &Env) -> Result<Self> {
        let api_key = env
            .get("MESHY_API_KEY")
            .ok_or(VitaError::MissingApiKey("MESHY_API_KEY"))?;
        let mut config = Self::new(api_key);
        config.preferred_base = env.get("MESHY_API_BASE_URL");
        Ok(config)
    }

    pub fn with_preferred_base(mut self, base: impl Into<String>) -> Self {
        self.preferred_base = Some(base.into());
        self
    }

    pub fn with_fallback_bases(mut self, bases: Vec<String>) -> Self {
        self.fallback_bases = bases;
        self
    }
}

/// Configuration for the image-understanding client.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model variants tried in order until one answers.
    pub model_order: Vec<ModelVariant>,
}

impl VisionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_VISION_BASE_URL.to_string(),
            model_order: ModelVariant::default_order(),
        }
    }

    pub fn from_env(env: &Env) -> Result<Self> {
        let api_key = env
            .get("GEMINI_API_KEY")
            .ok_or(VitaError::MissingApiKey("GEMINI_API_KEY"))?;
        let mut config = Self::new(api_key);
        if let Some(base_url) = env.get("GEMINI_API_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model_order(mut self, model_order: Vec<ModelVariant>) -> Self {
        self.model_order = model_order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotenv_lines() {
        let env = Env::parse_dotenv(
            "# comment\nMESHY_API_KEY=abc\nexport GEMINI_API_KEY=\"def\"\nEMPTY=\n",
        );
        assert_eq!(env.dotenv.get("MESHY_API_KEY").map(String::as_str), Some("abc"));
        assert_eq!(env.dotenv.get("GEMINI_API_KEY").map(String::as_str), Some("def"));
        assert!(!env.dotenv.contains_key("EMPTY"));
    }

    #[test]
    fn mesh_config_requires_api_key() {
        let env = Env::parse_dotenv("MESHY_API_BASE_URL=https://example.com/v9\n");
        // No MESHY_API_KEY in the overlay; only fails when the process env
        // does not provide one either.
        if std::env::var("MESHY_API_KEY").is_err() {
            let err = MeshConfig::from_env(&env).unwrap_err();
            assert!(matches!(err, VitaError::MissingApiKey("MESHY_API_KEY")));
        }
    }

    #[test]
    fn mesh_config_reads_preferred_base() {
        let env = Env::parse_dotenv("MESHY_API_KEY=k\nMESHY_API_BASE_URL=https://example.com/v9\n");
        let config = MeshConfig::from_env(&env).unwrap();
        assert_eq!(config.preferred_base.as_deref(), Some("https://example.com/v9"));
        assert_eq!(config.fallback_bases.len(), DEFAULT_MESH_BASES.len());
    }
}
