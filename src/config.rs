use crate::detectors::DetectorId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_detector_timeout")]
    pub detector_timeout_seconds: u64,
    #[serde(default)]
    pub detectors: BTreeMap<DetectorId, DetectorConfig>,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Optional YAML file overriding the built-in brand knowledge base.
    #[serde(default)]
    pub knowledge_base_path: Option<String>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key. The detector stays
    /// registered but unavailable when the variable is unset.
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_detector_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut detectors = BTreeMap::new();
        detectors.insert(
            DetectorId::Tactics,
            DetectorConfig {
                enabled: true,
                weight: 0.4,
            },
        );
        detectors.insert(
            DetectorId::Urls,
            DetectorConfig {
                enabled: true,
                weight: 0.3,
            },
        );
        detectors.insert(
            DetectorId::Llm,
            DetectorConfig {
                enabled: true,
                weight: 0.3,
            },
        );
        detectors.insert(
            DetectorId::Knowledge,
            DetectorConfig {
                enabled: true,
                weight: 0.3,
            },
        );
        detectors.insert(
            DetectorId::BrandVisual,
            DetectorConfig {
                enabled: true,
                weight: 0.2,
            },
        );

        Self {
            threshold: default_threshold(),
            detector_timeout_seconds: default_detector_timeout(),
            detectors,
            llm: LlmConfig::default(),
            knowledge_base_path: None,
            logging: Some(LoggingConfig {
                level: "info".to_string(),
            }),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path}"))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("threshold must be within [0.0, 1.0], got {}", self.threshold);
        }
        for (id, detector) in &self.detectors {
            if detector.weight < 0.0 {
                anyhow::bail!("detector {id} has negative weight {}", detector.weight);
            }
        }
        Ok(())
    }

    /// Effective (enabled, weight) for one detector; unlisted detectors
    /// are disabled.
    pub fn detector(&self, id: DetectorId) -> (bool, f64) {
        self.detectors
            .get(&id)
            .map(|d| (d.enabled, d.weight))
            .unwrap_or((false, 0.0))
    }
}
