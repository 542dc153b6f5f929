//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// SeerLord configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub skills: SkillConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

/// Tuning knobs for skill retrieval and evolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    /// Minimum similarity score for a vector candidate to count as a match
    pub min_score: f32,
    /// Number of vector candidates fetched per retrieval
    pub max_candidates: usize,
    /// Similarity threshold for related-skill context lookups
    pub related_threshold: f32,
    /// Whether retrieval may trigger on-demand skill evolution
    pub evolution_enabled: bool,
    /// Average rating at or below which feedback triggers refinement
    pub feedback_refine_threshold: f64,
    /// Minimum number of reviews before feedback can trigger refinement
    pub feedback_min_reviews: usize,
}

/// Execution-graph bounds and throttles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Hard cap on node executions per graph invocation
    pub step_budget: u32,
    /// Maximum critique/refine rounds before a graph must terminate
    pub max_critique_rounds: u32,
    /// Per-task wall-clock timeout when dispatching a plan
    pub task_timeout_secs: u64,
    /// Concurrency cap for independent sub-tasks within one plugin run
    pub subtask_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: None,
                default_model: "anthropic/claude-sonnet-4-20250514".to_string(),
                embedding_model: "openai/text-embedding-3-small".to_string(),
                temperature: 0.7,
                max_tokens: 8192,
                timeout_secs: 120,
            },
            skills: SkillConfig {
                min_score: 0.7,
                max_candidates: 3,
                related_threshold: 0.6,
                evolution_enabled: true,
                feedback_refine_threshold: 3.0,
                feedback_min_reviews: 3,
            },
            graph: GraphConfig {
                step_budget: 64,
                max_critique_rounds: 3,
                task_timeout_secs: 300,
                subtask_concurrency: 4,
            },
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("SEERLORD_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix = &key[key.len() - 4..];
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SEERLORD_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("seerlord")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        if !(0.0..=1.0).contains(&self.skills.min_score) {
            return Err(anyhow!("skills.min_score must be within 0.0..=1.0"));
        }
        if self.skills.max_candidates < 3 {
            return Err(anyhow!("skills.max_candidates must be at least 3"));
        }
        if self.graph.max_critique_rounds == 0 || self.graph.step_budget == 0 {
            return Err(anyhow!("graph bounds must be non-zero"));
        }
        if self.graph.subtask_concurrency == 0 {
            return Err(anyhow!("graph.subtask_concurrency must be non-zero"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.embedding_model" => Ok(self.llm.embedding_model.clone()),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),
            "skills.min_score" => Ok(self.skills.min_score.to_string()),
            "skills.max_candidates" => Ok(self.skills.max_candidates.to_string()),
            "skills.evolution_enabled" => Ok(self.skills.evolution_enabled.to_string()),
            "graph.step_budget" => Ok(self.graph.step_budget.to_string()),
            "graph.max_critique_rounds" => Ok(self.graph.max_critique_rounds.to_string()),
            "graph.task_timeout_secs" => Ok(self.graph.task_timeout_secs.to_string()),
            "graph.subtask_concurrency" => Ok(self.graph.subtask_concurrency.to_string()),
            _ => Err(anyhow!("Unknown config key: {}", key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.skills.max_candidates, 3);
        assert!(config.skills.evolution_enabled);
    }

    #[test]
    fn test_stored_api_key_rejected() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut config = Config::default();
        config.graph.max_critique_rounds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.skills.min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_get_known_keys() {
        let config = Config::default();
        assert_eq!(config.get("graph.max_critique_rounds").unwrap(), "3");
        assert_eq!(config.get("skills.min_score").unwrap(), "0.7");
        assert!(config.get("nope.nope").is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.llm.default_model, config.llm.default_model);
        assert_eq!(parsed.graph.step_budget, config.graph.step_budget);
    }
}
