use serde::Deserialize;
use std::path::Path;

use crate::core::RiskTier;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub blocklist: BlocklistConfig,
    pub vector: VectorConfig,
    pub openai: OpenAiConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectionConfig {
    pub quality: QualityBands,
    pub thresholds: StatusThresholds,
    /// On the 0-10 scale; the [0,1] quality score is multiplied by 10 before comparing.
    pub min_acceptable_score: f64,
    pub top_k: usize,
    pub enable_openai: bool,
    pub max_openai_calls_per_day: u32,
    /// Daily cost ceiling in USD.
    pub openai_cost_limit: f64,
    pub single_call_cost_limit: f64,
    pub max_search_attempts: u32,
    pub max_input_length: usize,
    /// Lowest final tier written back into the vector index.
    pub feedback_min_tier: RiskTier,
    /// Run blocklist and embed+search concurrently for URLs.
    pub parallel_url_signals: bool,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct QualityBands {
    pub min_length: usize,
    pub min_acceptable_length: usize,
    pub min_good_length: usize,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct StatusThresholds {
    pub danger: f32,
    pub warning: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BlocklistConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub client_id: String,
    pub client_version: String,
    pub threat_types: Vec<String>,
    pub platform_types: Vec<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorConfig {
    pub qdrant_host: String,
    pub collection: String,
    pub embedding_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            quality: QualityBands::default(),
            thresholds: StatusThresholds::default(),
            min_acceptable_score: 5.0,
            top_k: 5,
            enable_openai: true,
            max_openai_calls_per_day: 100,
            openai_cost_limit: 0.01,
            single_call_cost_limit: 0.001,
            max_search_attempts: 2,
            max_input_length: 2000,
            feedback_min_tier: RiskTier::Danger,
            parallel_url_signals: false,
        }
    }
}

impl Default for QualityBands {
    fn default() -> Self {
        Self {
            min_length: 10,
            min_acceptable_length: 20,
            min_good_length: 30,
        }
    }
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            danger: 0.5,
            warning: 0.3,
        }
    }
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            base_url: "https://safebrowsing.googleapis.com".into(),
            api_key: None,
            client_id: "scamradar".into(),
            client_version: "1.0".into(),
            threat_types: vec![
                "MALWARE".into(),
                "SOCIAL_ENGINEERING".into(),
                "UNWANTED_SOFTWARE".into(),
                "POTENTIALLY_HARMFUL_APPLICATION".into(),
            ],
            platform_types: vec!["ANY_PLATFORM".into()],
            timeout_ms: 3_000,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            qdrant_host: "http://127.0.0.1:6333".into(),
            collection: "phishing_cases".into(),
            embedding_url: "http://127.0.0.1:8000/v1/embed".into(),
            timeout_ms: 5_000,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            max_tokens: 500,
            temperature: 0.1,
            timeout_ms: 15_000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/detection_history.db".into(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if file doesn't exist.
    /// Secrets and endpoints from the environment (or `.env`) override the file.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let mut config = Self::load_file(path.as_ref());
        config.apply_env();
        config
    }

    fn load_file(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    fn apply_env(&mut self) {
        let _ = dotenv::dotenv();
        if let Some(key) = env_nonempty("SAFE_BROWSING_API_KEY") {
            self.blocklist.api_key = Some(key);
        }
        if let Some(key) = env_nonempty("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(host) = env_nonempty("QDRANT_HOST") {
            self.vector.qdrant_host = host;
        }
        if let Some(url) = env_nonempty("EMBEDDING_API_URL") {
            self.vector.embedding_url = url;
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    dotenv::var(key).ok().filter(|v| !v.trim().is_empty())
}
