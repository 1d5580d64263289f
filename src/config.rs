use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for IntervAIew
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub snowflake: SnowflakeConfig,
    pub cortex: CortexConfig,
    pub currency: CurrencyConfig,
    pub cost: CostConfig,
    pub archive: ArchiveConfig,
    pub reveal: RevealConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowflakeConfig {
    pub username: String,
    pub account: String,
    pub password: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    /// Overrides `https://<account>.snowflakecomputing.com`
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CortexConfig {
    pub model: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub api_url: String,
    /// Key looked up under `data` in the rate service response
    pub currency: String,
    pub symbol: String,
    pub fallback_rate: f64,
    pub ttl_seconds: u64,
}

/// Cost heuristic: credits are charged per token and per second of response
/// time, then priced in USD per credit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostConfig {
    pub credits_per_token: f64,
    pub credits_per_second: f64,
    pub usd_per_credit: f64,
    pub fallback_balance_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RevealConfig {
    pub chars_per_frame: usize,
    pub frame_delay_ms: u64,
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a valid config - never fails
    pub fn load() -> Self {
        let env_paths = ["../.env", ".env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::warn!(
                "No .env file found in any expected location - continuing with env vars only"
            );
        }

        let config_path =
            env::var("INTERVAIEW_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::from_yaml(&contents) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", config_path);
                        config
                    }
                    Err(e) => {
                        tracing::error!("{} in {} - using defaults", e, config_path);
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::warn!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    /// Parse a YAML document into a config
    pub fn from_yaml(contents: &str) -> crate::error::Result<Self> {
        serde_yaml::from_str::<Config>(contents).map_err(|e| {
            crate::error::IntervaiewError::Config(format!("Failed to parse config: {e}"))
        })
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = env::var("INTERVAIEW_BIND") {
            self.server.bind = bind;
        }
        if let Ok(token) = env::var("INTERVAIEW_BEARER_TOKEN") {
            self.server.bearer_token = Some(token).filter(|t| !t.is_empty());
        }

        // Snowflake credentials
        if let Ok(username) = env::var("SNOWFLAKE_USERNAME") {
            self.snowflake.username = username;
        }
        if let Ok(account) = env::var("SNOWFLAKE_ACCOUNT") {
            self.snowflake.account = account;
        }
        if let Ok(password) = env::var("SNOWFLAKE_PASSWORD") {
            self.snowflake.password = password;
        }
        if let Ok(warehouse) = env::var("SNOWFLAKE_WAREHOUSE") {
            self.snowflake.warehouse = warehouse;
        }
        if let Ok(database) = env::var("SNOWFLAKE_DATABASE") {
            self.snowflake.database = database;
        }
        if let Ok(schema) = env::var("SNOWFLAKE_SCHEMA") {
            self.snowflake.schema = schema;
        }
        if let Ok(base_url) = env::var("SNOWFLAKE_BASE_URL") {
            self.snowflake.base_url = Some(base_url);
        }

        // Cortex overrides
        if let Ok(model) = env::var("CORTEX_MODEL") {
            self.cortex.model = model;
        }
        if let Ok(prompt) = env::var("INTERVAIEW_SYSTEM_PROMPT") {
            self.cortex.system_prompt = prompt;
        }

        if let Ok(url) = env::var("CURRENCY_API_URL") {
            self.currency.api_url = url;
        }
        if let Ok(dir) = env::var("INTERVAIEW_CHATS_DIR") {
            self.archive.dir = dir;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.snowflake.account.is_empty() || self.snowflake.username.is_empty() {
            return Err(
                "SNOWFLAKE_ACCOUNT and SNOWFLAKE_USERNAME must be set for completions".into(),
            );
        }
        if self.currency.api_url.is_empty() {
            return Err("CURRENCY_API_URL is empty; the fallback rate will be used".into());
        }
        if self.currency.fallback_rate <= 0.0 {
            return Err("currency.fallback_rate must be positive".into());
        }
        if self.currency.ttl_seconds == 0 {
            return Err("currency.ttl_seconds cannot be 0".into());
        }
        if self.reveal.chars_per_frame == 0 {
            return Err("reveal.chars_per_frame cannot be 0".into());
        }

        let c = self.cost;
        for (name, val) in [
            ("credits_per_token", c.credits_per_token),
            ("credits_per_second", c.credits_per_second),
            ("usd_per_credit", c.usd_per_credit),
        ] {
            if val < 0.0 {
                return Err(format!("cost.{name} cannot be negative").into());
            }
        }

        Ok(())
    }

    /// Base URL of the Snowflake account endpoints
    pub fn snowflake_base_url(&self) -> String {
        match &self.snowflake.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.snowflake.account),
        }
    }

    /// Get the rate staleness window as Duration
    pub fn rate_ttl(&self) -> Duration {
        Duration::from_secs(self.currency.ttl_seconds)
    }

    /// Get the reveal frame delay as Duration
    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal.frame_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8501".to_string(),
                bearer_token: None,
            },
            snowflake: SnowflakeConfig {
                username: String::new(),
                account: String::new(),
                password: String::new(),
                warehouse: "COMPUTE_WH".to_string(),
                database: "SNOWFLAKE".to_string(),
                schema: "CORTEX".to_string(),
                base_url: None,
            },
            cortex: CortexConfig {
                model: "openai-gpt-4.1".to_string(),
                system_prompt: "You are IntervAIew, an interview preparation assistant."
                    .to_string(),
            },
            currency: CurrencyConfig {
                api_url: String::new(),
                currency: "INR".to_string(),
                symbol: "₹".to_string(),
                fallback_rate: 85.4,
                ttl_seconds: 3600,
            },
            cost: CostConfig {
                credits_per_token: 1.4 / 1_000_000.0,
                credits_per_second: 1.0 / 3600.0,
                usd_per_credit: 4.0,
                fallback_balance_usd: 400.0,
            },
            archive: ArchiveConfig {
                dir: "chats".to_string(),
            },
            reveal: RevealConfig {
                chars_per_frame: 4,
                frame_delay_ms: 3,
            },
        }
    }
}
