use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "mentorlink.toml",
    "config/mentorlink.toml",
    "../mentorlink.toml",
    "../config/mentorlink.toml",
];

/// Environment variable consulted for the AI key when the config leaves it unset.
pub const AI_API_KEY_ENV: &str = "MENTORLINK_AI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub gamification: GamificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://mentorlink.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
            min_password_length: Self::default_min_password_length(),
        }
    }
}

impl AuthConfig {
    fn default_session_ttl() -> u64 {
        7 * 86_400
    }

    const fn default_min_password_length() -> usize {
        8
    }
}

/// Settings for the OpenAI-compatible provider used for chat and embeddings.
///
/// ```
/// use mentorlink_config::AiConfig;
///
/// let ai = AiConfig::default();
/// assert_eq!(ai.base_url, "https://openrouter.ai/api/v1");
/// assert_eq!(ai.request_timeout_seconds, 30);
/// assert!(ai.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "AiConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "AiConfig::default_chat_model")]
    pub chat_model: String,
    #[serde(default = "AiConfig::default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "AiConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "AiConfig::default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "AiConfig::default_history_window")]
    pub history_window: usize,
}

impl AiConfig {
    fn default_base_url() -> String {
        "https://openrouter.ai/api/v1".to_string()
    }

    fn default_chat_model() -> String {
        "openai/gpt-4o-mini".to_string()
    }

    fn default_embedding_model() -> String {
        "openai/text-embedding-3-small".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    fn default_system_prompt() -> String {
        "You are a supportive mentorship assistant. Help the user reflect on their \
         learning goals and suggest concrete next steps."
            .to_string()
    }

    const fn default_history_window() -> usize {
        20
    }

    /// Configured key, falling back to [`AI_API_KEY_ENV`].
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(AI_API_KEY_ENV).ok())
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Self::default_base_url(),
            chat_model: Self::default_chat_model(),
            embedding_model: Self::default_embedding_model(),
            request_timeout_seconds: Self::default_request_timeout(),
            system_prompt: Self::default_system_prompt(),
            history_window: Self::default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Buffer size of every room broadcast channel.
    pub channel_capacity: usize,
    /// Buffer size of the per-socket outbound queue.
    pub outbound_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            outbound_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationConfig {
    pub points_per_mentorship: i64,
    pub points_per_session: i64,
    pub points_per_goal: i64,
    pub points_per_review: i64,
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            points_per_mentorship: 50,
            points_per_session: 20,
            points_per_goal: 30,
            points_per_review: 10,
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use mentorlink_config::load;
///
/// std::env::remove_var("MENTORLINK_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let session_ttl_i64 = i64::try_from(defaults.auth.session_ttl_seconds).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.session_ttl_seconds", session_ttl_i64)?
        .set_default("ai.base_url", defaults.ai.base_url.clone())?
        .set_default("ai.chat_model", defaults.ai.chat_model.clone())?
        .set_default("ai.embedding_model", defaults.ai.embedding_model.clone())?
        .set_default(
            "ai.request_timeout_seconds",
            i64::try_from(defaults.ai.request_timeout_seconds).unwrap_or(i64::MAX),
        )?;

    let environment_overrides = config::Environment::with_prefix("MENTORLINK").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("MENTORLINK_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via MENTORLINK_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    debug!(
        http = %format!("{}:{}", config.http.address, config.http.port),
        database = %config.database.url,
        ai_configured = config.ai.api_key.is_some(),
        "loaded backend configuration"
    );
    Ok(config)
}
