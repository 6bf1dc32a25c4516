use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use mentorlink_ai::{AiError, AiProvider, OpenAiCompatibleClient};
use mentorlink_auth::Authenticator;
use mentorlink_config::AppConfig;
use mentorlink_database::initialize_database;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Install the global fmt subscriber. `RUST_LOG` overrides the default
    /// `info` filter.
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub ai: Option<Arc<dyn AiProvider>>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database).await?;
        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());
        let ai = build_ai_provider(config)?;

        Ok(Self {
            db_pool,
            authenticator,
            ai,
        })
    }
}

/// The assistant is optional: without an API key the AI routes answer 503
/// and everything else keeps working.
fn build_ai_provider(config: &AppConfig) -> Result<Option<Arc<dyn AiProvider>>> {
    match OpenAiCompatibleClient::from_config(&config.ai) {
        Ok(client) => {
            info!(
                base_url = %config.ai.base_url,
                chat_model = %config.ai.chat_model,
                embedding_model = %config.ai.embedding_model,
                "AI provider ready"
            );
            Ok(Some(Arc::new(client)))
        }
        Err(AiError::NotConfigured) => {
            warn!("no AI API key configured, assistant features are disabled");
            Ok(None)
        }
        Err(error) => Err(anyhow::anyhow!("failed to initialise AI provider: {error}")),
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
