use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{info, warn};

use meshitomo_agent::{
    AccountActionHandler, AgentRuntime, BillingClient, CandidateSelector, Enricher,
    InMemorySessionStore, QuotaLedger, RecommendationPipeline, StructuredExtractor,
};
use meshitomo_core::config::{AppConfig, ConfigError, LoadOptions};
use meshitomo_core::plans::PlanId;
use meshitomo_core::{Lexicons, PlanCatalog};
use meshitomo_db::{connect_with_settings, migrations, DbPool, SqlUserRepository};
use meshitomo_line::client::ReplyChannel;

use crate::billing::StripeBilling;
use crate::catalog::HotpepperCatalog;
use crate::health;
use crate::line_api::{LineApiClient, PushNotifier};
use crate::llm::OpenAiChatClient;
use crate::webhook::{self, WebhookState};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    reply_channel: Arc<dyn ReplyChannel>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("collaborator client construction failed: {0}")]
    Client(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "database connected and migrated"
    );

    let user_repo = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let llm = Arc::new(OpenAiChatClient::from_config(&config.llm).map_err(BootstrapError::Client)?);
    let catalog =
        Arc::new(HotpepperCatalog::from_config(&config.hotpepper).map_err(BootstrapError::Client)?);
    let reply_channel: Arc<dyn ReplyChannel> =
        Arc::new(LineApiClient::from_config(&config.line).map_err(BootstrapError::Client)?);

    // Billing is optional at startup: without credentials the bot still
    // recommends, and plan flows answer with a configuration error.
    let billing: Arc<dyn BillingClient> = match StripeBilling::from_config(&config.billing) {
        Ok(client) => Arc::new(client),
        Err(reason) => {
            warn!(
                event_name = "system.bootstrap.billing_unconfigured",
                correlation_id = "bootstrap",
                reason = %reason,
                "billing client not configured; plan flows will be unavailable"
            );
            Arc::new(UnconfiguredBilling)
        }
    };

    let sessions = InMemorySessionStore::shared();
    let plan_catalog = PlanCatalog::default();

    let pipeline = RecommendationPipeline::new(
        StructuredExtractor::new(llm.clone()),
        CandidateSelector::new(llm.clone(), config.recommend.pick_limit),
        Enricher::new(llm),
        catalog,
        sessions.clone(),
    );
    let runtime = AgentRuntime::new(
        Lexicons::default(),
        QuotaLedger::new(user_repo.clone(), plan_catalog.clone()),
        pipeline,
        AccountActionHandler::new(user_repo, billing, plan_catalog),
        sessions,
        Arc::new(PushNotifier::new(reply_channel.clone())),
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime), reply_channel })
}

impl Application {
    pub async fn serve(self) -> Result<()> {
        let state = WebhookState {
            runtime: self.runtime.clone(),
            reply_channel: self.reply_channel.clone(),
            line_channel_secret: self.config.line.channel_secret.expose_secret().to_string(),
            stripe_webhook_secret: self.config.billing.webhook_secret.clone(),
        };
        let router = webhook::router(state).merge(health::router(self.db_pool.clone()));

        let address = format!("{}:{}", self.config.server.bind_address, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&address).await?;
        info!(
            event_name = "system.server.listening",
            correlation_id = "bootstrap",
            bind_address = %address,
            "webhook listener bound"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        Ok(())
    }
}

/// Stands in when no billing credentials are configured: every link
/// request fails with an operator-actionable message.
struct UnconfiguredBilling;

#[async_trait]
impl BillingClient for UnconfiguredBilling {
    async fn checkout_link(&self, _user_id: &str, _plan_id: &PlanId) -> Result<String> {
        Err(anyhow!("billing.api_key is not configured"))
    }

    async fn portal_link(&self, _customer_ref: &str) -> Result<String> {
        Err(anyhow!("billing.api_key is not configured"))
    }
}

#[cfg(test)]
mod tests {
    use meshitomo_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use super::{bootstrap_with_config, BootstrapError};

    fn test_config(database_url: &str) -> AppConfig {
        AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                line_channel_secret: Some("test-channel-secret".to_string()),
                line_channel_access_token: Some("test-access-token".to_string()),
                llm_api_key: Some("sk-test".to_string()),
                hotpepper_api_key: Some("hp-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("test config should validate")
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_line_credentials() {
        let result = super::bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_api_key: Some("sk-test".to_string()),
                hotpepper_api_key: Some("hp-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("missing line credentials should fail").to_string();
        assert!(message.contains("line.channel_secret"));
    }

    #[tokio::test]
    async fn bootstrap_prepares_schema_and_runtime() {
        let app = bootstrap_with_config(test_config("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'users'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("users table should exist after bootstrap");
        assert_eq!(table_count, 1);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_unconnectable_database() {
        let result =
            bootstrap_with_config(test_config("sqlite:///nonexistent-dir/meshitomo.db")).await;
        assert!(matches!(result, Err(BootstrapError::DatabaseConnect(_))));
    }
}
