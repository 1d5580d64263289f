use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::archive::{ConversationArchive, JsonFileArchive};
use crate::completion::CompletionBuilder;
use crate::config::Config;
use crate::error::{IntervaiewError, Result};
use crate::gateway::QueryGateway;
use crate::models::{ConversationTurn, SavedConversation, SessionView, SettingsUpdate};
use crate::rates::{CurrencyApi, RateCache, RateSource};
use crate::session::{Session, SessionRegistry};
use crate::stats::SessionStats;
use crate::transport::{SnowflakeTransport, Warehouse};

const REMAINING_BALANCE_QUERY: &str = "SELECT MAX_BY(FREE_USAGE_BALANCE, DATE) AS REMAINING_CREDITS FROM SNOWFLAKE.ORGANIZATION_USAGE.REMAINING_BALANCE_DAILY;";

/// Coordinates every user action of the chat shell.
#[derive(Clone)]
pub struct ChatService {
    config: Arc<Config>,
    gateway: Arc<QueryGateway>,
    completions: Arc<CompletionBuilder>,
    rates: Arc<RateCache>,
    archive: Arc<dyn ConversationArchive>,
    sessions: Arc<SessionRegistry>,
}

impl ChatService {
    /// Create the service against Snowflake, the currency API and the chats directory
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let warehouse = Arc::new(SnowflakeTransport::new(&config)?);
        let rate_source = Arc::new(CurrencyApi::new(
            config.currency.api_url.clone(),
            config.currency.currency.clone(),
        ));
        let archive = Arc::new(JsonFileArchive::new(&config.archive.dir));
        Ok(Self::with_parts(config, warehouse, rate_source, archive))
    }

    pub fn with_parts(
        config: Arc<Config>,
        warehouse: Arc<dyn Warehouse>,
        rate_source: Arc<dyn RateSource>,
        archive: Arc<dyn ConversationArchive>,
    ) -> Self {
        let gateway = Arc::new(QueryGateway::new(warehouse));
        let completions = Arc::new(CompletionBuilder::new(
            gateway.clone(),
            config.cortex.model.clone(),
        ));
        let rates = Arc::new(RateCache::new(
            rate_source,
            config.rate_ttl(),
            config.currency.fallback_rate,
        ));
        Self {
            config,
            gateway,
            completions,
            rates,
            archive,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gateway(&self) -> &QueryGateway {
        &self.gateway
    }

    /// Remaining free-usage balance in USD, or the configured fallback
    async fn remaining_balance_usd(&self) -> f64 {
        let fallback = self.config.cost.fallback_balance_usd;
        match self.gateway.execute_scalar(REMAINING_BALANCE_QUERY).await {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Unparseable remaining balance '{}', using {}", raw, fallback);
                fallback
            }),
            None => fallback,
        }
    }

    pub async fn open_session(&self) -> SessionView {
        let balance = self.remaining_balance_usd().await;
        let session = Session::new(self.config.cortex.system_prompt.clone(), balance);
        let view = session.view();
        self.sessions.insert(session).await;
        tracing::info!(session = %view.id, balance, "Session opened");
        view
    }

    pub async fn close_session(&self, id: Uuid) -> Result<()> {
        self.sessions.remove(id).await?;
        tracing::info!(session = %id, "Session closed");
        Ok(())
    }

    pub async fn session(&self, id: Uuid) -> Result<SessionView> {
        let entry = self.sessions.get(id).await?;
        let session = entry.lock().await;
        Ok(session.view())
    }

    /// Sends `message` and records the turn once the completion succeeds.
    pub async fn send_message(&self, id: Uuid, message: &str) -> Result<ConversationTurn> {
        if message.trim().is_empty() {
            return Err(IntervaiewError::InvalidInput(
                "message cannot be empty".to_string(),
            ));
        }

        let entry = self.sessions.get(id).await?;
        let mut session = entry.lock().await;

        let started = Instant::now();
        let completion = self.completions.complete(message, &session).await?;
        let elapsed = started.elapsed().as_secs();

        let turn = ConversationTurn {
            user_input: message.to_string(),
            assistant_response: completion.text,
            response_time_seconds: elapsed,
            total_tokens: completion.total_tokens,
        };
        session.append_turn(turn.clone());
        tracing::info!(
            session = %id,
            tokens = turn.total_tokens,
            seconds = elapsed,
            "Turn recorded"
        );
        Ok(turn)
    }

    pub async fn clear_history(&self, id: Uuid) -> Result<()> {
        let entry = self.sessions.get(id).await?;
        let mut session = entry.lock().await;
        if session.is_empty() {
            return Err(IntervaiewError::InvalidInput(
                "There are no messages in the chat history to clear.".to_string(),
            ));
        }
        session.clear();
        Ok(())
    }

    pub async fn update_settings(&self, id: Uuid, update: &SettingsUpdate) -> Result<SessionView> {
        let entry = self.sessions.get(id).await?;
        let mut session = entry.lock().await;
        session.update_settings(update.guardrails_enabled, update.memory_enabled);
        tracing::info!(
            session = %id,
            guardrails = session.settings().guardrails_enabled,
            memory = session.settings().memory_enabled,
            "Chat settings updated"
        );
        Ok(session.view())
    }

    pub async fn stats(&self, id: Uuid) -> Result<SessionStats> {
        let entry = self.sessions.get(id).await?;
        let session = entry.lock().await;
        Ok(SessionStats::compute(
            session.turns(),
            session.remaining_balance_usd(),
            &self.config.cost,
            &self.rates,
            &self.config.currency.symbol,
        )
        .await)
    }

    pub async fn save_conversation(&self, id: Uuid, name: &str) -> Result<()> {
        let entry = self.sessions.get(id).await?;
        let session = entry.lock().await;
        if session.is_empty() {
            return Err(IntervaiewError::InvalidInput(
                "There are no messages in the chat history to save.".to_string(),
            ));
        }
        self.archive.save(name, &session.snapshot()).await
    }

    pub async fn list_conversations(&self) -> Result<Vec<String>> {
        self.archive.list().await
    }

    pub async fn load_conversation(&self, name: &str) -> Result<SavedConversation> {
        let file = self.archive.load(name).await?;
        Ok(SavedConversation {
            name: name.to_string(),
            turns: file.turns(),
        })
    }

    pub async fn delete_conversation(&self, name: &str) -> Result<()> {
        self.archive.delete(name).await
    }
}
