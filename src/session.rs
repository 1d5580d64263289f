use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{IntervaiewError, Result};
use crate::models::{ChatSettings, ConversationFile, ConversationTurn, SessionView};

/// One active conversation with its settings and balance.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    turns: Vec<ConversationTurn>,
    settings: ChatSettings,
    remaining_balance_usd: f64,
}

impl Session {
    pub fn new(system_prompt: impl Into<String>, remaining_balance_usd: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            turns: Vec::new(),
            settings: ChatSettings::with_prompt(system_prompt),
            remaining_balance_usd,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn remaining_balance_usd(&self) -> f64 {
        self.remaining_balance_usd
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn append_turn(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Applies the given flags. Turning memory off drops the history.
    pub fn update_settings(&mut self, guardrails_enabled: Option<bool>, memory_enabled: Option<bool>) {
        if let Some(guardrails) = guardrails_enabled {
            self.settings.guardrails_enabled = guardrails;
        }
        if let Some(memory) = memory_enabled {
            self.settings.memory_enabled = memory;
        }
        if !self.settings.memory_enabled {
            self.turns.clear();
        }
    }

    pub fn snapshot(&self) -> ConversationFile {
        ConversationFile::from_turns(&self.turns)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            created_at: self.created_at,
            settings: self.settings.clone(),
            remaining_balance_usd: self.remaining_balance_usd,
            turns: self.turns.clone(),
        }
    }
}

/// Sessions keyed by id, each behind its own lock so that actions on one
/// session run one at a time while other sessions proceed.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) -> Arc<Mutex<Session>> {
        let id = session.id();
        let entry = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, entry.clone());
        entry
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(IntervaiewError::SessionNotFound(id))
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(IntervaiewError::SessionNotFound(id))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
