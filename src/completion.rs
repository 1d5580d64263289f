use serde::Serialize;
use std::sync::Arc;

use crate::error::{IntervaiewError, Result};
use crate::gateway::QueryGateway;
use crate::models::{ChatMessage, CompletionOptions, CortexResponse};
use crate::session::Session;

/// Request sent to `SNOWFLAKE.CORTEX.COMPLETE`.
#[derive(Debug, Serialize, Clone)]
pub struct CompletionPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: CompletionOptions,
}

impl CompletionPayload {
    /// Renders the payload as the backend SQL call.
    ///
    /// Message text is quoted by the JSON encoder; the JSON documents are then
    /// embedded as SQL string literals.
    pub fn to_sql(&self) -> Result<String> {
        let messages = serde_json::to_string(&self.messages)?;
        let options = serde_json::to_string(&self.options)?;
        Ok(format!(
            "SELECT SNOWFLAKE.CORTEX.COMPLETE({}, PARSE_JSON({}), PARSE_JSON({})) AS RESPONSE;",
            sql_literal(&self.model),
            sql_literal(&messages),
            sql_literal(&options),
        ))
    }
}

/// Quotes `text` as a Snowflake single-quoted string literal.
pub fn sql_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Decoded completion: the assistant text and the total token count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u64,
}

pub struct CompletionBuilder {
    gateway: Arc<QueryGateway>,
    model: String,
}

impl CompletionBuilder {
    pub fn new(gateway: Arc<QueryGateway>, model: String) -> Self {
        Self { gateway, model }
    }

    /// System prompt, then history when memory is on, then the new message.
    pub fn build_payload(&self, user_message: &str, session: &Session) -> CompletionPayload {
        let settings = session.settings();
        let mut messages = vec![ChatMessage::system(settings.system_prompt.clone())];

        if settings.memory_enabled {
            for turn in session.turns() {
                messages.push(ChatMessage::user(turn.user_input.clone()));
                messages.push(ChatMessage::assistant(turn.assistant_response.clone()));
            }
        }
        messages.push(ChatMessage::user(user_message));

        CompletionPayload {
            model: self.model.clone(),
            messages,
            options: CompletionOptions {
                guardrails: settings.guardrails_enabled,
            },
        }
    }

    pub async fn complete(&self, user_message: &str, session: &Session) -> Result<Completion> {
        let payload = self.build_payload(user_message, session);
        let sql = payload.to_sql()?;
        tracing::debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            guardrails = payload.options.guardrails,
            "Requesting completion"
        );

        let scalar = self.gateway.execute_scalar(&sql).await.ok_or_else(|| {
            IntervaiewError::Completion("no response from the warehouse".to_string())
        })?;
        decode_response(&scalar)
    }
}

/// Extracts the assistant text and token usage from the COMPLETE result.
pub fn decode_response(scalar: &str) -> Result<Completion> {
    let response: CortexResponse = serde_json::from_str(scalar).map_err(|e| {
        IntervaiewError::Completion(format!("unexpected COMPLETE response: {e}"))
    })?;

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        IntervaiewError::Completion("COMPLETE returned empty choices".to_string())
    })?;

    Ok(Completion {
        text: choice.messages,
        total_tokens: response.usage.total_tokens,
    })
}
