use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Cortex chat message format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

// Cortex COMPLETE options object
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOptions {
    pub guardrails: bool,
}

// Cortex COMPLETE response format
#[derive(Debug, Deserialize)]
pub struct CortexResponse {
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub messages: String,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub total_tokens: u64,
}

/// One user message, its response, and the round-trip metadata.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub user_input: String,
    pub assistant_response: String,
    pub response_time_seconds: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub guardrails_enabled: bool,
    pub memory_enabled: bool,
    pub system_prompt: String,
}

impl ChatSettings {
    pub fn with_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            guardrails_enabled: false,
            memory_enabled: true,
            system_prompt: system_prompt.into(),
        }
    }
}

/// Partial settings change; absent fields keep their current value.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub guardrails_enabled: Option<bool>,
    #[serde(default)]
    pub memory_enabled: Option<bool>,
}

/// On-disk conversation: four parallel sequences, index `i` is one turn.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ConversationFile {
    pub user_input: Vec<String>,
    pub assistant_response: Vec<String>,
    pub response_time_in_seconds: Vec<u64>,
    pub total_tokens: Vec<u64>,
}

impl ConversationFile {
    pub fn from_turns(turns: &[ConversationTurn]) -> Self {
        let mut file = Self::default();
        for turn in turns {
            file.user_input.push(turn.user_input.clone());
            file.assistant_response.push(turn.assistant_response.clone());
            file.response_time_in_seconds
                .push(turn.response_time_seconds);
            file.total_tokens.push(turn.total_tokens);
        }
        file
    }

    pub fn len(&self) -> usize {
        self.user_input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_input.is_empty()
    }

    /// Returns a description of the first length mismatch, if any.
    pub fn length_mismatch(&self) -> Option<String> {
        let n = self.user_input.len();
        let lengths = [
            ("assistant_response", self.assistant_response.len()),
            ("response_time_in_seconds", self.response_time_in_seconds.len()),
            ("total_tokens", self.total_tokens.len()),
        ];
        lengths
            .iter()
            .find(|(_, len)| *len != n)
            .map(|(field, len)| format!("user_input has {n} entries but {field} has {len}"))
    }

    /// Zips the sequences back into turns. Callers check `length_mismatch` first.
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.user_input
            .iter()
            .zip(&self.assistant_response)
            .zip(&self.response_time_in_seconds)
            .zip(&self.total_tokens)
            .map(|(((user, assistant), secs), tokens)| ConversationTurn {
                user_input: user.clone(),
                assistant_response: assistant.clone(),
                response_time_seconds: *secs,
                total_tokens: *tokens,
            })
            .collect()
    }
}

/// Read-only view of a session returned to clients
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub settings: ChatSettings,
    pub remaining_balance_usd: f64,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveConversationRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SavedConversation {
    pub name: String,
    pub turns: Vec<ConversationTurn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(i: u64) -> ConversationTurn {
        ConversationTurn {
            user_input: format!("question {i}"),
            assistant_response: format!("answer {i}"),
            response_time_seconds: i,
            total_tokens: 10 * i,
        }
    }

    #[test]
    fn test_conversation_file_uses_original_keys() {
        let file = ConversationFile::from_turns(&[turn(1)]);
        let value = serde_json::to_value(&file).unwrap();
        let mut keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "assistant_response",
                "response_time_in_seconds",
                "total_tokens",
                "user_input"
            ]
        );
    }

    #[test]
    fn test_turns_preserve_index_alignment() {
        let turns = vec![turn(1), turn(2), turn(3)];
        let file = ConversationFile::from_turns(&turns);
        assert_eq!(file.len(), 3);
        assert!(file.length_mismatch().is_none());
        assert_eq!(file.turns(), turns);
    }

    #[test]
    fn test_length_mismatch_reported() {
        let mut file = ConversationFile::from_turns(&[turn(1), turn(2)]);
        file.total_tokens.pop();
        let reason = file.length_mismatch().unwrap();
        assert!(reason.contains("total_tokens"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ChatSettings::with_prompt("prompt");
        assert!(!settings.guardrails_enabled);
        assert!(settings.memory_enabled);
    }
}
