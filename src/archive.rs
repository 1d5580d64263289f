use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{IntervaiewError, Result};
use crate::models::ConversationFile;

const EXTENSION: &str = "json";

/// Storage for saved conversations, addressed by name
#[async_trait]
pub trait ConversationArchive: Send + Sync {
    /// Write a conversation, replacing any existing one with the same name
    async fn save(&self, name: &str, snapshot: &ConversationFile) -> Result<()>;

    /// Names of all saved conversations
    async fn list(&self) -> Result<Vec<String>>;

    /// Read a conversation back
    async fn load(&self, name: &str) -> Result<ConversationFile>;

    /// Remove a conversation
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Characters that cannot appear in a conversation name, besides control characters.
const FORBIDDEN: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

/// Checks that a conversation name can be used verbatim as a file stem.
///
/// The name is the stem, so distinct names never share a file and every stem
/// `list` returns can be passed back to `load` and `delete`.
pub fn validate_name(name: &str) -> Result<&str> {
    let reason = if name.trim().is_empty() {
        Some("it is empty")
    } else if name.trim() != name {
        Some("it has leading or trailing whitespace")
    } else if name.starts_with('.') {
        Some("it starts with '.'")
    } else if name.chars().any(|c| c.is_control() || FORBIDDEN.contains(&c)) {
        Some("it contains a control character or one of / \\ < > : \" | ? *")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(IntervaiewError::InvalidInput(format!(
            "'{name}' is not a usable conversation name: {reason}"
        ))),
        None => Ok(name),
    }
}

/// One `<name>.json` file per conversation in a directory.
pub struct JsonFileArchive {
    dir: PathBuf,
}

impl JsonFileArchive {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.{EXTENSION}"))
    }
}

fn io_error(name: &str, source: std::io::Error) -> IntervaiewError {
    IntervaiewError::Archive {
        name: name.to_string(),
        source,
    }
}

#[async_trait]
impl ConversationArchive for JsonFileArchive {
    async fn save(&self, name: &str, snapshot: &ConversationFile) -> Result<()> {
        let stem = validate_name(name)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(stem, e))?;

        let json = serde_json::to_vec(snapshot)?;
        fs::write(self.path_for(stem), json)
            .await
            .map_err(|e| io_error(stem, e))?;

        tracing::info!(name = %stem, turns = snapshot.len(), "Conversation saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir.display().to_string(), e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            // Stray files that could not be loaded back by name are skipped
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if validate_name(stem).is_ok() => names.push(stem.to_string()),
                _ => tracing::debug!(path = %path.display(), "Skipping unaddressable archive file"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn load(&self, name: &str) -> Result<ConversationFile> {
        let stem = validate_name(name)?;
        let bytes = fs::read(self.path_for(stem))
            .await
            .map_err(|e| io_error(stem, e))?;

        let file: ConversationFile =
            serde_json::from_slice(&bytes).map_err(|e| IntervaiewError::MalformedConversation {
                name: stem.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(reason) = file.length_mismatch() {
            return Err(IntervaiewError::MalformedConversation {
                name: stem.to_string(),
                reason,
            });
        }
        Ok(file)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let stem = validate_name(name)?;
        fs::remove_file(self.path_for(stem))
            .await
            .map_err(|e| io_error(stem, e))?;
        tracing::info!(name = %stem, "Conversation deleted");
        Ok(())
    }
}
