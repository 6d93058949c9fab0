//! Directory-per-chat persistence.
//!
//! State writes go through a temporary file and a rename so a crash mid-write
//! never leaves a truncated `state.json` behind.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::{StoreError, StoreResult};
use crate::record::ChatRecord;

const STATE_FILE: &str = "state.json";
const LOG_FILE: &str = "messages.log";

/// Timestamp layout of conversation log lines (UTC, second precision).
const LOG_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Filesystem-backed store of chat records and conversation logs.
#[derive(Debug, Clone)]
pub struct ChatStore {
    root: PathBuf,
}

impl ChatStore {
    /// Open the store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(&root, e))?;
        debug!(root = %root.display(), "chat store opened");
        Ok(Self { root })
    }

    /// Root directory holding one sub-directory per chat.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a single chat.
    pub fn chat_dir(&self, chat_id: &str) -> StoreResult<PathBuf> {
        validate_chat_id(chat_id)?;
        Ok(self.root.join(chat_id))
    }

    /// Ids of every chat with a directory under the root, sorted.
    #[instrument(skip(self))]
    pub async fn list_chats(&self) -> StoreResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| StoreError::io(entry.path(), e))?
                .is_dir();
            if is_dir && let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Load a chat's state record.
    #[instrument(skip(self))]
    pub async fn load(&self, chat_id: &str) -> StoreResult<ChatRecord> {
        let path = self.chat_dir(chat_id)?.join(STATE_FILE);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    chat_id: chat_id.to_string(),
                });
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        Ok(serde_json::from_str(&data)?)
    }

    /// Write a chat's state record, creating its directory if needed.
    #[instrument(skip(self, record), fields(chat_id = %record.chat_id))]
    pub async fn save(&self, record: &ChatRecord) -> StoreResult<()> {
        let dir = self.chat_dir(&record.chat_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let data = serde_json::to_vec(record)?;
        let tmp = dir.join(format!("{STATE_FILE}.tmp"));
        let path = dir.join(STATE_FILE);
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        debug!(step_id = ?record.step_id, timers = record.timers.len(), "chat state saved");
        Ok(())
    }

    /// Append a timestamped line to the chat's conversation log.
    #[instrument(skip(self, text))]
    pub async fn append_history(&self, chat_id: &str, text: &str) -> StoreResult<()> {
        let dir = self.chat_dir(chat_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let path = dir.join(LOG_FILE);
        let line = format!("{} {text}\n", Utc::now().format(LOG_TIME_FORMAT));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }
}

/// Chat ids become directory names; reject anything that could escape the
/// root or collide with the store's own files.
fn validate_chat_id(chat_id: &str) -> StoreResult<()> {
    let bad = chat_id.is_empty()
        || chat_id == "."
        || chat_id == ".."
        || chat_id.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidChatId(chat_id.to_string()));
    }
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use metabot_kernel::StopwatchState;

    async fn setup() -> (tempfile::TempDir, ChatStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::open(dir.path().join("history")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn open_creates_root() {
        let (_dir, store) = setup().await;
        assert!(store.root().is_dir());
        assert!(store.list_chats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_load() {
        let (_dir, store) = setup().await;
        let mut record = ChatRecord::new("100");
        record.step_id = Some("2".into());
        record.timers.push(StopwatchState {
            start: 1,
            timeout: 2,
            done: false,
        });

        store.save(&record).await.unwrap();
        let loaded = store.load("100").await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn save_overwrites() {
        let (_dir, store) = setup().await;
        let mut record = ChatRecord::new("100");
        store.save(&record).await.unwrap();
        record.active = false;
        store.save(&record).await.unwrap();
        assert!(!store.load("100").await.unwrap().active);
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let (_dir, store) = setup().await;
        let err = store.load("nobody").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_chats_returns_directories_only() {
        let (_dir, store) = setup().await;
        store.save(&ChatRecord::new("b")).await.unwrap();
        store.save(&ChatRecord::new("a")).await.unwrap();
        tokio::fs::write(store.root().join("stray.txt"), b"x")
            .await
            .unwrap();

        assert_eq!(store.list_chats().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn append_history_adds_timestamped_lines() {
        let (_dir, store) = setup().await;
        store.append_history("5", "/start").await.unwrap();
        store.append_history("5", "Yes").await.unwrap();

        let log = tokio::fs::read_to_string(store.root().join("5").join(LOG_FILE))
            .await
            .unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" /start"));
        assert_eq!(lines[1].len(), 19 + 1 + 3);
    }

    #[tokio::test]
    async fn rejects_path_like_chat_ids() {
        let (_dir, store) = setup().await;
        for id in ["", "..", "a/b", "a\\b"] {
            let err = store.save(&ChatRecord::new(id)).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidChatId(_)));
        }
    }
}
