//! TOML-file session repository.
//!
//! Each session is one `<id>.toml` file under the storage directory.
//! Writes go through a temporary file, fsync, and rename, so a crash
//! mid-write never leaves a truncated session on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use tern_core::session::{Session, SessionRepository};

/// Session repository backed by one TOML file per session.
pub struct TomlSessionRepository {
    storage_dir: PathBuf,
}

impl TomlSessionRepository {
    /// Creates a repository rooted at the given directory, creating it
    /// if necessary.
    pub async fn new(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        tokio::fs::create_dir_all(&storage_dir)
            .await
            .with_context(|| {
                format!("failed to create session directory {}", storage_dir.display())
            })?;
        Ok(Self { storage_dir })
    }

    /// Creates a repository at the platform default location
    /// (`<data_dir>/tern/sessions`).
    pub async fn at_default_location() -> Result<Self> {
        let base = dirs::data_dir().context("could not determine the platform data directory")?;
        Self::new(base.join("tern").join("sessions")).await
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.storage_dir.join(format!("{session_id}.toml"))
    }

    async fn write_atomically(&self, path: &Path, content: &str) -> Result<()> {
        let tmp_path = path.with_extension("toml.tmp");
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path)
            .await
            .with_context(|| format!("failed to move session file into place at {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for TomlSessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.session_path(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let session: Session = toml::from_str(&content)
            .with_context(|| format!("failed to parse session file {}", path.display()))?;
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let content =
            toml::to_string_pretty(session).context("failed to serialize session to TOML")?;
        let path = self.session_path(&session.id);
        self.write_atomically(&path, &content).await?;
        tracing::debug!(target: "tern::store", session_id = %session.id, "session saved");
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to delete {}", path.display())),
        }
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.storage_dir)
            .await
            .with_context(|| format!("failed to list {}", self.storage_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match toml::from_str::<Session>(&content) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    // A single corrupt file must not hide every other session.
                    tracing::warn!(
                        target: "tern::store",
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable session file"
                    );
                }
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}
