use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::model::Memo;
use crate::error::StoreError;

/// Field to order memos by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Time,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Persistent memo storage, keyed by `Memo::url`
#[async_trait]
pub trait MemoStore: Send + Sync {
    async fn get(&self, url: &str) -> Result<Memo, StoreError>;

    async fn get_all(&self, key: SortKey, order: SortOrder) -> Result<Vec<Memo>, StoreError>;

    /// Like `get_all` without the audio: every memo's `audio` is empty
    async fn list(&self, key: SortKey, order: SortOrder) -> Result<Vec<Memo>, StoreError>;

    /// Insert or replace
    async fn put(&self, memo: &Memo) -> Result<(), StoreError>;

    async fn delete(&self, url: &str) -> Result<(), StoreError>;
}

fn sort_memos(memos: &mut [Memo], key: SortKey, order: SortOrder) {
    match key {
        SortKey::Time => memos.sort_by_key(|m| m.time),
        SortKey::Title => memos.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase())),
    }
    if order == SortOrder::Descending {
        memos.reverse();
    }
}

/// Memo store on the local filesystem
///
/// Each memo is two files in one directory: `<url>.json` holding the
/// metadata and `<url>.<ext>` holding the audio.
pub struct FileMemoStore {
    root: PathBuf,
}

impl FileMemoStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        info!("Memo store: {}", root.display());

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self, url: &str) -> PathBuf {
        self.root.join(format!("{}.json", url))
    }

    fn audio_path(&self, url: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", url, extension))
    }

    // Urls are generated hex ids; anything else would escape the root
    fn check_url(url: &str) -> Result<(), StoreError> {
        if url.is_empty() || !url.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StoreError::NotFound(url.to_string()));
        }
        Ok(())
    }

    async fn read_metadata(&self, path: &Path) -> Result<Memo, StoreError> {
        let json = fs::read(path).await?;
        Ok(serde_json::from_slice(&json)?)
    }

    async fn load_all(&self, key: SortKey, order: SortOrder, with_audio: bool) -> Result<Vec<Memo>, StoreError> {
        let mut memos = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let mut memo = match self.read_metadata(&path).await {
                Ok(memo) => memo,
                Err(e) => {
                    warn!("Skipping unreadable memo {}: {}", path.display(), e);
                    continue;
                }
            };

            if with_audio {
                match fs::read(self.audio_path(&memo.url, memo.audio_extension())).await {
                    Ok(audio) => memo.audio = audio,
                    Err(e) => warn!("Memo {} has no audio: {}", memo.url, e),
                }
            }
            memos.push(memo);
        }

        sort_memos(&mut memos, key, order);
        debug!("Loaded {} memos (audio: {})", memos.len(), with_audio);

        Ok(memos)
    }
}

#[async_trait]
impl MemoStore for FileMemoStore {
    async fn get(&self, url: &str) -> Result<Memo, StoreError> {
        Self::check_url(url)?;

        let path = self.metadata_path(url);
        if !fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(url.to_string()));
        }

        let mut memo = self.read_metadata(&path).await?;
        memo.audio = fs::read(self.audio_path(url, memo.audio_extension())).await?;

        Ok(memo)
    }

    async fn get_all(&self, key: SortKey, order: SortOrder) -> Result<Vec<Memo>, StoreError> {
        self.load_all(key, order, true).await
    }

    async fn list(&self, key: SortKey, order: SortOrder) -> Result<Vec<Memo>, StoreError> {
        self.load_all(key, order, false).await
    }

    async fn put(&self, memo: &Memo) -> Result<(), StoreError> {
        Self::check_url(&memo.url)?;

        fs::write(self.audio_path(&memo.url, memo.audio_extension()), &memo.audio).await?;
        fs::write(self.metadata_path(&memo.url), serde_json::to_vec_pretty(memo)?).await?;

        debug!("Stored memo {} ({} audio bytes)", memo.url, memo.audio.len());

        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        let memo = self.get(url).await?;

        fs::remove_file(self.metadata_path(url)).await?;
        if let Err(e) = fs::remove_file(self.audio_path(url, memo.audio_extension())).await {
            warn!("Failed to remove audio for memo {}: {}", url, e);
        }

        info!("Deleted memo {}", url);

        Ok(())
    }
}
