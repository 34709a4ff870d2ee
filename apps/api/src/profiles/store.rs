//! Profile persistence.
//!
//! `JsonFileProfileStore` keeps one JSON document per profile plus an index of
//! summaries (`index.json`) that also records the default profile. All
//! operations take one async lock, so the index and the documents never drift.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::profiles::models::{CandidateProfile, ProfileSummary};

const INDEX_FILE: &str = "index.json";
const ID_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Invalid profile: {0}")]
    Invalid(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Profile storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile storage format error: {0}")]
    Format(#[from] serde_json::Error),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn create(&self, profile: CandidateProfile) -> Result<ProfileSummary, StoreError>;

    async fn get(&self, id: &str) -> Result<CandidateProfile, StoreError>;

    /// Summaries, oldest first.
    async fn list(&self) -> Result<Vec<ProfileSummary>, StoreError>;

    async fn update(&self, id: &str, profile: CandidateProfile)
        -> Result<ProfileSummary, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn set_default(&self, id: &str) -> Result<ProfileSummary, StoreError>;

    async fn default_id(&self) -> Result<Option<String>, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileIndex {
    #[serde(default)]
    profiles: BTreeMap<String, ProfileSummary>,
    #[serde(default)]
    default_profile: Option<String>,
}

impl ProfileIndex {
    fn summary(&self, id: &str) -> Result<&ProfileSummary, StoreError> {
        self.profiles
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn mark_default(&mut self, id: &str) {
        for (key, summary) in self.profiles.iter_mut() {
            summary.is_default = key == id;
        }
        self.default_profile = Some(id.to_string());
    }

    fn oldest_id(&self) -> Option<String> {
        self.profiles
            .values()
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|s| s.id.clone())
    }
}

pub struct JsonFileProfileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileProfileStore {
    /// Creates the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "Profile store opened");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn profile_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id.len() <= 64
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn load_index(&self) -> Result<ProfileIndex, StoreError> {
        match tokio::fs::read(self.dir.join(INDEX_FILE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProfileIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_index(&self, index: &ProfileIndex) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(index)?;
        tokio::fs::write(self.dir.join(INDEX_FILE), bytes).await?;
        Ok(())
    }

    async fn save_profile(&self, id: &str, profile: &CandidateProfile) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(profile)?;
        tokio::fs::write(self.profile_path(id)?, bytes).await?;
        Ok(())
    }

    fn new_id(index: &ProfileIndex) -> String {
        loop {
            let id: String = Uuid::new_v4().simple().to_string()[..ID_LEN].to_string();
            if !index.profiles.contains_key(&id) {
                return id;
            }
        }
    }
}

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn create(&self, profile: CandidateProfile) -> Result<ProfileSummary, StoreError> {
        profile.validate().map_err(StoreError::Invalid)?;
        let _guard = self.lock.lock().await;

        let mut index = self.load_index().await?;
        let id = Self::new_id(&index);
        let now = Utc::now();
        let summary = ProfileSummary {
            id: id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            created_at: now,
            updated_at: now,
            is_default: false,
        };

        self.save_profile(&id, &profile).await?;
        index.profiles.insert(id.clone(), summary);
        if index.default_profile.is_none() {
            index.mark_default(&id);
        }
        self.save_index(&index).await?;

        info!(profile_id = %id, "Profile created");
        Ok(index.summary(&id)?.clone())
    }

    async fn get(&self, id: &str) -> Result<CandidateProfile, StoreError> {
        let path = self.profile_path(id)?;
        let _guard = self.lock.lock().await;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<ProfileSummary>, StoreError> {
        let _guard = self.lock.lock().await;
        let index = self.load_index().await?;
        let mut summaries: Vec<ProfileSummary> = index.profiles.into_values().collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn update(
        &self,
        id: &str,
        profile: CandidateProfile,
    ) -> Result<ProfileSummary, StoreError> {
        profile.validate().map_err(StoreError::Invalid)?;
        let _guard = self.lock.lock().await;

        let mut index = self.load_index().await?;
        index.summary(id)?;
        self.save_profile(id, &profile).await?;
        if let Some(summary) = index.profiles.get_mut(id) {
            summary.name = profile.name.clone();
            summary.email = profile.email.clone();
            summary.updated_at = Utc::now();
        }
        self.save_index(&index).await?;

        debug!(profile_id = %id, "Profile updated");
        Ok(index.summary(id)?.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        let mut index = self.load_index().await?;
        index.summary(id)?;
        if index.profiles.len() == 1 {
            return Err(StoreError::Conflict(
                "the last remaining profile cannot be deleted".to_string(),
            ));
        }

        index.profiles.remove(id);
        if index.default_profile.as_deref() == Some(id) {
            if let Some(next) = index.oldest_id() {
                index.mark_default(&next);
                info!(profile_id = %next, "Default profile reassigned");
            }
        }
        self.save_index(&index).await?;

        match tokio::fs::remove_file(self.profile_path(id)?).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(profile_id = %id, "Profile deleted");
        Ok(())
    }

    async fn set_default(&self, id: &str) -> Result<ProfileSummary, StoreError> {
        let _guard = self.lock.lock().await;

        let mut index = self.load_index().await?;
        index.summary(id)?;
        index.mark_default(id);
        self.save_index(&index).await?;

        Ok(index.summary(id)?.clone())
    }

    async fn default_id(&self) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load_index().await?.default_profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::sample_profile;

    async fn store() -> (tempfile::TempDir, JsonFileProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileProfileStore::open(dir.path().join("profiles"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_first_profile_becomes_default() {
        let (_dir, store) = store().await;

        let first = store.create(sample_profile()).await.unwrap();
        let second = store.create(sample_profile()).await.unwrap();

        assert_eq!(first.id.len(), ID_LEN);
        assert!(first.is_default);
        assert!(!second.is_default);
        assert_eq!(store.default_id().await.unwrap(), Some(first.id));
    }

    #[tokio::test]
    async fn test_get_returns_stored_profile() {
        let (_dir, store) = store().await;
        let created = store.create(sample_profile()).await.unwrap();
        let loaded = store.get(&created.id).await.unwrap();
        assert_eq!(loaded, sample_profile());
    }

    #[tokio::test]
    async fn test_get_unknown_or_malformed_id_is_not_found() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.get("deadbeef").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.get("../index").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_profile_is_rejected() {
        let (_dir, store) = store().await;
        let mut profile = sample_profile();
        profile.name = String::new();
        assert!(matches!(
            store.create(profile).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_update_refreshes_summary() {
        let (_dir, store) = store().await;
        let created = store.create(sample_profile()).await.unwrap();
        let mut profile = sample_profile();
        profile.name = "Sam Okafor".to_string();

        let updated = store.update(&created.id, profile).await.unwrap();

        assert_eq!(updated.name, "Sam Okafor");
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(store.get(&created.id).await.unwrap().name, "Sam Okafor");
    }

    #[tokio::test]
    async fn test_last_profile_cannot_be_deleted() {
        let (_dir, store) = store().await;
        let only = store.create(sample_profile()).await.unwrap();
        assert!(matches!(
            store.delete(&only.id).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_deleting_default_promotes_oldest_remaining() {
        let (_dir, store) = store().await;
        let first = store.create(sample_profile()).await.unwrap();
        let second = store.create(sample_profile()).await.unwrap();

        store.delete(&first.id).await.unwrap();

        assert_eq!(store.default_id().await.unwrap(), Some(second.id.clone()));
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_default);
        assert!(store.get(&first.id).await.is_err());
    }

    #[tokio::test]
    async fn test_set_default_moves_flag() {
        let (_dir, store) = store().await;
        let first = store.create(sample_profile()).await.unwrap();
        let second = store.create(sample_profile()).await.unwrap();

        store.set_default(&second.id).await.unwrap();

        let listed = store.list().await.unwrap();
        let flags: Vec<(String, bool)> =
            listed.into_iter().map(|s| (s.id, s.is_default)).collect();
        assert!(flags.contains(&(first.id, false)));
        assert!(flags.contains(&(second.id, true)));
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let created = {
            let store = JsonFileProfileStore::open(dir.path()).await.unwrap();
            store.create(sample_profile()).await.unwrap()
        };
        let reopened = JsonFileProfileStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.default_id().await.unwrap(), Some(created.id));
    }
}
