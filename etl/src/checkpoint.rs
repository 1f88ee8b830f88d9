use chrono::{DateTime, Utc};
use redlake_core::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointData {
    processed_posts: BTreeSet<String>,
    last_run: Option<DateTime<Utc>>,
}

/// File-backed record of post ids already processed, used to skip them on
/// resumed runs. Opt-in: skipping also skips the mutable-field refresh
/// that re-ingestion would perform.
#[derive(Debug)]
pub struct CheckpointManager {
    path: PathBuf,
    data: CheckpointData,
}

impl CheckpointManager {
    /// Loads the checkpoint at `path`, starting fresh when the file is
    /// absent or unreadable.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    warn!(
                        "could not parse checkpoint {}: {}; starting fresh",
                        path.display(),
                        e
                    );
                    CheckpointData::default()
                }
            },
            Err(_) => CheckpointData::default(),
        };

        Self {
            path: path.to_path_buf(),
            data,
        }
    }

    pub fn is_processed(&self, post_id: &str) -> bool {
        self.data.processed_posts.contains(post_id)
    }

    pub fn mark_processed(&mut self, post_id: &str) -> Result<(), CoreError> {
        self.data.processed_posts.insert(post_id.to_string());
        self.data.last_run = Some(Utc::now());
        self.save()
    }

    pub fn len(&self) -> usize {
        self.data.processed_posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.processed_posts.is_empty()
    }

    fn save(&self) -> Result<(), CoreError> {
        let raw = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Deletes the checkpoint file so the next run processes everything.
    pub fn clear(path: &Path) -> Result<(), CoreError> {
        if path.exists() {
            std::fs::remove_file(path)?;
            info!("checkpoint {} cleared", path.display());
        }
        Ok(())
    }
}
