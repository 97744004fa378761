/// Snapshot Storage
///
/// Timestamp-ordered persistence of trained snapshots keyed by owner (a user
/// id or the "global" sentinel). The filesystem backend keeps one
/// subdirectory per owner with millisecond-stamped JSON files; any other
/// medium only has to honor the same save/latest/purge semantics.
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::services::cache::snapshot::TrainedSnapshot;

pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot; timestamp ordering follows `snapshot.created_at`.
    fn save(&self, owner: &str, snapshot: &TrainedSnapshot) -> Result<()>;

    /// Most recent snapshot for an owner, if any.
    fn latest(&self, owner: &str) -> Result<Option<TrainedSnapshot>>;

    /// Creation timestamps of all stored snapshots for an owner, ascending.
    fn list(&self, owner: &str) -> Result<Vec<DateTime<Utc>>>;

    /// Delete snapshots created before `cutoff`, always keeping the most
    /// recent one regardless of age. Returns the number deleted.
    fn purge_older_than(&self, owner: &str, cutoff: DateTime<Utc>) -> Result<usize>;
}

pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn owner_dir(&self, owner: &str) -> PathBuf {
        let sanitized: String = owner
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(sanitized)
    }

    /// (created-at millis, path) pairs sorted ascending by timestamp.
    fn entries(&self, owner: &str) -> Result<Vec<(i64, PathBuf)>> {
        let dir = self.owner_dir(owner);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(millis) = name
                .strip_prefix("snapshot_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|ts| ts.parse::<i64>().ok())
            else {
                continue;
            };
            entries.push((millis, path));
        }
        entries.sort_by_key(|(millis, _)| *millis);
        Ok(entries)
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn save(&self, owner: &str, snapshot: &TrainedSnapshot) -> Result<()> {
        let dir = self.owner_dir(owner);
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!(
            "snapshot_{}.json",
            snapshot.created_at.timestamp_millis()
        ));
        fs::write(&path, snapshot.to_bytes()?)?;

        info!(owner, path = %path.display(), "Snapshot saved");
        Ok(())
    }

    fn latest(&self, owner: &str) -> Result<Option<TrainedSnapshot>> {
        let entries = self.entries(owner)?;
        let Some((_, path)) = entries.last() else {
            return Ok(None);
        };
        let bytes = fs::read(path)?;
        Ok(Some(TrainedSnapshot::from_bytes(&bytes)?))
    }

    fn list(&self, owner: &str) -> Result<Vec<DateTime<Utc>>> {
        Ok(self
            .entries(owner)?
            .into_iter()
            .filter_map(|(millis, _)| DateTime::from_timestamp_millis(millis))
            .collect())
    }

    fn purge_older_than(&self, owner: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let entries = self.entries(owner)?;
        if entries.len() <= 1 {
            // Never leave an owner without a usable snapshot.
            return Ok(0);
        }

        let cutoff_millis = cutoff.timestamp_millis();
        let mut deleted = 0usize;
        // The newest entry is exempt from the age cutoff.
        for (millis, path) in &entries[..entries.len() - 1] {
            if *millis < cutoff_millis {
                fs::remove_file(path)?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            debug!(owner, deleted, "Purged aged snapshots");
        }
        Ok(deleted)
    }
}
