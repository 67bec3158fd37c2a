//! Model savers: storage for the "best" and "latest" candidate snapshots.
//!
//! Only two slots ever exist, so memory use stays flat however long a run
//! goes. [`InMemoryModelSaver`] keeps clones; [`LocalFileModelSaver`] writes
//! JSON files plus a manifest recording each checkpoint's epoch, score and
//! SHA-256 hash.

use crate::error::SaverError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Which candidate a snapshot is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Best,
    Latest,
}

impl Slot {
    fn file_name(self) -> &'static str {
        match self {
            Slot::Best => "best_model.json",
            Slot::Latest => "latest_model.json",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Best => f.write_str("best"),
            Slot::Latest => f.write_str("latest"),
        }
    }
}

/// Persists and retrieves candidate models.
///
/// Called only from the supervisor's own thread. A save error is fatal to
/// the run.
pub trait ModelSaver<M>: Send {
    fn save_best(&mut self, model: &M, epoch: usize, score: Option<f64>) -> Result<(), SaverError>;

    fn save_latest(&mut self, model: &M, epoch: usize, score: Option<f64>)
    -> Result<(), SaverError>;

    /// The last model stored with [`ModelSaver::save_best`], if any.
    fn get_best(&self) -> Result<Option<M>, SaverError>;

    /// The last model stored with [`ModelSaver::save_latest`], if any.
    fn get_latest(&self) -> Result<Option<M>, SaverError>;
}

/// Keeps both candidates in memory.
#[derive(Debug, Clone)]
pub struct InMemoryModelSaver<M> {
    best: Option<M>,
    latest: Option<M>,
}

impl<M> InMemoryModelSaver<M> {
    pub fn new() -> Self {
        Self {
            best: None,
            latest: None,
        }
    }
}

impl<M> Default for InMemoryModelSaver<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone + Send> ModelSaver<M> for InMemoryModelSaver<M> {
    fn save_best(&mut self, model: &M, _epoch: usize, _score: Option<f64>) -> Result<(), SaverError> {
        self.best = Some(model.clone());
        Ok(())
    }

    fn save_latest(
        &mut self,
        model: &M,
        _epoch: usize,
        _score: Option<f64>,
    ) -> Result<(), SaverError> {
        self.latest = Some(model.clone());
        Ok(())
    }

    fn get_best(&self) -> Result<Option<M>, SaverError> {
        Ok(self.best.clone())
    }

    fn get_latest(&self) -> Result<Option<M>, SaverError> {
        Ok(self.latest.clone())
    }
}

/// Manifest entry for a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: String,
    pub slot: Slot,
    pub epoch: usize,
    pub score: Option<f64>,
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    best: Option<CheckpointRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latest: Option<CheckpointRecord>,
}

impl Manifest {
    fn entry(&self, slot: Slot) -> Option<&CheckpointRecord> {
        match slot {
            Slot::Best => self.best.as_ref(),
            Slot::Latest => self.latest.as_ref(),
        }
    }

    fn set(&mut self, record: CheckpointRecord) {
        match record.slot {
            Slot::Best => self.best = Some(record),
            Slot::Latest => self.latest = Some(record),
        }
    }
}

const MANIFEST_FILE: &str = "checkpoints.json";

/// Writes candidates as JSON files under a directory.
///
/// Each write goes to a temporary sibling first and is renamed into place,
/// so a crash never leaves a half-written checkpoint behind. Loads verify
/// the file against the hash recorded in `checkpoints.json`.
#[derive(Debug)]
pub struct LocalFileModelSaver<M> {
    directory: PathBuf,
    _model: PhantomData<fn() -> M>,
}

impl<M> LocalFileModelSaver<M> {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            _model: PhantomData,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, slot: Slot) -> PathBuf {
        self.directory.join(slot.file_name())
    }

    /// Manifest entry for `slot`, if a checkpoint has been written there.
    pub fn record(&self, slot: Slot) -> Result<Option<CheckpointRecord>, SaverError> {
        Ok(self.manifest()?.entry(slot).cloned())
    }

    fn manifest(&self) -> Result<Manifest, SaverError> {
        let path = self.directory.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl<M: Serialize + DeserializeOwned> LocalFileModelSaver<M> {
    fn write(
        &self,
        slot: Slot,
        model: &M,
        epoch: usize,
        score: Option<f64>,
    ) -> Result<(), SaverError> {
        std::fs::create_dir_all(&self.directory)?;
        let bytes = serde_json::to_vec_pretty(model)?;
        write_atomically(&self.path_for(slot), &bytes)?;

        let record = CheckpointRecord {
            id: uuid::Uuid::new_v4().to_string(),
            slot,
            epoch,
            score,
            hash: sha256_hex(&bytes),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };
        let mut manifest = self.manifest()?;
        manifest.set(record);
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        write_atomically(&self.directory.join(MANIFEST_FILE), &manifest_bytes)?;

        tracing::debug!(slot = %slot, epoch, dir = %self.directory.display(), "Checkpoint written");
        Ok(())
    }

    fn read(&self, slot: Slot) -> Result<Option<M>, SaverError> {
        let Some(record) = self.manifest()?.entry(slot).cloned() else {
            return Ok(None);
        };
        let bytes = std::fs::read(self.path_for(slot))?;
        let actual = sha256_hex(&bytes);
        if actual != record.hash {
            return Err(SaverError::Corrupt {
                slot: slot.to_string(),
                expected: record.hash,
                actual,
            });
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

impl<M: Serialize + DeserializeOwned> ModelSaver<M> for LocalFileModelSaver<M> {
    fn save_best(&mut self, model: &M, epoch: usize, score: Option<f64>) -> Result<(), SaverError> {
        self.write(Slot::Best, model, epoch, score)
    }

    fn save_latest(
        &mut self,
        model: &M,
        epoch: usize,
        score: Option<f64>,
    ) -> Result<(), SaverError> {
        self.write(Slot::Latest, model, epoch, score)
    }

    fn get_best(&self) -> Result<Option<M>, SaverError> {
        self.read(Slot::Best)
    }

    fn get_latest(&self) -> Result<Option<M>, SaverError> {
        self.read(Slot::Latest)
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Weights {
        w: Vec<f64>,
    }

    #[test]
    fn test_in_memory_slots_are_independent() {
        let mut saver = InMemoryModelSaver::new();
        assert_eq!(saver.get_best().unwrap(), None);
        saver.save_best(&1u32, 0, Some(0.5)).unwrap();
        saver.save_latest(&2u32, 1, Some(0.7)).unwrap();
        assert_eq!(saver.get_best().unwrap(), Some(1));
        assert_eq!(saver.get_latest().unwrap(), Some(2));
    }

    #[test]
    fn test_local_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut saver = LocalFileModelSaver::<Weights>::new(dir.path().join("run"));
        assert_eq!(saver.get_latest().unwrap(), None);

        let best = Weights { w: vec![1.0, 2.0] };
        let latest = Weights { w: vec![3.0] };
        saver.save_best(&best, 2, Some(0.25)).unwrap();
        saver.save_latest(&latest, 4, Some(0.5)).unwrap();

        assert_eq!(saver.get_best().unwrap(), Some(best));
        assert_eq!(saver.get_latest().unwrap(), Some(latest));

        let record = saver.record(Slot::Best).unwrap().unwrap();
        assert_eq!(record.epoch, 2);
        assert_eq!(record.score, Some(0.25));
        assert_eq!(record.hash.len(), 64);
        assert!(saver.path_for(Slot::Best).exists());
    }

    #[test]
    fn test_local_file_overwrites_slot() {
        let dir = TempDir::new().unwrap();
        let mut saver = LocalFileModelSaver::<Weights>::new(dir.path());
        saver.save_latest(&Weights { w: vec![1.0] }, 0, None).unwrap();
        saver.save_latest(&Weights { w: vec![9.0] }, 1, None).unwrap();
        assert_eq!(saver.get_latest().unwrap().unwrap().w, vec![9.0]);
        assert_eq!(saver.record(Slot::Latest).unwrap().unwrap().epoch, 1);
        assert!(saver.record(Slot::Best).unwrap().is_none());
    }

    #[test]
    fn test_local_file_detects_tampering() {
        let dir = TempDir::new().unwrap();
        let mut saver = LocalFileModelSaver::<Weights>::new(dir.path());
        saver.save_best(&Weights { w: vec![1.0] }, 0, Some(1.0)).unwrap();
        std::fs::write(saver.path_for(Slot::Best), br#"{"w":[2.0]}"#).unwrap();

        let err = saver.get_best().unwrap_err();
        assert!(matches!(err, SaverError::Corrupt { ref slot, .. } if slot == "best"));
    }

    #[test]
    fn test_local_file_unwritable_directory_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let mut saver = LocalFileModelSaver::<Weights>::new(&blocker);
        let err = saver.save_best(&Weights { w: vec![] }, 0, None).unwrap_err();
        assert!(matches!(err, SaverError::Io(_)));
    }
}
