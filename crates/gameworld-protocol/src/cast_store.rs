//! Persisted metadata of running casts, for cast lists outside the server.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::lock;
use crate::types::PlayerId;

/// One row of cast metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastInfo {
    pub player_id: PlayerId,
    pub cast_name: String,
    pub password_protected: bool,
    pub viewers: u8,
}

/// Errors from a [`CastInfoStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read cast store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write cast store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse cast store: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to serialize cast store: {0}")]
    Serialize(#[from] ron::Error),
}

/// Where cast metadata is kept. Writes are best effort: the registry logs
/// failures and carries on.
pub trait CastInfoStore: Send + Sync {
    fn upsert(&self, info: &CastInfo) -> Result<(), StoreError>;

    fn remove(&self, player: PlayerId) -> Result<(), StoreError>;

    /// Forget every row. Safe to call with nothing stored.
    fn clear_all(&self) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<CastInfo>, StoreError>;
}

/// In-process store, used when no cast file is configured.
#[derive(Debug, Default)]
pub struct MemoryCastStore {
    rows: Mutex<BTreeMap<PlayerId, CastInfo>>,
}

impl MemoryCastStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CastInfoStore for MemoryCastStore {
    fn upsert(&self, info: &CastInfo) -> Result<(), StoreError> {
        lock(&self.rows).insert(info.player_id, info.clone());
        Ok(())
    }

    fn remove(&self, player: PlayerId) -> Result<(), StoreError> {
        lock(&self.rows).remove(&player);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        lock(&self.rows).clear();
        Ok(())
    }

    fn list(&self) -> Result<Vec<CastInfo>, StoreError> {
        Ok(lock(&self.rows).values().cloned().collect())
    }
}

/// Store backed by a RON file, rewritten in full on every change.
#[derive(Debug)]
pub struct RonCastStore {
    path: PathBuf,
    rows: Mutex<BTreeMap<PlayerId, CastInfo>>,
}

impl RonCastStore {
    /// Open `path`, loading existing rows. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let rows = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
            let list: Vec<CastInfo> = ron::from_str(&contents)?;
            list.into_iter().map(|info| (info.player_id, info)).collect()
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, rows: &BTreeMap<PlayerId, CastInfo>) -> Result<(), StoreError> {
        let list: Vec<&CastInfo> = rows.values().collect();
        let contents = ron::ser::to_string_pretty(&list, ron::ser::PrettyConfig::default())?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let staging = self.path.with_extension("ron.tmp");
        std::fs::write(&staging, contents).map_err(|source| StoreError::Write {
            path: staging.clone(),
            source,
        })?;
        std::fs::rename(&staging, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl CastInfoStore for RonCastStore {
    fn upsert(&self, info: &CastInfo) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows);
        rows.insert(info.player_id, info.clone());
        self.persist(&rows)
    }

    fn remove(&self, player: PlayerId) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows);
        if rows.remove(&player).is_none() {
            return Ok(());
        }
        self.persist(&rows)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows);
        rows.clear();
        self.persist(&rows)
    }

    fn list(&self) -> Result<Vec<CastInfo>, StoreError> {
        Ok(lock(&self.rows).values().cloned().collect())
    }
}

enum StoreJob {
    Upsert(CastInfo),
    Remove(PlayerId),
    ClearAll,
    Flush(Sender<()>),
}

/// Applies store mutations one at a time, in submission order, on a
/// dedicated thread. Submitting never waits on the store.
pub struct StoreWriter {
    sender: Option<Sender<StoreJob>>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWriter {
    pub fn spawn(store: Arc<dyn CastInfoStore>) -> std::io::Result<Self> {
        let (sender, jobs) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("cast-store".to_string())
            .spawn(move || run_store_jobs(store.as_ref(), jobs))?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    pub fn upsert(&self, info: CastInfo) {
        self.submit(StoreJob::Upsert(info));
    }

    pub fn remove(&self, player: PlayerId) {
        self.submit(StoreJob::Remove(player));
    }

    pub fn clear_all(&self) {
        self.submit(StoreJob::ClearAll);
    }

    /// Block until every mutation submitted so far has been applied.
    /// Returns `false` if the writer thread is gone.
    pub fn flush(&self) -> bool {
        let (done, finished) = crossbeam_channel::bounded(1);
        self.submit(StoreJob::Flush(done));
        finished.recv().is_ok()
    }

    fn submit(&self, job: StoreJob) {
        let sent = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(job).is_ok());
        if !sent {
            tracing::warn!("Cast store writer stopped, dropping update");
        }
    }
}

impl Drop for StoreWriter {
    /// Pending mutations are applied before the thread exits.
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("Cast store writer panicked");
        }
    }
}

fn run_store_jobs(store: &dyn CastInfoStore, jobs: Receiver<StoreJob>) {
    for job in jobs {
        let result = match job {
            StoreJob::Upsert(info) => store.upsert(&info),
            StoreJob::Remove(player) => store.remove(player),
            StoreJob::ClearAll => store.clear_all(),
            StoreJob::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };
        if let Err(e) = result {
            tracing::warn!("Cast store write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn info(id: u32, name: &str) -> CastInfo {
        CastInfo {
            player_id: PlayerId(id),
            cast_name: name.to_string(),
            password_protected: false,
            viewers: 0,
        }
    }

    #[test]
    fn test_memory_store_upsert_replaces() {
        let store = MemoryCastStore::new();
        store.upsert(&info(1, "Knight")).unwrap();
        let mut updated = info(1, "Knight");
        updated.viewers = 3;
        store.upsert(&updated).unwrap();
        assert_eq!(store.list().unwrap(), vec![updated]);

        store.remove(PlayerId(1)).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_ron_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("casts").join("live_casts.ron");

        let store = RonCastStore::open(&path).unwrap();
        store.upsert(&info(1, "Knight")).unwrap();
        store.upsert(&info(2, "Druid")).unwrap();
        store.remove(PlayerId(1)).unwrap();
        drop(store);

        let reopened = RonCastStore::open(&path).unwrap();
        assert_eq!(reopened.list().unwrap(), vec![info(2, "Druid")]);
    }

    #[test]
    fn test_clear_all_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = RonCastStore::open(dir.path().join("casts.ron")).unwrap();
        store.clear_all().unwrap();
        store.upsert(&info(5, "Paladin")).unwrap();
        store.clear_all().unwrap();
        store.clear_all().unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(RonCastStore::open(store.path()).unwrap().list().unwrap().is_empty());
    }

    /// Holds every upsert until the test opens the gate.
    struct GatedStore {
        gate: Receiver<()>,
        inner: MemoryCastStore,
    }

    impl CastInfoStore for GatedStore {
        fn upsert(&self, info: &CastInfo) -> Result<(), StoreError> {
            let _ = self.gate.recv_timeout(std::time::Duration::from_secs(5));
            self.inner.upsert(info)
        }

        fn remove(&self, player: PlayerId) -> Result<(), StoreError> {
            self.inner.remove(player)
        }

        fn clear_all(&self) -> Result<(), StoreError> {
            self.inner.clear_all()
        }

        fn list(&self) -> Result<Vec<CastInfo>, StoreError> {
            self.inner.list()
        }
    }

    #[test]
    fn test_writer_does_not_wait_for_slow_store() {
        let (open, gate) = crossbeam_channel::unbounded();
        let store = Arc::new(GatedStore {
            gate,
            inner: MemoryCastStore::new(),
        });
        let writer = StoreWriter::spawn(store.clone()).unwrap();

        let started = std::time::Instant::now();
        writer.upsert(info(1, "Knight"));
        writer.upsert(info(2, "Druid"));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert!(store.list().unwrap().is_empty());

        open.send(()).unwrap();
        open.send(()).unwrap();
        assert!(writer.flush());
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_writer_applies_jobs_in_order() {
        let store = Arc::new(MemoryCastStore::new());
        let writer = StoreWriter::spawn(store.clone()).unwrap();
        for viewers in 0..50 {
            let mut row = info(1, "Knight");
            row.viewers = viewers;
            writer.upsert(row);
        }
        writer.remove(PlayerId(1));
        writer.upsert(info(2, "Druid"));
        assert!(writer.flush());
        assert_eq!(store.list().unwrap(), vec![info(2, "Druid")]);
    }

    #[test]
    fn test_dropping_writer_drains_pending_jobs() {
        let store = Arc::new(MemoryCastStore::new());
        let writer = StoreWriter::spawn(store.clone()).unwrap();
        writer.upsert(info(3, "Sorcerer"));
        writer.clear_all();
        writer.upsert(info(4, "Paladin"));
        drop(writer);
        assert_eq!(store.list().unwrap(), vec![info(4, "Paladin")]);
    }

    #[test]
    fn test_corrupt_file_reports_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("casts.ron");
        std::fs::write(&path, "not ron [").unwrap();
        assert!(matches!(RonCastStore::open(&path), Err(StoreError::Parse(_))));
    }
}
