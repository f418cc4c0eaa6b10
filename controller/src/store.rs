use std::{io::ErrorKind, path::PathBuf};

use heater_common::{ControlState, Schedule, ScheduleWindow, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// Opaque revision token handed out by `get` and checked by `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision(pub u64);

/// Conditioned access to the single persisted control record. `put` fails
/// with `Conflict` when the record moved past the expected revision; the
/// caller re-reads and recomputes instead of overwriting.
#[allow(async_fn_in_trait)]
pub trait ControlStateStore {
    async fn get(&self) -> Result<(ControlState, Revision), StoreError>;
    async fn put(&self, state: &ControlState, expected: Revision) -> Result<Revision, StoreError>;
}

/// Window configuration, read-only from the control loops' perspective.
#[allow(async_fn_in_trait)]
pub trait ScheduleStore {
    async fn windows(&self) -> Result<Vec<ScheduleWindow>, StoreError>;
}

/// Bounded read-modify-write: applies `mutate` to the freshest record and
/// retries on conflict, re-reading and recomputing each round. Returns the
/// record as written. An exhausted budget surfaces `Conflict` so the caller
/// can defer to the next tick.
pub async fn try_update<S, F>(
    store: &S,
    max_attempts: u32,
    mut mutate: F,
) -> Result<ControlState, StoreError>
where
    S: ControlStateStore,
    F: FnMut(&mut ControlState),
{
    for _ in 0..max_attempts {
        let (mut state, revision) = store.get().await?;
        mutate(&mut state);
        match store.put(&state, revision).await {
            Ok(_) => return Ok(state),
            Err(StoreError::Conflict) => continue,
            Err(err) => return Err(err),
        }
    }
    Err(StoreError::Conflict)
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    revision: u64,
    state: ControlState,
}

/// JSON-file-backed store. The revision counter is embedded in the document
/// and bumped on every accepted write; the mutex only serializes access to
/// the file within this process, the revision check is what carries
/// correctness across overlapping loop invocations.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn load_document(&self) -> Result<StateDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => {
                serde_json::from_slice(&raw).map_err(|err| StoreError::Backend(err.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(StateDocument {
                revision: 0,
                state: ControlState::default(),
            }),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }
}

impl ControlStateStore for FileStateStore {
    async fn get(&self) -> Result<(ControlState, Revision), StoreError> {
        let _guard = self.lock.lock().await;
        let document = self.load_document().await?;
        Ok((document.state, Revision(document.revision)))
    }

    async fn put(&self, state: &ControlState, expected: Revision) -> Result<Revision, StoreError> {
        let _guard = self.lock.lock().await;
        let current = self.load_document().await?;
        if current.revision != expected.0 {
            return Err(StoreError::Conflict);
        }

        let next = StateDocument {
            revision: current.revision + 1,
            state: state.clone(),
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::Backend(err.to_string()))?;
        }
        let payload =
            serde_json::to_vec_pretty(&next).map_err(|err| StoreError::Backend(err.to_string()))?;
        tokio::fs::write(&self.path, payload)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(Revision(next.revision))
    }
}

/// In-memory store with the same conditioned-write semantics; used by tests
/// and simulation runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<(ControlState, u64)>,
}

impl ControlStateStore for MemoryStateStore {
    async fn get(&self) -> Result<(ControlState, Revision), StoreError> {
        let inner = self.inner.lock().await;
        Ok((inner.0.clone(), Revision(inner.1)))
    }

    async fn put(&self, state: &ControlState, expected: Revision) -> Result<Revision, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.1 != expected.0 {
            return Err(StoreError::Conflict);
        }
        inner.0 = state.clone();
        inner.1 += 1;
        Ok(Revision(inner.1))
    }
}

#[derive(Debug)]
pub struct FileScheduleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileScheduleStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<Schedule, StoreError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(&self.path).await {
            Ok(raw) => {
                serde_json::from_slice(&raw).map_err(|err| StoreError::Backend(err.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Schedule::default()),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    pub async fn save(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::Backend(err.to_string()))?;
        }
        let payload = serde_json::to_vec_pretty(schedule)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        tokio::fs::write(&self.path, payload)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))
    }
}

impl ScheduleStore for FileScheduleStore {
    async fn windows(&self) -> Result<Vec<ScheduleWindow>, StoreError> {
        let mut schedule = self.load().await?;
        let dropped = schedule.normalize();
        if dropped > 0 {
            warn!("ignoring {dropped} malformed schedule window(s)");
        }
        Ok(schedule.windows)
    }
}
