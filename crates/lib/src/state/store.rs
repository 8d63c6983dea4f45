//! On-disk storage of scope state partitions.
//!
//! # Storage Layout
//!
//! ```text
//! {state_dir}/
//! ├── base/
//! │   ├── dev.json        # ScopeState for base/dev
//! │   └── dev.lock        # advisory lock for base/dev
//! └── runtime/
//!     ├── dev.json
//!     └── dev.lock
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::lock::{FileLock, LockMode};
use super::types::{PartitionKey, STATE_FORMAT_VERSION, ScopeState};
use super::StoreError;

/// A held lock on one partition. Load and save go through it.
#[derive(Debug)]
pub struct PartitionLock {
  key: PartitionKey,
  lock: FileLock,
}

impl PartitionLock {
  pub fn key(&self) -> &PartitionKey {
    &self.key
  }

  pub fn mode(&self) -> LockMode {
    self.lock.mode()
  }

  pub fn lock_path(&self) -> &Path {
    self.lock.lock_path()
  }
}

/// Manages partition files under a state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
  root: PathBuf,
}

impl StateStore {
  pub fn new(root: PathBuf) -> Self {
    Self { root }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn partition_path(&self, key: &PartitionKey) -> PathBuf {
    self.root.join(key.scope.as_str()).join(format!("{}.json", key.env))
  }

  fn lock_path(&self, key: &PartitionKey) -> PathBuf {
    self.root.join(key.scope.as_str()).join(format!("{}.lock", key.env))
  }

  /// Lock a partition, waiting at most `wait` for a concurrent holder.
  pub async fn lock(
    &self,
    key: &PartitionKey,
    mode: LockMode,
    command: &str,
    wait: Duration,
  ) -> Result<PartitionLock, StoreError> {
    let lock = FileLock::acquire(&self.lock_path(key), mode, command, wait)
      .await
      .map_err(|e| StoreError::from_lock(key, e))?;
    debug!(partition = %key, ?mode, "partition locked");
    Ok(PartitionLock { key: key.clone(), lock })
  }

  /// Load the partition held by `lock`. A partition never written is empty at version 0.
  pub fn load(&self, lock: &PartitionLock) -> Result<ScopeState, StoreError> {
    let key = lock.key();
    match self.read_state(key)? {
      Some(state) => Ok(state),
      None => Ok(ScopeState::empty(key.clone())),
    }
  }

  fn read_state(&self, key: &PartitionKey) -> Result<Option<ScopeState>, StoreError> {
    let path = self.partition_path(key);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(StoreError::Read(e)),
    };

    let state: ScopeState = serde_json::from_str(&content).map_err(StoreError::Parse)?;

    if state.format != STATE_FORMAT_VERSION {
      return Err(StoreError::UnsupportedFormat(state.format));
    }
    if &state.partition != key {
      return Err(StoreError::Corrupt {
        partition: key.clone(),
        message: format!("file belongs to partition {}", state.partition),
      });
    }
    state.validate()?;

    Ok(Some(state))
  }

  /// Persist `state` under an exclusive lock.
  ///
  /// Fails with [`StoreError::VersionConflict`] if the on-disk version is no
  /// longer the one `state` was loaded at. On success `state.version` is
  /// bumped to the newly written version.
  pub fn save(&self, lock: &PartitionLock, state: &mut ScopeState) -> Result<(), StoreError> {
    let key = lock.key();
    if lock.mode() != LockMode::Exclusive {
      return Err(StoreError::SharedLock(key.clone()));
    }
    if &state.partition != key {
      return Err(StoreError::WrongPartition {
        held: key.clone(),
        requested: state.partition.clone(),
      });
    }

    let found = self.read_state(key)?.map(|s| s.version).unwrap_or(0);
    if found != state.version {
      return Err(StoreError::VersionConflict {
        partition: key.clone(),
        expected: state.version,
        found,
      });
    }

    let mut next = state.clone();
    next.version += 1;
    self.write_atomic(key, &next)?;
    *state = next;

    info!(partition = %key, version = state.version, resources = state.len(), "saved partition");
    Ok(())
  }

  /// Write to a temp file in the same directory, then rename over the target.
  fn write_atomic(&self, key: &PartitionKey, state: &ScopeState) -> Result<(), StoreError> {
    let path = self.partition_path(key);
    let dir = path.parent().unwrap_or(&self.root);
    fs::create_dir_all(dir).map_err(StoreError::Write)?;

    let content = serde_json::to_string_pretty(state).map_err(StoreError::Serialize)?;
    let mut temp = NamedTempFile::new_in(dir).map_err(StoreError::Write)?;
    temp.write_all(content.as_bytes()).map_err(StoreError::Write)?;
    temp.as_file().sync_all().map_err(StoreError::Write)?;
    temp.persist(&path).map_err(|e| StoreError::Write(e.error))?;
    Ok(())
  }
}
