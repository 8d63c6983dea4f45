//! Scope state partitions.
//!
//! Every `(scope, environment)` pair owns one partition holding the list of
//! materialized resources and a monotonically increasing version. Partitions
//! are locked independently, so `base/dev` and `runtime/dev` never wait on
//! each other.

pub mod lock;
pub mod store;
pub mod types;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::ResourceScope;

pub use lock::{FileLock, LockError, LockMetadata, LockMode};
pub use store::{PartitionLock, StateStore};
pub use types::{MaterializedResource, PartitionKey, STATE_FORMAT_VERSION, ScopeState};

#[derive(Debug, Error)]
pub enum StoreError {
  /// Another process holds the partition lock.
  #[error(
    "partition {partition} is locked by another process{}\n\
     If you're sure no other deploy is running, remove the lock file:\n  {}",
    .holder.as_ref().map(|h| format!(": {}", h)).unwrap_or_default(),
    .lock_path.display()
  )]
  LockContention {
    partition: PartitionKey,
    holder: Option<LockMetadata>,
    lock_path: PathBuf,
  },

  /// The partition changed on disk between load and save.
  #[error(
    "partition {partition} was modified by another process (loaded version {expected}, found {found}); re-run the command"
  )]
  VersionConflict {
    partition: PartitionKey,
    expected: u64,
    found: u64,
  },

  #[error("partition {0} is held with a shared lock and cannot be written")]
  SharedLock(PartitionKey),

  #[error("lock for partition {held} cannot be used to access {requested}")]
  WrongPartition { held: PartitionKey, requested: PartitionKey },

  #[error("partition {0} is not locked by this run")]
  NotLocked(PartitionKey),

  #[error("resource '{spec_id}' has scope {scope} and cannot be written to partition {partition}")]
  ScopeMismatch {
    partition: PartitionKey,
    spec_id: String,
    scope: ResourceScope,
  },

  #[error("partition {partition} is corrupt: {message}")]
  Corrupt { partition: PartitionKey, message: String },

  #[error("unsupported state format version {0}")]
  UnsupportedFormat(u32),

  #[error(transparent)]
  Lock(LockError),

  #[error("failed to read state: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write state: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse state: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),
}

impl StoreError {
  pub(crate) fn from_lock(partition: &PartitionKey, err: LockError) -> Self {
    match err {
      LockError::Contention { lock_path, holder } => StoreError::LockContention {
        partition: partition.clone(),
        holder,
        lock_path,
      },
      other => StoreError::Lock(other),
    }
  }
}
