//! File-based advisory locks for mutual exclusion between processes.
//!
//! Every state partition (and the local provider's inventory) has its own
//! lock file, so locks on different partitions never contend.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Poll interval while waiting for a contended lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// Written into the lock file by the exclusive holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at: DateTime<Utc>,
  pub command: String,
}

impl std::fmt::Display for LockMetadata {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} (PID {}, started {})", self.command, self.pid, self.started_at.to_rfc3339())
  }
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "{} is locked by another process{}\n\
     If you're sure no other deploy is running, remove the lock file:\n  {}",
    .lock_path.display(),
    .holder.as_ref().map(|h| format!(": {}", h)).unwrap_or_default(),
    .lock_path.display()
  )]
  Contention {
    lock_path: PathBuf,
    holder: Option<LockMetadata>,
  },

  #[error("failed to create lock directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// A held advisory lock. Released when dropped, on every exit path.
#[derive(Debug)]
pub struct FileLock {
  file: File,
  lock_path: PathBuf,
  mode: LockMode,
}

impl FileLock {
  /// Try once to take the lock without blocking.
  pub fn try_acquire(lock_path: &Path, mode: LockMode, command: &str) -> Result<Self, LockError> {
    if let Some(parent) = lock_path.parent()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent).map_err(LockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(lock_path)
      .map_err(LockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(LockError::Contention {
          lock_path: lock_path.to_path_buf(),
          holder: read_holder(lock_path),
        });
      }
      return Err(LockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      write_metadata(&file, command)?;
    }

    Ok(FileLock {
      file,
      lock_path: lock_path.to_path_buf(),
      mode,
    })
  }

  /// Take the lock, polling for at most `wait` before giving up with
  /// [`LockError::Contention`].
  pub async fn acquire(lock_path: &Path, mode: LockMode, command: &str, wait: Duration) -> Result<Self, LockError> {
    let deadline = Instant::now() + wait;
    loop {
      match Self::try_acquire(lock_path, mode, command) {
        Err(LockError::Contention { .. }) if Instant::now() < deadline => {
          debug!(lock = %lock_path.display(), "lock contended, waiting");
          tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
        other => return other,
      }
    }
  }

  /// Reads the lock metadata from the held file handle.
  ///
  /// Uses the held handle rather than reopening the file, which would fail
  /// on Windows due to mandatory locking.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  pub fn mode(&self) -> LockMode {
    self.mode
  }
}

fn write_metadata(file: &File, command: &str) -> Result<(), LockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at: Utc::now(),
    command: command.to_string(),
  };

  file.set_len(0).map_err(LockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(LockError::WriteMetadata)?;

  Ok(())
}

fn read_holder(lock_path: &Path) -> Option<LockMetadata> {
  let mut file = File::open(lock_path).ok()?;
  let mut contents = String::new();
  file.read_to_string(&mut contents).ok()?;
  serde_json::from_str(&contents).ok()
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
      return Err(io::Error::from(io::ErrorKind::WouldBlock));
    }
    Err(err)
  } else {
    Ok(())
  }
}
