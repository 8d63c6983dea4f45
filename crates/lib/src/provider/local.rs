//! A file-backed simulated cloud, one inventory file per environment.
//!
//! This lets the whole up/down/plan flow run without a cloud account: base
//! and runtime deployments executed by separate processes see each other's
//! resources through the shared inventory, exactly as they would through a
//! real provider's tag API.
//!
//! ```text
//! {inventory_dir}/
//! ├── dev.json     # {"format": 1, "env": "dev", "region": "...", "items": [...]}
//! └── dev.lock
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{CreateRequest, DestroyRequest, InventoryItem, ProviderError, ProviderHandle, ResourceProvider};
use crate::catalog::TagQuery;
use crate::state::{FileLock, LockError, LockMode};

const INVENTORY_FORMAT_VERSION: u32 = 1;

/// How long to wait for another process to finish writing the inventory.
const INVENTORY_LOCK_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
struct InventoryFile {
  format: u32,
  env: String,
  #[serde(default)]
  region: Option<String>,
  items: Vec<InventoryItem>,
}

#[derive(Debug)]
pub struct LocalProvider {
  dir: PathBuf,
  env: String,
  region: Option<String>,
  counter: AtomicU64,
  /// Serializes read-modify-write cycles within this process.
  write_guard: Mutex<()>,
}

impl LocalProvider {
  pub fn new(dir: PathBuf, env: impl Into<String>, region: Option<String>) -> Self {
    Self {
      dir,
      env: env.into(),
      region,
      counter: AtomicU64::new(0),
      write_guard: Mutex::new(()),
    }
  }

  fn inventory_path(&self) -> PathBuf {
    self.dir.join(format!("{}.json", self.env))
  }

  fn lock_path(&self) -> PathBuf {
    self.dir.join(format!("{}.lock", self.env))
  }

  fn read(&self) -> Result<InventoryFile, ProviderError> {
    let content = match fs::read_to_string(self.inventory_path()) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Ok(InventoryFile {
          format: INVENTORY_FORMAT_VERSION,
          env: self.env.clone(),
          region: self.region.clone(),
          items: Vec::new(),
        });
      }
      Err(e) => return Err(e.into()),
    };

    let inventory: InventoryFile =
      serde_json::from_str(&content).map_err(|e| ProviderError::Io(format!("corrupt inventory: {}", e)))?;
    if inventory.format != INVENTORY_FORMAT_VERSION {
      return Err(ProviderError::Io(format!(
        "unsupported inventory format {}",
        inventory.format
      )));
    }
    Ok(inventory)
  }

  fn write(&self, inventory: &InventoryFile) -> Result<(), ProviderError> {
    fs::create_dir_all(&self.dir)?;
    let content = serde_json::to_string_pretty(inventory).map_err(|e| ProviderError::Io(e.to_string()))?;
    let mut temp = NamedTempFile::new_in(&self.dir)?;
    temp.write_all(content.as_bytes())?;
    temp.persist(self.inventory_path()).map_err(|e| ProviderError::from(e.error))?;
    Ok(())
  }

  /// Run a read-modify-write cycle under both the in-process and the file lock.
  async fn mutate<T>(
    &self,
    op: &str,
    f: impl FnOnce(&mut InventoryFile) -> Result<T, ProviderError>,
  ) -> Result<T, ProviderError> {
    let _guard = self.write_guard.lock().await;
    let _lock = FileLock::acquire(&self.lock_path(), LockMode::Exclusive, op, INVENTORY_LOCK_WAIT)
      .await
      .map_err(|e| match e {
        LockError::Contention { .. } => ProviderError::Throttled(format!("inventory busy: {}", e)),
        other => ProviderError::Io(other.to_string()),
      })?;

    let mut inventory = self.read()?;
    let value = f(&mut inventory)?;
    self.write(&inventory)?;
    Ok(value)
  }

  fn new_handle(&self, request: &CreateRequest) -> ProviderHandle {
    let mut hasher = Sha256::new();
    hasher.update(self.env.as_bytes());
    hasher.update(request.spec_id.as_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(self.counter.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(
      chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_le_bytes(),
    );
    let digest = hex::encode(hasher.finalize());
    ProviderHandle(format!("{}-{}", request.kind, &digest[..12]))
  }
}

#[async_trait]
impl ResourceProvider for LocalProvider {
  fn name(&self) -> &str {
    "local"
  }

  async fn create(&self, request: &CreateRequest) -> Result<ProviderHandle, ProviderError> {
    let handle = self.new_handle(request);
    let item = InventoryItem {
      handle: handle.clone(),
      kind: request.kind.clone(),
      tags: request.tags.clone(),
    };

    self
      .mutate("create", |inventory| {
        inventory.items.push(item);
        Ok(())
      })
      .await?;

    info!(spec = %request.spec_id, handle = %handle, env = %self.env, "local provider created resource");
    Ok(handle)
  }

  async fn destroy(&self, request: &DestroyRequest) -> Result<(), ProviderError> {
    self
      .mutate("destroy", |inventory| {
        let before = inventory.items.len();
        inventory.items.retain(|item| item.handle != request.handle);
        if inventory.items.len() == before {
          return Err(ProviderError::NotFound(request.handle.to_string()));
        }
        Ok(())
      })
      .await?;

    info!(spec = %request.spec_id, handle = %request.handle, env = %self.env, "local provider destroyed resource");
    Ok(())
  }

  async fn describe(&self, handle: &ProviderHandle) -> Result<Option<InventoryItem>, ProviderError> {
    let inventory = self.read()?;
    Ok(inventory.items.into_iter().find(|item| &item.handle == handle))
  }

  async fn list(&self, query: &TagQuery) -> Result<Vec<InventoryItem>, ProviderError> {
    let inventory = self.read()?;
    let matches: Vec<InventoryItem> = inventory
      .items
      .into_iter()
      .filter(|item| query.matches(&item.tags))
      .collect();
    debug!(query = %query, matches = matches.len(), "local provider list");
    Ok(matches)
  }
}
