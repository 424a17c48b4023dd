// # File Address Store
//
// File-based implementation of AddrStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: the previous file is kept as `.backup`
// - Recovery: falls back to the backup if the main file does not parse
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "addrs": {
//     "ipv4_addr": "1.2.3.4",
//     "ipv6_addr": null,
//     "updated_at": "2025-01-09T12:00:00Z"
//   }
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::addr_store::{AddrStore, CachedAddrs};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

/// File-based address store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use ddnsmgr_core::state::FileAddrStore;
/// use ddnsmgr_core::traits::AddrStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileAddrStore::new("/var/lib/ddnsmgr/state.json").await?;
///     store.save("1.2.3.4".parse()?).await?;
///     let cached = store.load().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileAddrStore {
    path: PathBuf,
    addrs: Mutex<CachedAddrs>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    addrs: CachedAddrs,
}

impl FileAddrStore {
    /// Open (or create) a store at `path`
    ///
    /// The parent directory is created if missing. A corrupted file is
    /// recovered from its backup; if that fails too the store starts empty.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let addrs = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            addrs: Mutex::new(addrs),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<CachedAddrs, Error> {
        match Self::read_file(path).await {
            Ok(addrs) => Ok(addrs),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "State file {} is corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(CachedAddrs::default());
                }

                match Self::read_file(&backup_path).await {
                    Ok(addrs) => {
                        tracing::info!("Recovered cached addresses from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore state file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(addrs)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok(CachedAddrs::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn read_file(path: &Path) -> Result<CachedAddrs, Error> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(CachedAddrs::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!("Failed to read state file {}: {}", path.display(), e))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.addrs)
    }

    async fn write_file(&self, addrs: &CachedAddrs) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            addrs: addrs.clone(),
        };
        let json = serde_json::to_string_pretty(&state_file)?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Cached addresses written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl AddrStore for FileAddrStore {
    async fn load(&self) -> Result<CachedAddrs, Error> {
        Ok(self.addrs.lock().await.clone())
    }

    async fn save(&self, addr: IpAddr) -> Result<(), Error> {
        // Held across the write so concurrent saves hit the disk in order.
        let mut guard = self.addrs.lock().await;
        guard.set(addr);
        self.write_file(&guard).await
    }
}
