// Cross-process lock around the load-check-refresh-persist sequence

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::PersistenceError;

/// Interval between lock attempts
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound on waiting for another holder (covers two 30s exchanges)
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(90);

/// Exclusive advisory lock on `<store>.lock`, released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Lock file path for a store file
    pub fn path_for(store_path: &Path) -> PathBuf {
        let mut name = store_path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        store_path.with_file_name(name)
    }

    /// Acquire the lock, polling until `timeout` elapses
    pub async fn acquire(store_path: &Path, timeout: Duration) -> Result<Self, PersistenceError> {
        let path = Self::path_for(store_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| PersistenceError::Lock {
                path: path.clone(),
                source,
            })?;

        let started = Instant::now();
        let mut reported = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Store lock acquired");
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= timeout {
                        return Err(PersistenceError::LockTimeout {
                            path,
                            waited_secs: timeout.as_secs(),
                        });
                    }
                    if !reported {
                        tracing::info!(
                            path = %path.display(),
                            "Waiting for another token refresh to finish"
                        );
                        reported = true;
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(source) => return Err(PersistenceError::Lock { path, source }),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to release store lock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path() {
        assert_eq!(
            StoreLock::path_for(Path::new("/etc/nsp/nsp_config.ini")),
            PathBuf::from("/etc/nsp/nsp_config.ini.lock")
        );
    }

    #[tokio::test]
    async fn test_second_holder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("nsp_config.ini");

        let _held = StoreLock::acquire(&store_path, DEFAULT_LOCK_TIMEOUT)
            .await
            .unwrap();
        let err = StoreLock::acquire(&store_path, Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("nsp_config.ini");

        let first = StoreLock::acquire(&store_path, DEFAULT_LOCK_TIMEOUT)
            .await
            .unwrap();
        drop(first);

        assert!(StoreLock::acquire(&store_path, Duration::from_millis(250))
            .await
            .is_ok());
    }
}
