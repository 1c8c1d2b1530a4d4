use crate::state::CrawlState;
use crate::storage::atomic::write_atomic;
use crate::storage::writer::CoalescingWriter;
use crate::storage::{StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const PRIMARY_FILE: &str = "crawl_progress.json";
const BACKUP_FILE: &str = "crawl_progress.backup.json";
const STAGING_FILE: &str = "crawl_progress.tmp.json";

/// Locations of the checkpoint files inside the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPaths {
    pub primary: PathBuf,
    pub backup: PathBuf,
    pub staging: PathBuf,
}

impl ProgressPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            primary: data_dir.join(PRIMARY_FILE),
            backup: data_dir.join(BACKUP_FILE),
            staging: data_dir.join(STAGING_FILE),
        }
    }
}

struct FileLane {
    paths: ProgressPaths,
    // Serializes synchronous saves against the background lane
    write_lock: Mutex<()>,
}

impl FileLane {
    fn write(&self, state: &CrawlState) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        write_atomic(
            &self.paths.primary,
            &self.paths.staging,
            &bytes,
            Some(&self.paths.backup),
        )
    }
}

/// Checkpoint persistence for a crawl session
///
/// The primary file is always replaced atomically, with the previous
/// version kept as a backup. Cloning yields a handle to the same files and
/// the same background writer.
#[derive(Clone)]
pub struct ProgressStore {
    lane: Arc<FileLane>,
    writer: CoalescingWriter<CrawlState>,
}

impl ProgressStore {
    /// Creates a store rooted at `data_dir`
    ///
    /// # Returns
    ///
    /// * `Ok(ProgressStore)` - Store ready for use
    /// * `Err(StorageError)` - The path is unusable
    pub fn new(data_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let data_dir = data_dir.as_ref();
        if data_dir.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath(
                "data directory must not be empty".to_string(),
            ));
        }
        if data_dir.is_file() {
            return Err(StorageError::InvalidPath(format!(
                "{} is a file, not a directory",
                data_dir.display()
            )));
        }

        let lane = Arc::new(FileLane {
            paths: ProgressPaths::new(data_dir),
            write_lock: Mutex::new(()),
        });
        let sink_lane = Arc::clone(&lane);
        let writer = CoalescingWriter::new("checkpoint", move |state: CrawlState| {
            sink_lane.write(&state)
        });

        Ok(Self { lane, writer })
    }

    pub fn paths(&self) -> &ProgressPaths {
        &self.lane.paths
    }

    /// Returns true if a primary or backup checkpoint exists
    pub fn exists(&self) -> bool {
        self.lane.paths.primary.exists() || self.lane.paths.backup.exists()
    }

    /// Loads the last checkpoint
    ///
    /// Falls back to the backup when the primary is missing or unreadable,
    /// and restores the primary from it. The loaded state is normalized.
    ///
    /// # Returns
    ///
    /// * `Some(CrawlState)` - A checkpoint was recovered
    /// * `None` - No usable checkpoint exists
    pub fn load(&self) -> Option<CrawlState> {
        let paths = &self.lane.paths;

        match read_state(&paths.primary) {
            Ok(Some(mut state)) => {
                state.normalize();
                return Some(state);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Checkpoint {} unreadable: {}", paths.primary.display(), e),
        }

        match read_state(&paths.backup) {
            Ok(Some(mut state)) => {
                tracing::warn!("Recovered checkpoint from backup {}", paths.backup.display());
                if let Err(e) = self.restore_primary() {
                    tracing::warn!("Could not restore primary checkpoint: {}", e);
                }
                state.normalize();
                Some(state)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Backup checkpoint {} unreadable: {}", paths.backup.display(), e);
                None
            }
        }
    }

    /// Writes a checkpoint synchronously
    pub fn save(&self, state: &CrawlState) -> StorageResult<()> {
        self.lane.write(state)
    }

    /// Hands a snapshot to the background writer
    ///
    /// Never blocks on disk I/O. Failures are logged by the writer.
    pub fn save_async(&self, snapshot: CrawlState) {
        self.writer.submit(snapshot);
    }

    /// Waits for the background writer to go idle
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Number of background writes performed so far
    pub fn background_writes(&self) -> u64 {
        self.writer.writes()
    }

    /// Deletes every checkpoint file
    pub fn clear(&self) -> StorageResult<()> {
        let paths = &self.lane.paths;
        let _guard = self.lane.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        for path in [&paths.primary, &paths.backup, &paths.staging] {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn restore_primary(&self) -> StorageResult<()> {
        let paths = &self.lane.paths;
        let bytes = fs::read(&paths.backup)?;
        let _guard = self.lane.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        write_atomic(&paths.primary, &paths.staging, &bytes, None)
    }
}

fn read_state(path: &Path) -> StorageResult<Option<CrawlState>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}
