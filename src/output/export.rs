use crate::api::{BattleDetail, BattleList, PlayerDetail};
use crate::state::CrawlState;
use crate::storage::{write_atomic, CoalescingWriter, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LATEST_EXPORT_FILE: &str = "export_latest.json";
const SNAPSHOT_PREFIX: &str = "export_data_";

/// The exported dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub combined_battles: Option<BattleList>,
    pub battle_details: Vec<BattleDetail>,
    pub players: Vec<PlayerDetail>,
}

impl From<&CrawlState> for ExportData {
    fn from(state: &CrawlState) -> Self {
        Self {
            combined_battles: state.combined_battles.clone(),
            battle_details: state.battle_details.clone(),
            players: state.players.clone(),
        }
    }
}

/// One file found in the export directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFileInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Writes export artifacts into a single directory
///
/// Snapshots get a timestamped name, the "latest" export is overwritten in
/// place. Both go through the same atomic write as checkpoints.
#[derive(Clone)]
pub struct ExportWriter {
    dir: PathBuf,
    latest: CoalescingWriter<Arc<ExportData>>,
}

impl ExportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let target = dir.join(LATEST_EXPORT_FILE);
        let latest = CoalescingWriter::new("export", move |data: Arc<ExportData>| {
            write_json(&target, &data)
        });
        Self { dir, latest }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_EXPORT_FILE)
    }

    /// Writes a new timestamped export
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Path of the file written
    /// * `Err(StorageError)` - The export could not be written
    pub fn export_snapshot(&self, data: &ExportData) -> StorageResult<PathBuf> {
        let name = format!("{}{}.json", SNAPSHOT_PREFIX, Utc::now().timestamp_millis());
        let target = self.dir.join(name);
        write_json(&target, data)?;
        tracing::info!("Exported snapshot to {}", target.display());
        Ok(target)
    }

    /// Overwrites the "latest" export
    pub fn export_latest(&self, data: &ExportData) -> StorageResult<PathBuf> {
        let target = self.latest_path();
        write_json(&target, data)?;
        tracing::debug!("Updated {}", target.display());
        Ok(target)
    }

    /// Hands a snapshot to the background export lane
    pub fn export_latest_async(&self, data: Arc<ExportData>) {
        self.latest.submit(data);
    }

    /// Waits for the background export lane to go idle
    pub async fn flush(&self) {
        self.latest.flush().await;
    }

    /// Lists `.json` files in the export directory, newest first
    pub fn list_exports(&self) -> StorageResult<Vec<ExportFileInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.to_ascii_lowercase().ends_with(".json") {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            files.push(ExportFileInfo {
                name,
                path: entry.path(),
                size_bytes: metadata.len(),
                modified,
            });
        }

        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(files)
    }
}

fn write_json(target: &Path, data: &ExportData) -> StorageResult<()> {
    let file_name = target
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(target.display().to_string()))?;
    let mut staging_name = file_name.to_os_string();
    staging_name.push(".tmp");
    let staging = target.with_file_name(staging_name);

    let bytes = serde_json::to_vec_pretty(data)?;
    write_atomic(target, &staging, &bytes, None)
}
