use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;

/// Key the task list is stored under.
pub const STORAGE_KEY: &str = "todo-list-data-v1";

/// Opaque key/value blob storage.
pub trait BlobStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// One file per key inside `dir`, written atomically.
#[derive(Debug)]
pub struct FileBlobStore {
    pub dir: PathBuf,
}

impl FileBlobStore {
    #[tracing::instrument(skip(dir))]
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        let dir = dir.to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        info!(dir = %dir.display(), "opened blob store");
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(file = %path.display(), "blob absent");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value), fields(bytes = value.len()))]
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), "writing blob atomically");

        let failed = || format!("failed to write {}", path.display());
        let mut temp = NamedTempFile::new_in(&self.dir).with_context(failed)?;
        temp.write_all(value.as_bytes()).with_context(failed)?;
        temp.flush().with_context(failed)?;

        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// In-process store. A quota, when set, rejects values larger than it.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    entries: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: HashMap::new(),
            quota: Some(quota),
        }
    }

    pub fn insert_raw(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        if let Some(quota) = self.quota
            && value.len() > quota
        {
            return Err(anyhow!(
                "quota exceeded: {} bytes over a {quota} byte limit",
                value.len()
            ));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Reads and writes the task list under [`STORAGE_KEY`].
pub struct TaskRepository {
    blobs: Box<dyn BlobStore>,
}

impl std::fmt::Debug for TaskRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRepository").finish_non_exhaustive()
    }
}

impl TaskRepository {
    pub fn new(blobs: Box<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBlobStore::new()))
    }

    /// Never fails: a missing, unreadable or malformed blob yields an empty
    /// list.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Vec<Task> {
        let raw = match self.blobs.get(STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no stored task list; starting empty");
                return Vec::new();
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to read task list; starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(tasks) => {
                let tasks = sanitize(tasks);
                debug!(count = tasks.len(), "loaded tasks");
                tasks
            }
            Err(err) => {
                warn!(error = %err, "stored task list is malformed; starting empty");
                Vec::new()
            }
        }
    }

    /// Writes unconditionally; failures are logged and swallowed.
    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save(&mut self, tasks: &[Task]) {
        if let Err(err) = self.try_save(tasks) {
            warn!(error = %format!("{err:#}"), "failed to save task list");
        }
    }

    pub fn try_save(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(tasks)?;
        self.blobs
            .set(STORAGE_KEY, &serialized)
            .context("failed to write task list")
    }
}

fn sanitize(tasks: Vec<Task>) -> Vec<Task> {
    let before = tasks.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<Task> = tasks
        .into_iter()
        .filter(|task| !task.text.trim().is_empty())
        .filter(|task| seen.insert(task.id.clone()))
        .collect();

    if kept.len() != before {
        warn!(
            before,
            after = kept.len(),
            "dropped blank or duplicate stored tasks"
        );
    }
    kept
}
