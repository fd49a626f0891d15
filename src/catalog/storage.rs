use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

/// Directory inside a table root that marks a committed Delta table.
pub(crate) const DELTA_LOG_DIR: &str = "_delta_log";

/// Storage-specific capabilities of the lake: where tables live, how to find
/// them on startup and how to drop their files.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Printable root of the lake, used in errors and logs.
    fn root(&self) -> String;

    /// Location of `name` as understood by the table engine.
    fn table_uri(&self, name: &str) -> String;

    /// Make the root usable; called once before the catalog is rebuilt.
    async fn prepare(&self) -> io::Result<()> {
        Ok(())
    }

    /// Names of entries under the root that look like committed tables.
    async fn discover(&self) -> io::Result<Vec<String>>;

    /// Remove every file of `name`. Missing storage is not an error.
    async fn delete_table_storage(&self, name: &str) -> io::Result<()>;
}

/// Tables stored as sub-directories of a local directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the lake.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn root(&self) -> String {
        self.root.display().to_string()
    }

    fn table_uri(&self, name: &str) -> String {
        self.table_path(name).display().to_string()
    }

    async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    async fn discover(&self) -> io::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if !tokio::fs::try_exists(entry.path().join(DELTA_LOG_DIR)).await? {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_table_storage(&self, name: &str) -> io::Result<()> {
        match tokio::fs::remove_dir_all(self.table_path(name)).await {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
