use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use crate::core::error::{Error, ErrorKind, Result};

/// Owns the on-disk layout under the data root:
///
/// ```text
/// indices/<idx>/metadata.json
/// indices/<idx>/store/
/// indices/<idx>/tables/<t>/
/// indices/<idx>/data/
/// versions/v<N>/snapshot.json
/// ```
///
/// Create/delete on the same index name serialize through a per-name mutex;
/// operations on distinct names proceed independently.
pub struct DirectoryManager {
    root: PathBuf,
    max_indices: usize,
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: RwLock<DirectoryStats>,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryStats {
    pub index_count: usize,
    pub table_count: usize,
    pub total_size_bytes: u64,
}

impl DirectoryManager {
    pub fn new(root: PathBuf, max_indices: usize) -> Result<Self> {
        fs::create_dir_all(root.join("indices"))?;
        fs::create_dir_all(root.join("versions"))?;

        let manager = DirectoryManager {
            root,
            max_indices,
            name_locks: Mutex::new(HashMap::new()),
            stats: RwLock::new(DirectoryStats::default()),
        };
        manager.refresh_stats()?;
        Ok(manager)
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.name_locks.lock();
        locks.entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub fn create_index(&self, name: &str) -> Result<()> {
        validate_index_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock.lock();

        if self.index_path(name).exists() {
            return Err(Error::already_exists(name));
        }
        if self.list_indices()?.len() >= self.max_indices {
            return Err(Error::new(
                ErrorKind::LimitExceeded,
                format!("index count limit [{}] reached", self.max_indices),
            ));
        }

        fs::create_dir_all(self.store_path(name))?;
        fs::create_dir_all(self.tables_path(name))?;
        fs::create_dir_all(self.index_path(name).join("data"))?;
        self.refresh_stats()?;
        tracing::info!(index = %name, "created index directory");
        Ok(())
    }

    pub fn delete_index(&self, name: &str) -> Result<()> {
        validate_index_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock.lock();

        let path = self.index_path(name);
        if !path.exists() {
            return Err(Error::index_not_found(name));
        }
        fs::remove_dir_all(&path)?;
        self.refresh_stats()?;
        tracing::info!(index = %name, "deleted index directory");
        Ok(())
    }

    pub fn index_exists(&self, name: &str) -> bool {
        validate_index_name(name).is_ok() && self.index_path(name).exists()
    }

    pub fn list_indices(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.root.join("indices"))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn create_table(&self, index: &str, table: &str) -> Result<()> {
        validate_index_name(table)?;
        if !self.index_exists(index) {
            return Err(Error::index_not_found(index));
        }
        let path = self.table_path(index, table);
        if path.exists() {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("table [{}/{}] already exists", index, table),
            ));
        }
        fs::create_dir_all(path)?;
        self.refresh_stats()?;
        Ok(())
    }

    pub fn delete_table(&self, index: &str, table: &str) -> Result<()> {
        let path = self.table_path(index, table);
        if !path.exists() {
            return Err(Error::not_found(format!("table [{}/{}] not found", index, table)));
        }
        fs::remove_dir_all(path)?;
        self.refresh_stats()?;
        Ok(())
    }

    pub fn list_tables(&self, index: &str) -> Result<Vec<String>> {
        if !self.index_exists(index) {
            return Err(Error::index_not_found(index));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(self.tables_path(index))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    // Path getters

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self, name: &str) -> PathBuf {
        self.root.join("indices").join(name)
    }

    pub fn store_path(&self, name: &str) -> PathBuf {
        self.index_path(name).join("store")
    }

    pub fn tables_path(&self, name: &str) -> PathBuf {
        self.index_path(name).join("tables")
    }

    pub fn table_path(&self, index: &str, table: &str) -> PathBuf {
        self.tables_path(index).join(table)
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.index_path(name).join("metadata.json")
    }

    pub fn versions_path(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn get_stats(&self) -> DirectoryStats {
        self.stats.read().clone()
    }

    /// Remove empty store/table directories left behind by deleted indices.
    pub fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(self.root.join("indices"))? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() && fs::read_dir(&path)?.next().is_none() {
                fs::remove_dir(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            self.refresh_stats()?;
        }
        Ok(removed)
    }

    fn refresh_stats(&self) -> Result<()> {
        let indices = self.list_indices()?;
        let mut table_count = 0;
        let mut total_size = 0;
        for index in &indices {
            table_count += self.list_tables(index).map(|t| t.len()).unwrap_or(0);
            total_size += dir_size(&self.index_path(index))?;
        }
        *self.stats.write() = DirectoryStats {
            index_count: indices.len(),
            table_count,
            total_size_bytes: total_size,
        };
        Ok(())
    }
}

fn dir_size(path: &Path) -> Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                size += dir_size(&entry.path())?;
            } else {
                size += meta.len();
            }
        }
    }
    Ok(size)
}

/// Index name rules: lowercase letters/digits/`_`/`-`, must not start with
/// `.`/`_`/`-`, no `/`, no spaces, no `..`, at most 255 bytes.
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name(name, "must not be empty"));
    }
    if name.len() > 255 {
        return Err(Error::invalid_name(name, "must not be longer than 255 bytes"));
    }
    if name.contains("..") {
        return Err(Error::invalid_name(name, "must not contain '..'"));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or(' ');
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(Error::invalid_name(name, "must start with a lowercase letter or digit"));
    }
    for c in name.chars() {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
            return Err(Error::invalid_name(
                name,
                "must contain only lowercase letters, digits, '_' and '-'",
            ));
        }
    }
    Ok(())
}
