use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use chrono::Utc;
use parking_lot::RwLock;
use crate::core::error::{Error, ErrorKind, Result};
use crate::metadata::types::{IndexMetadata, MetadataSnapshot, TableMetadata};

/// Persistence backend for index and table metadata.
pub trait MetadataBackend: Send + Sync {
    fn save_index(&self, metadata: &IndexMetadata) -> Result<()>;
    fn load_index(&self, name: &str) -> Result<IndexMetadata>;
    fn delete_index(&self, name: &str) -> Result<()>;
    fn list_indices(&self) -> Result<Vec<String>>;

    fn save_table(&self, metadata: &TableMetadata) -> Result<()>;
    fn load_table(&self, index: &str, table: &str) -> Result<TableMetadata>;
    fn delete_table(&self, index: &str, table: &str) -> Result<()>;
    fn list_tables(&self, index: &str) -> Result<Vec<String>>;

    fn save_snapshot(&self, snapshot: &MetadataSnapshot) -> Result<()>;
    fn load_snapshot(&self, version: i64) -> Result<MetadataSnapshot>;
    fn supports_snapshots(&self) -> bool;
}

/// File backend. All writes are atomic: write to a `.tmp` sibling, fsync,
/// rename into place.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: PathBuf) -> Self {
        FileBackend { root }
    }

    fn index_metadata_path(&self, name: &str) -> PathBuf {
        self.root.join("indices").join(name).join("metadata.json")
    }

    fn table_metadata_path(&self, index: &str, table: &str) -> PathBuf {
        self.root.join("indices").join(index).join("tables").join(table).join("metadata.json")
    }

    fn snapshot_path(&self, version: i64) -> PathBuf {
        self.root.join("versions").join(format!("v{}", version)).join("snapshot.json")
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::internal(format!("no parent directory for {:?}", path)))?;
        fs::create_dir_all(parent)?;

        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl MetadataBackend for FileBackend {
    fn save_index(&self, metadata: &IndexMetadata) -> Result<()> {
        let contents = serde_json::to_vec_pretty(metadata)?;
        self.write_atomic(&self.index_metadata_path(&metadata.name), &contents)
    }

    fn load_index(&self, name: &str) -> Result<IndexMetadata> {
        let path = self.index_metadata_path(name);
        if !path.exists() {
            return Err(Error::new(
                ErrorKind::MetadataNotFound,
                format!("metadata for index [{}] not found", name),
            ));
        }
        let contents = fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn delete_index(&self, name: &str) -> Result<()> {
        let path = self.index_metadata_path(name);
        if !path.exists() {
            return Err(Error::new(
                ErrorKind::MetadataNotFound,
                format!("metadata for index [{}] not found", name),
            ));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn list_indices(&self) -> Result<Vec<String>> {
        let indices_dir = self.root.join("indices");
        let mut names = Vec::new();
        if indices_dir.exists() {
            for entry in fs::read_dir(indices_dir)? {
                let entry = entry?;
                if entry.path().join("metadata.json").exists() {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn save_table(&self, metadata: &TableMetadata) -> Result<()> {
        let contents = serde_json::to_vec_pretty(metadata)?;
        self.write_atomic(&self.table_metadata_path(&metadata.index, &metadata.name), &contents)
    }

    fn load_table(&self, index: &str, table: &str) -> Result<TableMetadata> {
        let path = self.table_metadata_path(index, table);
        if !path.exists() {
            return Err(Error::new(
                ErrorKind::MetadataNotFound,
                format!("metadata for table [{}/{}] not found", index, table),
            ));
        }
        let contents = fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn delete_table(&self, index: &str, table: &str) -> Result<()> {
        let path = self.table_metadata_path(index, table);
        if !path.exists() {
            return Err(Error::new(
                ErrorKind::MetadataNotFound,
                format!("metadata for table [{}/{}] not found", index, table),
            ));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn list_tables(&self, index: &str) -> Result<Vec<String>> {
        let tables_dir = self.root.join("indices").join(index).join("tables");
        let mut names = Vec::new();
        if tables_dir.exists() {
            for entry in fs::read_dir(tables_dir)? {
                let entry = entry?;
                if entry.path().join("metadata.json").exists() {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn save_snapshot(&self, snapshot: &MetadataSnapshot) -> Result<()> {
        let contents = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomic(&self.snapshot_path(snapshot.version), &contents)
    }

    fn load_snapshot(&self, version: i64) -> Result<MetadataSnapshot> {
        let path = self.snapshot_path(version);
        if !path.exists() {
            return Err(Error::new(
                ErrorKind::MetadataNotFound,
                format!("snapshot v{} not found", version),
            ));
        }
        let contents = fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn supports_snapshots(&self) -> bool {
        true
    }
}

/// In-memory backend. Not snapshotable; everything is lost on restart.
#[derive(Default)]
pub struct MemoryBackend {
    indices: RwLock<HashMap<String, IndexMetadata>>,
    tables: RwLock<HashMap<(String, String), TableMetadata>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataBackend for MemoryBackend {
    fn save_index(&self, metadata: &IndexMetadata) -> Result<()> {
        self.indices.write().insert(metadata.name.clone(), metadata.clone());
        Ok(())
    }

    fn load_index(&self, name: &str) -> Result<IndexMetadata> {
        self.indices.read().get(name).cloned().ok_or_else(|| {
            Error::new(ErrorKind::MetadataNotFound, format!("metadata for index [{}] not found", name))
        })
    }

    fn delete_index(&self, name: &str) -> Result<()> {
        self.indices.write().remove(name).map(|_| ()).ok_or_else(|| {
            Error::new(ErrorKind::MetadataNotFound, format!("metadata for index [{}] not found", name))
        })
    }

    fn list_indices(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn save_table(&self, metadata: &TableMetadata) -> Result<()> {
        self.tables
            .write()
            .insert((metadata.index.clone(), metadata.name.clone()), metadata.clone());
        Ok(())
    }

    fn load_table(&self, index: &str, table: &str) -> Result<TableMetadata> {
        self.tables.read().get(&(index.to_string(), table.to_string())).cloned().ok_or_else(
            || {
                Error::new(
                    ErrorKind::MetadataNotFound,
                    format!("metadata for table [{}/{}] not found", index, table),
                )
            },
        )
    }

    fn delete_table(&self, index: &str, table: &str) -> Result<()> {
        self.tables
            .write()
            .remove(&(index.to_string(), table.to_string()))
            .map(|_| ())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::MetadataNotFound,
                    format!("metadata for table [{}/{}] not found", index, table),
                )
            })
    }

    fn list_tables(&self, index: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .keys()
            .filter(|(idx, _)| idx == index)
            .map(|(_, table)| table.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn save_snapshot(&self, _snapshot: &MetadataSnapshot) -> Result<()> {
        Err(Error::new(
            ErrorKind::UnsupportedOperation,
            "memory metadata backend does not support snapshots".to_string(),
        ))
    }

    fn load_snapshot(&self, _version: i64) -> Result<MetadataSnapshot> {
        Err(Error::new(
            ErrorKind::UnsupportedOperation,
            "memory metadata backend does not support snapshots".to_string(),
        ))
    }

    fn supports_snapshots(&self) -> bool {
        false
    }
}

/// Construct a backend from a storage-type string.
pub fn backend_for(storage_type: &str, root: PathBuf) -> Result<Box<dyn MetadataBackend>> {
    match storage_type {
        "file" => Ok(Box::new(FileBackend::new(root))),
        "memory" => Ok(Box::new(MemoryBackend::new())),
        other => Err(Error::new(
            ErrorKind::UnsupportedStorageType,
            format!("unsupported metadata storage type [{}]", other),
        )),
    }
}

/// Metadata store: caches index metadata, serializes writers, and keeps the
/// global version counter. The counter increments on every mutation and on
/// every successful snapshot.
pub struct MetadataStore {
    backend: Box<dyn MetadataBackend>,
    version: AtomicI64,
    cache: RwLock<BTreeMap<String, IndexMetadata>>,
}

impl MetadataStore {
    pub fn open(backend: Box<dyn MetadataBackend>) -> Result<Self> {
        let mut cache = BTreeMap::new();
        let mut max_version = 0;
        for name in backend.list_indices()? {
            let metadata = backend.load_index(&name)?;
            max_version = max_version.max(metadata.version);
            cache.insert(name, metadata);
        }
        Ok(MetadataStore {
            backend,
            version: AtomicI64::new(max_version),
            cache: RwLock::new(cache),
        })
    }

    pub fn get_latest_version(&self) -> i64 {
        self.version.load(Ordering::Acquire)
    }

    fn next_version(&self) -> i64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn save_index(&self, mut metadata: IndexMetadata) -> Result<IndexMetadata> {
        let mut cache = self.cache.write();
        metadata.version = self.next_version();
        metadata.updated_at = Utc::now();
        self.backend.save_index(&metadata)?;
        cache.insert(metadata.name.clone(), metadata.clone());
        Ok(metadata)
    }

    /// Save with an optimistic precondition on the current stored version.
    pub fn save_index_if(&self, metadata: IndexMetadata, expected_version: i64) -> Result<IndexMetadata> {
        {
            let cache = self.cache.read();
            if let Some(current) = cache.get(&metadata.name) {
                if current.version != expected_version {
                    return Err(Error::new(
                        ErrorKind::VersionConflict,
                        format!(
                            "metadata version conflict for [{}]: expected {}, current {}",
                            metadata.name, expected_version, current.version
                        ),
                    ));
                }
            }
        }
        self.save_index(metadata)
    }

    pub fn get_index(&self, name: &str) -> Result<IndexMetadata> {
        self.cache.read().get(name).cloned().ok_or_else(|| {
            Error::new(ErrorKind::MetadataNotFound, format!("metadata for index [{}] not found", name))
        })
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.cache.read().contains_key(name)
    }

    pub fn delete_index(&self, name: &str) -> Result<()> {
        let mut cache = self.cache.write();
        if cache.remove(name).is_none() {
            return Err(Error::new(
                ErrorKind::MetadataNotFound,
                format!("metadata for index [{}] not found", name),
            ));
        }
        self.backend.delete_index(name)?;
        self.next_version();
        Ok(())
    }

    pub fn list_indices(&self) -> Vec<IndexMetadata> {
        self.cache.read().values().cloned().collect()
    }

    pub fn save_table(&self, mut metadata: TableMetadata) -> Result<TableMetadata> {
        metadata.version = self.next_version();
        self.backend.save_table(&metadata)?;
        Ok(metadata)
    }

    pub fn get_table(&self, index: &str, table: &str) -> Result<TableMetadata> {
        self.backend.load_table(index, table)
    }

    pub fn delete_table(&self, index: &str, table: &str) -> Result<()> {
        self.backend.delete_table(index, table)?;
        self.next_version();
        Ok(())
    }

    pub fn list_tables(&self, index: &str) -> Result<Vec<String>> {
        self.backend.list_tables(index)
    }

    // Aliases

    /// Map of alias name to the indices it points at.
    pub fn aliases(&self) -> BTreeMap<String, Vec<String>> {
        let cache = self.cache.read();
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for metadata in cache.values() {
            for alias in &metadata.aliases {
                map.entry(alias.clone()).or_default().push(metadata.name.clone());
            }
        }
        map
    }

    /// Resolve a name that may be an index or an alias into index names.
    pub fn resolve(&self, name: &str) -> Vec<String> {
        let cache = self.cache.read();
        if cache.contains_key(name) {
            return vec![name.to_string()];
        }
        let mut indices: Vec<String> = cache
            .values()
            .filter(|m| m.aliases.contains(name))
            .map(|m| m.name.clone())
            .collect();
        indices.sort();
        indices
    }

    pub fn add_alias(&self, index: &str, alias: &str) -> Result<()> {
        let mut metadata = self.get_index(index)?;
        if metadata.aliases.insert(alias.to_string()) {
            self.save_index(metadata)?;
        }
        Ok(())
    }

    pub fn remove_alias(&self, index: &str, alias: &str) -> Result<()> {
        let mut metadata = self.get_index(index)?;
        if !metadata.aliases.remove(alias) {
            return Err(Error::not_found(format!(
                "alias [{}] missing on index [{}]",
                alias, index
            )));
        }
        self.save_index(metadata)?;
        Ok(())
    }

    // Snapshots

    pub fn create_snapshot(&self) -> Result<MetadataSnapshot> {
        if !self.backend.supports_snapshots() {
            return Err(Error::new(
                ErrorKind::UnsupportedOperation,
                "metadata backend does not support snapshots".to_string(),
            ));
        }
        let snapshot = MetadataSnapshot {
            version: self.next_version(),
            taken_at: Utc::now(),
            indices: self.cache.read().clone(),
        };
        self.backend.save_snapshot(&snapshot)?;
        Ok(snapshot)
    }

    pub fn restore_snapshot(&self, version: i64) -> Result<()> {
        let snapshot = self.backend.load_snapshot(version)?;
        let mut cache = self.cache.write();
        for metadata in snapshot.indices.values() {
            self.backend.save_index(metadata)?;
        }
        *cache = snapshot.indices;
        self.next_version();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_store() -> (TempDir, MetadataStore) {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        let store = MetadataStore::open(Box::new(backend)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_and_reload() {
        let (dir, store) = file_store();
        let saved = store.save_index(IndexMetadata::new("books")).unwrap();
        assert_eq!(saved.version, 1);

        // New store over the same directory sees the persisted state
        let store2 =
            MetadataStore::open(Box::new(FileBackend::new(dir.path().to_path_buf()))).unwrap();
        let loaded = store2.get_index("books").unwrap();
        assert_eq!(loaded.name, "books");
        assert_eq!(store2.get_latest_version(), 1);
    }

    #[test]
    fn test_version_monotonic() {
        let (_dir, store) = file_store();
        let v1 = store.save_index(IndexMetadata::new("a")).unwrap().version;
        let v2 = store.save_index(IndexMetadata::new("b")).unwrap().version;
        let mut b = store.get_index("b").unwrap();
        b.aliases.insert("all".to_string());
        let v3 = store.save_index(b).unwrap().version;
        assert!(v1 < v2 && v2 < v3);
    }

    #[test]
    fn test_save_if_conflict() {
        let (_dir, store) = file_store();
        let saved = store.save_index(IndexMetadata::new("a")).unwrap();
        let stale = saved.version - 1;
        let err = store.save_index_if(saved, stale).unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionConflict);
    }

    #[test]
    fn test_aliases_round_trip() {
        let (_dir, store) = file_store();
        store.save_index(IndexMetadata::new("books-1")).unwrap();
        store.save_index(IndexMetadata::new("books-2")).unwrap();
        store.add_alias("books-1", "books").unwrap();
        store.add_alias("books-2", "books").unwrap();

        assert_eq!(store.resolve("books"), vec!["books-1", "books-2"]);
        assert_eq!(store.resolve("books-1"), vec!["books-1"]);

        store.remove_alias("books-1", "books").unwrap();
        assert_eq!(store.resolve("books"), vec!["books-2"]);

        // Deleting the index removes the binding from the alias map
        store.delete_index("books-2").unwrap();
        assert!(store.resolve("books").is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let (_dir, store) = file_store();
        store.save_index(IndexMetadata::new("books")).unwrap();
        let snapshot = store.create_snapshot().unwrap();

        store.delete_index("books").unwrap();
        assert!(store.get_index("books").is_err());

        store.restore_snapshot(snapshot.version).unwrap();
        assert!(store.get_index("books").is_ok());
    }

    #[test]
    fn test_memory_backend_no_snapshots() {
        let store = MetadataStore::open(Box::new(MemoryBackend::new())).unwrap();
        store.save_index(IndexMetadata::new("a")).unwrap();
        let err = store.create_snapshot().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_backend_factory() {
        assert!(backend_for("file", PathBuf::from("/tmp/x")).is_ok());
        assert!(backend_for("memory", PathBuf::from("/tmp/x")).is_ok());
        let err = backend_for("redis", PathBuf::from("/tmp/x")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedStorageType);
    }
}
