use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use crate::analysis::AnalyzerRegistry;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{validate_doc_id, RefreshPolicy, WriteConditions, WriteOutcome};
use crate::directory::DirectoryManager;
use crate::engine::{DocumentShredder, Engine, EngineConfig};
use crate::mapping::Mapping;
use crate::metadata::{backend_for, IndexMetadata, IndexState, MetadataStore};
use crate::search::QueryCache;

/// An open index: its engine plus the per-index query-result cache.
pub struct IndexHandle {
    pub engine: Arc<Engine>,
    pub cache: Arc<QueryCache>,
}

/// Owns every index in the node: directory layout, metadata, the analyzer
/// registry, and a cache of open engines guarded by a narrow open mutex so
/// concurrent misses cannot double-open the same index.
pub struct IndexManager {
    config: Config,
    directory: DirectoryManager,
    metadata: MetadataStore,
    analyzers: AnalyzerRegistry,
    engines: RwLock<HashMap<String, Arc<IndexHandle>>>,
    open_mu: Mutex<()>,
}

impl IndexManager {
    pub fn new(config: Config, analyzers: AnalyzerRegistry) -> Result<Self> {
        Self::with_metadata_storage(config, analyzers, "file")
    }

    /// Construct with an explicit metadata storage type (`file` or
    /// `memory`).
    pub fn with_metadata_storage(
        config: Config,
        analyzers: AnalyzerRegistry,
        storage_type: &str,
    ) -> Result<Self> {
        let directory = DirectoryManager::new(config.data_dir.clone(), config.max_indices)?;
        let backend = backend_for(storage_type, config.data_dir.clone())?;
        let metadata = MetadataStore::open(backend)?;
        Ok(IndexManager {
            config,
            directory,
            metadata,
            analyzers,
            engines: RwLock::new(HashMap::new()),
            open_mu: Mutex::new(()),
        })
    }

    pub fn analyzers(&self) -> &AnalyzerRegistry {
        &self.analyzers
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn directory(&self) -> &DirectoryManager {
        &self.directory
    }

    // Index lifecycle

    /// Create an index from an optional `{settings, mappings, aliases}`
    /// body.
    pub fn create_index(&self, name: &str, body: Option<&Value>) -> Result<IndexMetadata> {
        if self.metadata.index_exists(name) {
            return Err(Error::already_exists(name));
        }
        self.directory.create_index(name)?;

        let mut metadata = IndexMetadata::new(name);
        if let Some(body) = body {
            if let Some(mappings) = body.get("mappings") {
                metadata.mapping = Mapping::from_json(mappings)?;
            }
            if let Some(settings) = body.get("settings") {
                metadata.settings = serde_json::from_value(settings.clone())
                    .map_err(|e| Error::illegal_argument(format!("invalid settings: {}", e)))?;
            }
            if let Some(aliases) = body.get("aliases").and_then(|a| a.as_object()) {
                for alias in aliases.keys() {
                    metadata.aliases.insert(alias.clone());
                }
            }
        }
        let saved = self.metadata.save_index(metadata)?;
        tracing::info!(index = %name, version = saved.version, "created index");
        Ok(saved)
    }

    /// Delete an index: close its engine, drop metadata (which atomically
    /// removes alias bindings), then remove the directory.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        if !self.metadata.index_exists(name) {
            return Err(Error::index_not_found(name));
        }
        if let Some(handle) = self.engines.write().remove(name) {
            handle.engine.close()?;
        }
        self.metadata.delete_index(name)?;
        self.directory.delete_index(name)?;
        tracing::info!(index = %name, "deleted index");
        Ok(())
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.metadata.index_exists(name)
    }

    pub fn get_metadata(&self, name: &str) -> Result<IndexMetadata> {
        self.metadata.get_index(name).map_err(|_| Error::index_not_found(name))
    }

    pub fn list_indices(&self) -> Vec<IndexMetadata> {
        self.metadata.list_indices()
    }

    /// Close an index: writes are rejected and the engine is released, but
    /// data and metadata stay on disk.
    pub fn close_index(&self, name: &str) -> Result<()> {
        let mut metadata = self.get_metadata(name)?;
        if let Some(handle) = self.engines.write().remove(name) {
            handle.engine.close()?;
        }
        metadata.state = IndexState::Closed;
        self.metadata.save_index(metadata)?;
        Ok(())
    }

    pub fn open_index(&self, name: &str) -> Result<()> {
        let mut metadata = self.get_metadata(name)?;
        if metadata.state == IndexState::Open {
            return Ok(());
        }
        metadata.state = IndexState::Open;
        self.metadata.save_index(metadata)?;
        Ok(())
    }

    /// The open engine for an index, opening it on first use. The narrow
    /// `open_mu` plus a double check prevents two concurrent misses from
    /// opening the same engine twice.
    pub fn handle(&self, name: &str) -> Result<Arc<IndexHandle>> {
        if let Some(handle) = self.engines.read().get(name).cloned() {
            return Ok(handle);
        }

        let metadata = self.get_metadata(name)?;
        if metadata.state == IndexState::Closed {
            return Err(Error::illegal_argument(format!("index [{}] is closed", name)));
        }

        let _guard = self.open_mu.lock();
        if let Some(handle) = self.engines.read().get(name).cloned() {
            return Ok(handle);
        }

        let engine_config = EngineConfig {
            buffer_docs: self.config.writer_buffer_docs,
            refresh_interval: self.config.refresh_interval,
            wal_sync_bytes: self.config.wal_sync_bytes,
        };
        let engine = Engine::open(name, &self.directory.store_path(name), engine_config)?;
        let handle = Arc::new(IndexHandle {
            engine,
            cache: Arc::new(QueryCache::new(self.config.query_cache_entries)),
        });
        self.engines.write().insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Resolve a request target (index name or alias) to index names.
    pub fn resolve(&self, name: &str) -> Result<Vec<String>> {
        let indices = self.metadata.resolve(name);
        if indices.is_empty() {
            return Err(Error::index_not_found(name));
        }
        Ok(indices)
    }

    /// Resolve to exactly one index, as write operations require.
    pub fn resolve_one(&self, name: &str) -> Result<String> {
        let mut indices = self.resolve(name)?;
        if indices.len() > 1 {
            return Err(Error::illegal_argument(format!(
                "alias [{}] has more than one index associated with it",
                name
            )));
        }
        Ok(indices.remove(0))
    }

    // Document operations

    /// Index a document, inferring mappings for unmapped fields first.
    /// Returns the outcome together with the engine so callers can honor
    /// `refresh=wait_for`.
    pub fn index_document(
        &self,
        index: &str,
        id: Option<String>,
        source: &Value,
        conditions: WriteConditions,
        create_only: bool,
        refresh: RefreshPolicy,
    ) -> Result<(WriteOutcome, Arc<Engine>)> {
        // Writes auto-create missing indices, as clients expect
        let index = match self.resolve_one(index) {
            Ok(resolved) => resolved,
            Err(err) if err.kind == ErrorKind::IndexNotFound => {
                self.create_index(index, None)?;
                index.to_string()
            }
            Err(err) => return Err(err),
        };
        let id = match id {
            Some(id) => {
                validate_doc_id(&id)?;
                id
            }
            None => uuid::Uuid::new_v4().simple().to_string(),
        };

        let mut metadata = self.get_metadata(&index)?;
        if metadata.mapping.infer_from_document(source) {
            metadata.mapping.validate()?;
            metadata = self.metadata.save_index(metadata)?;
        }

        let shredder = DocumentShredder::new(&metadata.mapping, &self.analyzers);
        let doc = shredder.shred(&id, source)?;

        let handle = self.handle(&index)?;
        let durable = refresh == RefreshPolicy::WaitFor;
        let outcome = handle.engine.index(doc, conditions, create_only, durable)?;
        if refresh == RefreshPolicy::Immediate {
            handle.engine.refresh();
        }
        Ok((outcome, handle.engine.clone()))
    }

    pub fn get_document(
        &self,
        index: &str,
        id: &str,
    ) -> Result<Option<(Value, crate::engine::LiveDoc)>> {
        let index = self.resolve_one(index)?;
        let handle = self.handle(&index)?;
        handle.engine.get_latest(id)
    }

    pub fn delete_document(
        &self,
        index: &str,
        id: &str,
        conditions: WriteConditions,
        refresh: RefreshPolicy,
    ) -> Result<(WriteOutcome, Arc<Engine>)> {
        let index = self.resolve_one(index)?;
        let handle = self.handle(&index)?;
        let durable = refresh == RefreshPolicy::WaitFor;
        let outcome = handle.engine.delete(id, conditions, durable)?;
        if refresh == RefreshPolicy::Immediate {
            handle.engine.refresh();
        }
        Ok((outcome, handle.engine.clone()))
    }

    /// Partial update: merge `doc` into the current source (or upsert),
    /// then rewrite through the normal index path. Scripted updates are
    /// not supported.
    pub fn update_document(
        &self,
        index: &str,
        id: &str,
        body: &Value,
        refresh: RefreshPolicy,
    ) -> Result<(WriteOutcome, Arc<Engine>)> {
        if body.get("script").is_some() {
            return Err(Error::illegal_argument("scripted updates are not supported"));
        }
        let partial = body
            .get("doc")
            .ok_or_else(|| Error::illegal_argument("update requires [doc]"))?;
        let doc_as_upsert =
            body.get("doc_as_upsert").and_then(|v| v.as_bool()).unwrap_or(false);

        let index = self.resolve_one(index)?;
        let current = self.get_document(&index, id)?;
        let merged = match current {
            Some((mut source, _)) => {
                merge_json(&mut source, partial);
                source
            }
            None if doc_as_upsert => partial.clone(),
            None => return Err(Error::not_found(format!("document [{}] not found", id))),
        };
        self.index_document(
            &index,
            Some(id.to_string()),
            &merged,
            WriteConditions::default(),
            false,
            refresh,
        )
    }

    // Shutdown

    /// Close every open engine, flushing their WALs.
    pub fn close_all(&self) -> Result<()> {
        let handles: Vec<(String, Arc<IndexHandle>)> =
            self.engines.write().drain().collect();
        for (name, handle) in handles {
            if let Err(err) = handle.engine.close() {
                tracing::error!(index = %name, error = %err, "failed to close engine");
            }
        }
        Ok(())
    }
}

/// Recursive object merge: objects merge key-by-key, everything else is
/// replaced.
fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager() -> (TempDir, IndexManager) {
        let dir = TempDir::new().unwrap();
        let config = Config { data_dir: dir.path().to_path_buf(), ..Config::default() };
        let manager = IndexManager::new(config, AnalyzerRegistry::new()).unwrap();
        (dir, manager)
    }

    #[test]
    fn test_create_and_delete_index() {
        let (_dir, manager) = manager();
        manager
            .create_index(
                "books",
                Some(&json!({"mappings": {"properties": {"title": {"type": "text"}}}})),
            )
            .unwrap();
        assert!(manager.index_exists("books"));
        assert!(manager.create_index("books", None).is_err());

        manager.delete_index("books").unwrap();
        assert!(!manager.index_exists("books"));
        assert!(matches!(
            manager.delete_index("books").unwrap_err().kind,
            ErrorKind::IndexNotFound
        ));
    }

    #[test]
    fn test_write_read_round_trip() {
        let (_dir, manager) = manager();
        manager.create_index("books", None).unwrap();

        let source = json!({"title": "the quick brown fox", "price": 10});
        let (outcome, _) = manager
            .index_document(
                "books",
                Some("1".to_string()),
                &source,
                WriteConditions::default(),
                false,
                RefreshPolicy::None,
            )
            .unwrap();
        assert!(outcome.created);

        // _source comes back verbatim
        let (loaded, live) = manager.get_document("books", "1").unwrap().unwrap();
        assert_eq!(loaded, source);
        assert_eq!(live.version, 1);

        // Dynamic mapping picked up the fields
        let metadata = manager.get_metadata("books").unwrap();
        assert!(metadata.mapping.field("title").is_some());
        assert!(metadata.mapping.field("price").is_some());
        manager.close_all().unwrap();
    }

    #[test]
    fn test_update_merges() {
        let (_dir, manager) = manager();
        manager.create_index("books", None).unwrap();
        manager
            .index_document(
                "books",
                Some("1".to_string()),
                &json!({"title": "fox", "price": 10}),
                WriteConditions::default(),
                false,
                RefreshPolicy::None,
            )
            .unwrap();

        let (outcome, _) = manager
            .update_document("books", "1", &json!({"doc": {"price": 12}}), RefreshPolicy::None)
            .unwrap();
        assert_eq!(outcome.version, 2);

        let (source, _) = manager.get_document("books", "1").unwrap().unwrap();
        assert_eq!(source, json!({"title": "fox", "price": 12}));

        // Scripted updates are rejected
        assert!(manager
            .update_document("books", "1", &json!({"script": "ctx..."}), RefreshPolicy::None)
            .is_err());
        manager.close_all().unwrap();
    }

    #[test]
    fn test_update_upsert() {
        let (_dir, manager) = manager();
        manager.create_index("books", None).unwrap();
        assert!(manager
            .update_document("books", "9", &json!({"doc": {"a": 1}}), RefreshPolicy::None)
            .is_err());
        let (outcome, _) = manager
            .update_document(
                "books",
                "9",
                &json!({"doc": {"a": 1}, "doc_as_upsert": true}),
                RefreshPolicy::None,
            )
            .unwrap();
        assert!(outcome.created);
        manager.close_all().unwrap();
    }

    #[test]
    fn test_alias_resolution() {
        let (_dir, manager) = manager();
        manager.create_index("books-1", None).unwrap();
        manager.create_index("books-2", None).unwrap();
        manager.metadata().add_alias("books-1", "books").unwrap();
        manager.metadata().add_alias("books-2", "books").unwrap();

        assert_eq!(manager.resolve("books").unwrap().len(), 2);
        assert!(manager.resolve_one("books").is_err());
        assert_eq!(manager.resolve_one("books-1").unwrap(), "books-1");
        assert!(manager.resolve("missing").is_err());
    }

    #[test]
    fn test_closed_index_rejects_handle() {
        let (_dir, manager) = manager();
        manager.create_index("books", None).unwrap();
        manager.close_index("books").unwrap();
        assert!(manager.handle("books").is_err());

        manager.open_index("books").unwrap();
        assert!(manager.handle("books").is_ok());
        manager.close_all().unwrap();
    }

    #[test]
    fn test_merge_json() {
        let mut target = json!({"a": {"b": 1, "c": 2}, "d": 3});
        merge_json(&mut target, &json!({"a": {"b": 9}, "e": 4}));
        assert_eq!(target, json!({"a": {"b": 9, "c": 2}, "d": 3, "e": 4}));
    }
}
