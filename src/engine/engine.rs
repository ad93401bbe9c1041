use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use roaring::RoaringBitmap;
use serde_json::Value;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{FieldValue, WriteConditions, WriteOutcome};
use crate::engine::doc::{IndexedDocument, LiveDoc};
use crate::engine::file_lock::WriterLock;
use crate::engine::merge::{merge_segments, MergePolicy, TieredMergePolicy};
use crate::engine::segment::{SegmentBuffer, SegmentId, SegmentMeta};
use crate::engine::segment_reader::DiskSegment;
use crate::engine::segment_writer::write_segment;
use crate::engine::snapshot::{SegmentHandle, Snapshot};
use crate::engine::wal::{SyncMode, Wal, WalOp, WalRecord};

pub const PRIMARY_TERM: i64 = 1;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Buffered documents that trigger an automatic flush.
    pub buffer_docs: usize,
    pub refresh_interval: Duration,
    pub wal_sync_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            buffer_docs: 10_000,
            refresh_interval: Duration::from_secs(1),
            wal_sync_bytes: 1024 * 1024,
        }
    }
}

/// Everything guarded by the single writer mutex.
struct WriterState {
    buffer: SegmentBuffer,
    /// Sealed RAM segments awaiting flush.
    sealed: Vec<Arc<SegmentHandle>>,
    /// On-disk segments, sorted by min_doc.
    disk: Vec<Arc<SegmentHandle>>,
    live: HashMap<String, LiveDoc>,
    /// Versions of deleted keys, so a re-created doc continues the chain.
    tombstones: HashMap<String, i64>,
    deleted: RoaringBitmap,
    next_doc_id: u32,
    next_seq_no: i64,
    /// Highest sequence number sealed into a searchable segment.
    last_sealed_seq: i64,
    wal: Wal,
    /// Writes since the last published snapshot.
    dirty: bool,
}

enum MergeSignal {
    Check,
    Shutdown,
}

/// Per-index storage engine: a single writer, multi-reader snapshots, a
/// WAL for the unflushed tail, and background refresh/merge.
pub struct Engine {
    name: String,
    store_dir: PathBuf,
    config: EngineConfig,
    writer: Mutex<WriterState>,
    current: RwLock<Arc<Snapshot>>,
    snapshot_version: AtomicU64,
    refresh_tx: tokio::sync::watch::Sender<u64>,
    merge_tx: Sender<MergeSignal>,
    /// Bounded pool running the per-field merge work.
    merge_pool: rayon::ThreadPool,
    stop_refresh_tx: Sender<()>,
    threads: Mutex<Vec<std::thread::JoinHandle<()>>>,
    closed: AtomicBool,
    _lock: WriterLock,
}

impl Engine {
    /// Open (or create) the engine over a store directory, recovering
    /// on-disk segments and replaying the WAL tail.
    pub fn open(name: &str, store_dir: &Path, config: EngineConfig) -> Result<Arc<Self>> {
        fs::create_dir_all(store_dir)?;
        let lock = WriterLock::acquire(store_dir)?;

        // Recover durable segments
        let mut disk = Vec::new();
        for entry in fs::read_dir(store_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("seg") {
                let segment = DiskSegment::open(&path)?;
                let meta = segment.meta().clone();
                disk.push(Arc::new(SegmentHandle::disk(meta, segment, path)));
            }
        }
        disk.sort_by_key(|s| s.meta.min_doc);

        let mut deleted = load_deleted(store_dir)?;

        // Rebuild the live-document table in doc-id order; a later row for
        // the same key supersedes the earlier one.
        let mut live: HashMap<String, LiveDoc> = HashMap::new();
        let mut next_doc_id = 0u32;
        let mut next_seq_no = 1i64;
        for segment in &disk {
            for entry in segment.entries() {
                next_doc_id = next_doc_id.max(entry.doc_id + 1);
                for child in &entry.children {
                    next_doc_id = next_doc_id.max(child + 1);
                }
                next_seq_no = next_seq_no.max(entry.seq_no + 1);
                if entry.parent.is_some() || deleted.contains(entry.doc_id) {
                    continue;
                }
                if let Some(previous) = live.insert(
                    entry.key.clone(),
                    LiveDoc {
                        doc_id: entry.doc_id,
                        seq_no: entry.seq_no,
                        version: entry.version,
                        children: entry.children.clone(),
                    },
                ) {
                    deleted.insert(previous.doc_id);
                    for child in previous.children {
                        deleted.insert(child);
                    }
                }
            }
        }

        let wal_path = store_dir.join("wal.log");
        let records = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path, SyncMode::Batch(config.wal_sync_bytes))?;

        let (refresh_tx, _) = tokio::sync::watch::channel(0u64);
        let (merge_tx, merge_rx) = channel::unbounded();
        let (stop_refresh_tx, stop_refresh_rx) = channel::bounded(1);
        let merge_pool = rayon::ThreadPoolBuilder::new()
            .num_threads((num_cpus::get() / 2).max(1))
            .build()
            .map_err(|e| Error::internal(format!("merge pool: {}", e)))?;

        let engine = Arc::new(Engine {
            name: name.to_string(),
            store_dir: store_dir.to_path_buf(),
            config,
            writer: Mutex::new(WriterState {
                buffer: SegmentBuffer::new(),
                sealed: Vec::new(),
                disk,
                live,
                tombstones: HashMap::new(),
                deleted,
                next_doc_id,
                next_seq_no,
                last_sealed_seq: next_seq_no - 1,
                wal,
                dirty: false,
            }),
            current: RwLock::new(Arc::new(Snapshot::empty())),
            snapshot_version: AtomicU64::new(0),
            refresh_tx,
            merge_tx,
            merge_pool,
            stop_refresh_tx,
            threads: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            _lock: lock,
        });

        // Replay the WAL tail through the normal write path
        {
            let mut state = engine.writer.lock();
            for record in records {
                match record.op {
                    WalOp::Index { doc, version } => {
                        engine.apply_indexed(&mut state, doc, record.seq_no, version);
                    }
                    WalOp::Delete { key, version } => {
                        engine.apply_delete(&mut state, &key, version);
                    }
                }
                state.next_seq_no = state.next_seq_no.max(record.seq_no + 1);
            }
            // Recovered writes become searchable immediately
            engine.seal_buffer(&mut state);
            engine.publish(&mut state);
        }

        engine.spawn_background(merge_rx, stop_refresh_rx);
        tracing::info!(index = %name, "engine opened");
        Ok(engine)
    }

    fn spawn_background(self: &Arc<Self>, merge_rx: Receiver<MergeSignal>, stop_rx: Receiver<()>) {
        let mut threads = self.threads.lock();

        let refresh_engine = Arc::downgrade(self);
        let interval = self.config.refresh_interval;
        threads.push(std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(channel::RecvTimeoutError::Timeout) => {
                        let Some(engine) = refresh_engine.upgrade() else {
                            break;
                        };
                        engine.refresh();
                    }
                    _ => break,
                }
            }
        }));

        let merge_engine = Arc::downgrade(self);
        threads.push(std::thread::spawn(move || {
            while let Ok(MergeSignal::Check) = merge_rx.recv() {
                let Some(engine) = merge_engine.upgrade() else {
                    break;
                };
                if let Err(err) = engine.maybe_merge() {
                    tracing::error!(index = %engine.name, error = %err, "background merge failed");
                }
            }
        }));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("index [{}] is closed", self.name),
            ));
        }
        Ok(())
    }

    /// Index one analyzed document. `create_only` rejects writes over an
    /// existing visible document; `durable` forces a WAL fsync before the
    /// acknowledgment.
    pub fn index(
        &self,
        doc: IndexedDocument,
        conditions: WriteConditions,
        create_only: bool,
        durable: bool,
    ) -> Result<WriteOutcome> {
        self.ensure_open()?;
        let mut state = self.writer.lock();

        let existing = state.live.get(&doc.key).cloned();
        self.check_conditions(existing.as_ref(), &conditions, &doc.key)?;
        if create_only && existing.is_some() {
            return Err(Error::version_conflict(format!(
                "[{}]: version conflict, document already exists",
                doc.key
            )));
        }

        let version = match &existing {
            Some(live) => live.version + 1,
            None => state.tombstones.get(&doc.key).map(|v| v + 1).unwrap_or(1),
        };
        let seq_no = state.next_seq_no;
        state.next_seq_no += 1;

        let key = doc.key.clone();
        state.wal.append(&WalRecord { seq_no, op: WalOp::Index { doc: doc.clone(), version } })?;
        if durable {
            state.wal.sync()?;
        }

        self.apply_indexed(&mut state, doc, seq_no, version);

        if state.buffer.doc_count() as usize >= self.config.buffer_docs {
            self.flush_locked(&mut state)?;
        }

        Ok(WriteOutcome {
            id: key,
            version,
            seq_no,
            primary_term: PRIMARY_TERM,
            created: existing.is_none(),
        })
    }

    /// Delete by external id. Appends a tombstone and hides the doc (and
    /// its nested children) from the next snapshot.
    pub fn delete(&self, key: &str, conditions: WriteConditions, durable: bool) -> Result<WriteOutcome> {
        self.ensure_open()?;
        let mut state = self.writer.lock();

        let existing = state.live.get(key).cloned();
        self.check_conditions(existing.as_ref(), &conditions, key)?;
        let Some(live) = existing else {
            return Err(Error::not_found(format!("document [{}] not found", key)));
        };

        let version = live.version + 1;
        let seq_no = state.next_seq_no;
        state.next_seq_no += 1;

        state
            .wal
            .append(&WalRecord { seq_no, op: WalOp::Delete { key: key.to_string(), version } })?;
        if durable {
            state.wal.sync()?;
        }

        self.apply_delete(&mut state, key, version);

        Ok(WriteOutcome {
            id: key.to_string(),
            version,
            seq_no,
            primary_term: PRIMARY_TERM,
            created: false,
        })
    }

    fn check_conditions(
        &self,
        existing: Option<&LiveDoc>,
        conditions: &WriteConditions,
        key: &str,
    ) -> Result<()> {
        if conditions.is_empty() {
            return Ok(());
        }
        let (current_seq, current_term) = match existing {
            Some(live) => (live.seq_no, PRIMARY_TERM),
            None => {
                return Err(Error::version_conflict(format!(
                    "[{}]: version conflict, document does not exist",
                    key
                )));
            }
        };
        let seq_ok = conditions.if_seq_no.map(|s| s == current_seq).unwrap_or(true);
        let term_ok = conditions.if_primary_term.map(|t| t == current_term).unwrap_or(true);
        if !seq_ok || !term_ok {
            return Err(Error::version_conflict(format!(
                "[{}]: version conflict, required seqNo [{}], primary term [{}], current seqNo [{}]",
                key,
                conditions.if_seq_no.unwrap_or(-1),
                conditions.if_primary_term.unwrap_or(PRIMARY_TERM),
                current_seq
            )));
        }
        Ok(())
    }

    /// Append the analyzed document (and nested children) to the buffer and
    /// update the live table. Assumes seq/version already assigned.
    fn apply_indexed(&self, state: &mut WriterState, mut doc: IndexedDocument, seq_no: i64, version: i64) {
        let parent_id = state.next_doc_id;
        state.next_doc_id += 1;

        let children = std::mem::take(&mut doc.children);
        let mut child_ids = Vec::with_capacity(children.len());

        // Supersede the previous visible version, children included
        if let Some(previous) = state.live.remove(&doc.key) {
            state.deleted.insert(previous.doc_id);
            for child in previous.children {
                state.deleted.insert(child);
            }
        }

        state.buffer.add(parent_id, &doc, seq_no, version, Vec::new(), None);
        for mut child in children {
            let child_id = state.next_doc_id;
            state.next_doc_id += 1;
            child.add_doc_value("_nested_parent", FieldValue::Long(parent_id as i64));
            state.buffer.add(child_id, &child, seq_no, version, Vec::new(), Some(parent_id));
            child_ids.push(child_id);
        }

        // Patch the parent entry with its children ids
        state.buffer.set_children(parent_id, child_ids.clone());

        state.tombstones.remove(&doc.key);
        state.live.insert(
            doc.key.clone(),
            LiveDoc { doc_id: parent_id, seq_no, version, children: child_ids },
        );
        state.dirty = true;
    }

    fn apply_delete(&self, state: &mut WriterState, key: &str, version: i64) {
        if let Some(previous) = state.live.remove(key) {
            state.deleted.insert(previous.doc_id);
            for child in previous.children {
                state.deleted.insert(child);
            }
        }
        state.tombstones.insert(key.to_string(), version);
        state.dirty = true;
    }

    /// Latest acknowledged state of a document, unaffected by refresh
    /// visibility (realtime get).
    pub fn get_latest(&self, key: &str) -> Result<Option<(Value, LiveDoc)>> {
        let state = self.writer.lock();
        let Some(live) = state.live.get(key).cloned() else {
            return Ok(None);
        };
        if let Some(source) = state.buffer.stored_source(live.doc_id) {
            return Ok(Some((source.clone(), live)));
        }
        for handle in state.sealed.iter().chain(state.disk.iter()) {
            if handle.contains_doc(live.doc_id) {
                if let Some(source) = handle.stored_source(live.doc_id)? {
                    return Ok(Some((source, live)));
                }
            }
        }
        Ok(None)
    }

    /// Seal the active buffer and publish a new snapshot. A no-op when
    /// nothing changed since the last publication, so idle indices keep
    /// their snapshot (and their query caches) stable.
    pub fn refresh(&self) {
        let mut state = self.writer.lock();
        if !state.dirty && state.buffer.is_empty() {
            return;
        }
        self.seal_buffer(&mut state);
        self.publish(&mut state);
        let _ = self.merge_tx.send(MergeSignal::Check);
    }

    /// Persist all sealed segments, truncate the WAL, and publish.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.writer.lock();
        self.flush_locked(&mut state)
    }

    fn seal_buffer(&self, state: &mut WriterState) {
        if state.buffer.is_empty() {
            return;
        }
        let buffer = std::mem::take(&mut state.buffer);
        let ram = buffer.seal();
        let (min_doc, max_doc) = entry_range(&ram.entries);
        let meta = SegmentMeta {
            id: SegmentId::new(),
            doc_count: ram.doc_count(),
            min_doc,
            max_doc,
            size_bytes: ram.approximate_size(),
            created_at: Utc::now(),
        };
        state.sealed.push(Arc::new(SegmentHandle::ram(meta, ram)));
        state.last_sealed_seq = state.next_seq_no - 1;
    }

    fn flush_locked(&self, state: &mut WriterState) -> Result<()> {
        self.seal_buffer(state);

        let sealed = std::mem::take(&mut state.sealed);
        for handle in sealed {
            let ram = match &handle.data {
                crate::engine::snapshot::SegmentData::Ram(ram) => ram,
                crate::engine::snapshot::SegmentData::Disk(_) => continue,
            };
            let (path, meta) = write_segment(&self.store_dir, ram, handle.meta.id)?;
            let segment = DiskSegment::open(&path)?;
            state.disk.push(Arc::new(SegmentHandle::disk(meta, segment, path)));
        }
        state.disk.sort_by_key(|s| s.meta.min_doc);

        persist_deleted(&self.store_dir, &state.deleted)?;
        state.wal.truncate()?;

        self.publish(state);
        let _ = self.merge_tx.send(MergeSignal::Check);
        Ok(())
    }

    /// Publish the current segment set as a new immutable snapshot.
    fn publish(&self, state: &mut WriterState) {
        let mut segments: Vec<Arc<SegmentHandle>> =
            state.disk.iter().chain(state.sealed.iter()).cloned().collect();
        segments.sort_by_key(|s| s.meta.min_doc);

        let version = self.snapshot_version.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(Snapshot {
            segments,
            deleted: state.deleted.clone(),
            seq_no: state.last_sealed_seq,
            version,
            live_docs: state.live.len() as u64,
        });
        *self.current.write() = snapshot;
        state.dirty = false;
        let _ = self.refresh_tx.send(version);
    }

    /// The snapshot a new searcher should capture.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Resolves once a snapshot covering `seq_no` has been published, i.e.
    /// the write with that sequence number is searchable.
    pub async fn wait_for_seq(&self, seq_no: i64) {
        let mut rx = self.refresh_tx.subscribe();
        loop {
            if self.snapshot().seq_no >= seq_no {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn maybe_merge(&self) -> Result<()> {
        let policy = TieredMergePolicy::default();
        let (inputs, deleted) = {
            let state = self.writer.lock();
            (policy.select_inputs(&state.disk), state.deleted.clone())
        };
        if inputs.len() < 2 {
            return Ok(());
        }

        tracing::info!(index = %self.name, inputs = inputs.len(), "merging segments");
        let merged = self.merge_pool.install(|| merge_segments(&inputs, &deleted))?;
        let (path, meta) = write_segment(&self.store_dir, &merged, SegmentId::new())?;
        let segment = DiskSegment::open(&path)?;
        let handle = Arc::new(SegmentHandle::disk(meta, segment, path));

        // Install: swap inputs for the merged segment and let readers
        // drain; files unlink when the last snapshot drops its handle.
        let mut state = self.writer.lock();
        let input_ids: Vec<SegmentId> = inputs.iter().map(|s| s.meta.id).collect();
        state.disk.retain(|s| !input_ids.contains(&s.meta.id));
        state.disk.push(handle);
        state.disk.sort_by_key(|s| s.meta.min_doc);
        for input in &inputs {
            input.mark_for_deletion();
        }
        self.publish(&mut state);
        Ok(())
    }

    /// Engine statistics for `_stats`/`_cat` surfaces.
    pub fn stats(&self) -> EngineStats {
        let snapshot = self.snapshot();
        EngineStats {
            doc_count: snapshot.live_docs,
            segment_count: snapshot.segment_count(),
            size_bytes: snapshot.size_bytes(),
            seq_no: snapshot.seq_no,
        }
    }

    /// Flush, stop background work, and release the writer lock. In-flight
    /// writes complete before close returns; later writes fail.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        {
            let mut state = self.writer.lock();
            let result = self.flush_locked(&mut state);
            state.wal.sync()?;
            result?;
        }
        let _ = self.stop_refresh_tx.send(());
        let _ = self.merge_tx.send(MergeSignal::Shutdown);
        for thread in self.threads.lock().drain(..) {
            let _ = thread.join();
        }
        tracing::info!(index = %self.name, "engine closed");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            let _ = self.stop_refresh_tx.send(());
            let _ = self.merge_tx.send(MergeSignal::Shutdown);
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineStats {
    pub doc_count: u64,
    pub segment_count: usize,
    pub size_bytes: u64,
    pub seq_no: i64,
}

fn entry_range(entries: &[crate::engine::doc::DocEntry]) -> (u32, u32) {
    let mut min = u32::MAX;
    let mut max = 0;
    for entry in entries {
        min = min.min(entry.doc_id);
        max = max.max(entry.doc_id);
        for child in &entry.children {
            min = min.min(*child);
            max = max.max(*child);
        }
    }
    if entries.is_empty() {
        (0, 0)
    } else {
        (min, max)
    }
}

fn deleted_path(store_dir: &Path) -> PathBuf {
    store_dir.join("deleted.bin")
}

fn load_deleted(store_dir: &Path) -> Result<RoaringBitmap> {
    let path = deleted_path(store_dir);
    if !path.exists() {
        return Ok(RoaringBitmap::new());
    }
    let bytes = fs::read(path)?;
    RoaringBitmap::deserialize_from(&bytes[..])
        .map_err(|e| Error::new(ErrorKind::Parse, format!("deleted bitmap: {}", e)))
}

fn persist_deleted(store_dir: &Path, deleted: &RoaringBitmap) -> Result<()> {
    let mut bytes = Vec::new();
    deleted
        .serialize_into(&mut bytes)
        .map_err(|e| Error::internal(format!("deleted bitmap: {}", e)))?;
    let path = deleted_path(store_dir);
    let tmp = path.with_extension("bin.tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(key: &str, term: &str) -> IndexedDocument {
        let mut doc = IndexedDocument::new(key.to_string(), json!({"title": term}));
        doc.add_term("title", term.to_string(), 0);
        doc.add_term("_id", key.to_string(), 0);
        doc.field_lengths.insert("title".into(), 1);
        doc
    }

    fn open(dir: &TempDir) -> Arc<Engine> {
        Engine::open("books", &dir.path().join("store"), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_index_then_refresh_visible() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);

        let outcome = engine.index(doc("1", "fox"), WriteConditions::default(), false, false).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.version, 1);

        // Not visible before refresh
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.postings("title", "fox").unwrap().len(), 0);

        engine.refresh();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.postings("title", "fox").unwrap().doc_ids, vec![0]);
        assert_eq!(snapshot.live_docs, 1);
        engine.close().unwrap();
    }

    #[test]
    fn test_snapshot_isolation() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        engine.index(doc("1", "fox"), WriteConditions::default(), false, false).unwrap();
        engine.refresh();
        let before = engine.snapshot();

        engine.index(doc("2", "fox"), WriteConditions::default(), false, false).unwrap();
        engine.refresh();

        // The earlier snapshot still sees exactly one posting
        assert_eq!(before.postings("title", "fox").unwrap().len(), 1);
        assert_eq!(engine.snapshot().postings("title", "fox").unwrap().len(), 2);
        engine.close().unwrap();
    }

    #[test]
    fn test_version_and_seq_monotonic() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        let first = engine.index(doc("1", "a"), WriteConditions::default(), false, false).unwrap();
        let second = engine.index(doc("1", "b"), WriteConditions::default(), false, false).unwrap();
        assert!(second.version > first.version);
        assert!(second.seq_no > first.seq_no);
        assert!(!second.created);

        engine.refresh();
        // Superseded doc is not visible
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.postings("title", "a").unwrap().len(), 0);
        assert_eq!(snapshot.postings("title", "b").unwrap().len(), 1);
        engine.close().unwrap();
    }

    #[test]
    fn test_conditional_write_conflict() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        let first = engine.index(doc("9", "v1"), WriteConditions::default(), false, false).unwrap();

        let ok = engine
            .index(
                doc("9", "v2"),
                WriteConditions { if_seq_no: Some(first.seq_no), if_primary_term: Some(1) },
                false,
                false,
            )
            .unwrap();
        assert_eq!(ok.version, 2);

        // Replaying the same precondition now conflicts
        let err = engine
            .index(
                doc("9", "v3"),
                WriteConditions { if_seq_no: Some(first.seq_no), if_primary_term: Some(1) },
                false,
                false,
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionConflict);
        engine.close().unwrap();
    }

    #[test]
    fn test_create_only_conflict() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        engine.index(doc("1", "a"), WriteConditions::default(), true, false).unwrap();
        let err = engine.index(doc("1", "b"), WriteConditions::default(), true, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionConflict);
        engine.close().unwrap();
    }

    #[test]
    fn test_delete_and_realtime_get() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        engine.index(doc("1", "fox"), WriteConditions::default(), false, false).unwrap();

        // Realtime get sees the doc before any refresh
        let (source, live) = engine.get_latest("1").unwrap().unwrap();
        assert_eq!(source, json!({"title": "fox"}));
        assert_eq!(live.version, 1);

        let outcome = engine.delete("1", WriteConditions::default(), false).unwrap();
        assert_eq!(outcome.version, 2);
        assert!(engine.get_latest("1").unwrap().is_none());

        let err = engine.delete("1", WriteConditions::default(), false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        // Re-creating continues the version chain
        let recreated = engine.index(doc("1", "fox"), WriteConditions::default(), false, false).unwrap();
        assert_eq!(recreated.version, 3);
        engine.close().unwrap();
    }

    #[test]
    fn test_flush_and_recover() {
        let dir = TempDir::new().unwrap();
        {
            let engine = open(&dir);
            engine.index(doc("1", "fox"), WriteConditions::default(), false, false).unwrap();
            engine.index(doc("2", "dog"), WriteConditions::default(), false, false).unwrap();
            engine.flush().unwrap();
            engine.delete("2", WriteConditions::default(), false).unwrap();
            // "3" stays only in the WAL
            engine.index(doc("3", "cat"), WriteConditions::default(), false, false).unwrap();
            engine.close().unwrap();
        }

        let engine = open(&dir);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.postings("title", "fox").unwrap().len(), 1);
        assert_eq!(snapshot.postings("title", "dog").unwrap().len(), 0);
        assert_eq!(snapshot.postings("title", "cat").unwrap().len(), 1);
        assert_eq!(snapshot.live_docs, 2);

        // Sequence numbers continue after recovery
        let outcome = engine.index(doc("4", "owl"), WriteConditions::default(), false, false).unwrap();
        assert!(outcome.seq_no > 3);
        engine.close().unwrap();
    }

    #[test]
    fn test_closed_engine_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        engine.close().unwrap();
        let err = engine.index(doc("1", "a"), WriteConditions::default(), false, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn test_nested_children_tracked() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);

        let mut parent = doc("1", "fox");
        let mut child = IndexedDocument::new("1#comments#0".into(), json!({"author": "ann"}));
        child.add_term("comments.author", "ann".into(), 0);
        parent.children.push(child);

        engine.index(parent, WriteConditions::default(), false, false).unwrap();
        engine.refresh();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.postings("comments.author", "ann").unwrap().len(), 1);
        // Child row carries the parent pointer
        let child_entry = snapshot.entry(1).unwrap();
        assert_eq!(child_entry.parent, Some(0));

        // Replacing the parent hides the old child
        engine.index(doc("1", "fox"), WriteConditions::default(), false, false).unwrap();
        engine.refresh();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.postings("comments.author", "ann").unwrap().len(), 0);
        engine.close().unwrap();
    }
}
