//! File-backed append-only log backend.

use crate::backend::{KvBackend, Namespace};
use crate::error::{StoreError, StoreResult};
use crate::record::{compute_crc32, LogRecord, LogRecordType, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

type NamespaceMap = BTreeMap<Vec<u8>, Vec<u8>>;
type State = BTreeMap<u8, NamespaceMap>;

/// When the log holds this many times more records than live entries,
/// it is compacted on open.
const COMPACT_WASTE_FACTOR: usize = 4;

/// Logs smaller than this are never compacted.
const COMPACT_MIN_RECORDS: usize = 64;

/// A durable key-value backend over an append-only log file.
///
/// Every mutation is appended as a checksummed [`LogRecord`] and the full
/// log is replayed into memory on open. Data written before a process
/// restart is visible after reopen.
///
/// # Recovery
///
/// - A truncated trailing record (torn write) is discarded and the file is
///   trimmed back to the last complete record.
/// - A checksum mismatch or malformed record *before* the tail means the
///   log cannot be trusted and open fails with a corruption error.
///
/// # Durability
///
/// Mutations are written to the file before they return, which survives
/// process restarts. [`KvBackend::flush`] additionally syncs file data to
/// disk for durability across OS crashes.
#[derive(Debug)]
pub struct FileLogBackend {
    path: PathBuf,
    file: Mutex<File>,
    state: RwLock<State>,
}

impl FileLogBackend {
    /// Opens or creates a log-backed store at the given path, creating
    /// parent directories if needed.
    ///
    /// Replays the existing log, truncating a torn tail record if one is
    /// found, and compacts the log when dead records dominate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened or
    /// created, and [`StoreError::Corrupted`] / [`StoreError::ChecksumMismatch`]
    /// if the existing log is damaged before its tail.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::unavailable(format!("cannot create {}: {e}", parent.display())))?;
        }

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(StoreError::unavailable(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };

        let (state, records_replayed, valid_len) = replay(&data)?;

        if valid_len < data.len() as u64 {
            tracing::warn!(
                path = %path.display(),
                torn_bytes = data.len() as u64 - valid_len,
                "discarding torn tail record"
            );
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::unavailable(format!("cannot open {}: {e}", path.display())))?;
        file.set_len(valid_len)?;
        // Position the cursor past the replayed records, or the next append
        // would overwrite the log prefix.
        file.seek(SeekFrom::Start(valid_len))?;

        let backend = Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            state: RwLock::new(state),
        };

        let live: usize = backend.state.read().values().map(NamespaceMap::len).sum();
        if records_replayed >= COMPACT_MIN_RECORDS && records_replayed > live * COMPACT_WASTE_FACTOR {
            tracing::debug!(records_replayed, live, "compacting store log on open");
            backend.compact()?;
        }

        Ok(backend)
    }

    /// Returns the path to the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the log to hold only live entries.
    ///
    /// The compacted log is written to a temporary file and atomically
    /// renamed over the original, so a crash mid-compaction leaves either
    /// the old or the new log intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite or rename fails.
    pub fn compact(&self) -> StoreResult<()> {
        let state = self.state.read();
        let mut file = self.file.lock();

        let tmp_path = self.path.with_extension("compact");
        let mut tmp = File::create(&tmp_path)?;

        for (ns_byte, entries) in state.iter() {
            // Replayed state only ever holds known namespace tags
            let Some(ns) = Namespace::from_byte(*ns_byte) else {
                continue;
            };
            for (key, value) in entries {
                let record = LogRecord::Put {
                    ns,
                    key: key.clone(),
                    value: value.clone(),
                };
                tmp.write_all(&record.encode())?;
            }
        }
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;

        let mut compacted = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)?;
        compacted.seek(SeekFrom::End(0))?;
        *file = compacted;
        Ok(())
    }

    /// Appends a record to the log while holding the file lock.
    fn append(&self, record: &LogRecord) -> StoreResult<()> {
        let mut file = self.file.lock();
        file.write_all(&record.encode())?;
        Ok(())
    }
}

impl KvBackend for FileLogBackend {
    fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.append(&LogRecord::Put {
            ns,
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        self.state
            .write()
            .entry(ns.as_byte())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, ns: Namespace, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .state
            .read()
            .get(&ns.as_byte())
            .and_then(|m| m.get(key).cloned()))
    }

    fn delete(&self, ns: Namespace, key: &[u8]) -> StoreResult<bool> {
        let present = self
            .state
            .read()
            .get(&ns.as_byte())
            .is_some_and(|m| m.contains_key(key));
        if !present {
            return Ok(false);
        }

        self.append(&LogRecord::Delete {
            ns,
            key: key.to_vec(),
        })?;
        if let Some(m) = self.state.write().get_mut(&ns.as_byte()) {
            m.remove(key);
        }
        Ok(true)
    }

    fn count(&self, ns: Namespace) -> StoreResult<usize> {
        Ok(self
            .state
            .read()
            .get(&ns.as_byte())
            .map_or(0, NamespaceMap::len))
    }

    fn iterate(&self, ns: Namespace) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .state
            .read()
            .get(&ns.as_byte())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn clear(&self, ns: Namespace) -> StoreResult<()> {
        self.append(&LogRecord::Clear { ns })?;
        if let Some(m) = self.state.write().get_mut(&ns.as_byte()) {
            m.clear();
        }
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

/// Replays a log buffer into live state.
///
/// Returns the state, the number of records applied, and the byte length of
/// the valid prefix (everything past it is a torn tail to be truncated).
fn replay(data: &[u8]) -> StoreResult<(State, usize, u64)> {
    let mut state = State::new();
    let mut records = 0usize;
    let mut offset = 0usize;

    while offset < data.len() {
        let remaining = &data[offset..];

        // Incomplete header: torn tail, treat as end
        if remaining.len() < HEADER_SIZE {
            break;
        }

        if remaining[0..4] != LOG_MAGIC {
            return Err(StoreError::corrupted(format!(
                "invalid magic at offset {offset}"
            )));
        }

        let version = u16::from_le_bytes([remaining[4], remaining[5]]);
        if version > LOG_VERSION {
            return Err(StoreError::corrupted(format!(
                "unsupported log version {version} at offset {offset}"
            )));
        }

        let type_byte = remaining[6];
        let record_type = LogRecordType::from_byte(type_byte).ok_or_else(|| {
            StoreError::corrupted(format!("unknown record type {type_byte} at offset {offset}"))
        })?;

        let ns_byte = remaining[7];
        let ns = Namespace::from_byte(ns_byte).ok_or_else(|| {
            StoreError::corrupted(format!("unknown namespace {ns_byte} at offset {offset}"))
        })?;

        let payload_len =
            u32::from_le_bytes([remaining[8], remaining[9], remaining[10], remaining[11]]) as usize;
        let total_len = HEADER_SIZE + payload_len + CRC_SIZE;

        // Incomplete record: torn tail, treat as end
        if remaining.len() < total_len {
            break;
        }

        let payload = &remaining[HEADER_SIZE..HEADER_SIZE + payload_len];
        let crc_start = HEADER_SIZE + payload_len;
        let stored_crc = u32::from_le_bytes([
            remaining[crc_start],
            remaining[crc_start + 1],
            remaining[crc_start + 2],
            remaining[crc_start + 3],
        ]);
        let computed_crc = compute_crc32(&remaining[..crc_start]);
        if stored_crc != computed_crc {
            return Err(StoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        match LogRecord::decode_payload(record_type, ns, payload)? {
            LogRecord::Put { ns, key, value } => {
                state.entry(ns.as_byte()).or_default().insert(key, value);
            }
            LogRecord::Delete { ns, key } => {
                if let Some(m) = state.get_mut(&ns.as_byte()) {
                    m.remove(&key);
                }
            }
            LogRecord::Clear { ns } => {
                if let Some(m) = state.get_mut(&ns.as_byte()) {
                    m.clear();
                }
            }
        }

        records += 1;
        offset += total_len;
    }

    Ok((state, records, offset as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_path(dir: &TempDir) -> PathBuf {
        dir.path().join("tidepool.log")
    }

    #[test]
    fn file_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let backend = FileLogBackend::open(&store_path(&dir)).unwrap();

        backend.put(Namespace::Meta, b"k", b"v").unwrap();
        assert_eq!(
            backend.get(Namespace::Meta, b"k").unwrap(),
            Some(b"v".to_vec())
        );
    }

    #[test]
    fn file_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let backend = FileLogBackend::open(&path).unwrap();
            backend
                .put(Namespace::PendingActions, b"a1", b"insert")
                .unwrap();
            backend
                .put(Namespace::CachedEntries, b"quote", b"500")
                .unwrap();
            backend.delete(Namespace::CachedEntries, b"quote").unwrap();
        }

        let backend = FileLogBackend::open(&path).unwrap();
        assert_eq!(
            backend.get(Namespace::PendingActions, b"a1").unwrap(),
            Some(b"insert".to_vec())
        );
        assert_eq!(backend.get(Namespace::CachedEntries, b"quote").unwrap(), None);
        assert_eq!(backend.count(Namespace::PendingActions).unwrap(), 1);
    }

    #[test]
    fn writes_across_multiple_sessions_all_survive() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let backend = FileLogBackend::open(&path).unwrap();
            backend.put(Namespace::PendingActions, b"k1", b"v1").unwrap();
        }
        {
            let backend = FileLogBackend::open(&path).unwrap();
            // A second-session write of the same record size must not
            // land over the first session's record.
            backend.put(Namespace::PendingActions, b"k2", b"v2").unwrap();
            assert_eq!(
                backend.get(Namespace::PendingActions, b"k1").unwrap(),
                Some(b"v1".to_vec())
            );
        }

        let backend = FileLogBackend::open(&path).unwrap();
        assert_eq!(
            backend.get(Namespace::PendingActions, b"k1").unwrap(),
            Some(b"v1".to_vec())
        );
        assert_eq!(
            backend.get(Namespace::PendingActions, b"k2").unwrap(),
            Some(b"v2".to_vec())
        );
        assert_eq!(backend.count(Namespace::PendingActions).unwrap(), 2);
    }

    #[test]
    fn append_after_compact_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let backend = FileLogBackend::open(&path).unwrap();
            for i in 0..10u8 {
                backend.put(Namespace::Meta, b"churn", &[i]).unwrap();
            }
            backend.compact().unwrap();
            backend.put(Namespace::Meta, b"after", b"compaction").unwrap();
        }

        let backend = FileLogBackend::open(&path).unwrap();
        assert_eq!(
            backend.get(Namespace::Meta, b"churn").unwrap(),
            Some(vec![9u8])
        );
        assert_eq!(
            backend.get(Namespace::Meta, b"after").unwrap(),
            Some(b"compaction".to_vec())
        );
    }

    #[test]
    fn file_clear_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let backend = FileLogBackend::open(&path).unwrap();
            backend.put(Namespace::CachedEntries, b"a", b"1").unwrap();
            backend.put(Namespace::CachedEntries, b"b", b"2").unwrap();
            backend.put(Namespace::PendingActions, b"x", b"9").unwrap();
            backend.clear(Namespace::CachedEntries).unwrap();
        }

        let backend = FileLogBackend::open(&path).unwrap();
        assert_eq!(backend.count(Namespace::CachedEntries).unwrap(), 0);
        assert_eq!(backend.count(Namespace::PendingActions).unwrap(), 1);
    }

    #[test]
    fn file_truncates_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let backend = FileLogBackend::open(&path).unwrap();
            backend.put(Namespace::Meta, b"good", b"record").unwrap();
        }

        // Simulate a torn write: append half a record
        let record = LogRecord::Put {
            ns: Namespace::Meta,
            key: b"torn".to_vec(),
            value: b"never completed".to_vec(),
        };
        let bytes = record.encode();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&bytes[..bytes.len() / 2]).unwrap();
        drop(file);

        let backend = FileLogBackend::open(&path).unwrap();
        assert_eq!(
            backend.get(Namespace::Meta, b"good").unwrap(),
            Some(b"record".to_vec())
        );
        assert_eq!(backend.get(Namespace::Meta, b"torn").unwrap(), None);

        // The torn bytes were physically truncated
        let len = std::fs::metadata(&path).unwrap().len();
        let expected = LogRecord::Put {
            ns: Namespace::Meta,
            key: b"good".to_vec(),
            value: b"record".to_vec(),
        }
        .encode()
        .len() as u64;
        assert_eq!(len, expected);
    }

    #[test]
    fn file_detects_mid_log_corruption() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let backend = FileLogBackend::open(&path).unwrap();
            backend.put(Namespace::Meta, b"k1", b"v1").unwrap();
            backend.put(Namespace::Meta, b"k2", b"v2").unwrap();
        }

        // Flip a payload bit inside the first record
        let mut data = std::fs::read(&path).unwrap();
        data[HEADER_SIZE] ^= 0x01;
        std::fs::write(&path, &data).unwrap();

        let result = FileLogBackend::open(&path);
        assert!(matches!(
            result,
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn file_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        std::fs::write(&path, b"not a tidepool log at all").unwrap();

        let result = FileLogBackend::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn compact_preserves_live_state() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        let backend = FileLogBackend::open(&path).unwrap();
        for i in 0..20u8 {
            backend
                .put(Namespace::CachedEntries, b"churn", &[i])
                .unwrap();
        }
        backend.put(Namespace::Meta, b"keep", b"me").unwrap();

        let before = std::fs::metadata(&path).unwrap().len();
        backend.compact().unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before);

        assert_eq!(
            backend.get(Namespace::CachedEntries, b"churn").unwrap(),
            Some(vec![19u8])
        );
        assert_eq!(
            backend.get(Namespace::Meta, b"keep").unwrap(),
            Some(b"me".to_vec())
        );

        // Compacted log replays cleanly
        drop(backend);
        let backend = FileLogBackend::open(&path).unwrap();
        assert_eq!(
            backend.get(Namespace::CachedEntries, b"churn").unwrap(),
            Some(vec![19u8])
        );
    }

    #[test]
    fn open_compacts_wasteful_log() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let backend = FileLogBackend::open(&path).unwrap();
            // One live key rewritten far past the waste threshold
            for i in 0..(COMPACT_MIN_RECORDS + 10) {
                backend
                    .put(Namespace::Meta, b"hot", &(i as u32).to_le_bytes())
                    .unwrap();
            }
        }
        let before = std::fs::metadata(&path).unwrap().len();

        let backend = FileLogBackend::open(&path).unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before);
        assert_eq!(
            backend.get(Namespace::Meta, b"hot").unwrap(),
            Some(((COMPACT_MIN_RECORDS + 9) as u32).to_le_bytes().to_vec())
        );
    }

    #[test]
    fn file_is_durable() {
        let dir = TempDir::new().unwrap();
        let backend = FileLogBackend::open(&store_path(&dir)).unwrap();
        assert!(backend.is_durable());
        backend.flush().unwrap();
    }

    #[test]
    fn delete_missing_key_appends_nothing() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        let backend = FileLogBackend::open(&path).unwrap();

        assert!(!backend.delete(Namespace::Meta, b"absent").unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
