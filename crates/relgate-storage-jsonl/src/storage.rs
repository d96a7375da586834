use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use relgate_core::{RecordKind, StoreError};
use relgate_storage::LogStore;

/// JSON Lines log, one file per record kind under `root`.
///
/// Every append is written in a single `write_all` and synced before the
/// sequence number is returned. A trailing line without a newline is a torn
/// write from a crash: readers skip it and the next append truncates it.
pub struct JsonlLogStore {
    root: PathBuf,
    // next sequence number per partition, populated on first append
    seqs: Mutex<HashMap<RecordKind, u64>>,
}

impl JsonlLogStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root).map_err(|source| StoreError::Io { path: root.to_path_buf(), source })?;
        Ok(Self { root: root.to_path_buf(), seqs: Mutex::new(HashMap::new()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_path(&self, kind: RecordKind) -> PathBuf {
        partition_path(&self.root, kind)
    }

    /// Truncate a torn tail and count complete lines.
    fn recover(&self, kind: RecordKind, file: &mut File, path: &Path) -> Result<u64, StoreError> {
        let io = |source| StoreError::Io { path: path.to_path_buf(), source };
        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0)).map_err(io)?;
        file.read_to_end(&mut bytes).map_err(io)?;

        let keep = bytes.iter().rposition(|b| *b == b'\n').map(|i| i + 1).unwrap_or(0);
        if keep < bytes.len() {
            tracing::warn!(kind = %kind, path = %path.display(), torn_bytes = bytes.len() - keep, "discarding torn trailing record");
            file.set_len(keep as u64).map_err(io)?;
            file.sync_all().map_err(io)?;
        }
        Ok(bytes[..keep].iter().filter(|b| **b == b'\n').count() as u64)
    }
}

pub fn partition_path(root: &Path, kind: RecordKind) -> PathBuf {
    match kind {
        RecordKind::Validation => root.join("validation_log.jsonl"),
        RecordKind::Gate => root.join("gate_log.jsonl"),
        RecordKind::Snapshot => root.join("release_snapshots").join("snapshot_log.jsonl"),
        RecordKind::Propagation => root.join("propagation_log.jsonl"),
        RecordKind::Health => root.join("health_log.jsonl"),
    }
}

impl LogStore for JsonlLogStore {
    fn append_line(&self, kind: RecordKind, line: &str) -> Result<u64, StoreError> {
        if line.contains('\n') || line.contains('\r') {
            return Err(StoreError::Framing { kind });
        }
        let mut seqs = self.seqs.lock().map_err(|_| StoreError::Unavailable("jsonl writer lock poisoned".into()))?;

        let path = self.partition_path(kind);
        let io = |source| StoreError::Io { path: path.clone(), source };
        let parent = path.parent().unwrap_or(self.root.as_path());
        std::fs::create_dir_all(parent).map_err(io)?;

        let existed = path.exists();
        let mut file = OpenOptions::new().create(true).read(true).append(true).open(&path).map_err(io)?;
        if !existed {
            sync_directory(parent).map_err(io)?;
        }

        let next = match seqs.get(&kind) {
            Some(n) => *n,
            None => self.recover(kind, &mut file, &path)? + 1,
        };

        let prev_len = file.metadata().map_err(io)?.len();
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        if let Err(source) = write_synced(&mut file, prev_len, &buf) {
            // the rollback itself may have failed; recount before the next append
            seqs.remove(&kind);
            return Err(io(source));
        }

        seqs.insert(kind, next + 1);
        Ok(next)
    }

    fn read_lines(&self, kind: RecordKind) -> Result<Vec<String>, StoreError> {
        let path = self.partition_path(kind);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let complete = bytes.iter().rposition(|b| *b == b'\n').map(|i| &bytes[..i]).unwrap_or(&[]);
        if complete.is_empty() && bytes.first() != Some(&b'\n') {
            return Ok(vec![]);
        }
        let text = String::from_utf8(complete.to_vec()).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        Ok(text.split('\n').map(str::to_string).collect())
    }
}

/// A sink that can be made durable and cut back to an earlier length.
trait DurableSink: Write {
    fn sync(&mut self) -> std::io::Result<()>;
    fn rollback(&mut self, len: u64) -> std::io::Result<()>;
}

impl DurableSink for File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }

    fn rollback(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)?;
        self.sync_all()
    }
}

/// Write and sync `buf`. On any failure the sink is cut back to `prev_len`,
/// so a record whose append returned an error is never read back.
fn write_synced<S: DurableSink>(sink: &mut S, prev_len: u64, buf: &[u8]) -> std::io::Result<()> {
    let Err(err) = sink.write_all(buf).and_then(|_| sink.sync()) else {
        return Ok(());
    };
    if let Err(rollback) = sink.rollback(prev_len) {
        tracing::error!(error = %rollback, prev_len, "could not roll back failed append");
    }
    Err(err)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> std::io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
