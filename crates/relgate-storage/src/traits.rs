use relgate_core::{LogRecord, RecordKind, StoreError};

/// Append-only, line-oriented storage partitioned by record kind.
///
/// `append_line` must not return `Ok` until the line is durable. Readers only
/// ever see complete lines, in append order.
pub trait LogStore: Send + Sync {
    /// Returns the 1-based sequence number of the appended line within its partition.
    fn append_line(&self, kind: RecordKind, line: &str) -> Result<u64, StoreError>;

    fn read_lines(&self, kind: RecordKind) -> Result<Vec<String>, StoreError>;
}

/// Typed access on top of any [`LogStore`].
pub trait LogStoreExt: LogStore {
    fn append<R: LogRecord>(&self, record: &R) -> Result<u64, StoreError> {
        let line = serde_json::to_string(record).map_err(|source| StoreError::Serialize { kind: R::KIND, source })?;
        let seq = self.append_line(R::KIND, &line)?;
        tracing::debug!(kind = %R::KIND, seq, "appended record");
        Ok(seq)
    }

    /// All records of a kind in append order.
    fn read_all<R: LogRecord>(&self) -> Result<Vec<R>, StoreError> {
        self.read_filtered(|_: &R| true)
    }

    fn read_filtered<R: LogRecord>(&self, filter: impl Fn(&R) -> bool) -> Result<Vec<R>, StoreError> {
        let mut out = Vec::new();
        for (idx, line) in self.read_lines(R::KIND)?.iter().enumerate() {
            let rec = decode::<R>(line, idx as u64 + 1)?;
            if filter(&rec) {
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// Most recent record matching `key`.
    fn read_latest<R: LogRecord>(&self, key: impl Fn(&R) -> bool) -> Result<Option<R>, StoreError> {
        Ok(self.read_filtered(key)?.pop())
    }

    fn count(&self, kind: RecordKind) -> Result<usize, StoreError> {
        Ok(self.read_lines(kind)?.len())
    }
}

impl<S: LogStore + ?Sized> LogStoreExt for S {}

fn decode<R: LogRecord>(line: &str, line_no: u64) -> Result<R, StoreError> {
    let rec: R = serde_json::from_str(line).map_err(|source| StoreError::Corrupt { kind: R::KIND, line: line_no, source })?;
    let found = rec.header().record_kind;
    if found != R::KIND {
        return Err(StoreError::KindMismatch { kind: R::KIND, line: line_no, found });
    }
    Ok(rec)
}
