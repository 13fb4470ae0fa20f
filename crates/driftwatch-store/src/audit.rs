// crates/driftwatch-store/src/audit.rs
//
// Append-only audit logs implementing the `AuditSink` trait.
//
// RocksDB key format:
//   - `audit:{seq:020}` -> JSON-serialized AuditRecord
//
// Records are never updated or deleted; sequence numbers start at 1 and
// strictly increase, so key order is append order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use rocksdb::{DBWithThreadMode, IteratorMode, MultiThreaded, Options};

use driftwatch_core::{AuditEvent, AuditRecord, AuditSink, DriftwatchError};

const AUDIT_PREFIX: &str = "audit:";

/// Audit log held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, in append order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().expect("audit lock poisoned").clone()
    }

    /// Snapshot of the events recorded for one model, in append order.
    pub fn events_for(&self, model: &str) -> Vec<AuditEvent> {
        self.records
            .read()
            .expect("audit lock poisoned")
            .iter()
            .filter(|r| r.model == model)
            .map(|r| r.event.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("audit lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(
        &self,
        recorded_at: DateTime<Utc>,
        model: &str,
        event: AuditEvent,
    ) -> Result<u64, DriftwatchError> {
        let mut records = self.records.write().expect("audit lock poisoned");
        let seq = records.len() as u64 + 1;
        records.push(AuditRecord {
            seq,
            recorded_at,
            model: model.to_string(),
            event,
        });
        Ok(seq)
    }
}

/// Durable audit log in its own RocksDB database.
#[derive(Debug)]
pub struct RocksAuditLog {
    db: DBWithThreadMode<MultiThreaded>,
    /// Next sequence number to assign; the lock also orders appends.
    next_seq: Mutex<u64>,
}

impl RocksAuditLog {
    /// Open (or create) the audit database, resuming after the last record.
    pub fn open(path: &str) -> Result<Self, DriftwatchError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path).map_err(|e| {
            DriftwatchError::Storage(format!("Failed to open audit RocksDB at {}: {}", path, e))
        })?;
        Self::from_db(db)
    }

    /// Open an existing audit database read-only.
    pub fn open_read_only(path: &str) -> Result<Self, DriftwatchError> {
        let opts = Options::default();
        let db = DBWithThreadMode::<MultiThreaded>::open_for_read_only(&opts, path, false)
            .map_err(|e| {
                DriftwatchError::Storage(format!(
                    "Failed to open audit RocksDB read-only at {}: {}",
                    path, e
                ))
            })?;
        Self::from_db(db)
    }

    fn from_db(db: DBWithThreadMode<MultiThreaded>) -> Result<Self, DriftwatchError> {
        let last = match db.iterator(IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item.map_err(|e| {
                    DriftwatchError::Storage(format!("RocksDB iteration error: {}", e))
                })?;
                parse_seq(&key)?
            }
            None => 0,
        };
        tracing::debug!("Audit log opened, last sequence {}", last);

        Ok(Self {
            db,
            next_seq: Mutex::new(last + 1),
        })
    }

    /// Build the record key: `audit:{seq:020}`.
    fn record_key(seq: u64) -> Vec<u8> {
        format!("{}{:020}", AUDIT_PREFIX, seq).into_bytes()
    }

    /// The most recent `limit` records, oldest first.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<AuditRecord>, DriftwatchError> {
        let mut records = Vec::with_capacity(limit);
        for item in self.db.iterator(IteratorMode::End).take(limit) {
            let (_, value) = item
                .map_err(|e| DriftwatchError::Storage(format!("RocksDB iteration error: {}", e)))?;
            records.push(serde_json::from_slice(&value)?);
        }
        records.reverse();
        Ok(records)
    }

    /// Every record, oldest first.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>, DriftwatchError> {
        let mut records = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (_, value) = item
                .map_err(|e| DriftwatchError::Storage(format!("RocksDB iteration error: {}", e)))?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

impl AuditSink for RocksAuditLog {
    fn record(
        &self,
        recorded_at: DateTime<Utc>,
        model: &str,
        event: AuditEvent,
    ) -> Result<u64, DriftwatchError> {
        let mut next = self.next_seq.lock().expect("audit lock poisoned");
        let seq = *next;
        let record = AuditRecord {
            seq,
            recorded_at,
            model: model.to_string(),
            event,
        };
        self.db
            .put(Self::record_key(seq), serde_json::to_vec(&record)?)
            .map_err(|e| DriftwatchError::Storage(format!("RocksDB put failed: {}", e)))?;
        *next += 1;
        Ok(seq)
    }
}

/// Audit sink that only writes events to the tracing log.
///
/// Used when no durable log is available; sequence numbers restart at 1
/// with every process.
#[derive(Debug, Default)]
pub struct TracingAuditSink {
    next_seq: AtomicU64,
}

impl TracingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditSink for TracingAuditSink {
    fn record(
        &self,
        _recorded_at: DateTime<Utc>,
        model: &str,
        event: AuditEvent,
    ) -> Result<u64, DriftwatchError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = serde_json::to_string(&event)?;
        tracing::info!(
            target: "driftwatch::audit",
            "#{} {} {}: {}",
            seq,
            model,
            event.kind(),
            payload
        );
        Ok(seq)
    }
}

/// Extract the sequence number from an `audit:{seq}` key.
fn parse_seq(key: &[u8]) -> Result<u64, DriftwatchError> {
    std::str::from_utf8(key)
        .ok()
        .and_then(|k| k.strip_prefix(AUDIT_PREFIX))
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            DriftwatchError::Storage(format!(
                "Unexpected key in audit log: {}",
                String::from_utf8_lossy(key)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::TriggerReason;

    #[test]
    fn in_memory_log_assigns_increasing_seq() {
        let log = InMemoryAuditLog::new();
        let now = Utc::now();
        let a = log
            .record(now, "churn", AuditEvent::BaselineInstalled { window_seq: 0, fingerprint: "f".into() })
            .unwrap();
        let b = log
            .record(
                now,
                "fraud",
                AuditEvent::TriggerCoalesced {
                    reason: TriggerReason::Scheduled,
                    cause: "cooldown".into(),
                },
            )
            .unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(log.events_for("churn").len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn tracing_sink_counts_from_one() {
        let sink = TracingAuditSink::new();
        let event = AuditEvent::NotificationFailed {
            version_id: 3,
            error: "timeout".to_string(),
        };
        assert_eq!(sink.record(Utc::now(), "churn", event.clone()).unwrap(), 1);
        assert_eq!(sink.record(Utc::now(), "churn", event).unwrap(), 2);
    }

    #[test]
    fn parse_seq_round_trips_keys() {
        assert_eq!(parse_seq(&RocksAuditLog::record_key(42)).unwrap(), 42);
        assert!(parse_seq(b"version:1").is_err());
    }
}
