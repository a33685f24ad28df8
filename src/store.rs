//! Transaction persistence.
//!
//! The pipeline needs exactly one operation from a store: create a batch
//! of records for an owner. [`TransactionStore::insert_batch`] is a unit of
//! work. Either every record of the batch is stored or none is.

use crate::error::ReceiptError;
use crate::model::{NewTransaction, PersistedTransaction};
use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Durable home of transaction records.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist `records` atomically, returning them in the same order with
    /// identifiers and timestamps assigned.
    async fn insert_batch(
        &self,
        records: Vec<NewTransaction>,
    ) -> Result<Vec<PersistedTransaction>, ReceiptError>;
}

fn stamp_all(records: Vec<NewTransaction>) -> Vec<PersistedTransaction> {
    let now = Utc::now();
    records
        .into_iter()
        .map(|r| PersistedTransaction::stamp(r, now))
        .collect()
}

/// Process-local store, used by tests and the `extract` command.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<PersistedTransaction>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn records(&self) -> Vec<PersistedTransaction> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_batch(
        &self,
        records: Vec<NewTransaction>,
    ) -> Result<Vec<PersistedTransaction>, ReceiptError> {
        let saved = stamp_all(records);
        let mut guard = self
            .records
            .lock()
            .map_err(|_| ReceiptError::Store("memory store lock poisoned".into()))?;
        guard.extend(saved.iter().cloned());
        Ok(saved)
    }
}

/// Store keeping every record in one JSON array file.
///
/// Each batch rewrites the file through a temp file in the same directory
/// followed by a rename, so readers see either the old or the new array.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored record, in insertion order.
    pub async fn load(&self) -> Result<Vec<PersistedTransaction>, ReceiptError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_records(&path))
            .await
            .map_err(|e| ReceiptError::Internal(format!("store task panicked: {e}")))?
    }
}

fn read_records(path: &Path) -> Result<Vec<PersistedTransaction>, ReceiptError> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| ReceiptError::Store(format!("{} is corrupt: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(ReceiptError::Store(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

fn write_records(path: &Path, records: &[PersistedTransaction]) -> Result<(), ReceiptError> {
    let store_err = |e: &dyn std::fmt::Display| {
        ReceiptError::Store(format!("cannot write {}: {e}", path.display()))
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| store_err(&e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| store_err(&e))?;
    serde_json::to_writer_pretty(&mut tmp, records).map_err(|e| store_err(&e))?;
    tmp.write_all(b"\n").map_err(|e| store_err(&e))?;
    tmp.as_file().sync_all().map_err(|e| store_err(&e))?;
    tmp.persist(path).map_err(|e| store_err(&e.error))?;
    Ok(())
}

#[async_trait]
impl TransactionStore for JsonFileStore {
    async fn insert_batch(
        &self,
        records: Vec<NewTransaction>,
    ) -> Result<Vec<PersistedTransaction>, ReceiptError> {
        let _guard = self.lock.lock().await;
        let saved = stamp_all(records);
        let path = self.path.clone();
        let batch = saved.clone();

        let total = tokio::task::spawn_blocking(move || {
            let mut all = read_records(&path)?;
            all.extend(batch);
            write_records(&path, &all)?;
            Ok::<_, ReceiptError>(all.len())
        })
        .await
        .map_err(|e| ReceiptError::Internal(format!("store task panicked: {e}")))??;

        info!(
            "Stored {} transaction(s) in {} ({} total)",
            saved.len(),
            self.path.display(),
            total
        );
        debug!(
            "Stored ids: {:?}",
            saved.iter().map(|t| t.id).collect::<Vec<_>>()
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        PaymentMethod, TransactionMetadata, TransactionSource, TransactionStatus, TransactionType,
    };
    use chrono::NaiveDate;

    fn record(amount: f64) -> NewTransaction {
        NewTransaction {
            user_id: "u1".into(),
            kind: TransactionType::Expense,
            category: "Dining".into(),
            subcategory: None,
            amount,
            currency: "INR".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: None,
            payment_method: PaymentMethod::Card,
            tags: vec![],
            source: TransactionSource::Receipt,
            receipt_image_url: None,
            is_deleted: false,
            status: TransactionStatus::Confirmed,
            metadata: TransactionMetadata::default(),
        }
    }

    #[tokio::test]
    async fn memory_store_preserves_order() {
        let store = MemoryStore::new();
        let saved = store
            .insert_batch(vec![record(1.0), record(2.0)])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);
        assert_ne!(saved[0].id, saved[1].id);
        assert_eq!(saved[0].created_at, saved[0].updated_at);
        let amounts: Vec<f64> = store.records().iter().map(|t| t.record.amount).collect();
        assert_eq!(amounts, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn json_store_appends_batches() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("ledger").join("transactions.json"));

        store.insert_batch(vec![record(10.0)]).await.unwrap();
        let second = store
            .insert_batch(vec![record(20.0), record(30.0)])
            .await
            .unwrap();

        let all = store.load().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].id, second[0].id);
        assert_eq!(all[2].record.amount, 30.0);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert!(raw[0]["_id"].is_string());
        assert_eq!(raw[0]["source"], "receipt");
        assert!(raw[0]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn corrupt_json_store_rejects_batch_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        let err = store.insert_batch(vec![record(1.0)]).await.unwrap_err();
        assert!(matches!(err, ReceiptError::Store(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn missing_json_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("none.json"));
        assert!(store.load().await.unwrap().is_empty());
    }
}
