use std::collections::HashMap;

use async_trait::async_trait;
use cdr_core::DocumentRecord;
use tokio::sync::Mutex;

use crate::{check_record, check_text, to_column, DocumentStore, StoreError};

/// Process-local store with the same contract as the PostgreSQL backend.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: Mutex<HashMap<String, DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = DocumentRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.url.clone(), record))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn snapshot(&self, url: &str) -> Option<DocumentRecord> {
        self.records.lock().await.get(url).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().await.contains_key(url))
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        check_record(record)?;
        let mut records = self.records.lock().await;
        if records.contains_key(&record.url) {
            return Err(StoreError::duplicate_key(&record.url));
        }
        records.insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<DocumentRecord, StoreError> {
        self.records
            .lock()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| StoreError::not_found(url))
    }

    async fn update_first_seen(
        &self,
        url: &str,
        first_fetch_time: u64,
        pub_date: u64,
    ) -> Result<(), StoreError> {
        to_column("first_fetch_time", first_fetch_time)?;
        to_column("pub_date", pub_date)?;
        let mut records = self.records.lock().await;
        let record = records.get_mut(url).ok_or_else(|| StoreError::not_found(url))?;
        record.first_fetch_time = first_fetch_time;
        record.pub_date = pub_date;
        Ok(())
    }

    async fn update_latest(&self, url: &str, fetch_time: u64, text: &str) -> Result<(), StoreError> {
        to_column("fetch_time", fetch_time)?;
        check_text("text", text)?;
        let mut records = self.records.lock().await;
        let record = records.get_mut(url).ok_or_else(|| StoreError::not_found(url))?;
        record.fetch_time = fetch_time;
        record.text = text.to_string();
        Ok(())
    }
}
