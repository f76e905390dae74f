#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use cdr_core::DocumentRecord;
use cdr_storage::{DocumentStore, MemoryDocumentStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    Insert(String),
    Get(String),
    UpdateFirstSeen(String),
    UpdateLatest(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Insert(_) | Call::UpdateFirstSeen(_) | Call::UpdateLatest(_)
        )
    }
}

/// Memory store that records every contract call and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingStore {
    pub inner: MemoryDocumentStore,
    calls: Mutex<Vec<Call>>,
    fail_mutations: Mutex<bool>,
}

impl RecordingStore {
    pub fn with_records(records: impl IntoIterator<Item = DocumentRecord>) -> Self {
        Self {
            inner: MemoryDocumentStore::with_records(records),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn fail_mutations(&self, fail: bool) {
        *self.fail_mutations.lock().expect("fail lock") = fail;
    }

    fn log(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn outage(&self) -> Result<(), StoreError> {
        if *self.fail_mutations.lock().expect("fail lock") {
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        self.log(Call::Exists(url.to_string()));
        self.inner.exists(url).await
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        self.log(Call::Insert(record.url.clone()));
        self.outage()?;
        self.inner.insert(record).await
    }

    async fn get(&self, url: &str) -> Result<DocumentRecord, StoreError> {
        self.log(Call::Get(url.to_string()));
        self.inner.get(url).await
    }

    async fn update_first_seen(
        &self,
        url: &str,
        first_fetch_time: u64,
        pub_date: u64,
    ) -> Result<(), StoreError> {
        self.log(Call::UpdateFirstSeen(url.to_string()));
        self.outage()?;
        self.inner.update_first_seen(url, first_fetch_time, pub_date).await
    }

    async fn update_latest(&self, url: &str, fetch_time: u64, text: &str) -> Result<(), StoreError> {
        self.log(Call::UpdateLatest(url.to_string()));
        self.outage()?;
        self.inner.update_latest(url, fetch_time, text).await
    }
}

/// Claims every url exists but holds nothing, so `get` is always `NotFound`.
#[derive(Debug, Default)]
pub struct PhantomStore;

#[async_trait]
impl DocumentStore for PhantomStore {
    async fn exists(&self, _url: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        Err(StoreError::duplicate_key(&record.url))
    }

    async fn get(&self, url: &str) -> Result<DocumentRecord, StoreError> {
        Err(StoreError::not_found(url))
    }

    async fn update_first_seen(&self, url: &str, _: u64, _: u64) -> Result<(), StoreError> {
        Err(StoreError::not_found(url))
    }

    async fn update_latest(&self, url: &str, _: u64, _: &str) -> Result<(), StoreError> {
        Err(StoreError::not_found(url))
    }
}

pub fn obs(url: &str, fetch_time: u64, text: &str, pub_date: u64) -> DocumentRecord {
    DocumentRecord::new(url, pub_date, fetch_time, text)
}
