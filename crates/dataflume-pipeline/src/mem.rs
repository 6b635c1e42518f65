//! In-memory collaborator implementations for tests, demos, and the CLI's
//! ad-hoc path.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dataflume_core::{Batch, Record};

use crate::collaborators::{
    BatchEvent, EventPublisher, ObjectMetadata, PublishError, SchemaChangeEvent, Source,
    SourceError, SourceProvider, StorageError, StorageManager, StoredObject,
};

/// Finite source over an in-memory record list, with optional failure
/// injection at a given batch index and an optional per-batch delay for
/// exercising in-flight shutdown.
pub struct MemorySource {
    records: VecDeque<Record>,
    fail_at_batch: Option<usize>,
    delay: Option<std::time::Duration>,
    batches_served: usize,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
            fail_at_batch: None,
            delay: None,
            batches_served: 0,
        }
    }

    pub fn failing_at(mut self, batch_index: usize) -> Self {
        self.fail_at_batch = Some(batch_index);
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn next_batch(&mut self, hint: usize) -> Result<Option<Batch>, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at_batch == Some(self.batches_served) {
            return Err(SourceError::Read("injected source failure".to_string()));
        }
        if self.records.is_empty() {
            return Ok(None);
        }
        let take = hint.max(1).min(self.records.len());
        let batch: Batch = self.records.drain(..take).collect();
        self.batches_served += 1;
        Ok(Some(batch))
    }
}

#[derive(Default)]
struct RegisteredSource {
    records: Vec<Record>,
    fail_at_batch: Option<usize>,
    delay: Option<std::time::Duration>,
}

/// Provider over named in-memory record sets.
#[derive(Default)]
pub struct MemorySourceProvider {
    sources: Mutex<BTreeMap<String, RegisteredSource>>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, records: Vec<Record>) {
        self.lock().insert(
            name.into(),
            RegisteredSource {
                records,
                fail_at_batch: None,
                delay: None,
            },
        );
    }

    /// Make the named source fail when serving the given batch index.
    pub fn register_failing(
        &self,
        name: impl Into<String>,
        records: Vec<Record>,
        fail_at_batch: usize,
    ) {
        self.lock().insert(
            name.into(),
            RegisteredSource {
                records,
                fail_at_batch: Some(fail_at_batch),
                delay: None,
            },
        );
    }

    /// Make the named source pause before each batch it serves.
    pub fn register_slow(
        &self,
        name: impl Into<String>,
        records: Vec<Record>,
        delay: std::time::Duration,
    ) {
        self.lock().insert(
            name.into(),
            RegisteredSource {
                records,
                fail_at_batch: None,
                delay: Some(delay),
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, RegisteredSource>> {
        self.sources.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[async_trait]
impl SourceProvider for MemorySourceProvider {
    async fn open(&self, source: &str) -> Result<Box<dyn Source>, SourceError> {
        let registered = self.lock();
        let entry = registered
            .get(source)
            .ok_or_else(|| SourceError::Unknown(source.to_string()))?;
        let mut opened = MemorySource::new(entry.records.clone());
        opened.fail_at_batch = entry.fail_at_batch;
        opened.delay = entry.delay;
        Ok(Box::new(opened))
    }
}

/// Storage seam over an in-memory object map, with a write-failure switch
/// for exercising batch-fatal paths.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, (Vec<u8>, ObjectMetadata)>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.lock().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (Vec<u8>, ObjectMetadata)>> {
        self.objects.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[async_trait]
impl StorageManager for MemoryStorage {
    async fn store(
        &self,
        path: &str,
        bytes: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<StoredObject, StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Write("injected write failure".to_string()));
        }
        let size = bytes.len() as u64;
        self.lock().insert(path.to_string(), (bytes, metadata));
        Ok(StoredObject {
            path: path.to_string(),
            size,
        })
    }

    async fn retrieve(&self, path: &str) -> Result<(Vec<u8>, ObjectMetadata), StorageError> {
        self.lock()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, StorageError> {
        Ok(self
            .lock()
            .keys()
            .filter(|path| path.starts_with(prefix))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_metadata(&self, path: &str) -> Result<ObjectMetadata, StorageError> {
        self.lock()
            .get(path)
            .map(|(_, metadata)| metadata.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

/// Event sink that records everything published, with a failure switch to
/// exercise the best-effort path.
#[derive(Default)]
pub struct MemoryPublisher {
    batch_events: Mutex<Vec<BatchEvent>>,
    schema_events: Mutex<Vec<SchemaChangeEvent>>,
    fail: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn batch_events(&self) -> Vec<BatchEvent> {
        self.batch_events
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn schema_events(&self) -> Vec<SchemaChangeEvent> {
        self.schema_events
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish_batch(&self, event: BatchEvent) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Send("injected publish failure".to_string()));
        }
        self.batch_events
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(event);
        Ok(())
    }

    async fn publish_schema_change(&self, event: SchemaChangeEvent) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Send("injected publish failure".to_string()));
        }
        self.schema_events
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(event);
        Ok(())
    }
}
