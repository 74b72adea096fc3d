use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::Mutex;

use crate::DataManagerError;

/// An entity kept in a [`Store`].
pub trait Record: Clone + Send + 'static {
    /// Prefix of generated ids, e.g. `d` for drivers.
    const PREFIX: &'static str;
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    /// Checks required fields and fills in defaults before a write.
    fn validate(&mut self) -> Result<(), DataManagerError> {
        Ok(())
    }
}

/// In-memory list of records, in insertion order.
#[derive(Clone)]
pub struct Store<T: Record> {
    records: Arc<Mutex<Vec<T>>>,
    next_id: Arc<AtomicU64>,
}

impl<T: Record> Store<T> {
    pub fn new(seed: Vec<T>) -> Self {
        let next_id = seed.len() as u64 + 1;
        Self {
            records: Arc::new(Mutex::new(seed)),
            next_id: Arc::new(AtomicU64::new(next_id)),
        }
    }

    pub async fn list(&self) -> Vec<T> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn get(&self, id: &str) -> Result<T, DataManagerError> {
        self.records
            .lock()
            .await
            .iter()
            .find(|record| record.id() == id)
            .cloned()
            .ok_or_else(|| not_found::<T>(id))
    }

    /// Adds a record under a freshly generated id, ignoring any id it carries.
    pub async fn insert(&self, mut record: T) -> Result<T, DataManagerError> {
        record.validate()?;

        let mut records = self.records.lock().await;
        let id = loop {
            let candidate = format!("{}{}", T::PREFIX, self.next_id.fetch_add(1, Ordering::Relaxed));
            if !records.iter().any(|existing| existing.id() == candidate) {
                break candidate;
            }
        };
        record.set_id(id);
        records.push(record.clone());

        tracing::info!("Added {} {}", T::KIND, record.id());
        Ok(record)
    }

    /// Replaces the record with the given id. The id itself never changes.
    pub async fn update(&self, id: &str, mut record: T) -> Result<T, DataManagerError> {
        record.set_id(id.to_string());
        record.validate()?;

        let mut records = self.records.lock().await;
        let existing = records.iter_mut().find(|existing| existing.id() == id).ok_or_else(|| not_found::<T>(id))?;
        *existing = record.clone();

        tracing::info!("Updated {} {}", T::KIND, id);
        Ok(record)
    }

    /// Applies `change` to the record in place and returns the result.
    pub async fn modify(&self, id: &str, change: impl FnOnce(&mut T)) -> Result<T, DataManagerError> {
        let mut records = self.records.lock().await;
        let existing = records.iter_mut().find(|existing| existing.id() == id).ok_or_else(|| not_found::<T>(id))?;

        let mut changed = existing.clone();
        change(&mut changed);
        changed.set_id(id.to_string());
        changed.validate()?;
        *existing = changed.clone();

        Ok(changed)
    }

    pub async fn remove(&self, id: &str) -> Result<T, DataManagerError> {
        let mut records = self.records.lock().await;
        let index = records.iter().position(|record| record.id() == id).ok_or_else(|| not_found::<T>(id))?;

        tracing::info!("Removed {} {}", T::KIND, id);
        Ok(records.remove(index))
    }
}

fn not_found<T: Record>(id: &str) -> DataManagerError {
    DataManagerError::NotFound(format!("{} {}", T::KIND, id))
}
