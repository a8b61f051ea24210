//! Record storage behind the query console.
//!
//! Sessions only ever see a store through the [`RecordStore`] trait, so any
//! backend that can answer the three asynchronous calls can sit behind the
//! console. [`MemoryStore`] is the backend the binary ships with and the one
//! the tests drive.

use std::{future::Future, time::Duration};

use tokio::{sync::Mutex, time::sleep};
use tracing::debug;

use crate::error::StoreError;

/// Names inserted by the binary on startup unless `--no-seed` is given.
pub const SEED_NAMES: &[&str] = &[
    "Jeremy Goodwin",
    "Natalie Hurley",
    "Dan Rydell",
    "Casey McCall",
    "Dana Whitaker",
];

/// A stored row. Only the store creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: u64,
    pub name: String,
}

/// Asynchronous contract between the console and its backing store.
///
/// Every call may complete long after it was issued. Implementations are
/// responsible for serializing conflicting writes: two concurrent inserts
/// must both succeed with distinct ids.
pub trait RecordStore: Send + Sync + 'static {
    /// Creates the table and seeds it. Calling this again is harmless and
    /// never duplicates the seed rows.
    fn initialize(&self, seed: &[&str]) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every record whose name contains `text`, ascending by id.
    fn find_by_prefix(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<Record>, StoreError>> + Send;

    /// Appends a record and returns it with its freshly assigned id.
    fn insert(&self, name: &str) -> impl Future<Output = Result<Record, StoreError>> + Send;
}

/// In-memory [`RecordStore`].
///
/// Matching is case-insensitive: `find d` finds `Don Johnson`. Rows live in a
/// `Vec` in insertion order, which is also id order, so search results come
/// back sorted without extra work.
#[derive(Default)]
pub struct MemoryStore {
    table: Mutex<Table>,
    latency: Duration,
}

#[derive(Default)]
struct Table {
    created: bool,
    seeded: bool,
    rows: Vec<Record>,
    last_id: u64,
}

impl Table {
    fn append(&mut self, name: &str) -> Record {
        self.last_id += 1;
        let record = Record {
            id: self.last_id,
            name: name.to_string(),
        };
        self.rows.push(record.clone());
        record
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency` before touching the table, standing in
    /// for a round trip to a real engine.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            table: Mutex::default(),
            latency,
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }
}

impl RecordStore for MemoryStore {
    async fn initialize(&self, seed: &[&str]) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let mut table = self.table.lock().await;
        table.created = true;

        if table.seeded {
            debug!("store already seeded; skipping seed rows");
            return Ok(());
        }

        for name in seed {
            table.append(name);
        }
        table.seeded = true;
        debug!(rows = table.rows.len(), "store initialized");
        Ok(())
    }

    async fn find_by_prefix(&self, text: &str) -> Result<Vec<Record>, StoreError> {
        self.simulate_latency().await;
        let table = self.table.lock().await;
        if !table.created {
            return Err(StoreError::Uninitialized);
        }

        let needle = text.to_lowercase();
        Ok(table
            .rows
            .iter()
            .filter(|record| record.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn insert(&self, name: &str) -> Result<Record, StoreError> {
        self.simulate_latency().await;
        let mut table = self.table.lock().await;
        if !table.created {
            return Err(StoreError::Uninitialized);
        }
        Ok(table.append(name))
    }
}
