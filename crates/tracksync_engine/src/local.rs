//! Local record set.

use crate::error::{SyncError, SyncResult};
use serde_json::{json, Value};
use tracksync_protocol::{OperationType, Shipment};

/// A change to the local record set.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new record.
    Add(Shipment),
    /// Replace an existing record.
    Update(Shipment),
    /// Remove a record.
    Delete {
        /// Identifier of the record to remove.
        id: String,
    },
}

impl Mutation {
    /// Returns the operation type used for replay.
    pub fn op_type(&self) -> OperationType {
        match self {
            Mutation::Add(_) => OperationType::Add,
            Mutation::Update(_) => OperationType::Update,
            Mutation::Delete { .. } => OperationType::Delete,
        }
    }

    /// Returns the identifier of the affected record.
    pub fn id(&self) -> &str {
        match self {
            Mutation::Add(s) | Mutation::Update(s) => &s.id,
            Mutation::Delete { id } => id,
        }
    }

    /// Returns the payload sent to the remote store.
    pub fn payload(&self) -> SyncResult<Value> {
        match self {
            Mutation::Add(s) | Mutation::Update(s) => Ok(serde_json::to_value(s)?),
            Mutation::Delete { id } => Ok(json!({ "id": id })),
        }
    }
}

/// The locally held record set.
///
/// Local storage is assumed always available: an error here means the
/// environment is broken and is surfaced to the caller as
/// [`SyncError::LocalWrite`].
pub trait LocalStore: Send {
    /// Returns all records in insertion order.
    fn records(&self) -> Vec<Shipment>;

    /// Returns the record with the given identifier.
    fn get(&self, id: &str) -> Option<Shipment> {
        self.records().into_iter().find(|s| s.id == id)
    }

    /// Applies a mutation.
    fn apply(&mut self, mutation: &Mutation) -> SyncResult<()>;

    /// Replaces the whole record set with the result of a merge.
    fn replace_all(&mut self, records: Vec<Shipment>) -> SyncResult<()>;
}

/// A local store kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    records: Vec<Shipment>,
    fail_writes: bool,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records`.
    pub fn with_records(records: Vec<Shipment>) -> Self {
        Self {
            records,
            fail_writes: false,
        }
    }

    /// Makes every write fail, simulating a broken environment.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn check_writable(&self) -> SyncResult<()> {
        if self.fail_writes {
            return Err(SyncError::local_write("local store is read-only"));
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|s| s.id == id)
    }
}

impl LocalStore for MemoryLocalStore {
    fn records(&self) -> Vec<Shipment> {
        self.records.clone()
    }

    fn get(&self, id: &str) -> Option<Shipment> {
        self.records.iter().find(|s| s.id == id).cloned()
    }

    fn apply(&mut self, mutation: &Mutation) -> SyncResult<()> {
        self.check_writable()?;

        match mutation {
            Mutation::Add(shipment) => {
                if self.position(&shipment.id).is_some() {
                    return Err(SyncError::local_write(format!(
                        "shipment {} already exists",
                        shipment.id
                    )));
                }
                self.records.push(shipment.clone());
            }
            Mutation::Update(shipment) => {
                let index = self.position(&shipment.id).ok_or_else(|| {
                    SyncError::local_write(format!("shipment {} not found", shipment.id))
                })?;
                self.records[index] = shipment.clone();
            }
            Mutation::Delete { id } => {
                let index = self
                    .position(id)
                    .ok_or_else(|| SyncError::local_write(format!("shipment {id} not found")))?;
                self.records.remove(index);
            }
        }
        Ok(())
    }

    fn replace_all(&mut self, records: Vec<Shipment>) -> SyncResult<()> {
        self.check_writable()?;
        self.records = records;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracksync_testkit::shipment;

    #[test]
    fn mutation_payloads() {
        let s = shipment("A", "2024-01-02T00:00:00Z");

        let add = Mutation::Add(s.clone());
        assert_eq!(add.op_type(), OperationType::Add);
        assert_eq!(add.payload().unwrap()["id"], "A");

        let delete = Mutation::Delete { id: "A".into() };
        assert_eq!(delete.op_type(), OperationType::Delete);
        assert_eq!(delete.payload().unwrap(), json!({"id": "A"}));
        assert_eq!(delete.id(), "A");
    }

    #[test]
    fn apply_add_update_delete() {
        let mut store = MemoryLocalStore::new();
        let s = shipment("A", "2024-01-02T00:00:00Z");

        store.apply(&Mutation::Add(s.clone())).unwrap();
        assert!(store.apply(&Mutation::Add(s.clone())).is_err());

        let updated = s.clone().with_updated_at(tracksync_testkit::ts("2024-01-03T00:00:00Z"));
        store.apply(&Mutation::Update(updated.clone())).unwrap();
        assert_eq!(store.get("A"), Some(updated));

        store.apply(&Mutation::Delete { id: "A".into() }).unwrap();
        assert!(store.records().is_empty());
        assert!(store.apply(&Mutation::Delete { id: "A".into() }).is_err());
    }

    #[test]
    fn failing_store_rejects_writes() {
        let mut store = MemoryLocalStore::new();
        store.set_fail_writes(true);

        let err = store
            .apply(&Mutation::Add(shipment("A", "2024-01-02T00:00:00Z")))
            .unwrap_err();
        assert!(matches!(err, SyncError::LocalWrite(_)));
        assert!(store.replace_all(Vec::new()).is_err());
    }
}
