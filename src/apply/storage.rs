use crate::codec::{Attribute, DirectoryChange, Entry, ModOp, Modification};
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// AppliedChange is one committed log record, decoded and ready for the storage engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppliedChange {
    pub index: u64,
    pub term: u32,
    pub change: DirectoryChange,
}

/// StorageEngine is the application's database. The apply task drives it with one transaction per
/// committed record, in index order.
///
/// A failure to apply a committed record is unrecoverable, so errors returned from `apply` or
/// `commit` bring the replica down.
pub trait StorageEngine: Send + 'static {
    /// Index of the last record committed to storage, 0 if none. Records at or below it are
    /// skipped after a restart.
    fn last_applied(&self) -> u64;

    fn begin(&mut self) -> io::Result<()>;

    fn apply(&mut self, change: &AppliedChange) -> io::Result<()>;

    /// Makes the transaction durable and records `index` as the last applied index.
    fn commit(&mut self, index: u64) -> io::Result<()>;

    fn abort(&mut self);
}

impl<S: StorageEngine + ?Sized> StorageEngine for Box<S> {
    fn last_applied(&self) -> u64 {
        (**self).last_applied()
    }

    fn begin(&mut self) -> io::Result<()> {
        (**self).begin()
    }

    fn apply(&mut self, change: &AppliedChange) -> io::Result<()> {
        (**self).apply(change)
    }

    fn commit(&mut self, index: u64) -> io::Result<()> {
        (**self).commit(index)
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

/// InMemoryStorageEngine keeps entries in memory, keyed by normalized DN. Clones share the same
/// data, so an application can keep a handle for reads after giving one to the raft client.
#[derive(Clone, Default)]
pub struct InMemoryStorageEngine {
    inner: Arc<Mutex<InMemoryTables>>,
}

#[derive(Default)]
struct InMemoryTables {
    entries: BTreeMap<String, Entry>,
    last_applied: u64,
    // Working copy of `entries` while a transaction is open.
    txn: Option<BTreeMap<String, Entry>>,
}

impl InMemoryStorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, normalized_dn: &str) -> Option<Entry> {
        self.tables().entries.get(normalized_dn).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tables(&self) -> MutexGuard<'_, InMemoryTables> {
        // Nothing panics while holding the lock, so a poisoned mutex still holds consistent data.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl StorageEngine for InMemoryStorageEngine {
    fn last_applied(&self) -> u64 {
        self.tables().last_applied
    }

    fn begin(&mut self) -> io::Result<()> {
        let mut tables = self.tables();
        if tables.txn.is_some() {
            return Err(io::Error::new(io::ErrorKind::Other, "transaction already open"));
        }
        tables.txn = Some(tables.entries.clone());
        Ok(())
    }

    fn apply(&mut self, applied: &AppliedChange) -> io::Result<()> {
        let mut tables = self.tables();
        let txn = tables
            .txn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no open transaction"))?;

        match &applied.change {
            DirectoryChange::Add(entry) => {
                let dn = entry
                    .dn
                    .as_ref()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no dn"))?;
                if txn.contains_key(&dn.normalized) {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} already exists", dn.value),
                    ));
                }
                txn.insert(dn.normalized.clone(), entry.clone());
            }
            DirectoryChange::Modify { dn, mods } => {
                let entry = txn.get_mut(&dn.normalized).ok_or_else(|| not_found(&dn.value))?;
                for modification in mods {
                    apply_modification(entry, modification);
                }
            }
            DirectoryChange::Delete { dn } => {
                txn.remove(&dn.normalized).ok_or_else(|| not_found(&dn.value))?;
            }
        }

        Ok(())
    }

    fn commit(&mut self, index: u64) -> io::Result<()> {
        let mut tables = self.tables();
        let txn = tables
            .txn
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no open transaction"))?;
        tables.entries = txn;
        tables.last_applied = index;
        Ok(())
    }

    fn abort(&mut self) {
        self.tables().txn = None;
    }
}

fn not_found(dn: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} does not exist", dn))
}

fn apply_modification(entry: &mut Entry, modification: &Modification) {
    let name = &modification.attribute.name;
    let position = entry
        .attributes
        .iter()
        .position(|attr| attr.name.eq_ignore_ascii_case(name));
    let values = &modification.attribute.values;

    match (modification.op, position) {
        (ModOp::Add, Some(i)) => {
            let existing = &mut entry.attributes[i].values;
            for value in values {
                if !existing.contains(value) {
                    existing.push(value.clone());
                }
            }
        }
        (ModOp::Add, None) | (ModOp::Replace, None) => {
            if !values.is_empty() {
                entry.attributes.push(Attribute {
                    name: name.clone(),
                    descriptor: modification.attribute.descriptor.clone(),
                    values: values.clone(),
                });
            }
        }
        (ModOp::Replace, Some(i)) => {
            if values.is_empty() {
                entry.attributes.remove(i);
            } else {
                entry.attributes[i].values = values.clone();
            }
        }
        (ModOp::Delete, Some(i)) => {
            if values.is_empty() {
                entry.attributes.remove(i);
            } else {
                entry.attributes[i].values.retain(|v| !values.contains(v));
                if entry.attributes[i].values.is_empty() {
                    entry.attributes.remove(i);
                }
            }
        }
        (ModOp::Delete, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Dn, SchemaContext, StaticSchema};
    use bytes::Bytes;

    fn dn(value: &str) -> Dn {
        let ctx = SchemaContext::new(Arc::new(StaticSchema::core()));
        Dn::parse(&ctx, value).unwrap()
    }

    fn alice() -> Entry {
        let mut entry = Entry::new(10)
            .with_attribute(Attribute::new("cn", vec!["alice"]))
            .with_attribute(Attribute::new("mail", vec!["a@example.com", "alice@example.com"]));
        entry.dn = Some(dn("cn=alice,dc=example"));
        entry
    }

    fn applied(index: u64, change: DirectoryChange) -> AppliedChange {
        AppliedChange { index, term: 1, change }
    }

    fn apply_one(storage: &mut InMemoryStorageEngine, change: AppliedChange) -> io::Result<()> {
        storage.begin()?;
        match storage.apply(&change) {
            Ok(()) => storage.commit(change.index),
            Err(e) => {
                storage.abort();
                Err(e)
            }
        }
    }

    #[test]
    fn add_modify_delete() {
        let mut storage = InMemoryStorageEngine::new();
        let reader = storage.clone();
        let key = dn("cn=alice,dc=example").normalized;

        apply_one(&mut storage, applied(1, DirectoryChange::Add(alice()))).unwrap();
        assert_eq!(reader.last_applied(), 1);
        assert_eq!(reader.entry(&key), Some(alice()));

        let mods = vec![
            Modification::new(ModOp::Delete, Attribute::new("mail", vec!["a@example.com"])),
            Modification::new(ModOp::Add, Attribute::new("sn", vec!["smith"])),
            Modification::new(ModOp::Replace, Attribute::new("CN", vec!["Alice"])),
        ];
        let modify = DirectoryChange::Modify {
            dn: dn("cn=alice,dc=example"),
            mods,
        };
        apply_one(&mut storage, applied(2, modify)).unwrap();

        let entry = reader.entry(&key).unwrap();
        assert_eq!(entry.attribute("mail").unwrap().values, vec![Bytes::from("alice@example.com")]);
        assert_eq!(entry.attribute("sn").unwrap().values, vec![Bytes::from("smith")]);
        assert_eq!(entry.attribute("cn").unwrap().values, vec![Bytes::from("Alice")]);

        let delete = DirectoryChange::Delete {
            dn: dn("cn=alice,dc=example"),
        };
        apply_one(&mut storage, applied(3, delete)).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.last_applied(), 3);
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let mut storage = InMemoryStorageEngine::new();
        apply_one(&mut storage, applied(1, DirectoryChange::Add(alice()))).unwrap();

        let err = apply_one(&mut storage, applied(2, DirectoryChange::Add(alice()))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        let delete_missing = DirectoryChange::Delete {
            dn: dn("cn=bob,dc=example"),
        };
        let err = apply_one(&mut storage, applied(2, delete_missing)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        assert_eq!(storage.last_applied(), 1);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn apply_requires_open_transaction() {
        let mut storage = InMemoryStorageEngine::new();
        assert!(storage.apply(&applied(1, DirectoryChange::Add(alice()))).is_err());
        assert!(storage.commit(1).is_err());

        storage.begin().unwrap();
        assert!(storage.begin().is_err());
    }
}
