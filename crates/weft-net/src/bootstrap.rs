//! Persistent store of bootstrap contacts.
//!
//! A small on-disk table of seed peers, read at startup and maintained
//! as the node learns better contacts. Ordering carries no meaning.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{Options, DB};
use thiserror::Error;
use tracing::{debug, warn};
use weft_core::{Address, DecodeError, WireDecode, WireEncode};
use weft_proto::Contact;

/// Column family for contacts.
const CONTACTS_CF: &str = "contacts";

/// Errors from the bootstrap store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(String),

    /// Stored bytes failed to decode
    #[error("corrupt record: {0}")]
    Corrupt(#[from] DecodeError),
}

/// On-disk bootstrap contact table.
pub struct BootstrapStore {
    db: Arc<DB>,
}

impl BootstrapStore {
    /// Opens (or creates) a store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, [CONTACTS_CF])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Reads every stored contact.
    ///
    /// Rows that no longer decode are skipped with a warning rather
    /// than failing the whole read.
    pub fn read_all(&self) -> Result<Vec<Contact>, StoreError> {
        let cf = self.cf()?;
        let mut contacts = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            match Contact::from_bytes(&value) {
                Ok(contact) => contacts.push(contact),
                Err(err) => warn!(%err, "skipping corrupt bootstrap contact"),
            }
        }
        Ok(contacts)
    }

    /// Adds (or refreshes) a batch of contacts.
    pub fn add_many(&self, contacts: &[Contact]) -> Result<(), StoreError> {
        let cf = self.cf()?;
        for contact in contacts {
            self.db
                .put_cf(cf, contact.id.as_bytes(), contact.to_vec())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        debug!(count = contacts.len(), "stored bootstrap contacts");
        Ok(())
    }

    /// Replaces the whole table with `contacts`.
    pub fn replace_all(&self, contacts: &[Contact]) -> Result<(), StoreError> {
        let cf = self.cf()?;
        let existing: Vec<Vec<u8>> = self
            .db
            .iterator_cf(cf, rocksdb::IteratorMode::Start)
            .filter_map(|item| item.ok().map(|(k, _)| k.to_vec()))
            .collect();
        for key in existing {
            self.db
                .delete_cf(cf, &key)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        self.add_many(contacts)
    }

    /// Removes a contact by id.
    pub fn remove(&self, id: &Address) -> Result<(), StoreError> {
        let cf = self.cf()?;
        self.db
            .delete_cf(cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CONTACTS_CF)
            .ok_or_else(|| StoreError::Database("missing contacts column family".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use weft_proto::{Endpoint, EndpointPair};

    fn contact(port: u16) -> Contact {
        let endpoint = Endpoint::new("1.2.3.4".parse().unwrap(), port);
        Contact::new(Address::random(), EndpointPair::new(endpoint, endpoint))
    }

    #[test]
    fn add_and_read_back() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::open(dir.path()).unwrap();

        let contacts = vec![contact(5000), contact(5001)];
        store.add_many(&contacts).unwrap();

        let mut read = store.read_all().unwrap();
        read.sort_by_key(|c| c.endpoints.external.port());
        assert_eq!(read, contacts);
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let seed = contact(5000);
        {
            let store = BootstrapStore::open(dir.path()).unwrap();
            store.add_many(std::slice::from_ref(&seed)).unwrap();
        }
        let store = BootstrapStore::open(dir.path()).unwrap();
        assert_eq!(store.read_all().unwrap(), vec![seed]);
    }

    #[test]
    fn replace_all_swaps_the_table() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::open(dir.path()).unwrap();

        store.add_many(&[contact(5000), contact(5001)]).unwrap();
        let fresh = vec![contact(6000)];
        store.replace_all(&fresh).unwrap();
        assert_eq!(store.read_all().unwrap(), fresh);
    }

    #[test]
    fn remove_by_id() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::open(dir.path()).unwrap();

        let keep = contact(5000);
        let gone = contact(5001);
        store.add_many(&[keep, gone]).unwrap();
        store.remove(&gone.id).unwrap();
        assert_eq!(store.read_all().unwrap(), vec![keep]);
    }

    #[test]
    fn refresh_overwrites_same_id() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::open(dir.path()).unwrap();

        let mut seed = contact(5000);
        store.add_many(std::slice::from_ref(&seed)).unwrap();
        seed.endpoints.external = Endpoint::new("5.6.7.8".parse().unwrap(), 7000);
        store.add_many(std::slice::from_ref(&seed)).unwrap();

        let read = store.read_all().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].endpoints.external.port(), 7000);
    }
}
