//! Durable counter store: a single-file embedded database holding the
//! visit/like pair.
//!
//! Layout is normative for compatibility with existing data files: one
//! table named `stats` with the keys `visits` and `likes`, each value an
//! 8-byte little-endian unsigned integer. The table is created on first
//! open and never deleted.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use thiserror::Error;

use crate::domain::counters::{CounterPair, decode_counter, encode_counter};

const STATS: TableDefinition<&str, &[u8]> = TableDefinition::new("stats");

const VISITS_KEY: &str = "visits";
const LIKES_KEY: &str = "likes";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(#[from] redb::DatabaseError),
    #[error("store transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("store table access failed: {0}")]
    Table(#[from] redb::TableError),
    #[error("store access failed: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("store commit failed: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("stored counter `{key}` is not {expected} bytes wide")]
    Corrupt { key: &'static str, expected: usize },
}

/// Handle to the on-disk counter store. All writes are transactional; the
/// two counters are always committed together so a crash never persists
/// one without the other.
pub struct StatsStore {
    db: Database,
}

impl StatsStore {
    /// Open or create the store file. Failure here is fatal to startup:
    /// the service does not run without durable state.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        // Create the stats table idempotently so later reads never race
        // against first-write table creation.
        let txn = db.begin_write()?;
        txn.open_table(STATS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Read the persisted pair. Keys never written yet read as zero.
    pub fn load(&self) -> Result<CounterPair, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATS)?;
        Ok(CounterPair {
            visits: read_counter(&table, VISITS_KEY)?,
            likes: read_counter(&table, LIKES_KEY)?,
        })
    }

    /// Persist both counters in one atomic transaction.
    pub fn save(&self, pair: CounterPair) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATS)?;
            table.insert(VISITS_KEY, encode_counter(pair.visits).as_slice())?;
            table.insert(LIKES_KEY, encode_counter(pair.likes).as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Read-modify-write both counters inside a single transaction and
    /// return the committed pair. A failed transaction leaves the stored
    /// pair untouched.
    pub fn apply<F>(&self, mutate: F) -> Result<CounterPair, StoreError>
    where
        F: FnOnce(CounterPair) -> CounterPair,
    {
        let txn = self.db.begin_write()?;
        let updated;
        {
            let mut table = txn.open_table(STATS)?;
            let current = CounterPair {
                visits: read_counter(&table, VISITS_KEY)?,
                likes: read_counter(&table, LIKES_KEY)?,
            };
            updated = mutate(current);
            table.insert(VISITS_KEY, encode_counter(updated.visits).as_slice())?;
            table.insert(LIKES_KEY, encode_counter(updated.likes).as_slice())?;
        }
        txn.commit()?;
        Ok(updated)
    }
}

fn read_counter<T>(table: &T, key: &'static str) -> Result<u64, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(guard) => decode_counter(guard.value()).ok_or(StoreError::Corrupt {
            key,
            expected: crate::domain::counters::COUNTER_WIDTH,
        }),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, StatsStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StatsStore::open(dir.path().join("jairo.db")).expect("open store");
        (dir, store)
    }

    #[test]
    fn first_open_reads_zeroes() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load().expect("load"), CounterPair::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = temp_store();
        let pair = CounterPair::new(10, 2);
        store.save(pair).expect("save");
        assert_eq!(store.load().expect("load"), pair);
    }

    #[test]
    fn reopening_the_file_sees_the_last_committed_pair() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jairo.db");

        {
            let store = StatsStore::open(&path).expect("open");
            store.save(CounterPair::new(7, 3)).expect("save");
        }

        let reopened = StatsStore::open(&path).expect("reopen");
        assert_eq!(reopened.load().expect("load"), CounterPair::new(7, 3));
    }

    #[test]
    fn apply_reads_and_writes_in_one_transaction() {
        let (_dir, store) = temp_store();
        store.save(CounterPair::new(10, 2)).expect("seed");

        let committed = store.apply(|pair| pair.with_like(true)).expect("apply");
        assert_eq!(committed, CounterPair::new(9, 3));
        assert_eq!(store.load().expect("load"), committed);
    }

    #[test]
    fn aborted_transaction_leaves_the_stored_pair_untouched() {
        let (_dir, store) = temp_store();
        store.save(CounterPair::new(10, 2)).expect("seed");

        // A mutation that dies before commit drops the write transaction,
        // which must roll back both keys.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.apply(|_| panic!("mutation aborted"))
        }));
        assert!(result.is_err());

        assert_eq!(store.load().expect("load"), CounterPair::new(10, 2));
    }

    #[test]
    fn repeated_likes_accumulate_exactly() {
        let (_dir, store) = temp_store();
        store.save(CounterPair::new(10, 2)).expect("seed");

        for _ in 0..3 {
            store.apply(|pair| pair.with_like(false)).expect("apply");
        }

        assert_eq!(store.load().expect("load"), CounterPair::new(10, 5));
    }
}
