//! Transactional access to the ordered event map.
//!
//! All writes go through [`Store::write`], which scopes a closure over an
//! exclusive transaction and commits on success; dropping the transaction on
//! any error path rolls it back. Reads go through [`Store::read`], which sees
//! a consistent WAL snapshot relative to concurrent writers.
//!
//! Commits that inserted events signal [`Store::subscribe`] receivers after
//! the commit, so a woken subscriber is guaranteed to observe at least the
//! writes of the commit that woke it. The channel is a single-slot
//! `tokio::sync::watch`: pending signals overwrite rather than queue, and a
//! woken reader re-reads the store.

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tokio::sync::watch;

use crate::error::StoreError;
use crate::id::EventId;
use crate::migrations::run_migrations;
use crate::pool::DbPool;

/// Handle to the event store shared by all writers, readers, and the pruner.
pub struct Store {
    pool: DbPool,
    changes: watch::Sender<u64>,
}

impl Store {
    /// Opens the store, creating the events map if it does not exist.
    ///
    /// Idempotent: opening an existing state file preserves all events.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a connection cannot be checked out or the
    /// schema cannot be initialized.
    pub fn open(pool: DbPool) -> Result<Self, StoreError> {
        let conn = pool.get()?;
        run_migrations(&conn)?;
        drop(conn);

        let (changes, _) = watch::channel(0u64);
        Ok(Self { pool, changes })
    }

    /// Runs `body` inside an exclusive write transaction.
    ///
    /// The transaction commits if `body` returns `Ok` and rolls back
    /// otherwise. If the committed transaction inserted any events, change
    /// subscribers are signalled after the commit. Deletions alone do not
    /// signal; readers wait for new events, not for retention.
    ///
    /// # Errors
    ///
    /// Propagates `body`'s error, or a `StoreError` from the transaction
    /// machinery itself.
    pub fn write<T, E>(&self, body: impl FnOnce(&mut WriteTx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.pool.get().map_err(StoreError::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let mut wtx = WriteTx {
            tx,
            inserted: false,
        };
        let out = body(&mut wtx)?;

        let WriteTx { tx, inserted } = wtx;
        tx.commit().map_err(StoreError::from)?;

        if inserted {
            self.changes.send_modify(|n| *n = n.wrapping_add(1));
        }

        Ok(out)
    }

    /// Runs `body` inside a read transaction with snapshot isolation.
    ///
    /// # Errors
    ///
    /// Propagates `body`'s error, or a `StoreError` from the transaction
    /// machinery itself.
    pub fn read<T, E>(&self, body: impl FnOnce(&ReadTx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.pool.get().map_err(StoreError::from)?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let rtx = ReadTx { tx };
        body(&rtx)
    }

    /// Subscribes to change notifications.
    ///
    /// The receiver resolves `changed()` once per committed write that
    /// inserted events, coalescing bursts into a single pending wake.
    /// Dropping the receiver releases the subscription.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

/// Exclusive write transaction over the events map.
pub struct WriteTx<'conn> {
    tx: Transaction<'conn>,
    inserted: bool,
}

impl WriteTx<'_> {
    /// Inserts an event. Overwrites any existing entry with the same id.
    pub fn put(&mut self, id: &EventId, payload: &[u8]) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT OR REPLACE INTO events (id, payload) VALUES (?1, ?2)",
            params![id.to_string(), payload],
        )?;
        self.inserted = true;
        Ok(())
    }

    /// Deletes an event by its textual key. Missing keys are a no-op.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.tx
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Opens a cursor over the events map within this transaction.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.tx)
    }

    /// Number of events currently in the map.
    pub fn len(&self) -> Result<u64, StoreError> {
        count_events(&self.tx)
    }
}

/// Read transaction over the events map.
pub struct ReadTx<'conn> {
    tx: Transaction<'conn>,
}

impl ReadTx<'_> {
    /// Opens a cursor over the events map within this snapshot.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.tx)
    }

    /// Number of events in this snapshot.
    pub fn len(&self) -> Result<u64, StoreError> {
        count_events(&self.tx)
    }
}

fn count_events(conn: &Connection) -> Result<u64, StoreError> {
    let n = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    Ok(n)
}

/// Bidirectional cursor over the events map, ordered by key.
///
/// A fresh cursor is unpositioned (`is_done()` is true) until one of
/// [`first`](Cursor::first), [`last`](Cursor::last), or
/// [`seek`](Cursor::seek) places it. Every step is a single indexed point
/// query inside the enclosing transaction, so a cursor observes the same
/// snapshot as the transaction that opened it.
pub struct Cursor<'a> {
    conn: &'a Connection,
    pos: Option<(String, Vec<u8>)>,
}

impl<'a> Cursor<'a> {
    fn new(conn: &'a Connection) -> Self {
        Self { conn, pos: None }
    }

    /// Positions on the smallest key, or done if the map is empty.
    pub fn first(&mut self) -> Result<(), StoreError> {
        self.pos = self.row("SELECT id, payload FROM events ORDER BY id ASC LIMIT 1", &[])?;
        Ok(())
    }

    /// Positions on the largest key, or done if the map is empty.
    pub fn last(&mut self) -> Result<(), StoreError> {
        self.pos = self.row(
            "SELECT id, payload FROM events ORDER BY id DESC LIMIT 1",
            &[],
        )?;
        Ok(())
    }

    /// Positions on the smallest key >= `key`, or done if there is none.
    pub fn seek(&mut self, key: &str) -> Result<(), StoreError> {
        self.pos = self.row(
            "SELECT id, payload FROM events WHERE id >= ?1 ORDER BY id ASC LIMIT 1",
            &[key],
        )?;
        Ok(())
    }

    /// Steps to the next larger key; done past the end. No-op when done.
    pub fn next(&mut self) -> Result<(), StoreError> {
        if let Some((current, _)) = self.pos.take() {
            self.pos = self.row(
                "SELECT id, payload FROM events WHERE id > ?1 ORDER BY id ASC LIMIT 1",
                &[current.as_str()],
            )?;
        }
        Ok(())
    }

    /// Steps to the next smaller key; done past the start. No-op when done.
    pub fn prev(&mut self) -> Result<(), StoreError> {
        if let Some((current, _)) = self.pos.take() {
            self.pos = self.row(
                "SELECT id, payload FROM events WHERE id < ?1 ORDER BY id DESC LIMIT 1",
                &[current.as_str()],
            )?;
        }
        Ok(())
    }

    /// True when the cursor has run off the map (or was never positioned).
    pub fn is_done(&self) -> bool {
        self.pos.is_none()
    }

    /// Key at the current position.
    pub fn key(&self) -> Option<&str> {
        self.pos.as_ref().map(|(k, _)| k.as_str())
    }

    /// Payload at the current position.
    pub fn value(&self) -> Option<&[u8]> {
        self.pos.as_ref().map(|(_, v)| v.as_slice())
    }

    fn row(
        &self,
        sql: &str,
        params: &[&str],
    ) -> Result<Option<(String, Vec<u8>)>, StoreError> {
        let row = self
            .conn
            .query_row(sql, rusqlite::params_from_iter(params), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        Ok(row)
    }
}
