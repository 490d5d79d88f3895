//! Transactions and savepoints.
//!
//! The closure APIs ([`Connection::transaction`] and friends) commit on
//! normal completion and roll back on any error, re-propagating it. They are
//! built on guard types ([`Transaction`], [`Savepoint`]) that roll back from
//! drop, so early returns and panics unwind cleanly too. A rollback failure
//! during unwind is logged and suppressed in favor of the original error.

use std::ops::Deref;

use crate::connection::Connection;
use crate::Result;

/// Locking behavior of an explicit transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionBehavior {
    Deferred,
    Immediate,
    Exclusive,
}

impl TransactionBehavior {
    fn begin_sql(self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// An open transaction. Rolls back from drop unless committed.
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    finished: bool,
}

impl<'conn> Transaction<'conn> {
    fn begin(conn: &'conn Connection, begin_sql: &str) -> Result<Transaction<'conn>> {
        conn.exec_raw(begin_sql)?;
        Ok(Transaction {
            conn,
            finished: false,
        })
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.exec_raw("COMMIT")
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.exec_raw("ROLLBACK")
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    #[inline]
    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.conn.exec_raw("ROLLBACK") {
                tracing::error!("rollback during transaction unwind failed: {err}");
            }
        }
    }
}

/// A named nested-transaction boundary. Rolls back to the savepoint from
/// drop unless released.
pub struct Savepoint<'conn> {
    conn: &'conn Connection,
    name: String,
    finished: bool,
}

impl<'conn> Savepoint<'conn> {
    fn begin(conn: &'conn Connection, name: &str) -> Result<Savepoint<'conn>> {
        conn.exec_raw(&format!("SAVEPOINT {name}"))?;
        Ok(Savepoint {
            conn,
            name: name.to_string(),
            finished: false,
        })
    }

    /// Release the savepoint, folding its changes into the enclosing scope.
    pub fn release(mut self) -> Result<()> {
        self.finished = true;
        self.conn.exec_raw(&format!("RELEASE SAVEPOINT {}", self.name))
    }

    /// Undo every change made since the savepoint.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn
            .exec_raw(&format!("ROLLBACK TO SAVEPOINT {}", self.name))
    }
}

impl Deref for Savepoint<'_> {
    type Target = Connection;

    #[inline]
    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self
                .conn
                .exec_raw(&format!("ROLLBACK TO SAVEPOINT {}", self.name))
            {
                tracing::error!("rollback during savepoint unwind failed: {err}");
            }
        }
    }
}

impl Connection {
    /// Begin an explicit transaction with the given behavior.
    pub fn begin_transaction(&self, behavior: TransactionBehavior) -> Result<Transaction<'_>> {
        Transaction::begin(self, behavior.begin_sql())
    }

    /// Begin a named savepoint.
    pub fn savepoint(&self, name: &str) -> Result<Savepoint<'_>> {
        Savepoint::begin(self, name)
    }

    fn run_transaction<T>(
        &self,
        begin_sql: &str,
        body: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let tx = Transaction::begin(self, begin_sql)?;
        // An error drops the guard, which rolls back and keeps the body's
        // error as the one the caller sees.
        let value = body(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `body` inside a transaction: commit on success, roll back and
    /// re-propagate on error.
    pub fn transaction<T>(&self, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.run_transaction("BEGIN TRANSACTION", body)
    }

    /// [`transaction`](Connection::transaction) with `BEGIN DEFERRED`.
    pub fn read_transaction<T>(&self, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.run_transaction(TransactionBehavior::Deferred.begin_sql(), body)
    }

    /// [`transaction`](Connection::transaction) with `BEGIN IMMEDIATE`.
    pub fn write_transaction<T>(&self, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.run_transaction(TransactionBehavior::Immediate.begin_sql(), body)
    }

    /// [`transaction`](Connection::transaction) with `BEGIN EXCLUSIVE`.
    pub fn exclusive_transaction<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        self.run_transaction(TransactionBehavior::Exclusive.begin_sql(), body)
    }

    /// Run `body` inside a named savepoint: release on success, roll back to
    /// the savepoint and re-propagate on error. Names are opaque identifiers
    /// chosen by the caller.
    pub fn with_savepoint<T>(
        &self,
        name: &str,
        body: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let sp = Savepoint::begin(self, name)?;
        let value = body(self)?;
        sp.release()?;
        Ok(value)
    }
}
