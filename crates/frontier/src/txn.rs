// Frontier is an embedded crawl frontier for web crawlers.
// Copyright (C) 2024 Stract ApS
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>

//! Transaction management over the embedded store.
//!
//! The store serializes writers and gives readers a consistent snapshot.
//! A failed write is not treated as a user error right away: the pending
//! closure is re-run exactly once (the store grows its backing as needed
//! between attempts), and only a repeated storage failure is surfaced.

use std::path::Path;

use anyhow::Context;
use redb::Durability;

use crate::{Error, Result};

const DATA_FILE: &str = "data.redb";

pub struct TxnManager {
    db: redb::Database,
    durability: Durability,
}

impl TxnManager {
    /// Open (or create) the store inside `dir`.
    ///
    /// `Durability::Eventual` matches the async-flush stance of the engine:
    /// commits are immediately visible and eventually synced. Throwaway
    /// databases use `Durability::None`.
    pub fn open<P: AsRef<Path>>(dir: P, durability: Durability) -> Result<Self> {
        if !dir.as_ref().exists() {
            std::fs::create_dir_all(dir.as_ref())
                .map_err(|e| Error::InvalidPath(format!("{}: {e}", dir.as_ref().display())))?;
        }

        let db = redb::Database::create(dir.as_ref().join(DATA_FILE))?;

        Ok(Self { db, durability })
    }

    pub fn read(&self) -> Result<redb::ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    /// Run `f` inside a write transaction and commit. On a storage-level
    /// failure the transaction is aborted and `f` re-run once; the second
    /// failure is surfaced as [`Error::StoreFull`]. `f` must therefore be
    /// safe to re-run from scratch.
    pub fn with_write<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&redb::WriteTransaction) -> Result<T>,
    {
        match self.try_write(&mut f) {
            Ok(value) => Ok(value),
            Err(err) if is_store_error(&err) => {
                tracing::debug!("write transaction failed, retrying once: {err:#}");
                self.try_write(&mut f)
                    .map_err(|err| err.context(Error::StoreFull))
            }
            Err(err) => Err(err),
        }
    }

    fn try_write<T, F>(&self, f: &mut F) -> Result<T>
    where
        F: FnMut(&redb::WriteTransaction) -> Result<T>,
    {
        let mut txn = self.db.begin_write().context("beginning write transaction")?;
        txn.set_durability(self.durability);

        let value = f(&txn)?;
        txn.commit().context("committing write transaction")?;

        Ok(value)
    }
}

fn is_store_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<redb::StorageError>().is_some()
            || cause.downcast_ref::<redb::CommitError>().is_some()
            || cause.downcast_ref::<redb::TransactionError>().is_some()
            || cause.downcast_ref::<redb::TableError>().is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::ReadableTable;

    const TABLE: redb::TableDefinition<'static, u64, u64> = redb::TableDefinition::new("test");

    #[test]
    fn write_then_read() {
        let dir = crate::gen_temp_path();
        let txn = TxnManager::open(&dir, Durability::None).unwrap();

        txn.with_write(|t| {
            let mut table = t.open_table(TABLE)?;
            table.insert(1, 10)?;
            Ok(())
        })
        .unwrap();

        let read = txn.read().unwrap();
        let table = read.open_table(TABLE).unwrap();
        assert_eq!(table.get(1).unwrap().unwrap().value(), 10);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn semantic_errors_are_not_retried() {
        let dir = crate::gen_temp_path();
        let txn = TxnManager::open(&dir, Durability::None).unwrap();

        let mut attempts = 0;
        let res: Result<()> = txn.with_write(|_| {
            attempts += 1;
            Err(Error::NoPage.into())
        });

        assert!(res.is_err());
        assert_eq!(attempts, 1);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
