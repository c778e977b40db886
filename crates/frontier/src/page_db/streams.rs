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

//! Forward streams over the page database tables.
//!
//! Every stream pins a read snapshot for its whole lifetime, so writers
//! are never blocked and the stream sees a consistent view. Rows are
//! fetched by stepping an ordered cursor, one key at a time.

use std::ops::Bound;

use file_store::MmapArray;
use redb::ReadableTable;

use super::{decode_adjacency_row, PageDb, PageInfo};
use super::{HASH2IDX_TABLE, HASH2INFO_TABLE, LINKS_TABLE};
use crate::link_stream::{Link, LinkStream};
use crate::{urls, Result};

fn after(cursor: Option<u64>) -> (Bound<u64>, Bound<u64>) {
    match cursor {
        None => (Bound::Unbounded, Bound::Unbounded),
        Some(last) => (Bound::Excluded(last), Bound::Unbounded),
    }
}

/// Streams `(from, to)` page-id pairs by scanning the adjacency rows.
///
/// In `only_different_domains` mode, links whose endpoints share a domain
/// hash are skipped; the domains come from the high 32 bits of the stored
/// page hashes, materialized as a dense id-to-hash vector when the stream
/// is created.
pub struct PageDbLinkStream {
    table: redb::ReadOnlyTable<u64, &'static [u8]>,
    idx2hash: Option<MmapArray<u64>>,
    cursor: Option<u64>,
    from: u64,
    to: Vec<u64>,
    i_to: usize,
}

impl PageDbLinkStream {
    /// Stream every link.
    pub fn new(db: &PageDb) -> Result<Self> {
        Self::with_mode(db, false)
    }

    pub fn with_mode(db: &PageDb, only_different_domains: bool) -> Result<Self> {
        let txn = db.txn().read()?;
        let table = txn.open_table(LINKS_TABLE)?;

        // built after the links snapshot, so it covers every id in it
        let idx2hash = if only_different_domains {
            Some(db.idx2hash()?)
        } else {
            None
        };

        Ok(Self {
            table,
            idx2hash,
            cursor: None,
            from: 0,
            to: Vec::new(),
            i_to: 0,
        })
    }

    /// Advance to the next adjacency row. Returns false at the end.
    fn advance_row(&mut self) -> Result<bool> {
        let next = {
            let mut range = self.table.range(after(self.cursor))?;
            match range.next() {
                Some(row) => {
                    let (k, v) = row?;
                    Some((k.value(), decode_adjacency_row(v.value()).collect()))
                }
                None => None,
            }
        };

        match next {
            Some((from, to)) => {
                self.cursor = Some(from);
                self.from = from;
                self.to = to;
                self.i_to = 0;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn crosses_domains(&self, from: u64, to: u64) -> Result<bool> {
        match &self.idx2hash {
            None => Ok(true),
            Some(hashes) => {
                let from_hash = hashes.get(from as usize)?;
                let to_hash = hashes.get(to as usize)?;
                Ok(urls::domain_hash(from_hash) != urls::domain_hash(to_hash))
            }
        }
    }
}

impl LinkStream for PageDbLinkStream {
    fn next_link(&mut self) -> Result<Option<Link>> {
        loop {
            if self.i_to < self.to.len() {
                let to = self.to[self.i_to];
                self.i_to += 1;

                if self.crosses_domains(self.from, to)? {
                    return Ok(Some(Link {
                        from: self.from,
                        to,
                    }));
                }
                continue;
            }

            if !self.advance_row()? {
                return Ok(None);
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = None;
        self.to.clear();
        self.i_to = 0;
        Ok(())
    }
}

/// Streams `(hash, id)` pairs in ascending hash order.
pub struct HashIdxStream {
    table: redb::ReadOnlyTable<u64, u64>,
    cursor: Option<u64>,
}

impl HashIdxStream {
    pub fn new(db: &PageDb) -> Result<Self> {
        let txn = db.txn().read()?;
        let table = txn.open_table(HASH2IDX_TABLE)?;

        Ok(Self {
            table,
            cursor: None,
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(u64, u64)>> {
        let next = {
            let mut range = self.table.range(after(self.cursor))?;
            match range.next() {
                Some(row) => {
                    let (k, v) = row?;
                    Some((k.value(), v.value()))
                }
                None => None,
            }
        };

        if let Some((hash, _)) = next {
            self.cursor = Some(hash);
        }
        Ok(next)
    }
}

/// Streams `(hash, PageInfo)` pairs in ascending hash order.
pub struct HashInfoStream {
    table: redb::ReadOnlyTable<u64, &'static [u8]>,
    cursor: Option<u64>,
}

impl HashInfoStream {
    pub fn new(db: &PageDb) -> Result<Self> {
        let txn = db.txn().read()?;
        let table = txn.open_table(HASH2INFO_TABLE)?;

        Ok(Self {
            table,
            cursor: None,
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(u64, PageInfo)>> {
        let next = {
            let mut range = self.table.range(after(self.cursor))?;
            match range.next() {
                Some(row) => {
                    let (k, v) = row?;
                    Some((k.value(), PageInfo::load(v.value())?))
                }
                None => None,
            }
        };

        if let Some((hash, _)) = &next {
            self.cursor = Some(*hash);
        }
        Ok(next)
    }
}
