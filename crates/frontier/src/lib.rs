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

//! Embedded crawl-frontier storage and scheduling.
//!
//! Crawled pages go into a content-addressed [`PageDb`] which interns URLs,
//! tracks per-page crawl history and maintains an incrementally updated link
//! graph. Link-analysis scores ([`scorer::PageRank`], [`scorer::Hits`]) are
//! computed over streamed edges with a bounded in-memory footprint, and two
//! schedulers decide what a crawler should fetch next: best-first
//! ([`scheduler::BfScheduler`]) pops the highest-scoring uncrawled URL,
//! frequency ([`scheduler::FreqScheduler`]) re-crawls known URLs at per-page
//! target rates estimated from observed change history.

use thiserror::Error;

pub mod config;
pub mod edge_stream;
pub mod link_stream;
pub mod page_db;
pub mod scheduler;
pub mod scorer;
pub mod txn;
pub mod urls;
pub mod varint;

pub use link_stream::{Link, LinkStream};
pub use page_db::{CrawledPage, PageDb, PageInfo};
pub use scheduler::{BfScheduler, FreqScheduler};
pub use scorer::Scorer;

#[derive(Error, Debug)]
pub enum Error {
    #[error("allocation failed")]
    Memory,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("page not found")]
    NoPage,

    #[error("requested precision not reached within the loop budget")]
    Precision,

    #[error("synchronization primitive failed")]
    Thread,

    #[error("store full")]
    StoreFull,
}

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Seconds since the UNIX epoch, as the page database stores crawl times.
pub(crate) fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
pub(crate) use file_store::gen_temp_path;
