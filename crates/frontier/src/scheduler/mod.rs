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

//! Crawl schedulers.
//!
//! A schedule is an ordered, persistent set of `(score, hash)` keys acting
//! as a priority queue: popping the smallest key yields the next page to
//! crawl. Scores change as the page database evolves, and putting the hash
//! inside the key makes rewriting a page's position a cheap
//! delete-then-insert of `(old score, hash) -> (new score, hash)`.

use std::ffi::OsString;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use anyhow::bail;

use crate::Result;

pub mod best_first;
pub mod frequency;

pub use best_first::BfScheduler;
pub use frequency::{FreqScheduler, PageFreq};

/// Compound schedule key, ordered by ascending score and then ascending
/// hash. NaN scores are rejected before they reach the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleKey {
    pub score: f32,
    pub hash: u64,
}

impl ScheduleKey {
    const BYTES: usize = 12;

    pub fn new(score: f32, hash: u64) -> Result<Self> {
        if score.is_nan() {
            bail!("schedule keys cannot carry a NaN score");
        }
        Ok(Self { score, hash })
    }

    fn encode(&self) -> [u8; Self::BYTES] {
        let mut out = [0; Self::BYTES];
        out[..4].copy_from_slice(&self.score.to_le_bytes());
        out[4..].copy_from_slice(&self.hash.to_le_bytes());
        out
    }

    fn decode(data: &[u8]) -> Self {
        let score = f32::from_le_bytes(data[..4].try_into().unwrap());
        let hash = u64::from_le_bytes(data[4..12].try_into().unwrap());
        Self { score, hash }
    }
}

impl redb::Value for ScheduleKey {
    type SelfType<'a> = ScheduleKey
    where
        Self: 'a;

    type AsBytes<'a> = [u8; Self::BYTES]
    where
        Self: 'a;

    fn fixed_width() -> Option<usize> {
        Some(Self::BYTES)
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        Self::decode(data)
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'a,
        Self: 'b,
    {
        value.encode()
    }

    fn type_name() -> redb::TypeName {
        redb::TypeName::new("frontier::ScheduleKey")
    }
}

impl redb::Key for ScheduleKey {
    fn compare(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        let a = Self::decode(a);
        let b = Self::decode(b);

        a.score
            .total_cmp(&b.score)
            .then_with(|| a.hash.cmp(&b.hash))
    }
}

/// Full schedule scan, smallest key first.
pub(crate) fn full_range() -> (Bound<ScheduleKey>, Bound<ScheduleKey>) {
    (Bound::Unbounded, Bound::Unbounded)
}

/// Everything strictly after `key`.
pub(crate) fn after_key(key: ScheduleKey) -> (Bound<ScheduleKey>, Bound<ScheduleKey>) {
    (Bound::Excluded(key), Bound::Unbounded)
}

/// Schedulers keep their state next to the page database: the directory
/// path is the database path with a suffix appended.
pub(crate) fn sibling_path(base: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push("_");
    path.push(suffix);
    PathBuf::from(path)
}
