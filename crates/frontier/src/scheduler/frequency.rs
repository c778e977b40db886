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

//! Frequency scheduler.
//!
//! Re-crawls known pages at per-page target rates. The schedule key is a
//! cumulative due-time that starts at 0 and moves forward by `1 / freq`
//! every time the page is dispatched, so over a long run each page is
//! crawled at its configured frequency and pages interleave in
//! earliest-deadline order.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use file_store::{ConstSerializable, MmapArray};
use redb::{ReadableTable, TableDefinition};

use super::{sibling_path, ScheduleKey};
use crate::config::FreqSchedulerConfig;
use crate::page_db::{CrawledPage, HashInfoStream, PageDb};
use crate::txn::TxnManager;
use crate::Result;

const SCHEDULE_TABLE: TableDefinition<'static, ScheduleKey, f32> =
    TableDefinition::new("schedule");

/// A page hash and its target crawl frequency, the unit of bulk seeding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFreq {
    pub hash: u64,
    pub freq: f32,
}

impl ConstSerializable for PageFreq {
    const BYTES: usize = 12;

    fn serialize(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.hash.to_le_bytes());
        buf[8..12].copy_from_slice(&self.freq.to_le_bytes());
    }

    fn deserialize(buf: &[u8]) -> Self {
        Self {
            hash: u64::from_le_bytes(buf[..8].try_into().unwrap()),
            freq: f32::from_le_bytes(buf[8..12].try_into().unwrap()),
        }
    }
}

/// Estimate target frequencies from observed change history: every page
/// with at least two crawls gets its measured change rate.
pub fn estimate_page_freqs<P: AsRef<std::path::Path>>(
    db: &PageDb,
    path: P,
) -> Result<MmapArray<PageFreq>> {
    let mut freqs = Vec::new();

    let mut stream = HashInfoStream::new(db)?;
    while let Some((hash, page_info)) = stream.next()? {
        if page_info.n_crawls < 2 {
            continue;
        }
        if let Some(rate) = page_info.change_rate() {
            freqs.push(PageFreq { hash, freq: rate });
        }
    }

    file_store::mmap_array::from_iter(path, freqs)
}

pub struct FreqScheduler {
    page_db: Arc<PageDb>,
    txn: TxnManager,
    path: PathBuf,
    persist: AtomicBool,
    config: FreqSchedulerConfig,
}

impl FreqScheduler {
    /// Attach a frequency schedule to `page_db`. As with the best-first
    /// scheduler, the database is owned by the caller.
    pub fn new(page_db: Arc<PageDb>) -> Result<Self> {
        Self::with_config(page_db, FreqSchedulerConfig::default())
    }

    pub fn with_config(page_db: Arc<PageDb>, config: FreqSchedulerConfig) -> Result<Self> {
        let path = sibling_path(page_db.path(), "freqs");
        let durability = if config.persist {
            redb::Durability::Eventual
        } else {
            redb::Durability::None
        };

        let txn = TxnManager::open(&path, durability)?;
        txn.with_write(|t| {
            t.open_table(SCHEDULE_TABLE)?;
            Ok(())
        })?;

        Ok(Self {
            page_db,
            txn,
            path,
            persist: AtomicBool::new(config.persist),
            config,
        })
    }

    pub fn set_persist(&self, persist: bool) {
        self.persist.store(persist, Ordering::Relaxed);
    }

    /// Seed the schedule from the crawl history: every crawled,
    /// non-seed page below the crawl cap enters with frequency
    /// `freq_scale * change_rate`, or `freq_default` when no rate can be
    /// estimated. Non-positive frequencies are skipped.
    pub fn load_simple(&self, freq_default: f32, freq_scale: f32) -> Result<()> {
        self.txn.with_write(|txn| {
            let mut schedule = txn.open_table(SCHEDULE_TABLE)?;

            let mut stream = HashInfoStream::new(&self.page_db)?;
            while let Some((hash, page_info)) = stream.next()? {
                if page_info.n_crawls == 0 || page_info.is_seed() {
                    continue;
                }
                if self.config.max_n_crawls != 0 && page_info.n_crawls >= self.config.max_n_crawls
                {
                    continue;
                }

                let mut freq = freq_default;
                if freq_scale > 0.0 {
                    if let Some(rate) = page_info.change_rate() {
                        if rate > 0.0 {
                            freq = freq_scale * rate;
                        }
                    }
                }

                if freq > 0.0 {
                    schedule.insert(ScheduleKey::new(0.0, hash)?, freq)?;
                }
            }
            Ok(())
        })
    }

    /// Bulk-seed the schedule: each page enters at due-time `1 / freq`.
    pub fn load(&self, freqs: &MmapArray<PageFreq>) -> Result<()> {
        self.txn.with_write(|txn| {
            let mut schedule = txn.open_table(SCHEDULE_TABLE)?;

            for i in 0..freqs.len() {
                let page_freq = freqs.get(i)?;
                if page_freq.freq > 0.0 {
                    schedule.insert(
                        ScheduleKey::new(1.0 / page_freq.freq, page_freq.hash)?,
                        page_freq.freq,
                    )?;
                }
            }
            Ok(())
        })
    }

    /// Pop up to `n` due pages. With a non-negative margin the batch is
    /// cut short as soon as the head of the queue is not due yet, since
    /// every later entry is even further from its deadline. Dispatched
    /// pages re-enter the queue at `due-time + 1 / freq`.
    pub fn request(&self, n: usize) -> Result<Vec<String>> {
        self.txn.with_write(|txn| {
            let mut schedule = txn.open_table(SCHEDULE_TABLE)?;
            let mut urls = Vec::new();

            while urls.len() < n {
                let head = {
                    let mut range = schedule.range(super::full_range())?;
                    match range.next() {
                        Some(row) => {
                            let (k, v) = row?;
                            Some((k.value(), v.value()))
                        }
                        None => None,
                    }
                };
                let Some((key, freq)) = head else {
                    break;
                };

                let Some(page_info) = self.page_db.get_info(key.hash)? else {
                    schedule.remove(key)?;
                    continue;
                };

                if self.config.margin >= 0.0 {
                    let elapsed = crate::now_secs() - page_info.last_crawl;
                    if elapsed < 1.0 / (f64::from(freq) * (1.0 + f64::from(self.config.margin))) {
                        break;
                    }
                }

                let crawl = self.config.max_n_crawls == 0
                    || page_info.n_crawls < self.config.max_n_crawls;

                schedule.remove(key)?;
                if crawl {
                    urls.push(page_info.url);
                    schedule.insert(ScheduleKey::new(key.score + 1.0 / freq, key.hash)?, freq)?;
                }
            }

            Ok(urls)
        })
    }

    /// Store a crawled page. The schedule is not touched: re-crawl
    /// cadence is fixed by the seeding step.
    pub fn add(&self, page: &CrawledPage) -> Result<()> {
        self.page_db.add(page, false)?;
        Ok(())
    }

    /// Print the schedule, one `due-time hash freq url` line per entry.
    pub fn dump<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let txn = self.txn.read()?;
        let table = txn.open_table(SCHEDULE_TABLE)?;

        for row in table.iter()? {
            let (k, v) = row?;
            let key = k.value();
            let url = self
                .page_db
                .get_info(key.hash)?
                .map(|page_info| page_info.url)
                .unwrap_or_else(|| "UNKNOWN".to_string());

            writeln!(out, "{:.6} {:016x} {:.6} {}", key.score, key.hash, v.value(), url)?;
        }

        Ok(())
    }
}

impl Drop for FreqScheduler {
    fn drop(&mut self) {
        if !self.persist.load(Ordering::Relaxed) {
            if let Err(err) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!("failed to remove schedule files: {err}");
            }
        }
    }
}
