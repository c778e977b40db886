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

//! Best-first scheduler.
//!
//! Greedy frontier: an ordered schedule of uncrawled pages keyed by
//! `(-score, hash)`, so the smallest key is the most valuable page. Pages
//! enter the schedule when first sighted as links; a background thread
//! re-scores them with an attached [`Scorer`] as the link graph grows.
//!
//! Schedule updates happen in small batches, each inside its own short
//! write transaction. Writers are serialized, and adding pages or serving
//! requests also needs a write transaction; long update transactions would
//! stall those more critical operations.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;

use redb::{ReadableTable, TableDefinition};

use super::{sibling_path, ScheduleKey};
use crate::config::BfSchedulerConfig;
use crate::page_db::{CrawledPage, HashIdxStream, HashInfoStream, PageDb};
use crate::scorer::Scorer;
use crate::txn::TxnManager;
use crate::{urls, Error, Result};

const SCHEDULE_TABLE: TableDefinition<'static, ScheduleKey, ()> =
    TableDefinition::new("schedule");

/// Scorers are owned by their creator; the scheduler and its update
/// thread only share them.
pub type SharedScorer = Arc<RwLock<Box<dyn Scorer>>>;

/// Update-thread lifecycle. Once finished, the thread only comes back
/// with a new scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Working,
    Stopped,
    Finished,
}

struct PageCounter {
    /// Page count at the time of the last finished update.
    n_old: u64,
    /// Current page count.
    n_new: u64,
}

struct UpdateShared {
    pages: Mutex<PageCounter>,
    new_pages: Condvar,
    state: Mutex<UpdateState>,
}

impl UpdateShared {
    fn stop_requested(&self) -> bool {
        *self.state.lock().unwrap() != UpdateState::Working
    }
}

struct UpdateThread {
    shared: Arc<UpdateShared>,
    handle: Option<JoinHandle<()>>,
}

pub struct BfScheduler {
    page_db: Arc<PageDb>,
    scorer: Option<SharedScorer>,
    txn: Arc<TxnManager>,
    path: PathBuf,
    persist: AtomicBool,
    config: BfSchedulerConfig,
    /// Consecutive soft-limited batches per domain.
    soft_skips: Mutex<HashMap<u32, u32>>,
    update: Mutex<Option<UpdateThread>>,
}

impl BfScheduler {
    /// Attach a best-first schedule to `page_db`. The schedule lives in its
    /// own store next to the database; the database itself is neither
    /// created nor destroyed by the scheduler, so schedulers can be swapped
    /// while keeping the same database.
    pub fn new(page_db: Arc<PageDb>) -> Result<Self> {
        Self::with_config(page_db, BfSchedulerConfig::default())
    }

    pub fn with_config(page_db: Arc<PageDb>, config: BfSchedulerConfig) -> Result<Self> {
        let path = sibling_path(page_db.path(), "bfs");
        let durability = if config.persist {
            redb::Durability::Eventual
        } else {
            redb::Durability::None
        };

        let txn = Arc::new(TxnManager::open(&path, durability)?);
        txn.with_write(|t| {
            t.open_table(SCHEDULE_TABLE)?;
            Ok(())
        })?;

        Ok(Self {
            page_db,
            scorer: None,
            txn,
            path,
            persist: AtomicBool::new(config.persist),
            config,
            soft_skips: Mutex::new(HashMap::new()),
            update: Mutex::new(None),
        })
    }

    /// Attach a scorer. Without one, schedule entries keep the content
    /// score reported at crawl time.
    pub fn set_scorer(&mut self, scorer: SharedScorer) {
        self.scorer = Some(scorer);
    }

    pub fn set_persist(&self, persist: bool) {
        self.persist.store(persist, Ordering::Relaxed);
    }

    /// Store a crawled page and schedule its newly discovered links.
    /// Pages seen before are not re-inserted; their schedule entries (if
    /// any) are already in place.
    pub fn add(&self, page: &CrawledPage) -> Result<()> {
        let delta = self.page_db.add(page, true)?;

        self.txn.with_write(|txn| {
            let mut schedule = txn.open_table(SCHEDULE_TABLE)?;

            for (hash, page_info) in &delta {
                if page_info.n_crawls != 0 {
                    continue;
                }

                let score = match &self.scorer {
                    // during a scorer update, fall back to the baseline
                    Some(scorer) => match scorer.try_read() {
                        Ok(scorer) => scorer.add(page_info),
                        Err(_) => 0.0,
                    },
                    None => page_info.score,
                };

                schedule.insert(ScheduleKey::new(-score, *hash)?, ())?;
            }
            Ok(())
        })?;

        let new_pages = delta
            .iter()
            .filter(|(_, page_info)| page_info.n_crawls == 0)
            .count() as u64;

        if let Some(update) = &*self.update.lock().unwrap() {
            let mut pages = update.shared.pages.lock().unwrap();
            pages.n_new += new_pages;
            update.shared.new_pages.notify_all();
        }

        Ok(())
    }

    /// Pop up to `n` uncrawled URLs in best-first order. Entries whose
    /// page has been crawled in the meantime are discarded lazily, and
    /// domain crawl rates are enforced against the soft and hard limits.
    pub fn request(&self, n: usize) -> Result<Vec<String>> {
        self.txn.with_write(|txn| {
            let mut schedule = txn.open_table(SCHEDULE_TABLE)?;
            let mut urls = Vec::new();
            let mut cursor: Option<ScheduleKey> = None;
            let mut throttled_this_batch: HashSet<u32> = HashSet::new();

            while urls.len() < n {
                let head = {
                    let mut range = match cursor {
                        None => schedule.range(super::full_range())?,
                        Some(key) => schedule.range(super::after_key(key))?,
                    };
                    match range.next() {
                        Some(row) => Some(row?.0.value()),
                        None => None,
                    }
                };
                let Some(key) = head else {
                    break;
                };

                let page_info = self
                    .page_db
                    .get_info(key.hash)?
                    .filter(|page_info| page_info.n_crawls == 0);
                let Some(page_info) = page_info else {
                    // already crawled or unknown
                    schedule.remove(key)?;
                    continue;
                };

                let domain = urls::domain_hash(key.hash);
                let rate = self.page_db.domain_crawl_rate(domain);

                if rate >= self.config.max_hard_domain_crawl_rate {
                    schedule.remove(key)?;
                    continue;
                }

                if rate >= self.config.max_soft_domain_crawl_rate {
                    let mut skips = self.soft_skips.lock().unwrap();
                    let count = skips.entry(domain).or_insert(0);
                    if throttled_this_batch.insert(domain) {
                        *count += 1;
                    }

                    if *count >= self.config.crawl_rate_steps {
                        skips.remove(&domain);
                        schedule.remove(key)?;
                    } else {
                        cursor = Some(key);
                    }
                    continue;
                }
                self.soft_skips.lock().unwrap().remove(&domain);

                schedule.remove(key)?;
                self.page_db.heat_domain(domain);
                urls.push(page_info.url);
            }

            Ok(urls)
        })
    }

    /// Rebuild the schedule from scratch out of every uncrawled page in
    /// the database.
    pub fn reload(&self) -> Result<()> {
        self.txn.with_write(|txn| {
            txn.delete_table(SCHEDULE_TABLE)?;
            let mut schedule = txn.open_table(SCHEDULE_TABLE)?;

            let mut stream = HashInfoStream::new(&self.page_db)?;
            while let Some((hash, page_info)) = stream.next()? {
                if page_info.n_crawls == 0 {
                    schedule.insert(ScheduleKey::new(-page_info.score, hash)?, ())?;
                }
            }
            Ok(())
        })
    }

    /// Launch the background update thread. A no-op without a scorer, or
    /// when the thread already runs; a stopped thread resumes.
    pub fn update_start(&self) -> Result<()> {
        let mut update = self.update.lock().unwrap();

        if let Some(existing) = &*update {
            let mut state = existing.shared.state.lock().unwrap();
            if *state == UpdateState::Stopped {
                *state = UpdateState::Working;
                drop(state);
                existing.shared.new_pages.notify_all();
            }
            return Ok(());
        }

        let Some(scorer) = &self.scorer else {
            tracing::debug!("no scorer attached, not starting the update thread");
            return Ok(());
        };

        let n_pages = self.page_db.n_pages()?;
        let shared = Arc::new(UpdateShared {
            pages: Mutex::new(PageCounter {
                n_old: n_pages,
                n_new: n_pages,
            }),
            new_pages: Condvar::new(),
            state: Mutex::new(UpdateState::Working),
        });

        let worker = UpdateWorker {
            page_db: Arc::clone(&self.page_db),
            scorer: Arc::clone(scorer),
            txn: Arc::clone(&self.txn),
            shared: Arc::clone(&shared),
            config: self.config.clone(),
        };

        let handle = std::thread::Builder::new()
            .name("bf-schedule-update".to_string())
            .spawn(move || worker.run())
            .map_err(|_| Error::Thread)?;

        *update = Some(UpdateThread {
            shared,
            handle: Some(handle),
        });

        Ok(())
    }

    /// Ask the update thread to stop. It finishes its current batch first.
    pub fn update_stop(&self) {
        if let Some(update) = &*self.update.lock().unwrap() {
            let mut state = update.shared.state.lock().unwrap();
            if *state == UpdateState::Working {
                *state = UpdateState::Stopped;
            }
            drop(state);
            update.shared.new_pages.notify_all();
        }
    }

    /// Current state of the update thread, if it was ever started.
    pub fn update_state(&self) -> Option<UpdateState> {
        self.update
            .lock()
            .unwrap()
            .as_ref()
            .map(|update| *update.shared.state.lock().unwrap())
    }
}

impl Drop for BfScheduler {
    fn drop(&mut self) {
        self.update_stop();

        if let Some(mut update) = self.update.lock().unwrap().take() {
            if let Some(handle) = update.handle.take() {
                if handle.join().is_err() {
                    tracing::warn!("schedule update thread panicked");
                }
            }
        }

        if !self.persist.load(Ordering::Relaxed) {
            if let Err(err) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!("failed to remove schedule files: {err}");
            }
        }
    }
}

const MAX_CONSECUTIVE_FAILURES: u32 = 3;

struct UpdateWorker {
    page_db: Arc<PageDb>,
    scorer: SharedScorer,
    txn: Arc<TxnManager>,
    shared: Arc<UpdateShared>,
    config: BfSchedulerConfig,
}

impl UpdateWorker {
    fn run(self) {
        let mut failures = 0;

        loop {
            if self.wait_for_new_pages() {
                break;
            }

            match self.scorer.write().unwrap().update() {
                Ok(()) => {}
                Err(err) if matches!(err.downcast_ref::<Error>(), Some(Error::Precision)) => {
                    tracing::warn!("scorer stopped before reaching precision: {err:#}");
                }
                Err(err) => {
                    tracing::error!("scorer update failed: {err:#}");
                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        break;
                    }
                    self.consume_trigger();
                    continue;
                }
            }

            if let Err(err) = self.rewrite_schedule() {
                tracing::error!("schedule rewrite failed: {err:#}");
                failures += 1;
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    break;
                }
            } else {
                failures = 0;
            }

            self.consume_trigger();
        }

        *self.shared.state.lock().unwrap() = UpdateState::Finished;
    }

    /// Block until enough new pages arrived or a stop was requested.
    /// Returns true when asked to stop.
    fn wait_for_new_pages(&self) -> bool {
        let mut pages = self.shared.pages.lock().unwrap();

        loop {
            if self.shared.stop_requested() {
                return true;
            }

            let threshold = (self.config.pages_threshold as f64)
                .max(self.config.fraction * pages.n_old as f64);
            if pages.n_new.saturating_sub(pages.n_old) as f64 >= threshold {
                return false;
            }

            pages = self.shared.new_pages.wait(pages).unwrap();
        }
    }

    fn consume_trigger(&self) {
        let mut pages = self.shared.pages.lock().unwrap();
        pages.n_old = pages.n_new;
    }

    /// Walk every page in batches and move the schedule entry of each
    /// uncrawled page from its old score to its new one. Each batch runs
    /// in its own short write transaction so the thread never monopolizes
    /// the writer.
    fn rewrite_schedule(&self) -> Result<()> {
        let mut stream = HashIdxStream::new(&self.page_db)?;
        let scorer = self.scorer.read().unwrap();

        loop {
            if self.shared.stop_requested() {
                return Ok(());
            }

            let mut batch = Vec::with_capacity(self.config.update_batch_size);
            while batch.len() < self.config.update_batch_size {
                match stream.next()? {
                    Some(pair) => batch.push(pair),
                    None => break,
                }
            }
            if batch.is_empty() {
                return Ok(());
            }

            self.txn.with_write(|txn| {
                let mut schedule = txn.open_table(SCHEDULE_TABLE)?;

                for &(hash, idx) in &batch {
                    let uncrawled = self
                        .page_db
                        .get_info(hash)?
                        .map_or(false, |page_info| page_info.n_crawls == 0);
                    if !uncrawled {
                        continue;
                    }

                    let (old, new) = match scorer.get(idx) {
                        Ok(scores) => scores,
                        Err(_) => continue,
                    };

                    if old != new {
                        schedule.remove(ScheduleKey::new(-old, hash)?)?;
                        schedule.insert(ScheduleKey::new(-new, hash)?, ())?;
                    }
                }
                Ok(())
            })?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PageDbConfig, PageRankConfig};
    use crate::scorer::PageRankScorer;

    fn open_temp_db() -> Arc<PageDb> {
        let config = PageDbConfig {
            persist: false,
            ..Default::default()
        };
        Arc::new(PageDb::with_config(crate::gen_temp_path(), config).unwrap())
    }

    fn transient_scheduler(page_db: Arc<PageDb>) -> BfScheduler {
        let config = BfSchedulerConfig {
            persist: false,
            ..Default::default()
        };
        BfScheduler::with_config(page_db, config).unwrap()
    }

    /// The crawl from the link structure:
    ///
    ///      0.0    1.0    0.1    0.5    0.4
    ///   1 ---> 2 ---->4----->5------>8----->9
    ///   |             |      |       |
    ///   |      +------+   +--+--+    |0.2
    ///   |      | 0.2   0.0|  0.5|    |
    ///   | 0.1  v          v     v    |
    ///   +----> 3          6     7<---+
    fn crawl_test_graph(sch: &BfScheduler) {
        let mut cp = CrawledPage::new("1");
        cp.add_link("2", 0.0);
        cp.add_link("3", 0.1);
        sch.add(&cp).unwrap();

        let mut cp = CrawledPage::new("2");
        cp.add_link("4", 1.0);
        sch.add(&cp).unwrap();

        let mut cp = CrawledPage::new("4");
        cp.add_link("3", 0.2);
        cp.add_link("5", 0.1);
        sch.add(&cp).unwrap();

        let mut cp = CrawledPage::new("5");
        cp.add_link("6", 0.0);
        cp.add_link("7", 0.5);
        cp.add_link("8", 0.5);
        sch.add(&cp).unwrap();

        let mut cp = CrawledPage::new("8");
        cp.add_link("7", 0.2);
        cp.add_link("9", 0.4);
        sch.add(&cp).unwrap();

        let cp = CrawledPage::new("7");
        sch.add(&cp).unwrap();
    }

    #[test]
    fn requests_come_back_in_score_order() {
        let db = open_temp_db();
        let sch = transient_scheduler(Arc::clone(&db));

        crawl_test_graph(&sch);

        // uncrawled by score: 9 (0.4), 3 (0.1), 6 (0.0)
        assert_eq!(sch.request(2).unwrap(), vec!["9", "3"]);
        assert_eq!(sch.request(4).unwrap(), vec!["6"]);
        assert!(sch.request(4).unwrap().is_empty());
    }

    #[test]
    fn restart_resumes_where_the_schedule_left_off() {
        let db_path = crate::gen_temp_path();

        {
            let db = Arc::new(PageDb::open(&db_path).unwrap());
            let sch = BfScheduler::new(Arc::clone(&db)).unwrap();

            let mut cp = CrawledPage::new("http://www.foobar.com/spam");
            for i in 0..100 {
                cp.add_link(format!("http://www.foobar.com/page_{i}"), i as f32 / 100.0);
            }
            sch.add(&cp).unwrap();

            let urls = sch.request(25).unwrap();
            for (i, url) in urls.iter().enumerate() {
                assert_eq!(url, &format!("http://www.foobar.com/page_{}", 99 - i));
            }
        }

        // reopen both stores from disk
        let db = Arc::new(PageDb::open(&db_path).unwrap());
        let sch = BfScheduler::new(Arc::clone(&db)).unwrap();

        let urls = sch.request(25).unwrap();
        assert_eq!(urls.len(), 25);
        for (i, url) in urls.iter().enumerate() {
            assert_eq!(url, &format!("http://www.foobar.com/page_{}", 74 - i));
        }

        db.set_persist(false);
        sch.set_persist(false);
    }

    #[test]
    fn hard_rate_limit_drops_hot_domains() {
        let db = open_temp_db();
        db.set_domain_temp(10, 100.0);

        let config = BfSchedulerConfig {
            persist: false,
            max_soft_domain_crawl_rate: 0.005,
            max_hard_domain_crawl_rate: 0.005,
            ..Default::default()
        };
        let sch = BfScheduler::with_config(Arc::clone(&db), config).unwrap();

        let mut cp = CrawledPage::new("http://hot.com/");
        cp.add_link("http://hot.com/a", 0.0);
        cp.add_link("http://hot.com/b", 0.0);
        cp.add_link("http://hot.com/c", 0.0);
        cp.add_link("http://cold.com/x", 0.0);
        sch.add(&cp).unwrap();

        // the first hot.com page heats the domain past the hard limit, the
        // rest of its entries are dropped; cold.com is unaffected
        let urls = sch.request(4).unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().any(|u| u.starts_with("http://cold.com")));

        assert!(sch.request(4).unwrap().is_empty());
    }

    #[test]
    fn soft_rate_limit_skips_then_drops() {
        let db = open_temp_db();
        db.set_domain_temp(10, 1000.0);

        let config = BfSchedulerConfig {
            persist: false,
            max_soft_domain_crawl_rate: 0.0005,
            max_hard_domain_crawl_rate: f32::INFINITY,
            crawl_rate_steps: 2,
            ..Default::default()
        };
        let sch = BfScheduler::with_config(Arc::clone(&db), config).unwrap();

        let mut cp = CrawledPage::new("http://warm.com/");
        cp.add_link("http://warm.com/a", 0.9);
        cp.add_link("http://warm.com/b", 0.1);
        sch.add(&cp).unwrap();

        // first batch: one dispatch heats the domain past the soft limit,
        // the second entry stays scheduled
        assert_eq!(sch.request(2).unwrap(), vec!["http://warm.com/a"]);

        // second throttled batch reaches the step budget, the entry drops
        assert!(sch.request(2).unwrap().is_empty());

        // even with a cold domain table the entry is gone
        db.set_domain_temp(10, 1000.0);
        assert!(sch.request(2).unwrap().is_empty());
    }

    #[test]
    fn reload_rebuilds_the_schedule_from_the_database() {
        let db = open_temp_db();
        let sch = transient_scheduler(Arc::clone(&db));

        crawl_test_graph(&sch);
        assert_eq!(sch.request(2).unwrap(), vec!["9", "3"]);

        // "9" and "3" are gone from the schedule but still uncrawled, so a
        // reload brings them back
        sch.reload().unwrap();
        assert_eq!(sch.request(3).unwrap(), vec!["9", "3", "6"]);
    }

    #[test]
    fn update_thread_lifecycle() {
        let db = open_temp_db();

        let config = BfSchedulerConfig {
            persist: false,
            pages_threshold: 1,
            fraction: 0.0,
            ..Default::default()
        };
        let mut sch = BfScheduler::with_config(Arc::clone(&db), config).unwrap();

        let scorer =
            PageRankScorer::new(Arc::clone(&db), &PageRankConfig::default()).unwrap();
        let scorer: Box<dyn Scorer> = Box::new(scorer);
        let scorer: SharedScorer = Arc::new(RwLock::new(scorer));
        sch.set_scorer(Arc::clone(&scorer));

        assert_eq!(sch.update_state(), None);
        sch.update_start().unwrap();
        assert_eq!(sch.update_state(), Some(UpdateState::Working));

        for i in 0..20 {
            let mut cp = CrawledPage::new(format!("page_{i}"));
            cp.add_link(format!("page_{}", i + 1), 0.5);
            cp.add_link(format!("page_{}", i + 2), 0.5);
            sch.add(&cp).unwrap();

            if i % 5 == 0 {
                sch.request(3).unwrap();
            }
        }

        sch.update_stop();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            match sch.update_state() {
                Some(UpdateState::Finished) => break,
                _ if std::time::Instant::now() > deadline => {
                    panic!("update thread did not finish in time")
                }
                _ => std::thread::sleep(std::time::Duration::from_millis(10)),
            }
        }

        // the scheduler still works after the thread wound down
        sch.request(3).unwrap();
    }
}
