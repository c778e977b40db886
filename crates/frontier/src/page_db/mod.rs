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

//! The page database.
//!
//! Four tables live inside one embedded store:
//!   - `info`: fixed scalars about the whole database, currently just the
//!     number of pages.
//!   - `hash2idx`: page hash to page id. Ids are dense consecutive
//!     integers, which lets scorers index pages into plain arrays.
//!   - `hash2info`: page hash to serialized [`PageInfo`].
//!   - `links`: page id to the packed ids of its outgoing links, the
//!     adjacency storage behind the link stream.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Context};
use file_store::MmapArray;
use redb::{ReadableTable, TableDefinition};

use crate::config::PageDbConfig;
use crate::edge_stream::EdgeStreamWriter;
use crate::link_stream::LinkStream;
use crate::txn::TxnManager;
use crate::{urls, Result};

mod domain_temp;
mod streams;

pub use domain_temp::DomainTemp;
pub use streams::{HashIdxStream, HashInfoStream, PageDbLinkStream};

pub(crate) const INFO_TABLE: TableDefinition<'static, &'static str, u64> =
    TableDefinition::new("info");
pub(crate) const HASH2IDX_TABLE: TableDefinition<'static, u64, u64> =
    TableDefinition::new("hash2idx");
pub(crate) const HASH2INFO_TABLE: TableDefinition<'static, u64, &'static [u8]> =
    TableDefinition::new("hash2info");
pub(crate) const LINKS_TABLE: TableDefinition<'static, u64, &'static [u8]> =
    TableDefinition::new("links");

const N_PAGES_KEY: &str = "n_pages";

/// An outgoing link of a crawled page. The score is an application-side
/// estimate of the link's value, typically derived from the surrounding
/// text.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub url: String,
    pub score: f32,
}

/// The information a crawler hands over for every fetched page.
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub links: Vec<LinkInfo>,
    /// Seconds since the epoch at which the page was fetched.
    pub time: f64,
    /// Content score of the page.
    pub score: f32,
    /// Arbitrary digest of the page body, used to detect content changes.
    pub content_hash: Vec<u8>,
}

impl CrawledPage {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            links: Vec::new(),
            time: crate::now_secs(),
            score: 0.0,
            content_hash: Vec::new(),
        }
    }

    pub fn add_link<S: Into<String>>(&mut self, url: S, score: f32) {
        self.links.push(LinkInfo {
            url: url.into(),
            score,
        });
    }

    pub fn set_content_hash<B: Into<Vec<u8>>>(&mut self, hash: B) {
        self.content_hash = hash.into();
    }

    pub fn set_content_hash_u32(&mut self, hash: u32) {
        self.content_hash = hash.to_ne_bytes().to_vec();
    }

    pub fn set_content_hash_u64(&mut self, hash: u64) {
        self.content_hash = hash.to_ne_bytes().to_vec();
    }

    pub fn set_content_hash_u128(&mut self, hash: u128) {
        self.content_hash = hash.to_ne_bytes().to_vec();
    }
}

/// What the database remembers about a page, crawled or merely sighted as
/// a link.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    pub url: String,
    /// First and last crawl times. Both 0 while the page is uncrawled.
    pub first_crawl: f64,
    pub last_crawl: f64,
    /// Content changes observed between the first and last crawl.
    pub n_changes: u64,
    /// Number of crawls. 0 when the page has only been seen as a link.
    pub n_crawls: u64,
    /// Content score from the last crawl, or the link score while
    /// uncrawled.
    pub score: f32,
    pub content_hash: Vec<u8>,
}

impl PageInfo {
    fn new_link(url: &str, score: f32) -> Self {
        Self {
            url: url.to_string(),
            first_crawl: 0.0,
            last_crawl: 0.0,
            n_changes: 0,
            n_crawls: 0,
            score,
            content_hash: Vec::new(),
        }
    }

    fn new_crawled(page: &CrawledPage) -> Self {
        Self {
            url: page.url.clone(),
            first_crawl: page.time,
            last_crawl: page.time,
            n_changes: 0,
            n_crawls: 1,
            score: page.score,
            content_hash: page.content_hash.clone(),
        }
    }

    /// Fold a re-crawl into the record. The content hash comparison is
    /// byte-wise over the full stored hash; a length change alone counts
    /// as a change.
    fn update(&mut self, page: &CrawledPage) {
        if self.content_hash != page.content_hash {
            self.content_hash = page.content_hash.clone();
            self.n_changes += 1;
        }
        self.n_crawls += 1;
        self.last_crawl = page.time;
        self.score = page.score;
    }

    /// Estimated change rate in changes per second, when the observation
    /// interval allows one.
    pub fn change_rate(&self) -> Option<f32> {
        let delta = self.last_crawl - self.first_crawl;
        if delta > 0.0 {
            Some(self.n_changes as f32 / delta as f32)
        } else {
            None
        }
    }

    /// Seeds are pages injected into the frontier rather than fetched:
    /// they count as crawled but never carried any content.
    pub fn is_seed(&self) -> bool {
        self.n_crawls > 0 && self.content_hash.is_empty()
    }

    /// Packed on-disk form, native endianness:
    /// `first_crawl | last_crawl | n_changes | n_crawls | score |
    /// content_hash_length | url NUL | content_hash`.
    pub fn dump(&self) -> Result<Vec<u8>> {
        if self.url.as_bytes().contains(&0) {
            bail!("page URL contains a NUL byte: {:?}", self.url);
        }

        let mut out = Vec::with_capacity(44 + self.url.len() + 1 + self.content_hash.len());
        out.extend_from_slice(&self.first_crawl.to_ne_bytes());
        out.extend_from_slice(&self.last_crawl.to_ne_bytes());
        out.extend_from_slice(&self.n_changes.to_ne_bytes());
        out.extend_from_slice(&self.n_crawls.to_ne_bytes());
        out.extend_from_slice(&self.score.to_ne_bytes());
        out.extend_from_slice(&(self.content_hash.len() as u64).to_ne_bytes());
        out.extend_from_slice(self.url.as_bytes());
        out.push(0);
        out.extend_from_slice(&self.content_hash);

        Ok(out)
    }

    pub fn load(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { data, pos: 0 };

        let first_crawl = f64::from_ne_bytes(cursor.take::<8>()?);
        let last_crawl = f64::from_ne_bytes(cursor.take::<8>()?);
        let n_changes = u64::from_ne_bytes(cursor.take::<8>()?);
        let n_crawls = u64::from_ne_bytes(cursor.take::<8>()?);
        let score = f32::from_ne_bytes(cursor.take::<4>()?);
        let content_hash_len = u64::from_ne_bytes(cursor.take::<8>()?) as usize;

        let url_bytes = cursor.take_until_nul()?;
        let url = std::str::from_utf8(url_bytes)
            .context("page URL is not valid UTF-8")?
            .to_string();
        let content_hash = cursor.take_slice(content_hash_len)?.to_vec();

        Ok(Self {
            url,
            first_crawl,
            last_crawl,
            n_changes,
            n_crawls,
            score,
            content_hash,
        })
    }
}

impl std::fmt::Display for PageInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>12.1}|{:>12.1}|{:.2e}|{:.2e}|{}",
            self.first_crawl,
            self.last_crawl,
            self.n_crawls as f64,
            self.n_changes as f64,
            self.url
        )
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take_slice(N)?;
        let mut out = [0; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            bail!("truncated page record");
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_until_nul(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .context("unterminated URL in page record")?;
        self.pos += nul + 1;
        Ok(&rest[..nul])
    }
}

pub struct PageDb {
    path: PathBuf,
    txn: TxnManager,
    domain_temp: Mutex<DomainTemp>,
    persist: AtomicBool,
}

impl PageDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_config(path, PageDbConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(path: P, config: PageDbConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let durability = if config.persist {
            redb::Durability::Eventual
        } else {
            redb::Durability::None
        };

        let txn = TxnManager::open(&path, durability)
            .with_context(|| format!("opening page database at {}", path.display()))?;

        txn.with_write(|t| {
            let mut info = t.open_table(INFO_TABLE)?;
            t.open_table(HASH2IDX_TABLE)?;
            t.open_table(HASH2INFO_TABLE)?;
            t.open_table(LINKS_TABLE)?;

            let missing = info.get(N_PAGES_KEY)?.is_none();
            if missing {
                info.insert(N_PAGES_KEY, 0u64)?;
            }
            Ok(())
        })
        .context("initializing page database tables")?;

        Ok(Self {
            path,
            txn,
            domain_temp: Mutex::new(DomainTemp::new(
                config.domain_temp_size,
                config.domain_temp_window,
            )),
            persist: AtomicBool::new(config.persist),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn txn(&self) -> &TxnManager {
        &self.txn
    }

    /// If false, the database directory is removed on drop.
    pub fn set_persist(&self, persist: bool) {
        self.persist.store(persist, Ordering::Relaxed);
    }

    pub fn set_domain_temp(&self, size: usize, window: f32) {
        *self.domain_temp.lock().unwrap() = DomainTemp::new(size, window);
    }

    /// Store a crawled page: update or create its [`PageInfo`], intern
    /// every outgoing link, and overwrite the page's adjacency row.
    ///
    /// With `emit_delta` the touched `(hash, PageInfo)` pairs are returned
    /// (the crawled page first, then every newly sighted link); schedulers
    /// use them to keep their queues in sync.
    pub fn add(&self, page: &CrawledPage, emit_delta: bool) -> Result<Vec<(u64, PageInfo)>> {
        self.txn
            .with_write(|txn| {
                let mut info = txn.open_table(INFO_TABLE)?;
                let mut hash2idx = txn.open_table(HASH2IDX_TABLE)?;
                let mut hash2info = txn.open_table(HASH2INFO_TABLE)?;
                let mut links = txn.open_table(LINKS_TABLE)?;

                let mut n_pages = info
                    .get(N_PAGES_KEY)?
                    .map(|guard| guard.value())
                    .unwrap_or(0);

                let mut delta = Vec::new();
                let page_hash = urls::page_hash(&page.url);

                let existing = hash2info
                    .get(page_hash)?
                    .map(|guard| PageInfo::load(guard.value()))
                    .transpose()?;
                let page_info = match existing {
                    Some(mut pi) => {
                        pi.update(page);
                        pi
                    }
                    None => PageInfo::new_crawled(page),
                };
                hash2info.insert(page_hash, page_info.dump()?.as_slice())?;
                if emit_delta {
                    delta.push((page_hash, page_info));
                }

                let own_id = {
                    let existing = hash2idx.get(page_hash)?.map(|guard| guard.value());
                    match existing {
                        Some(id) => id,
                        None => {
                            let id = n_pages;
                            hash2idx.insert(page_hash, id)?;
                            n_pages += 1;
                            id
                        }
                    }
                };

                let mut child_ids = Vec::with_capacity(page.links.len());
                for link in &page.links {
                    let link_hash = urls::page_hash(&link.url);
                    let existing = hash2idx.get(link_hash)?.map(|guard| guard.value());

                    match existing {
                        Some(id) => child_ids.push(id),
                        None => {
                            let id = n_pages;
                            hash2idx.insert(link_hash, id)?;
                            n_pages += 1;

                            let link_info = PageInfo::new_link(&link.url, link.score);
                            hash2info.insert(link_hash, link_info.dump()?.as_slice())?;
                            if emit_delta {
                                delta.push((link_hash, link_info));
                            }
                            child_ids.push(id);
                        }
                    }
                }

                info.insert(N_PAGES_KEY, n_pages)?;

                let mut row = Vec::with_capacity(child_ids.len() * 8);
                for id in &child_ids {
                    row.extend_from_slice(&id.to_ne_bytes());
                }
                links.insert(own_id, row.as_slice())?;

                Ok(delta)
            })
            .with_context(|| format!("adding crawled page {:?}", page.url))
    }

    /// Lookup by page hash. A missing page is a success with `None`.
    pub fn get_info(&self, hash: u64) -> Result<Option<PageInfo>> {
        let txn = self.txn.read()?;
        let table = txn.open_table(HASH2INFO_TABLE)?;

        match table.get(hash)? {
            Some(guard) => Ok(Some(PageInfo::load(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_idx(&self, hash: u64) -> Result<Option<u64>> {
        let txn = self.txn.read()?;
        let table = txn.open_table(HASH2IDX_TABLE)?;

        Ok(table.get(hash)?.map(|guard| guard.value()))
    }

    pub fn n_pages(&self) -> Result<u64> {
        let txn = self.txn.read()?;
        let table = txn.open_table(INFO_TABLE)?;

        Ok(table
            .get(N_PAGES_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    /// Dense vector of content scores, indexed by page id.
    pub fn get_scores(&self) -> Result<MmapArray<f32>> {
        let txn = self.txn.read()?;
        let info_table = txn.open_table(INFO_TABLE)?;
        let hash2idx = txn.open_table(HASH2IDX_TABLE)?;
        let hash2info = txn.open_table(HASH2INFO_TABLE)?;

        let n_pages = info_table
            .get(N_PAGES_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0) as usize;
        let mut scores = MmapArray::anonymous(n_pages)?;

        for (idx_row, info_row) in hash2idx.iter()?.zip(hash2info.iter()?) {
            let (idx_hash, id) = {
                let (k, v) = idx_row?;
                (k.value(), v.value())
            };
            let (info_hash, page_info) = {
                let (k, v) = info_row?;
                (k.value(), PageInfo::load(v.value())?)
            };

            if idx_hash != info_hash {
                bail!(crate::Error::Internal(
                    "hash2idx and hash2info disagree".to_string()
                ));
            }

            scores.set(id as usize, &page_info.score)?;
        }

        Ok(scores)
    }

    /// Dense page-hash vector, indexed by page id. The high 32 bits of
    /// each hash are the domain hash.
    pub(crate) fn idx2hash(&self) -> Result<MmapArray<u64>> {
        let txn = self.txn.read()?;
        let info_table = txn.open_table(INFO_TABLE)?;
        let hash2idx = txn.open_table(HASH2IDX_TABLE)?;

        let n_pages = info_table
            .get(N_PAGES_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0) as usize;
        let mut hashes = MmapArray::anonymous(n_pages)?;

        for row in hash2idx.iter()? {
            let (k, v) = row?;
            hashes.set(v.value() as usize, &k.value())?;
        }

        Ok(hashes)
    }

    /// Smoothed crawls-per-second for a domain over the configured window.
    pub fn domain_crawl_rate(&self, domain_hash: u32) -> f32 {
        let mut temp = self.domain_temp.lock().unwrap();
        temp.update(crate::now_secs() as f32);
        temp.get(domain_hash) / temp.window()
    }

    /// Count a dispatched crawl against a domain.
    pub fn heat_domain(&self, domain_hash: u32) {
        let mut temp = self.domain_temp.lock().unwrap();
        temp.update(crate::now_secs() as f32);
        temp.heat(domain_hash);
    }

    /// First page found whose adjacency row links to `target`.
    pub fn find_linking_page(&self, target: u64) -> Result<Option<u64>> {
        let txn = self.txn.read()?;
        let links = txn.open_table(LINKS_TABLE)?;

        for row in links.iter()? {
            let (k, v) = row?;
            let from = k.value();
            if decode_adjacency_row(v.value()).any(|id| id == target) && from != target {
                return Ok(Some(from));
            }
        }

        Ok(None)
    }

    /// Write every page record in hash order, one line per page.
    pub fn info_dump<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let txn = self.txn.read()?;
        let table = txn.open_table(HASH2INFO_TABLE)?;

        for row in table.iter()? {
            let (k, v) = row?;
            let page_info = PageInfo::load(v.value())?;
            writeln!(out, "{:016x} {}", k.value(), page_info)?;
        }

        Ok(())
    }

    /// Dump the link graph as a compressed edge container.
    pub fn links_dump<W: Write>(&self, out: W) -> Result<W> {
        let mut writer = EdgeStreamWriter::new(out);
        let mut stream = PageDbLinkStream::new(self)?;

        while let Some(link) = stream.next_link()? {
            writer.write_link(link)?;
        }

        writer.finish()
    }
}

pub(crate) fn decode_adjacency_row(row: &[u8]) -> impl Iterator<Item = u64> + '_ {
    row.chunks_exact(8)
        .map(|chunk| u64::from_ne_bytes(chunk.try_into().unwrap()))
}

impl Drop for PageDb {
    fn drop(&mut self) {
        if !self.persist.load(Ordering::Relaxed) {
            if let Err(err) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!("failed to remove page database files: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link_stream::Link;
    use proptest::prelude::*;

    fn open_temp_db() -> PageDb {
        let config = PageDbConfig {
            persist: false,
            ..Default::default()
        };
        PageDb::with_config(crate::gen_temp_path(), config).unwrap()
    }

    #[test]
    fn page_info_serialization_roundtrip() {
        let pi = PageInfo {
            url: "test_url_123".to_string(),
            first_crawl: 123.0,
            last_crawl: 456.0,
            n_changes: 100,
            n_crawls: 20,
            score: 0.7,
            content_hash: b"1234567\0".to_vec(),
        };

        let loaded = PageInfo::load(&pi.dump().unwrap()).unwrap();
        assert_eq!(loaded, pi);
    }

    #[test]
    fn page_info_with_nul_in_url_is_rejected() {
        let pi = PageInfo::new_link("bad\0url", 0.0);
        assert!(pi.dump().is_err());
    }

    #[test]
    fn add_and_read_back() {
        let db = open_temp_db();

        let mut cp1 = CrawledPage::new("www.yahoo.com");
        cp1.add_link("a", 0.1);
        cp1.add_link("b", 0.2);
        cp1.add_link("www.google.com", 0.3);
        cp1.set_content_hash_u64(1000);
        cp1.score = 0.5;

        let mut cp2 = CrawledPage::new("www.bing.com");
        cp2.add_link("x", 1.1);
        cp2.add_link("y", 1.2);
        cp2.set_content_hash_u64(2000);
        cp2.score = 0.2;

        db.add(&cp1, true).unwrap();
        db.add(&cp2, true).unwrap();

        // re-crawl bing with changed content
        cp2.set_content_hash_u64(3000);
        db.add(&cp2, true).unwrap();

        let yahoo = db
            .get_info(urls::page_hash("www.yahoo.com"))
            .unwrap()
            .unwrap();
        assert_eq!(yahoo.n_crawls, 1);
        assert_eq!(yahoo.n_changes, 0);

        let google = db
            .get_info(urls::page_hash("www.google.com"))
            .unwrap()
            .unwrap();
        assert_eq!(google.n_crawls, 0);

        let bing = db
            .get_info(urls::page_hash("www.bing.com"))
            .unwrap()
            .unwrap();
        assert_eq!(bing.n_crawls, 2);
        assert_eq!(bing.n_changes, 1);

        let mut stream = PageDbLinkStream::new(&db).unwrap();
        let mut edges = Vec::new();
        while let Some(link) = stream.next_link().unwrap() {
            edges.push((link.from, link.to));
        }
        assert_eq!(edges, vec![(0, 1), (0, 2), (0, 3), (4, 5), (4, 6)]);
    }

    #[test]
    fn ids_are_dense_and_consistent() {
        let db = open_temp_db();

        let mut cp = CrawledPage::new("1");
        cp.add_link("a", 0.0);
        cp.add_link("b", 0.0);
        db.add(&cp, false).unwrap();

        let mut cp = CrawledPage::new("2");
        cp.add_link("c", 0.0);
        cp.add_link("d", 0.0);
        db.add(&cp, false).unwrap();

        assert_eq!(db.n_pages().unwrap(), 6);

        let expected = ["1", "a", "b", "2", "c", "d"];
        for (id, url) in expected.iter().enumerate() {
            assert_eq!(
                db.get_idx(urls::page_hash(url)).unwrap(),
                Some(id as u64),
                "{url}"
            );
        }

        let mut stream = HashIdxStream::new(&db).unwrap();
        let mut seen = 0;
        while let Some((hash, idx)) = stream.next().unwrap() {
            assert!(idx < 6);
            assert_eq!(urls::page_hash(expected[idx as usize]), hash);
            seen += 1;
        }
        assert_eq!(seen, 6);
    }

    #[test]
    fn emit_delta_reports_new_pages_only() {
        let db = open_temp_db();

        let mut cp = CrawledPage::new("1");
        cp.add_link("2", 0.25);
        cp.set_content_hash_u64(1);
        let delta = db.add(&cp, true).unwrap();

        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0].1.url, "1");
        assert_eq!(delta[0].1.n_crawls, 1);
        assert_eq!(delta[1].1.url, "2");
        assert_eq!(delta[1].1.n_crawls, 0);
        assert_eq!(delta[1].1.score, 0.25);

        // "2" is already known: the delta now only holds the re-crawled page
        let delta = db.add(&cp, true).unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].1.n_crawls, 2);
    }

    #[test]
    fn adjacency_rows_are_overwritten_per_crawl() {
        let db = open_temp_db();

        let mut cp = CrawledPage::new("1");
        cp.add_link("2", 0.0);
        cp.add_link("3", 0.0);
        db.add(&cp, false).unwrap();

        let mut cp = CrawledPage::new("1");
        cp.add_link("3", 0.0);
        db.add(&cp, false).unwrap();

        let mut stream = PageDbLinkStream::new(&db).unwrap();
        let mut edges = Vec::new();
        while let Some(link) = stream.next_link().unwrap() {
            edges.push(link);
        }

        let id_3 = db.get_idx(urls::page_hash("3")).unwrap().unwrap();
        assert_eq!(edges, vec![Link { from: 0, to: id_3 }]);
    }

    #[test]
    fn scores_vector_follows_page_ids() {
        let db = open_temp_db();

        let mut cp = CrawledPage::new("1");
        cp.add_link("2", 0.5);
        cp.score = 0.25;
        db.add(&cp, false).unwrap();

        let scores = db.get_scores().unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores.get(0).unwrap(), 0.25);
        assert_eq!(scores.get(1).unwrap(), 0.5);
    }

    #[test]
    fn change_rate_and_seed_detection() {
        let db = open_temp_db();

        let mut cp = CrawledPage::new("http://example.com/");
        cp.time = 100.0;
        db.add(&cp, false).unwrap();

        // crawled without content: a frontier seed
        let pi = db
            .get_info(urls::page_hash("http://example.com/"))
            .unwrap()
            .unwrap();
        assert!(pi.is_seed());
        assert_eq!(pi.change_rate(), None);

        cp.time = 200.0;
        cp.set_content_hash_u64(1);
        db.add(&cp, false).unwrap();

        let pi = db
            .get_info(urls::page_hash("http://example.com/"))
            .unwrap()
            .unwrap();
        assert!(!pi.is_seed());
        assert_eq!(pi.change_rate(), Some(1.0 / 100.0));
    }

    #[test]
    fn domain_rate_tracks_heat() {
        let db = open_temp_db();
        db.set_domain_temp(10, 100.0);

        let dh = urls::domain_hash(urls::page_hash("http://example.com/a"));
        assert_eq!(db.domain_crawl_rate(dh), 0.0);

        db.heat_domain(dh);
        db.heat_domain(dh);

        let rate = db.domain_crawl_rate(dh);
        assert!(rate > 0.0 && rate <= 2.0 / 100.0 + 1e-6);
    }

    proptest! {
        #[test]
        fn page_info_roundtrip(
            url in "[a-zA-Z0-9./:_-]{1,60}",
            first_crawl in 0.0f64..2e9,
            extra in 0.0f64..1e6,
            n_crawls in 1u64..1000,
            n_changes in 0u64..999,
            score in -1e6f32..1e6,
            content_hash in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let pi = PageInfo {
                url,
                first_crawl,
                last_crawl: first_crawl + extra,
                n_changes,
                n_crawls,
                score,
                content_hash,
            };

            let loaded = PageInfo::load(&pi.dump().unwrap()).unwrap();
            prop_assert_eq!(loaded, pi);
        }
    }
}
