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

//! Per-page link-analysis scores, behind a uniform surface the schedulers
//! consult.

use std::sync::Arc;

use crate::config::{HitsConfig, PageRankConfig};
use crate::page_db::{PageDb, PageDbLinkStream, PageInfo};
use crate::Result;

pub mod hits;
pub mod page_rank;

pub use hits::Hits;
pub use page_rank::PageRank;

/// An updateable per-page score. Scorers are shared with the schedule
/// update thread, hence the marker bounds.
pub trait Scorer: Send + Sync {
    /// Baseline score for a page that just entered the database.
    fn add(&self, page_info: &PageInfo) -> f32 {
        let _ = page_info;
        0.0
    }

    /// Recompute all scores by consuming a link stream from the database.
    fn update(&mut self) -> Result<()>;

    /// Previous and current score of the given page id.
    fn get(&self, page_id: u64) -> Result<(f32, f32)>;
}

/// Scores pages by their PageRank.
pub struct PageRankScorer {
    page_db: Arc<PageDb>,
    page_rank: PageRank,
    use_content_scores: bool,
    only_different_domains: bool,
}

const SCORER_INITIAL_VERTICES: usize = 1000;

impl PageRankScorer {
    pub fn new(page_db: Arc<PageDb>, config: &PageRankConfig) -> Result<Self> {
        let page_rank = PageRank::open(page_db.path(), SCORER_INITIAL_VERTICES, config)?;

        Ok(Self {
            page_db,
            page_rank,
            use_content_scores: config.use_content_scores,
            only_different_domains: config.only_different_domains,
        })
    }
}

impl Scorer for PageRankScorer {
    fn update(&mut self) -> Result<()> {
        let mut stream =
            PageDbLinkStream::with_mode(&self.page_db, self.only_different_domains)?;

        if self.use_content_scores {
            self.page_rank.set_scores(Some(self.page_db.get_scores()?));
        }

        let result = self.page_rank.compute(&mut stream);

        if self.use_content_scores {
            self.page_rank.set_scores(None);
        }

        result
    }

    fn get(&self, page_id: u64) -> Result<(f32, f32)> {
        self.page_rank.get(page_id as usize)
    }
}

/// Scores pages by their HITS authority.
pub struct HitsScorer {
    page_db: Arc<PageDb>,
    hits: Hits,
    use_content_scores: bool,
    only_different_domains: bool,
}

impl HitsScorer {
    pub fn new(page_db: Arc<PageDb>, config: &HitsConfig) -> Result<Self> {
        let hits = Hits::open(page_db.path(), SCORER_INITIAL_VERTICES, config)?;

        Ok(Self {
            page_db,
            hits,
            use_content_scores: config.use_content_scores,
            only_different_domains: config.only_different_domains,
        })
    }
}

impl Scorer for HitsScorer {
    fn update(&mut self) -> Result<()> {
        let mut stream =
            PageDbLinkStream::with_mode(&self.page_db, self.only_different_domains)?;

        if self.use_content_scores {
            self.hits.set_scores(Some(self.page_db.get_scores()?));
        }

        let result = self.hits.compute(&mut stream);

        if self.use_content_scores {
            self.hits.set_scores(None);
        }

        result
    }

    fn get(&self, page_id: u64) -> Result<(f32, f32)> {
        self.hits.get_authority(page_id as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageDbConfig;
    use crate::page_db::CrawledPage;
    use crate::urls;

    /// The five-page graph used throughout: 1 -> {2, 5}, 2 -> {3, 5},
    /// 3 -> {4, 5}, 4 -> {1, 5}, 5 dangling.
    fn five_page_db() -> Arc<PageDb> {
        let config = PageDbConfig {
            persist: false,
            ..Default::default()
        };
        let db = PageDb::with_config(crate::gen_temp_path(), config).unwrap();

        let links: [&[&str]; 5] = [&["2", "5"], &["3", "5"], &["4", "5"], &["1", "5"], &[]];
        for (i, children) in links.iter().enumerate() {
            let mut cp = CrawledPage::new((i + 1).to_string());
            for child in *children {
                cp.add_link(*child, 0.1);
            }
            cp.score = i as f32 / 5.0;
            cp.set_content_hash_u64(i as u64);
            db.add(&cp, false).unwrap();
        }

        Arc::new(db)
    }

    #[test]
    fn page_rank_scores_through_the_database() {
        let db = five_page_db();

        let config = PageRankConfig {
            precision: 1e-7,
            max_loops: 10_000,
            ..Default::default()
        };
        let mut page_rank = PageRank::open(db.path(), 5, &config).unwrap();
        let mut stream = PageDbLinkStream::new(&db).unwrap();
        page_rank.compute(&mut stream).unwrap();

        let expected = [0.15936255, 0.15936255, 0.15936255, 0.15936255, 0.3625498];
        for (i, want) in expected.iter().enumerate() {
            let url = (i + 1).to_string();
            let idx = db.get_idx(urls::page_hash(&url)).unwrap().unwrap();
            let (_, score) = page_rank.get(idx as usize).unwrap();
            assert!((score - want).abs() < 1e-6, "page {url}: {score}");
        }
    }

    #[test]
    fn page_rank_scorer_ranks_the_dangling_sink_first() {
        let db = five_page_db();

        let config = PageRankConfig {
            precision: 1e-8,
            max_loops: 10_000,
            ..Default::default()
        };
        let mut scorer = PageRankScorer::new(Arc::clone(&db), &config).unwrap();
        scorer.update().unwrap();

        let sink = db.get_idx(urls::page_hash("5")).unwrap().unwrap();
        let (_, sink_score) = scorer.get(sink).unwrap();

        for url in ["1", "2", "3", "4"] {
            let idx = db.get_idx(urls::page_hash(url)).unwrap().unwrap();
            let (_, score) = scorer.get(idx).unwrap();
            assert!(sink_score > score, "{url} outranks the sink");
        }
    }

    #[test]
    fn hits_scores_through_the_database() {
        let db = five_page_db();

        let config = HitsConfig {
            precision: 1e-8,
            max_loops: 1000,
            ..Default::default()
        };
        let mut scorer = HitsScorer::new(Arc::clone(&db), &config).unwrap();
        scorer.update().unwrap();

        let expected_hubs = [0.25, 0.25, 0.25, 0.25, 0.0];
        let expected_auths = [0.125, 0.125, 0.125, 0.125, 0.5];
        for i in 0..5 {
            let url = (i + 1).to_string();
            let idx = db.get_idx(urls::page_hash(&url)).unwrap().unwrap() as usize;

            let (_, hub) = scorer.hits.get_hub(idx).unwrap();
            let (_, auth) = scorer.hits.get_authority(idx).unwrap();

            assert!((hub - expected_hubs[i]).abs() < 1e-6, "hub {url}: {hub}");
            assert!(
                (auth - expected_auths[i]).abs() < 1e-6,
                "auth {url}: {auth}"
            );
        }
    }

    #[test]
    fn baseline_score_defaults_to_zero() {
        let db = five_page_db();
        let scorer = PageRankScorer::new(Arc::clone(&db), &PageRankConfig::default()).unwrap();

        let pi = db.get_info(urls::page_hash("5")).unwrap().unwrap();
        assert_eq!(scorer.add(&pi), 0.0);
    }

    #[test]
    fn scorers_are_attachable_behind_the_trait() {
        let db = five_page_db();

        let mut scorers: Vec<Box<dyn Scorer>> = vec![
            Box::new(PageRankScorer::new(Arc::clone(&db), &PageRankConfig::default()).unwrap()),
            Box::new(HitsScorer::new(Arc::clone(&db), &HitsConfig::default()).unwrap()),
        ];

        for scorer in &mut scorers {
            scorer.update().unwrap();
            let (_, new) = scorer.get(0).unwrap();
            assert!(new >= 0.0);
        }
    }
}
