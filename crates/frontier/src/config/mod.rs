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

pub mod defaults;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PageDbConfig {
    /// If false, the database directory is removed on close.
    #[serde(default = "defaults::PageDb::persist")]
    pub persist: bool,

    /// Number of domains tracked by the crawl-rate table.
    #[serde(default = "defaults::PageDb::domain_temp_size")]
    pub domain_temp_size: usize,

    /// Cool-down window of the crawl-rate table, in seconds.
    #[serde(default = "defaults::PageDb::domain_temp_window")]
    pub domain_temp_window: f32,
}

impl Default for PageDbConfig {
    fn default() -> Self {
        Self {
            persist: defaults::PageDb::persist(),
            domain_temp_size: defaults::PageDb::domain_temp_size(),
            domain_temp_window: defaults::PageDb::domain_temp_window(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BfSchedulerConfig {
    #[serde(default = "defaults::BestFirst::persist")]
    pub persist: bool,

    /// Domains above this crawl rate are skipped for the current batch.
    #[serde(default = "defaults::BestFirst::max_soft_domain_crawl_rate")]
    pub max_soft_domain_crawl_rate: f32,

    /// Domains above this crawl rate have their schedule entries dropped.
    #[serde(default = "defaults::BestFirst::max_hard_domain_crawl_rate")]
    pub max_hard_domain_crawl_rate: f32,

    /// The background updater waits for at least this many new pages.
    #[serde(default = "defaults::BestFirst::pages_threshold")]
    pub pages_threshold: u64,

    /// ... or for this fraction of the page count, whichever is larger.
    #[serde(default = "defaults::BestFirst::fraction")]
    pub fraction: f64,

    /// Schedule rows rewritten per update-thread write transaction.
    #[serde(default = "defaults::BestFirst::update_batch_size")]
    pub update_batch_size: usize,

    /// Soft-limited batches tolerated before an entry is treated as
    /// hard-limited.
    #[serde(default = "defaults::BestFirst::crawl_rate_steps")]
    pub crawl_rate_steps: u32,
}

impl Default for BfSchedulerConfig {
    fn default() -> Self {
        Self {
            persist: defaults::BestFirst::persist(),
            max_soft_domain_crawl_rate: defaults::BestFirst::max_soft_domain_crawl_rate(),
            max_hard_domain_crawl_rate: defaults::BestFirst::max_hard_domain_crawl_rate(),
            pages_threshold: defaults::BestFirst::pages_threshold(),
            fraction: defaults::BestFirst::fraction(),
            update_batch_size: defaults::BestFirst::update_batch_size(),
            crawl_rate_steps: defaults::BestFirst::crawl_rate_steps(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FreqSchedulerConfig {
    #[serde(default = "defaults::Freq::persist")]
    pub persist: bool,

    /// When non-negative, a request batch stops as soon as the head of the
    /// queue is not due yet within `1 / (freq * (1 + margin))` seconds.
    #[serde(default = "defaults::Freq::margin")]
    pub margin: f32,

    /// Pages crawled at least this many times drop out of the schedule.
    /// 0 disables the cap.
    #[serde(default = "defaults::Freq::max_n_crawls")]
    pub max_n_crawls: u64,
}

impl Default for FreqSchedulerConfig {
    fn default() -> Self {
        Self {
            persist: defaults::Freq::persist(),
            margin: defaults::Freq::margin(),
            max_n_crawls: defaults::Freq::max_n_crawls(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PageRankConfig {
    #[serde(default = "defaults::PageRank::damping")]
    pub damping: f32,

    #[serde(default = "defaults::PageRank::precision")]
    pub precision: f32,

    #[serde(default = "defaults::PageRank::max_loops")]
    pub max_loops: usize,

    /// Weight the teleport distribution by page content scores.
    #[serde(default = "defaults::PageRank::use_content_scores")]
    pub use_content_scores: bool,

    /// Only stream links that cross domains.
    #[serde(default = "defaults::PageRank::only_different_domains")]
    pub only_different_domains: bool,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: defaults::PageRank::damping(),
            precision: defaults::PageRank::precision(),
            max_loops: defaults::PageRank::max_loops(),
            use_content_scores: defaults::PageRank::use_content_scores(),
            only_different_domains: defaults::PageRank::only_different_domains(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HitsConfig {
    #[serde(default = "defaults::Hits::precision")]
    pub precision: f32,

    #[serde(default = "defaults::Hits::max_loops")]
    pub max_loops: usize,

    /// Weight hub updates by the content score of the linked page.
    #[serde(default = "defaults::Hits::use_content_scores")]
    pub use_content_scores: bool,

    /// Only stream links that cross domains.
    #[serde(default = "defaults::Hits::only_different_domains")]
    pub only_different_domains: bool,
}

impl Default for HitsConfig {
    fn default() -> Self {
        Self {
            precision: defaults::Hits::precision(),
            max_loops: defaults::Hits::max_loops(),
            use_content_scores: defaults::Hits::use_content_scores(),
            only_different_domains: defaults::Hits::only_different_domains(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: BfSchedulerConfig = toml::from_str("max_soft_domain_crawl_rate = 2.5").unwrap();

        assert_eq!(config.max_soft_domain_crawl_rate, 2.5);
        assert!(config.max_hard_domain_crawl_rate.is_infinite());
        assert_eq!(config.update_batch_size, 100);
        assert_eq!(config.crawl_rate_steps, 5);
    }
}
