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

pub struct PageDb;

impl PageDb {
    pub fn persist() -> bool {
        true
    }

    pub fn domain_temp_size() -> usize {
        100
    }

    pub fn domain_temp_window() -> f32 {
        60.0
    }
}

pub struct BestFirst;

impl BestFirst {
    pub fn persist() -> bool {
        true
    }

    pub fn max_soft_domain_crawl_rate() -> f32 {
        f32::INFINITY
    }

    pub fn max_hard_domain_crawl_rate() -> f32 {
        f32::INFINITY
    }

    pub fn pages_threshold() -> u64 {
        100
    }

    pub fn fraction() -> f64 {
        0.01
    }

    pub fn update_batch_size() -> usize {
        100
    }

    pub fn crawl_rate_steps() -> u32 {
        5
    }
}

pub struct Freq;

impl Freq {
    pub fn persist() -> bool {
        false
    }

    /// Negative margin disables the early-stop check.
    pub fn margin() -> f32 {
        -1.0
    }

    /// 0 disables the crawl cap.
    pub fn max_n_crawls() -> u64 {
        0
    }
}

pub struct PageRank;

impl PageRank {
    pub fn damping() -> f32 {
        0.85
    }

    pub fn precision() -> f32 {
        1e-4
    }

    pub fn max_loops() -> usize {
        100
    }

    pub fn use_content_scores() -> bool {
        false
    }

    pub fn only_different_domains() -> bool {
        false
    }
}

pub struct Hits;

impl Hits {
    pub fn precision() -> f32 {
        1e-4
    }

    pub fn max_loops() -> usize {
        100
    }

    pub fn use_content_scores() -> bool {
        false
    }

    pub fn only_different_domains() -> bool {
        false
    }
}
