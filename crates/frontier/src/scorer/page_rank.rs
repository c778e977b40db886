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

//! Streaming PageRank.
//!
//! Power iteration over a link stream with a bounded in-memory footprint:
//! all per-page state lives in memory-mapped arrays, and every iteration
//! makes exactly one pass over the edges. Dangling-node mass is
//! distributed uniformly across all pages, folded into the same scalar as
//! the teleport term.

use std::path::Path;

use file_store::{AccessPattern, MmapArray};

use crate::config::PageRankConfig;
use crate::link_stream::LinkStream;
use crate::{Error, Result};

pub struct PageRank {
    out_degree: MmapArray<f32>,
    value1: MmapArray<f32>,
    value2: MmapArray<f32>,
    /// Optional per-page teleport weights, normalized to sum 1 on use.
    scores: Option<MmapArray<f32>>,

    n_pages: usize,
    initialized: bool,

    pub damping: f32,
    pub precision: f32,
    pub max_loops: usize,
}

impl PageRank {
    /// Create the iteration state under `path` with room for
    /// `max_vertices` pages. The arrays grow on demand as the stream
    /// reveals higher page ids.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_vertices: usize,
        config: &PageRankConfig,
    ) -> Result<Self> {
        let out_degree = MmapArray::open(path.as_ref().join("pr_out_degree.bin"), max_vertices)?;
        let mut value1 = MmapArray::open(path.as_ref().join("pr.bin"), max_vertices)?;
        let value2 = MmapArray::anonymous(max_vertices)?;

        value1.advise(AccessPattern::Sequential);
        let v0 = 1.0 / value1.len() as f32;
        for i in 0..value1.len() {
            value1.set(i, &v0)?;
        }

        Ok(Self {
            out_degree,
            value1,
            value2,
            scores: None,
            n_pages: 0,
            initialized: false,
            damping: config.damping,
            precision: config.precision,
            max_loops: config.max_loops,
        })
    }

    pub fn set_scores(&mut self, scores: Option<MmapArray<f32>>) {
        self.scores = scores;
    }

    pub fn n_pages(&self) -> usize {
        self.n_pages
    }

    pub fn set_n_pages(&mut self, n_pages: usize) -> Result<()> {
        self.n_pages = n_pages;

        while self.out_degree.len() < n_pages {
            let len = self.out_degree.len();
            self.out_degree.resize(2 * len)?;
        }
        while self.value1.len() < n_pages {
            let len = self.value1.len();
            self.value1.resize(2 * len)?;
        }
        while self.value2.len() < n_pages {
            let len = self.value2.len();
            self.value2.resize(2 * len)?;
        }

        Ok(())
    }

    fn expand_to_fit(&mut self, link: crate::Link) -> Result<()> {
        let needed = link.from.max(link.to) as usize + 1;
        if needed > self.n_pages {
            self.set_n_pages(needed)?;
        }
        Ok(())
    }

    /// One-time pass filling the out-degree vector.
    fn init_out_degree(&mut self, stream: &mut dyn LinkStream) -> Result<()> {
        self.out_degree.advise(AccessPattern::Sequential);

        while let Some(link) = stream.next_link()? {
            self.expand_to_fit(link)?;
            let degree = self.out_degree.get(link.from as usize)?;
            self.out_degree.set(link.from as usize, &(degree + 1.0))?;
        }

        Ok(())
    }

    fn teleport_weight(&self, i: usize) -> f32 {
        match &self.scores {
            Some(scores) => scores.get(i).unwrap_or(0.0),
            None => 1.0,
        }
    }

    /// Scale the current values by `damping / out_degree` and preseed the
    /// next values with the teleport plus dangling mass.
    fn begin_loop(&mut self) -> Result<()> {
        self.out_degree.advise(AccessPattern::Sequential);
        self.value1.advise(AccessPattern::Sequential);

        let mut d = 0.0f32;
        for i in 0..self.n_pages {
            let value = self.value1.get(i)?;
            if self.out_degree.get(i)? > 0.0 {
                d += (1.0 - self.damping) * value;
            } else {
                d += value;
            }
        }
        d /= self.n_pages as f32;

        for i in 0..self.n_pages {
            let degree = self.out_degree.get(i)?;
            if degree > 0.0 {
                let value = self.value1.get(i)?;
                self.value1.set(i, &(value * self.damping / degree))?;
            }
        }

        self.value2.advise(AccessPattern::Sequential);
        match &self.scores {
            None => {
                for i in 0..self.n_pages {
                    self.value2.set(i, &d)?;
                }
            }
            Some(_) => {
                for i in 0..self.n_pages {
                    let seed = d * self.n_pages as f32 * self.teleport_weight(i);
                    self.value2.set(i, &seed)?;
                }
            }
        }

        Ok(())
    }

    /// Push the scaled values along every edge.
    fn stream_loop(&mut self, stream: &mut dyn LinkStream) -> Result<()> {
        self.value1.advise(AccessPattern::Sequential);
        self.value2.advise(AccessPattern::Random);

        while let Some(link) = stream.next_link()? {
            self.expand_to_fit(link)?;
            let incoming = self.value1.get(link.from as usize)?;
            let value = self.value2.get(link.to as usize)?;
            self.value2.set(link.to as usize, &(value + incoming))?;
        }

        Ok(())
    }

    /// Swap current and next values; returns the largest per-page change.
    fn end_loop(&mut self) -> Result<f32> {
        let mut delta = 0.0f32;

        for i in 0..self.n_pages {
            let old = self.value1.get(i)?;
            let new = self.value2.get(i)?;

            delta = delta.max((new - old).abs());
            self.value1.set(i, &new)?;
            self.value2.set(i, &old)?;
        }

        Ok(delta)
    }

    /// Iterate to convergence. Surfaces [`Error::Precision`] when the loop
    /// budget runs out first; the scores computed so far remain usable.
    pub fn compute(&mut self, stream: &mut dyn LinkStream) -> Result<()> {
        if !self.initialized {
            self.init_out_degree(stream)?;
            stream.reset()?;
            self.initialized = true;
        }

        if let Some(scores) = &mut self.scores {
            normalize(scores)?;
        }

        let mut loops = 0;
        loop {
            self.begin_loop()?;
            self.stream_loop(stream)?;
            stream.reset()?;

            let delta = self.end_loop()?;
            loops += 1;

            if delta < self.precision {
                return Ok(());
            }
            if loops >= self.max_loops {
                return Err(Error::Precision.into());
            }
        }
    }

    /// Previous and current score of a page.
    pub fn get(&self, idx: usize) -> Result<(f32, f32)> {
        if idx >= self.value1.len() {
            return Err(Error::NoPage.into());
        }
        Ok((self.value2.get(idx)?, self.value1.get(idx)?))
    }

    pub fn set_persist(&mut self, persist: bool) {
        self.out_degree.set_persist(persist);
        self.value1.set_persist(persist);
    }
}

pub(crate) fn normalize(scores: &mut MmapArray<f32>) -> Result<()> {
    let mut sum = 0.0f32;
    for i in 0..scores.len() {
        sum += scores.get(i)?;
    }

    if sum > 0.0 {
        for i in 0..scores.len() {
            let value = scores.get(i)?;
            scores.set(i, &(value / sum))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link_stream::MemLinkStream;

    fn test_config() -> PageRankConfig {
        PageRankConfig {
            precision: 1e-7,
            max_loops: 10_000,
            ..Default::default()
        }
    }

    // 1 -> 2, 1 -> 5, 2 -> 3, 2 -> 5, 3 -> 4, 3 -> 5, 4 -> 1, 4 -> 5,
    // with page 5 dangling. Expected scores from solving the linear
    // system at damping 0.85.
    fn five_page_graph() -> MemLinkStream {
        MemLinkStream::from(
            [
                (0, 1),
                (0, 4),
                (1, 2),
                (1, 4),
                (2, 3),
                (2, 4),
                (3, 0),
                (3, 4),
            ]
            .as_slice(),
        )
    }

    #[test]
    fn converges_on_the_five_page_graph() {
        let dir = crate::gen_temp_path();
        std::fs::create_dir_all(&dir).unwrap();

        let mut pr = PageRank::open(&dir, 5, &test_config()).unwrap();
        let mut stream = five_page_graph();

        pr.compute(&mut stream).unwrap();

        let expected = [0.15936255, 0.15936255, 0.15936255, 0.15936255, 0.3625498];
        let mut sum = 0.0;
        for (i, want) in expected.iter().enumerate() {
            let (_, score) = pr.get(i).unwrap();
            assert!(
                (score - want).abs() < 1e-6,
                "page {i}: got {score}, want {want}"
            );
            assert!(score >= 0.0);
            sum += score;
        }
        assert!((sum - 1.0).abs() < 1e-5);

        drop(pr);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn arrays_expand_when_the_stream_reveals_new_ids() {
        let dir = crate::gen_temp_path();
        std::fs::create_dir_all(&dir).unwrap();

        let mut pr = PageRank::open(&dir, 2, &test_config()).unwrap();
        let mut stream = MemLinkStream::from([(0, 9), (9, 0)].as_slice());

        pr.compute(&mut stream).unwrap();
        assert_eq!(pr.n_pages(), 10);
        assert!(pr.get(9).unwrap().1 > 0.0);

        drop(pr);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn loop_budget_exhaustion_is_reported() {
        let dir = crate::gen_temp_path();
        std::fs::create_dir_all(&dir).unwrap();

        let config = PageRankConfig {
            precision: 0.0,
            max_loops: 2,
            ..Default::default()
        };
        let mut pr = PageRank::open(&dir, 2, &config).unwrap();
        let mut stream = MemLinkStream::from([(0, 1), (1, 0)].as_slice());

        let err = pr.compute(&mut stream).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Precision)
        ));

        drop(pr);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
