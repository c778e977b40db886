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

//! Streaming HITS (Kleinberg's hubs and authorities).
//!
//! Edges are assumed to arrive roughly ordered by source page, so hub
//! vectors are touched sequentially and authority vectors randomly. Both
//! score families are normalized to sum 1 after every pass.

use std::path::Path;

use file_store::{AccessPattern, MmapArray};

use crate::config::HitsConfig;
use crate::link_stream::LinkStream;
use crate::{Error, Result};

pub struct Hits {
    h1: MmapArray<f32>,
    h2: MmapArray<f32>,
    a1: MmapArray<f32>,
    a2: MmapArray<f32>,
    /// Optional per-page content weights for the hub update.
    scores: Option<MmapArray<f32>>,

    n_pages: usize,

    pub precision: f32,
    pub max_loops: usize,
}

impl Hits {
    pub fn open<P: AsRef<Path>>(path: P, max_vertices: usize, config: &HitsConfig) -> Result<Self> {
        let mut h1 = MmapArray::open(path.as_ref().join("hits_h1.bin"), max_vertices)?;
        let h2 = MmapArray::open(path.as_ref().join("hits_h2.bin"), max_vertices)?;
        let mut a1 = MmapArray::anonymous(max_vertices)?;
        let a2 = MmapArray::anonymous(max_vertices)?;

        let v0 = 1.0 / h1.len() as f32;
        for i in 0..h1.len() {
            h1.set(i, &v0)?;
            a1.set(i, &v0)?;
        }

        Ok(Self {
            h1,
            h2,
            a1,
            a2,
            scores: None,
            n_pages: 0,
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

        for arr in [&mut self.h1, &mut self.h2, &mut self.a1, &mut self.a2] {
            while arr.len() < n_pages {
                let len = arr.len();
                arr.resize(2 * len)?;
            }
        }

        Ok(())
    }

    fn hub_weight(&self, to: usize) -> f32 {
        match &self.scores {
            Some(scores) => scores.get(to).unwrap_or(0.0),
            None => 1.0,
        }
    }

    /// One pass over the edges: `h2[from] += a1[to]`, `a2[to] += h1[from]`.
    fn stream_loop(&mut self, stream: &mut dyn LinkStream) -> Result<()> {
        self.h2.advise(AccessPattern::Sequential);
        self.h2.zero();
        self.a2.advise(AccessPattern::Sequential);
        self.a2.zero();

        self.a1.advise(AccessPattern::Random);

        while let Some(link) = stream.next_link()? {
            let needed = link.from.max(link.to) as usize + 1;
            if needed > self.n_pages {
                self.set_n_pages(needed)?;
            }

            let from = link.from as usize;
            let to = link.to as usize;

            let hub = self.h2.get(from)?;
            let contribution = self.hub_weight(to) * self.a1.get(to)?;
            self.h2.set(from, &(hub + contribution))?;

            let auth = self.a2.get(to)?;
            self.a2.set(to, &(auth + self.h1.get(from)?))?;
        }

        Ok(())
    }

    /// Normalize the fresh vectors, compute the largest change over both
    /// families, and swap current/previous values.
    fn end_loop(&mut self) -> Result<f32> {
        let mut delta = 0.0f32;

        for (fresh, current) in [(&mut self.h2, &mut self.h1), (&mut self.a2, &mut self.a1)] {
            let mut sum = 0.0f32;
            for i in 0..self.n_pages {
                sum += fresh.get(i)?;
            }

            for i in 0..self.n_pages {
                let mut new = fresh.get(i)?;
                if sum > 0.0 {
                    new /= sum;
                }
                let old = current.get(i)?;

                delta = delta.max((new - old).abs());
                current.set(i, &new)?;
                fresh.set(i, &old)?;
            }
        }

        Ok(delta)
    }

    /// Iterate to convergence. Surfaces [`Error::Precision`] when the loop
    /// budget runs out first; the scores computed so far remain usable.
    pub fn compute(&mut self, stream: &mut dyn LinkStream) -> Result<()> {
        if let Some(scores) = &mut self.scores {
            super::page_rank::normalize(scores)?;
        }

        let mut loops = 0;
        loop {
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

    /// Previous and current hub score of a page.
    pub fn get_hub(&self, idx: usize) -> Result<(f32, f32)> {
        if idx >= self.h1.len() {
            return Err(Error::NoPage.into());
        }
        Ok((self.h2.get(idx)?, self.h1.get(idx)?))
    }

    /// Previous and current authority score of a page.
    pub fn get_authority(&self, idx: usize) -> Result<(f32, f32)> {
        if idx >= self.a1.len() {
            return Err(Error::NoPage.into());
        }
        Ok((self.a2.get(idx)?, self.a1.get(idx)?))
    }

    pub fn set_persist(&mut self, persist: bool) {
        self.h1.set_persist(persist);
        self.h2.set_persist(persist);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link_stream::MemLinkStream;

    fn test_config() -> HitsConfig {
        HitsConfig {
            precision: 1e-8,
            max_loops: 1000,
            ..Default::default()
        }
    }

    // 1 -> 2, 1 -> 5, 2 -> 3, 2 -> 5, 3 -> 4, 3 -> 5, 4 -> 1, 4 -> 5.
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

        let mut hits = Hits::open(&dir, 5, &test_config()).unwrap();
        let mut stream = five_page_graph();

        hits.compute(&mut stream).unwrap();

        let expected_hubs = [0.25, 0.25, 0.25, 0.25, 0.0];
        let expected_auths = [0.125, 0.125, 0.125, 0.125, 0.5];

        let mut hub_sum = 0.0;
        let mut auth_sum = 0.0;
        for i in 0..5 {
            let (_, hub) = hits.get_hub(i).unwrap();
            let (_, auth) = hits.get_authority(i).unwrap();

            assert!((hub - expected_hubs[i]).abs() < 1e-6, "hub {i}: {hub}");
            assert!((auth - expected_auths[i]).abs() < 1e-6, "auth {i}: {auth}");

            hub_sum += hub;
            auth_sum += auth;
        }
        assert!((hub_sum - 1.0).abs() < 1e-5);
        assert!((auth_sum - 1.0).abs() < 1e-5);

        drop(hits);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn arrays_expand_when_the_stream_reveals_new_ids() {
        let dir = crate::gen_temp_path();
        std::fs::create_dir_all(&dir).unwrap();

        let config = HitsConfig {
            precision: 1e-6,
            max_loops: 1000,
            ..Default::default()
        };
        let mut hits = Hits::open(&dir, 2, &config).unwrap();
        let mut stream = MemLinkStream::from([(0, 1), (0, 5), (5, 1)].as_slice());

        hits.compute(&mut stream).unwrap();
        assert_eq!(hits.n_pages(), 6);
        assert!(hits.get_authority(5).unwrap().1 > 0.0);
        assert!(hits.get_hub(5).unwrap().1 > 0.0);

        drop(hits);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn loop_budget_exhaustion_is_reported() {
        let dir = crate::gen_temp_path();
        std::fs::create_dir_all(&dir).unwrap();

        let config = HitsConfig {
            precision: 0.0,
            max_loops: 2,
            ..Default::default()
        };
        let mut hits = Hits::open(&dir, 2, &config).unwrap();
        let mut stream = MemLinkStream::from([(0, 1), (1, 0)].as_slice());

        let err = hits.compute(&mut stream).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Precision)
        ));

        drop(hits);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
