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

//! Approximate per-domain crawl counters with exponential cool-down.
//!
//! A fixed table of `(domain hash, temperature)` cells tracks how often the
//! hottest domains have been crawled inside a time window. Between updates
//! every temperature decays as if solving `dn/dt = -n/T`, which keeps the
//! table cheap to maintain and accurate enough for rate limiting.

#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    hash: u32,
    temp: f32,
}

#[derive(Debug)]
pub struct DomainTemp {
    table: Vec<Cell>,
    time: f32,
    window: f32,
}

impl DomainTemp {
    pub fn new(size: usize, window: f32) -> Self {
        Self {
            table: vec![Cell::default(); size.max(1)],
            time: 0.0,
            window,
        }
    }

    pub fn window(&self) -> f32 {
        self.window
    }

    /// Cool every cell down to time `t`.
    pub fn update(&mut self, t: f32) {
        let k = (1.0 - (t - self.time) / self.window).max(0.0);
        for cell in &mut self.table {
            cell.temp *= k;
        }
        self.time = t;
    }

    /// Count one more crawl for `hash`. Untracked domains replace the
    /// coldest cell, but only when that cell's temperature is below 1;
    /// otherwise the count is dropped silently.
    pub fn heat(&mut self, hash: u32) {
        let mut min_temp = self.table[0].temp;
        let mut i_min = 0;

        for (i, cell) in self.table.iter_mut().enumerate() {
            if cell.hash == hash {
                cell.temp += 1.0;
                return;
            }
            if cell.temp < min_temp {
                min_temp = cell.temp;
                i_min = i;
            }
        }

        if min_temp < 1.0 {
            self.table[i_min] = Cell { hash, temp: 1.0 };
        }
    }

    /// Temperature of `hash`, or 0 when untracked.
    pub fn get(&self, hash: u32) -> f32 {
        self.table
            .iter()
            .find(|cell| cell.hash == hash)
            .map(|cell| cell.temp)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heat_and_cool() {
        let mut dh = DomainTemp::new(10, 60.0);

        dh.heat(1);
        dh.heat(1);
        dh.heat(2);
        dh.heat(1000);

        assert!((dh.get(1) - 2.0).abs() < 1e-6);
        assert!((dh.get(2) - 1.0).abs() < 1e-6);
        assert!((dh.get(1000) - 1.0).abs() < 1e-6);
        assert_eq!(dh.get(3), 0.0);

        dh.update(1.0);

        let k = 1.0 - 1.0 / 60.0;
        assert!((dh.get(1) - 2.0 * k).abs() < 1e-6);
        assert!((dh.get(2) - k).abs() < 1e-6);
        assert!((dh.get(1000) - k).abs() < 1e-6);
        assert_eq!(dh.get(3), 0.0);
    }

    #[test]
    fn full_table_drops_new_domains_until_a_cell_cools() {
        let mut dh = DomainTemp::new(2, 10.0);

        dh.heat(1);
        dh.heat(2);

        // both cells are at 1.0, nothing to evict
        dh.heat(3);
        assert_eq!(dh.get(3), 0.0);

        // past the window everything cools to zero, cells become evictable
        dh.update(20.0);
        dh.heat(3);
        assert!((dh.get(3) - 1.0).abs() < 1e-6);
    }
}
