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

use crate::Result;

/// A directed edge between two pages, identified by their dense page ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub from: u64,
    pub to: u64,
}

/// A lazy, finite, restartable stream of links.
///
/// The scorers consume a stream once per iteration and call [`reset`]
/// in between, so implementations must reposition cheaply.
///
/// [`reset`]: LinkStream::reset
pub trait LinkStream {
    /// The next link, or `Ok(None)` at the end of the stream. Once an
    /// implementation has returned an error it must keep doing so.
    fn next_link(&mut self) -> Result<Option<Link>>;

    /// Reposition the stream to its first link.
    fn reset(&mut self) -> Result<()>;
}

/// An in-memory stream, for tests and small graphs.
pub struct MemLinkStream {
    links: Vec<Link>,
    pos: usize,
}

impl MemLinkStream {
    pub fn new(links: Vec<Link>) -> Self {
        Self { links, pos: 0 }
    }
}

impl From<&[(u64, u64)]> for MemLinkStream {
    fn from(edges: &[(u64, u64)]) -> Self {
        Self::new(
            edges
                .iter()
                .map(|&(from, to)| Link { from, to })
                .collect(),
        )
    }
}

impl LinkStream for MemLinkStream {
    fn next_link(&mut self) -> Result<Option<Link>> {
        let link = self.links.get(self.pos).copied();
        if link.is_some() {
            self.pos += 1;
        }
        Ok(link)
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_stream_restarts() {
        let mut stream = MemLinkStream::from([(0, 1), (1, 2)].as_slice());

        assert_eq!(stream.next_link().unwrap(), Some(Link { from: 0, to: 1 }));
        assert_eq!(stream.next_link().unwrap(), Some(Link { from: 1, to: 2 }));
        assert_eq!(stream.next_link().unwrap(), None);

        stream.reset().unwrap();
        assert_eq!(stream.next_link().unwrap(), Some(Link { from: 0, to: 1 }));
    }
}
