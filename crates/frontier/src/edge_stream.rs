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

//! Reading and writing bulk edge dumps.
//!
//! An edge dump is an lz4 frame container whose payload is a sequence of
//! `(delta from, delta to)` pairs, each a zig-zag varint against the
//! previous absolute edge. Deltas between consecutive edges of a sorted
//! dump are tiny, so the combination of delta coding and lz4 compresses a
//! web-scale link graph to a few bytes per edge.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::bail;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};

use crate::link_stream::{Link, LinkStream};
use crate::{varint, Result};

const BUF_SIZE: usize = 64 * 1024;

/// Read/write cursor over a sliding byte window. Consumed bytes are
/// reclaimed by compacting the unread tail to the front before refills.
pub struct ByteBuf {
    buf: Vec<u8>,
    size: usize,
    read: usize,
}

impl ByteBuf {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            size: 0,
            read: 0,
        }
    }

    pub fn unread(&self) -> usize {
        self.size - self.read
    }

    pub fn unread_slice(&self) -> &[u8] {
        &self.buf[self.read..self.size]
    }

    pub fn consume(&mut self, n: usize) {
        self.read = (self.read + n).min(self.size);
    }

    fn compact(&mut self) {
        if self.read > 0 {
            self.buf.copy_within(self.read..self.size, 0);
            self.size -= self.read;
            self.read = 0;
        }
    }

    /// Compact, then fill the free tail from `reader`. Returns the number
    /// of bytes read; 0 means the reader is exhausted.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        self.compact();
        let n = reader.read(&mut self.buf[self.size..])?;
        self.size += n;
        Ok(n)
    }
}

/// Streams absolute `(from, to)` links out of an edge dump.
///
/// After an error the stream is terminal: every further call fails.
pub struct EdgeStream {
    path: PathBuf,
    decoder: FrameDecoder<BufReader<File>>,
    buf: ByteBuf,
    from: i64,
    to: i64,
    failed: bool,
}

impl EdgeStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            decoder: FrameDecoder::new(BufReader::new(file)),
            buf: ByteBuf::with_capacity(BUF_SIZE),
            from: 0,
            to: 0,
            failed: false,
        })
    }

    fn next_delta(&mut self) -> Result<Option<i64>> {
        loop {
            if let Some((delta, read)) = varint::decode_i64(self.buf.unread_slice()) {
                self.buf.consume(read);
                return Ok(Some(delta));
            }

            if self.buf.unread() >= varint::MAX_LEN {
                bail!("corrupt varint in edge stream");
            }

            if self.buf.fill_from(&mut self.decoder)? == 0 {
                if self.buf.unread() == 0 {
                    return Ok(None);
                }
                bail!("truncated edge stream");
            }
        }
    }

    fn decode_next(&mut self) -> Result<Option<Link>> {
        let delta_from = match self.next_delta()? {
            Some(delta) => delta,
            None => return Ok(None),
        };
        let delta_to = match self.next_delta()? {
            Some(delta) => delta,
            None => bail!("edge stream ends in the middle of a pair"),
        };

        self.from += delta_from;
        self.to += delta_to;

        if self.from < 0 || self.to < 0 {
            bail!("edge stream produced a negative page id");
        }

        Ok(Some(Link {
            from: self.from as u64,
            to: self.to as u64,
        }))
    }
}

impl LinkStream for EdgeStream {
    fn next_link(&mut self) -> Result<Option<Link>> {
        if self.failed {
            bail!("edge stream is in a failed state");
        }

        match self.decode_next() {
            Ok(link) => Ok(link),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        let file = File::open(&self.path)?;
        self.decoder = FrameDecoder::new(BufReader::new(file));
        self.buf = ByteBuf::with_capacity(BUF_SIZE);
        self.from = 0;
        self.to = 0;
        self.failed = false;
        Ok(())
    }
}

/// The matching encoder, used by the link-dump tool.
pub struct EdgeStreamWriter<W: Write> {
    encoder: FrameEncoder<W>,
    from: i64,
    to: i64,
    scratch: Vec<u8>,
}

impl<W: Write> EdgeStreamWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            encoder: FrameEncoder::new(writer),
            from: 0,
            to: 0,
            scratch: Vec::with_capacity(2 * varint::MAX_LEN),
        }
    }

    pub fn write_link(&mut self, link: Link) -> Result<()> {
        let from = i64::try_from(link.from)?;
        let to = i64::try_from(link.to)?;

        self.scratch.clear();
        varint::encode_i64(from - self.from, &mut self.scratch);
        varint::encode_i64(to - self.to, &mut self.scratch);
        self.encoder.write_all(&self.scratch)?;

        self.from = from;
        self.to = to;
        Ok(())
    }

    pub fn finish(self) -> Result<W> {
        Ok(self.encoder.finish()?)
    }
}
