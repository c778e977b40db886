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

//! A typed, growable, memory-mapped array of fixed-size records.
//!
//! The backing region is either a file on disk or an anonymous mapping.
//! Growth resizes the backing file and re-maps, so callers must not hold
//! raw pointers into the region across a [`MmapArray::resize`]. A
//! file-backed array removes its file on drop unless it is marked
//! persistent.

use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use memmap2::MmapMut;

use crate::{ConstSerializable, Result};

/// Expected access pattern, forwarded to the kernel as a hint.
/// Hints are best-effort and ignored on platforms without `madvise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPattern {
    Normal,
    Sequential,
    Random,
}

pub struct MmapArray<T> {
    mmap: MmapMut,
    len: usize,
    file: Option<File>,
    path: Option<PathBuf>,
    persist: bool,
    _marker: PhantomData<T>,
}

impl<T> MmapArray<T>
where
    T: ConstSerializable,
{
    /// Open a file-backed array with capacity for `len` elements. The file
    /// is created (or extended) as needed. Existing contents are kept.
    pub fn open<P: AsRef<Path>>(path: P, len: usize) -> Result<Self> {
        let len = len.max(1);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        let bytes = (len * T::BYTES) as u64;
        if file.metadata()?.len() < bytes {
            file.set_len(bytes)?;
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            mmap,
            len,
            file: Some(file),
            path: Some(path.as_ref().to_path_buf()),
            persist: false,
            _marker: PhantomData,
        })
    }

    /// Create an anonymous (transient, zero-initialized) array of `len` elements.
    pub fn anonymous(len: usize) -> Result<Self> {
        let len = len.max(1);
        let mmap = MmapMut::map_anon(len * T::BYTES)?;

        Ok(Self {
            mmap,
            len,
            file: None,
            path: None,
            persist: false,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> Result<T> {
        if i >= self.len {
            return Err(self.out_of_bounds(i));
        }
        let start = i * T::BYTES;
        Ok(T::deserialize(&self.mmap[start..start + T::BYTES]))
    }

    pub fn set(&mut self, i: usize, value: &T) -> Result<()> {
        if i >= self.len {
            return Err(self.out_of_bounds(i));
        }
        let start = i * T::BYTES;
        value.serialize(&mut self.mmap[start..start + T::BYTES]);
        Ok(())
    }

    fn out_of_bounds(&self, i: usize) -> anyhow::Error {
        anyhow!("index {} out of bounds (len: {})", i, self.len)
    }

    /// Grow (or shrink) the array to `len` elements. New elements are zeroed.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        let len = len.max(1);
        let new_bytes = len * T::BYTES;

        match &self.file {
            Some(file) => {
                self.mmap.flush()?;
                file.set_len(new_bytes as u64)?;
                self.mmap = unsafe { MmapMut::map_mut(file)? };
            }
            None => {
                let mut mmap = MmapMut::map_anon(new_bytes)?;
                let keep = self.mmap.len().min(new_bytes);
                mmap[..keep].copy_from_slice(&self.mmap[..keep]);
                self.mmap = mmap;
            }
        }

        self.len = len;
        Ok(())
    }

    pub fn zero(&mut self) {
        self.mmap.fill(0);
    }

    /// Hint the expected access pattern to the kernel. Unsupported
    /// platforms and kernel refusals are silently tolerated.
    pub fn advise(&self, pattern: AccessPattern) {
        #[cfg(unix)]
        {
            let advice = match pattern {
                AccessPattern::Normal => memmap2::Advice::Normal,
                AccessPattern::Sequential => memmap2::Advice::Sequential,
                AccessPattern::Random => memmap2::Advice::Random,
            };
            if let Err(err) = self.mmap.advise(advice) {
                tracing::debug!("madvise hint ignored: {err}");
            }
        }
        #[cfg(not(unix))]
        {
            let _ = pattern;
        }
    }

    /// Flush the mapped region to its backing file.
    pub fn sync(&self) -> Result<()> {
        if self.file.is_some() {
            self.mmap.flush()?;
        }
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// If false (the default), the backing file is removed on drop.
    pub fn set_persist(&mut self, persist: bool) {
        self.persist = persist;
    }
}

impl<T> Drop for MmapArray<T> {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if self.persist {
                if let Err(err) = self.mmap.flush() {
                    tracing::warn!("failed to flush mmap array: {err}");
                }
            } else if let Err(err) = std::fs::remove_file(path) {
                tracing::warn!("failed to remove mmap array file: {err}");
            }
        }
    }
}

/// Bulk-load helper used by the frequency seeding tools.
pub fn from_iter<T, P, I>(path: P, items: I) -> Result<MmapArray<T>>
where
    T: ConstSerializable,
    P: AsRef<Path>,
    I: IntoIterator<Item = T>,
{
    let mut arr = MmapArray::open(path, 1)?;
    let mut n = 0;

    for item in items {
        if n >= arr.len() {
            let len = arr.len();
            arr.resize(2 * len)?;
        }
        arr.set(n, &item)?;
        n += 1;
    }

    if n == 0 {
        bail!("cannot build mmap array from an empty iterator");
    }

    arr.resize(n)?;
    Ok(arr)
}
