//! Seekable reader over one resource, serving one active range at a time

use bytes::Bytes;
use rand::Rng;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::{parse_ranges, ByteRange, ServedRange};
use crate::http::ContentReader;

/// Backing storage of an inode
#[derive(Debug)]
pub enum InodeSource {
    File(File),
    /// Generated content kept in memory
    Bytes(Bytes),
}

/// An open resource: handle, position, requested ranges, active window
#[derive(Debug)]
pub struct Inode {
    source: Option<InodeSource>,
    size: u64,
    position: u64,
    ranges: Vec<ByteRange>,
    active: usize,
    boundary: Option<String>,
    window: ServedRange,
}

impl Inode {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self::with_source(InodeSource::File(file), size))
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::with_source(InodeSource::Bytes(data), size)
    }

    fn with_source(source: InodeSource, size: u64) -> Self {
        Self {
            source: Some(source),
            size,
            position: 0,
            ranges: Vec::new(),
            active: 0,
            boundary: None,
            window: ServedRange::whole(size),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append the ranges named by a `Range` header; the first becomes active
    ///
    /// Returns false when the header yields no range. A boundary token is
    /// minted once more than one range is known.
    pub fn parse_ranges(&mut self, value: &str) -> bool {
        let Ok(parsed) = parse_ranges(value) else {
            return false;
        };
        if self.ranges.is_empty() {
            self.active = 0;
        }
        self.ranges.extend(parsed);
        if self.ranges.len() > 1 && self.boundary.is_none() {
            self.boundary = Some(format!("{:016x}", rand::thread_rng().gen::<u64>()));
        }
        true
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn active_range(&self) -> Option<&ByteRange> {
        self.ranges.get(self.active)
    }

    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// Restrict reads to `window`
    pub fn select(&mut self, window: ServedRange) {
        self.window = window;
    }

    pub fn window(&self) -> ServedRange {
        self.window
    }

    /// Read from `window.start + offset`, bounded by the window; 0 at end or when closed
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let remaining = self.window.len().saturating_sub(offset);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(remaining.min(usize::MAX as u64) as usize);
        let target = self.window.start + offset;

        let read = match self.source.as_mut() {
            None => return Ok(0),
            Some(InodeSource::Bytes(data)) => {
                let start = target as usize;
                let end = (start + want).min(data.len());
                if start >= end {
                    return Ok(0);
                }
                buf[..end - start].copy_from_slice(&data[start..end]);
                end - start
            }
            Some(InodeSource::File(file)) => {
                if self.position != target {
                    file.seek(SeekFrom::Start(target))?;
                    self.position = target;
                }
                file.read(&mut buf[..want])?
            }
        };

        self.position = target + read as u64;
        Ok(read)
    }

    pub fn close(&mut self) {
        self.source = None;
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}

impl ContentReader for Inode {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf, offset)
    }

    fn len(&self) -> u64 {
        self.window.len()
    }
}
