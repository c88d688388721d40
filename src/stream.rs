//! Random-access streaming over provider-native entry streams.
//!
//! Archive-backed entries are often readable only as a forward,
//! sequentially-decompressed byte stream, while consumers expect a
//! conventional `Read + Seek` contract. [`VirtualFileStream`] bridges the
//! two: it tracks a logical position bounded to `[0, length)` and maps
//! every seek onto what the underlying [`ProviderStream`] can actually do
//! — native repositioning when the backend is random-access, forward
//! discarding otherwise, and a restart-from-entry-start plus fast-forward
//! for backward seeks over forward-only decompression. A backward seek is
//! therefore potentially expensive on compressed entries, but it is never
//! silently wrong.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::VfsError;
use crate::provider::ProviderStream;

/// A bounded window into a file, starting at `base` and spanning `len`
/// bytes.
///
/// This is the [`ProviderStream`] for every backend whose entry content
/// sits uncompressed at a known offset: native files (the whole file) and
/// stored archive entries (a slice of the container). Fully random-access.
pub struct FileRegionStream {
    file: File,
    base: u64,
    len: u64,
    pos: u64,
}

impl FileRegionStream {
    /// Open `physical` and position the stream at the start of the region.
    pub fn open(physical: &Path, base: u64, len: u64) -> Result<Self, VfsError> {
        let mut file = File::open(physical)?;
        file.seek(SeekFrom::Start(base))?;
        Ok(Self {
            file,
            base,
            len,
            pos: 0,
        })
    }
}

impl Read for FileRegionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len - self.pos;
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let read = self.file.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl ProviderStream for FileRegionStream {
    fn len(&self) -> u64 {
        self.len
    }

    fn is_random_access(&self) -> bool {
        true
    }

    fn seek_to(&mut self, offset: u64) -> Result<(), VfsError> {
        self.file.seek(SeekFrom::Start(self.base + offset))?;
        self.pos = offset;
        Ok(())
    }

    fn restart(&mut self) -> Result<(), VfsError> {
        self.seek_to(0)
    }
}

/// Uniform random-access read stream over a virtual file.
///
/// Implements [`Read`] and [`Seek`] bounded to the entry's uncompressed
/// length: reads clamp to the remaining logical bytes and return `Ok(0)`
/// at the end of the *entry*, not the end of the container; seeks resolve
/// against start/current/end and reject targets outside `[0, length]`.
///
/// The stream is read-only by construction — it implements no write or
/// flush surface, matching the read-only nature of archive-backed mounts.
pub struct VirtualFileStream {
    inner: Box<dyn ProviderStream>,
    /// Logical 0-based position within the entry.
    position: u64,
    /// Uncompressed entry length.
    length: u64,
}

impl VirtualFileStream {
    pub(crate) fn new(inner: Box<dyn ProviderStream>) -> Self {
        let length = inner.len();
        Self {
            inner,
            position: 0,
            length,
        }
    }

    /// Uncompressed length of the file in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current logical position within the file.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the underlying stream to `target`, using the cheapest
    /// mechanism the backend supports.
    fn reposition(&mut self, target: u64) -> io::Result<()> {
        if target == self.position {
            return Ok(());
        }
        if self.inner.is_random_access() {
            self.inner.seek_to(target)?;
        } else if target > self.position {
            self.discard(target - self.position)?;
        } else {
            // Forward-only backend: re-open from the entry start and
            // fast-forward to the target.
            self.inner.restart()?;
            self.discard(target)?;
        }
        self.position = target;
        Ok(())
    }

    /// Read and drop `count` bytes from the underlying stream.
    fn discard(&mut self, mut count: u64) -> io::Result<()> {
        let mut sink = [0u8; 8192];
        while count > 0 {
            let want = count.min(sink.len() as u64) as usize;
            let read = self.inner.read(&mut sink[..want])?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "entry content ended before the seek target",
                ));
            }
            count -= read as u64;
        }
        Ok(())
    }
}

impl Read for VirtualFileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length - self.position;
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let read = self.inner.read(&mut buf[..want])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl Seek for VirtualFileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.length as i128 + delta as i128,
        };
        if target < 0 || target > self.length as i128 {
            return Err(VfsError::NotSupported("seek outside the stream bounds").into());
        }
        self.reposition(target as u64)?;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Forward-only test stream: rejects `seek_to`, supports `restart`.
    struct ForwardOnly {
        data: Vec<u8>,
        pos: usize,
    }

    impl ForwardOnly {
        fn new(data: Vec<u8>) -> Self {
            Self { data, pos: 0 }
        }
    }

    impl Read for ForwardOnly {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let remaining = &self.data[self.pos..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl ProviderStream for ForwardOnly {
        fn len(&self) -> u64 {
            self.data.len() as u64
        }
        fn is_random_access(&self) -> bool {
            false
        }
        fn seek_to(&mut self, _offset: u64) -> Result<(), VfsError> {
            Err(VfsError::NotSupported("forward-only stream"))
        }
        fn restart(&mut self) -> Result<(), VfsError> {
            self.pos = 0;
            Ok(())
        }
    }

    fn content(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn read_to_end_stops_at_length() {
        let mut stream = VirtualFileStream::new(Box::new(ForwardOnly::new(content(1000))));
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, content(1000));
        assert_eq!(stream.position(), 1000);

        // At the logical end, reads return 0.
        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seek_to_start_and_reread_is_identical() {
        let mut stream = VirtualFileStream::new(Box::new(ForwardOnly::new(content(512))));
        let mut first = Vec::new();
        stream.read_to_end(&mut first).unwrap();

        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut second = Vec::new();
        stream.read_to_end(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn backward_seek_restarts_forward_only_stream() {
        let data = content(300);
        let mut stream = VirtualFileStream::new(Box::new(ForwardOnly::new(data.clone())));

        let mut buf = vec![0u8; 200];
        stream.read_exact(&mut buf).unwrap();

        stream.seek(SeekFrom::Start(50)).unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, &data[50..]);
    }

    #[test]
    fn forward_seek_discards_without_restart() {
        let data = content(300);
        let mut stream = VirtualFileStream::new(Box::new(ForwardOnly::new(data.clone())));

        stream.seek(SeekFrom::Start(250)).unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, &data[250..]);
    }

    #[test]
    fn seek_from_end_and_current() {
        let mut stream = VirtualFileStream::new(Box::new(ForwardOnly::new(content(100))));
        assert_eq!(stream.seek(SeekFrom::End(-10)).unwrap(), 90);
        assert_eq!(stream.seek(SeekFrom::Current(-40)).unwrap(), 50);
        assert_eq!(stream.seek(SeekFrom::Current(25)).unwrap(), 75);
    }

    #[test]
    fn seek_outside_bounds_is_rejected() {
        let mut stream = VirtualFileStream::new(Box::new(ForwardOnly::new(content(100))));
        assert!(stream.seek(SeekFrom::Start(101)).is_err());
        assert!(stream.seek(SeekFrom::Current(-1)).is_err());
        assert!(stream.seek(SeekFrom::End(1)).is_err());
        // Seeking exactly to the end is allowed; reads there return 0.
        assert_eq!(stream.seek(SeekFrom::End(0)).unwrap(), 100);
        let mut buf = [0u8; 1];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn file_region_stream_is_bounded() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.bin");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"prefix-CONTENT-suffix").unwrap();
        drop(file);

        let mut region = FileRegionStream::open(&path, 7, 7).unwrap();
        let mut out = Vec::new();
        region.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"CONTENT");

        region.seek_to(3).unwrap();
        let mut rest = Vec::new();
        region.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"TENT");
        assert!(region.is_random_access());
    }
}
