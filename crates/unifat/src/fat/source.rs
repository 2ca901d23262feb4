//! Random-access byte sources and bounded views over them

use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Positional reads without a shared cursor.
///
/// Several [`SectionReader`]s may read from the same source at once. Sources
/// used concurrently must tolerate concurrent `read_at` calls; every
/// implementation in this crate does.
pub trait ReadAt {
    /// Reads up to `buf.len()` bytes starting at `offset`. Returns 0 at end of source.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Fills `buf` from `offset` or fails with [`io::ErrorKind::UnexpectedEof`].
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = match usize::try_from(offset) {
            Ok(start) if start < self.len() => start,
            _ => return Ok(0),
        };
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

impl ReadAt for Mmap {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self[..].read_at(buf, offset)
    }
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

/// A bounded, non-owning view over `[base, base + len)` of a source.
///
/// Reads and seeks are confined to the view; the cursor is private to each
/// view, so cloning yields an independent reader over the same bytes.
#[derive(Clone)]
pub struct SectionReader<'a> {
    source: &'a dyn ReadAt,
    base: u64,
    len: u64,
    pos: u64,
}

impl<'a> SectionReader<'a> {
    /// Create a view of `len` bytes starting at `base`.
    pub fn new(source: &'a dyn ReadAt, base: u64, len: u64) -> Self {
        Self {
            source,
            base,
            len,
            pos: 0,
        }
    }

    /// Offset of the view within its source.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Length of the view in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Narrow this view to `[offset, offset + len)` relative to its own start.
    pub fn subsection(&self, offset: u64, len: u64) -> SectionReader<'a> {
        let offset = offset.min(self.len);
        let len = len.min(self.len - offset);
        SectionReader::new(self.source, self.base + offset, len)
    }
}

impl std::fmt::Debug for SectionReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionReader")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

impl ReadAt for SectionReader<'_> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let remaining = self.len - offset;
        let n = (buf.len() as u64).min(remaining) as usize;
        self.source.read_at(&mut buf[..n], self.base + offset)
    }
}

impl Read for SectionReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = <Self as ReadAt>::read_at(self, buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SectionReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_read_at() {
        let data = [1u8, 2, 3, 4, 5];
        let mut buf = [0u8; 3];
        assert_eq!(data[..].read_at(&mut buf, 3).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(data[..].read_at(&mut buf, 5).unwrap(), 0);
        assert_eq!(data[..].read_at(&mut buf, u64::MAX).unwrap(), 0);
    }

    #[test]
    fn test_section_bounds() {
        let data: Vec<u8> = (0u8..32).collect();
        let mut section = SectionReader::new(&data, 8, 4);

        let mut out = Vec::new();
        section.read_to_end(&mut out).unwrap();
        assert_eq!(out, [8, 9, 10, 11]);

        section.seek(SeekFrom::Start(2)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(section.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[10, 11]);

        assert_eq!(section.seek(SeekFrom::End(-1)).unwrap(), 3);
        assert!(section.seek(SeekFrom::Current(-10)).is_err());
    }

    #[test]
    fn test_independent_cursors() {
        let data: Vec<u8> = (0u8..16).collect();
        let mut a = SectionReader::new(&data, 0, 16);
        let mut buf = [0u8; 4];
        a.read_exact(&mut buf).unwrap();

        let mut b = a.clone();
        b.seek(SeekFrom::Start(0)).unwrap();
        b.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);

        a.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6, 7]);
    }

    #[test]
    fn test_read_exact_at_past_end() {
        let data = vec![0u8; 4];
        let section = SectionReader::new(&data, 2, 8);
        let mut buf = [0u8; 4];
        let err = section.read_exact_at(&mut buf, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_subsection() {
        let data: Vec<u8> = (0u8..16).collect();
        let outer = SectionReader::new(&data, 4, 8);
        let mut inner = outer.subsection(2, 100);
        assert_eq!(inner.base(), 6);
        assert_eq!(inner.len(), 6);
        let mut out = Vec::new();
        inner.read_to_end(&mut out).unwrap();
        assert_eq!(out, [6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_file_read_at() {
        use std::io::Write;

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"universal").unwrap();
        let mut buf = [0u8; 3];
        file.read_exact_at(&mut buf, 3).unwrap();
        assert_eq!(&buf, b"ver");
    }
}
