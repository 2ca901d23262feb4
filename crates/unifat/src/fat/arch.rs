//! A single architecture of a fat container

use super::align::segment_align_bit;
use super::header::FatArchHeader;
use super::source::{ReadAt, SectionReader};
use crate::macho::{inspect_archive, inspect_object};
use crate::{cpu, Error, Result};
use std::io::{self, Read, Seek, SeekFrom};

/// One architecture: its header record, hidden flag, and a bounded view of its body.
///
/// The body view borrows the backing source, it never copies it. Reading and
/// seeking are confined to `[offset, offset + size)` of that source.
#[derive(Debug, Clone)]
pub struct FatArch<'a> {
    pub header: FatArchHeader,
    /// Present on disk but excluded from the declared architecture count
    pub hidden: bool,
    body: SectionReader<'a>,
}

impl<'a> FatArch<'a> {
    /// Wrap an already known header and body.
    pub fn new(header: FatArchHeader, body: SectionReader<'a>) -> Self {
        Self {
            header,
            hidden: false,
            body,
        }
    }

    /// View the record `header` describes within `source`.
    pub(crate) fn from_header(source: &'a dyn ReadAt, header: FatArchHeader, hidden: bool) -> Self {
        Self {
            header,
            hidden,
            body: SectionReader::new(source, header.offset, header.size),
        }
    }

    /// Describe `size` bytes at `offset` of `source` as an architecture to write.
    ///
    /// The range is inspected as a thin Mach-O object first, then as a static
    /// archive whose first object member provides the CPU identifiers and
    /// segments. The alignment is inferred from the segment addresses, the
    /// size always covers the whole range.
    ///
    /// # Errors
    ///
    /// Returns an error if the range cannot be read or is neither an object
    /// nor an archive of objects.
    pub fn describe(source: &'a dyn ReadAt, offset: u64, size: u64) -> Result<Self> {
        let body = SectionReader::new(source, offset, size);

        let len = usize::try_from(size)
            .map_err(|_| Error::Config(format!("{} bytes do not fit in memory", size)))?;
        let mut data = vec![0u8; len];
        body.read_exact_at(&mut data, 0)?;

        let info = match inspect_object(&data) {
            Ok(info) => info,
            Err(object_err) => inspect_archive(&data).map_err(|archive_err| {
                Error::MachO(format!("{}; {}", object_err, archive_err))
            })?,
        };

        let header = FatArchHeader {
            cpu_type: info.cpu_type,
            cpu_subtype: info.cpu_subtype,
            offset: 0,
            size,
            align: segment_align_bit(&info),
        };
        log::debug!(
            "described {} size {:#x} align 2^{}",
            cpu::arch_name(header.cpu_type, header.cpu_subtype),
            size,
            header.align
        );

        Ok(Self::new(header, body))
    }

    /// Describe an entire in-memory object or archive.
    pub fn from_bytes<T: ReadAt + AsRef<[u8]>>(data: &'a T) -> Result<Self> {
        let len = data.as_ref().len() as u64;
        Self::describe(data, 0, len)
    }

    /// Architecture name, e.g. `arm64`.
    pub fn name(&self) -> String {
        cpu::arch_name(self.header.cpu_type, self.header.cpu_subtype)
    }

    /// Size of the body in bytes.
    pub fn size(&self) -> u64 {
        self.header.size
    }

    /// Bounded view of the body, with its own cursor.
    pub fn body(&self) -> SectionReader<'a> {
        self.body.subsection(0, self.body.len())
    }

    /// Read the whole body into memory.
    pub fn read_body(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.body().read_to_end(&mut data)?;
        if (data.len() as u64) < self.header.size {
            return Err(Error::Format(format!(
                "{} body is truncated: {} of {} bytes",
                self.name(),
                data.len(),
                self.header.size
            )));
        }
        Ok(data)
    }
}

impl Read for FatArch<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl Seek for FatArch<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.body.seek(pos)
    }
}

impl ReadAt for FatArch<'_> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.body.read_at(buf, offset)
    }
}
