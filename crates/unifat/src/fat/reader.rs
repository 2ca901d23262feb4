//! Sequential fat container reader
//!
//! Yields the declared architectures in header table order, then probes the
//! slot right after the declared table for a hidden ARM64 record.

use super::arch::FatArch;
use super::header::{arch_header_size, decode_arch_header, decode_container_header, header_size};
use super::header::{FatArchHeader, FatHeader};
use super::source::{ReadAt, SectionReader};
use crate::cpu::HIDEABLE_CPU_TYPE;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Declared,
    Hidden,
    Done,
    Failed,
}

/// Reads the architectures of a fat container one at a time.
///
/// # Example
///
/// ```no_run
/// use unifat::FatReader;
///
/// let data = std::fs::read("universal-binary")?;
/// let mut reader = FatReader::new(&data)?;
/// while let Some(arch) = reader.next_arch()? {
///     println!("{} at {:#x} hidden={}", arch.name(), arch.header.offset, arch.hidden);
/// }
/// # Ok::<(), unifat::Error>(())
/// ```
pub struct FatReader<'a> {
    source: &'a dyn ReadAt,
    header: FatHeader,
    state: State,
    /// 1-based index of the next declared record
    next_index: u32,
    first_object_offset: Option<u64>,
}

impl<'a> FatReader<'a> {
    /// Decode the container header of `source`.
    ///
    /// # Errors
    ///
    /// - [`Error::Thin`] if `source` is a single-architecture object
    /// - [`Error::Format`] if the header is invalid
    pub fn new(source: &'a dyn ReadAt) -> Result<Self> {
        let mut r = SectionReader::new(source, 0, header_size());
        let header = decode_container_header(&mut r)?;

        Ok(Self {
            source,
            header,
            state: State::Declared,
            next_index: 1,
            first_object_offset: None,
        })
    }

    /// The container header as read from disk.
    pub fn header(&self) -> &FatHeader {
        &self.header
    }

    /// Read the next architecture, or `None` once every declared record and
    /// the optional hidden record have been returned.
    ///
    /// Decode failures are fatal: after an error every call returns `None`.
    pub fn next_arch(&mut self) -> Result<Option<FatArch<'a>>> {
        let result = match self.state {
            State::Declared if self.next_index <= self.header.nfat_arch => self.next_declared(),
            State::Declared => {
                self.state = State::Hidden;
                self.next_hidden()
            }
            State::Hidden => self.next_hidden(),
            State::Done | State::Failed => Ok(None),
        };

        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    fn slot_offset(&self, index: u32) -> u64 {
        header_size() + arch_header_size(self.header.magic) * (index as u64 - 1)
    }

    fn read_slot(&self, index: u32) -> Result<FatArchHeader> {
        let magic = self.header.magic;
        let mut r = SectionReader::new(self.source, self.slot_offset(index), arch_header_size(magic));
        decode_arch_header(&mut r, magic)
    }

    fn next_declared(&mut self) -> Result<Option<FatArch<'a>>> {
        let header = self.read_slot(self.next_index)?;
        self.next_index += 1;

        if self.first_object_offset.is_none() {
            self.first_object_offset = Some(header.offset);
        }

        Ok(Some(FatArch::from_header(self.source, header, false)))
    }

    fn next_hidden(&mut self) -> Result<Option<FatArch<'a>>> {
        self.state = State::Done;

        let slot = self.slot_offset(self.next_index);
        let first_object_offset = self.first_object_offset.unwrap_or(0);
        if slot + arch_header_size(self.header.magic) > first_object_offset {
            return Ok(None);
        }

        let header = self
            .read_slot(self.next_index)
            .map_err(|e| match e {
                Error::Format(msg) => Error::Format(format!("hidden arm64: {}", msg)),
                other => other,
            })?;

        if header.cpu_type != HIDEABLE_CPU_TYPE {
            if header.cpu_type != 0 || header.size != 0 {
                log::warn!(
                    "ignoring non-arm64 record (cputype {}) after the declared headers",
                    header.cpu_type
                );
            }
            return Ok(None);
        }

        log::debug!("found hidden arm64 at {:#x}", header.offset);
        Ok(Some(FatArch::from_header(self.source, header, true)))
    }
}

impl<'a> Iterator for FatReader<'a> {
    type Item = Result<FatArch<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_arch().transpose()
    }
}

/// A fully read container: header plus every architecture, declared then hidden.
#[derive(Debug)]
pub struct FatFile<'a> {
    pub header: FatHeader,
    pub arches: Vec<FatArch<'a>>,
}

impl<'a> FatFile<'a> {
    /// Read every architecture of the container in `source`.
    pub fn parse(source: &'a dyn ReadAt) -> Result<Self> {
        let reader = FatReader::new(source)?;
        let header = *reader.header();
        let arches = reader.collect::<Result<Vec<_>>>()?;
        Ok(Self { header, arches })
    }

    /// Whether any architecture is hidden from the declared count.
    pub fn has_hidden(&self) -> bool {
        self.arches.iter().any(|a| a.hidden)
    }

    /// Find an architecture by name, e.g. `arm64`.
    pub fn find(&self, name: &str) -> Option<&FatArch<'a>> {
        self.arches
            .iter()
            .find(|a| crate::cpu::arch_matches(name, a.header.cpu_type, a.header.cpu_subtype))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CPU_TYPE_ARM, CPU_TYPE_ARM64, CPU_TYPE_X86_64};
    use crate::fat::header::{encode_arch_header, encode_container_header, Magic};

    fn container(magic: Magic, nfat_arch: u32, arches: &[FatArchHeader], len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        encode_container_header(&mut out, &FatHeader { magic, nfat_arch }).unwrap();
        for hdr in arches {
            encode_arch_header(&mut out, hdr, magic).unwrap();
        }
        out.resize(len, 0);
        for hdr in arches {
            let start = hdr.offset as usize;
            out[start..start + hdr.size as usize].fill(hdr.cpu_type as u8);
        }
        out
    }

    fn record(cpu_type: u32, offset: u64, size: u64) -> FatArchHeader {
        FatArchHeader {
            cpu_type,
            cpu_subtype: 0,
            offset,
            size,
            align: 4,
        }
    }

    #[test]
    fn test_declared_only() {
        let data = container(
            Magic::Fat32,
            2,
            &[record(CPU_TYPE_X86_64, 0x40, 0x10), record(CPU_TYPE_ARM64, 0x50, 0x10)],
            0x60,
        );
        let fat = FatFile::parse(&data).unwrap();
        assert_eq!(fat.header.nfat_arch, 2);
        assert_eq!(fat.arches.len(), 2);
        assert!(!fat.has_hidden());
        assert_eq!(fat.arches[1].read_body().unwrap(), vec![CPU_TYPE_ARM64 as u8; 0x10]);
        assert!(fat.find("arm64").is_some());
        assert!(fat.find("armv7").is_none());
    }

    #[test]
    fn test_hidden_arm64() {
        let data = container(
            Magic::Fat32,
            1,
            &[record(CPU_TYPE_ARM, 0x40, 0x10), record(CPU_TYPE_ARM64, 0x50, 0x10)],
            0x60,
        );
        let mut reader = FatReader::new(&data).unwrap();
        assert!(!reader.next_arch().unwrap().unwrap().hidden);
        let hidden = reader.next_arch().unwrap().unwrap();
        assert!(hidden.hidden);
        assert_eq!(hidden.header.offset, 0x50);
        assert!(reader.next_arch().unwrap().is_none());
        assert!(reader.next_arch().unwrap().is_none());
    }

    #[test]
    fn test_hidden_slot_exactly_fits() {
        // slot 2 ends at 8 + 2 * 20 = 48, exactly the first body offset
        let data = container(
            Magic::Fat32,
            1,
            &[record(CPU_TYPE_ARM, 48, 0x10), record(CPU_TYPE_ARM64, 64, 0x10)],
            80,
        );
        let fat = FatFile::parse(&data).unwrap();
        assert_eq!(fat.arches.len(), 2);
        assert!(fat.arches[1].hidden);
    }

    #[test]
    fn test_no_room_for_hidden_slot() {
        let data = container(Magic::Fat64, 1, &[record(CPU_TYPE_X86_64, 40, 8)], 48);
        let fat = FatFile::parse(&data).unwrap();
        assert_eq!(fat.arches.len(), 1);
    }

    #[test]
    fn test_non_arm64_hidden_slot_ends_stream() {
        let data = container(
            Magic::Fat32,
            1,
            &[record(CPU_TYPE_ARM, 0x40, 0x10), record(CPU_TYPE_X86_64, 0x50, 0x10)],
            0x60,
        );
        let fat = FatFile::parse(&data).unwrap();
        assert_eq!(fat.arches.len(), 1);
    }

    #[test]
    fn test_truncated_table_is_fatal() {
        let mut data = Vec::new();
        encode_container_header(
            &mut data,
            &FatHeader {
                magic: Magic::Fat32,
                nfat_arch: 3,
            },
        )
        .unwrap();
        encode_arch_header(&mut data, &record(CPU_TYPE_ARM, 0x100, 0x10), Magic::Fat32).unwrap();

        let mut reader = FatReader::new(&data).unwrap();
        assert!(reader.next_arch().unwrap().is_some());
        assert!(matches!(reader.next_arch(), Err(Error::Format(_))));
        assert!(reader.next_arch().unwrap().is_none());
    }

    #[test]
    fn test_thin_and_corrupt_are_distinct() {
        let thin = vec![0xcfu8, 0xfa, 0xed, 0xfe, 0x0c, 0, 0, 0x01, 0, 0, 0, 0];
        assert!(FatReader::new(&thin).err().unwrap().is_thin());

        let corrupt = vec![0xcau8, 0xfe, 0xba, 0xbe, 0, 0, 0, 0];
        assert!(matches!(FatReader::new(&corrupt), Err(Error::Format(_))));
    }
}
