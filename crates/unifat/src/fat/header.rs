//! Fat container header encoding
//!
//! Every field is stored big-endian regardless of the host or the byte order
//! of the bundled objects.
//!
//! ## Structure
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ fat_header (8 bytes)                 │
//! │  - magic: 0xcafebabe / 0xcafebabf    │
//! │  - nfat_arch: declared count         │
//! ├──────────────────────────────────────┤
//! │ fat_arch (20 bytes) / fat_arch_64    │
//! │ (32 bytes), one per architecture     │
//! │  - cputype (4)                       │
//! │  - cpusubtype (4)                    │
//! │  - offset (4 / 8)                    │
//! │  - size (4 / 8)                      │
//! │  - align (4)                         │
//! │  - reserved (4, fat_arch_64 only)    │
//! ├──────────────────────────────────────┤
//! │ padding + architecture bodies        │
//! └──────────────────────────────────────┘
//! ```

use crate::{Error, Result};
use goblin::mach::fat::FAT_MAGIC;
use goblin::mach::header::{MH_CIGAM, MH_CIGAM_64, MH_MAGIC, MH_MAGIC_64};
use std::io::{self, Read, Write};

/// Magic of the 64-bit fat header variant
pub const FAT_MAGIC_64: u32 = 0xcafebabf;

/// Size of fat_header (magic + nfat_arch)
const FAT_HEADER_SIZE: u64 = 8;

/// Size of fat_arch
const FAT_ARCH_SIZE: u64 = 20;

/// Size of fat_arch_64
const FAT_ARCH_64_SIZE: u64 = 32;

/// Thin object magics as they look when read big-endian and byte swapped.
const THIN_MAGICS: [u32; 4] = [MH_MAGIC, MH_MAGIC_64, MH_CIGAM, MH_CIGAM_64];

/// Discriminates the two on-disk header shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magic {
    /// `FAT_MAGIC`, 32-bit offsets and sizes
    Fat32,
    /// `FAT_MAGIC_64`, 64-bit offsets and sizes
    Fat64,
}

impl Magic {
    /// Maps a raw magic value to a header shape.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            FAT_MAGIC => Some(Magic::Fat32),
            FAT_MAGIC_64 => Some(Magic::Fat64),
            _ => None,
        }
    }

    /// Raw on-disk magic value.
    pub fn to_u32(self) -> u32 {
        match self {
            Magic::Fat32 => FAT_MAGIC,
            Magic::Fat64 => FAT_MAGIC_64,
        }
    }
}

/// Container header: magic and declared architecture count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatHeader {
    pub magic: Magic,
    /// Number of architectures advertised to readers. May be lower than the
    /// number physically present when ARM64 is hidden.
    pub nfat_arch: u32,
}

/// One architecture record of the header table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatArchHeader {
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    /// Offset of the body from the start of the container
    pub offset: u64,
    /// Size of the body in bytes
    pub size: u64,
    /// Alignment of the body offset as a power of two
    pub align: u32,
}

/// Size of the container header in bytes.
pub fn header_size() -> u64 {
    FAT_HEADER_SIZE
}

/// Size of one architecture record for the given header shape.
pub fn arch_header_size(magic: Magic) -> u64 {
    match magic {
        Magic::Fat32 => FAT_ARCH_SIZE,
        Magic::Fat64 => FAT_ARCH_64_SIZE,
    }
}

/// Decodes the container header.
///
/// # Errors
///
/// - [`Error::Thin`] if the magic is a single-architecture Mach-O magic
/// - [`Error::Format`] if the magic is unreadable or unknown, or the
///   container declares no architectures
pub fn decode_container_header<R: Read + ?Sized>(r: &mut R) -> Result<FatHeader> {
    let raw = read_u32(r).map_err(|_| Error::Format("error reading magic number".into()))?;

    let magic = match Magic::from_u32(raw) {
        Some(magic) => magic,
        None if THIN_MAGICS.contains(&raw.swap_bytes()) => return Err(Error::Thin),
        None => return Err(Error::Format("invalid magic number".into())),
    };

    let nfat_arch = read_u32(r).map_err(|_| Error::Format("invalid fat_header".into()))?;
    if nfat_arch < 1 {
        return Err(Error::Format("file contains no images".into()));
    }

    Ok(FatHeader { magic, nfat_arch })
}

/// Decodes one architecture record in the layout selected by `magic`.
pub fn decode_arch_header<R: Read + ?Sized>(r: &mut R, magic: Magic) -> Result<FatArchHeader> {
    match magic {
        Magic::Fat64 => read_fat_arch_64(r)
            .map_err(|_| Error::Format("invalid fat arch64 header".into())),
        Magic::Fat32 => read_fat_arch(r).map_err(|_| Error::Format("invalid fat arch header".into())),
    }
}

fn read_fat_arch<R: Read + ?Sized>(r: &mut R) -> io::Result<FatArchHeader> {
    Ok(FatArchHeader {
        cpu_type: read_u32(r)?,
        cpu_subtype: read_u32(r)?,
        offset: read_u32(r)? as u64,
        size: read_u32(r)? as u64,
        align: read_u32(r)?,
    })
}

fn read_fat_arch_64<R: Read + ?Sized>(r: &mut R) -> io::Result<FatArchHeader> {
    let hdr = FatArchHeader {
        cpu_type: read_u32(r)?,
        cpu_subtype: read_u32(r)?,
        offset: read_u64(r)?,
        size: read_u64(r)?,
        align: read_u32(r)?,
    };
    let _reserved = read_u32(r)?;
    Ok(hdr)
}

/// Encodes the container header.
pub fn encode_container_header<W: Write + ?Sized>(w: &mut W, hdr: &FatHeader) -> io::Result<()> {
    w.write_all(&hdr.magic.to_u32().to_be_bytes())?;
    w.write_all(&hdr.nfat_arch.to_be_bytes())
}

/// Encodes one architecture record. The 64-bit layout carries a zero reserved field.
///
/// Fails with [`io::ErrorKind::InvalidInput`] when a 32-bit record cannot hold
/// the offset or size.
pub fn encode_arch_header<W: Write + ?Sized>(
    w: &mut W,
    hdr: &FatArchHeader,
    magic: Magic,
) -> io::Result<()> {
    let mut buf = Vec::with_capacity(FAT_ARCH_64_SIZE as usize);
    buf.extend(&hdr.cpu_type.to_be_bytes());
    buf.extend(&hdr.cpu_subtype.to_be_bytes());

    match magic {
        Magic::Fat64 => {
            buf.extend(&hdr.offset.to_be_bytes());
            buf.extend(&hdr.size.to_be_bytes());
            buf.extend(&hdr.align.to_be_bytes());
            buf.extend(&0u32.to_be_bytes());
        }
        Magic::Fat32 => {
            buf.extend(&to_u32(hdr.offset)?.to_be_bytes());
            buf.extend(&to_u32(hdr.size)?.to_be_bytes());
            buf.extend(&hdr.align.to_be_bytes());
        }
    }

    w.write_all(&buf)
}

fn to_u32(value: u64) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{value:#x} does not fit a 32-bit fat_arch field"),
        )
    })
}

fn read_u32<R: Read + ?Sized>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64<R: Read + ?Sized>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}
