//! Fat (universal) container reading and writing.
//!
//! A fat container bundles several single-architecture Mach-O objects behind
//! a big-endian header table. Layout, ordering and the hidden ARM64
//! convention follow Apple's `lipo`.

pub mod align;
pub mod arch;
pub mod header;
pub mod order;
pub mod reader;
pub mod source;
pub mod writer;

pub use arch::FatArch;
pub use header::{FatArchHeader, FatHeader, Magic, FAT_MAGIC_64};
pub use reader::{FatFile, FatReader};
pub use source::{ReadAt, SectionReader};
pub use writer::{build_header, create, FatWriter};

/// Largest alignment exponent a fat container accepts (2^15)
pub const ALIGN_BIT_MAX: u32 = 15;
