//! Fat container writer
//!
//! Writing is split into a plan phase (validation, ordering and offset
//! assignment) and an emit phase (header, header table, padded bodies).
//! Every failure that can be known in advance is raised by the plan phase,
//! so nothing is written for an invalid architecture set.

use super::arch::FatArch;
use super::header::{
    arch_header_size, encode_arch_header, encode_container_header, header_size, FatHeader, Magic,
};
use super::order::plan;
use crate::cpu::{HIDEABLE_CPU_TYPE, HIDE_COMPANION_CPU_TYPE};
use crate::error::{ValidationError, WritePhase};
use crate::{Error, Result};
use std::io::{self, BufWriter, Read, Write};

/// Fat container writer with builder pattern configuration.
///
/// # Example
///
/// ```no_run
/// use unifat::{FatArch, FatWriter};
///
/// let arm64 = std::fs::read("app-arm64")?;
/// let x86_64 = std::fs::read("app-x86_64")?;
/// let arches = vec![FatArch::from_bytes(&arm64)?, FatArch::from_bytes(&x86_64)?];
///
/// let out = std::fs::File::create("app")?;
/// FatWriter::new().fat64(false).create(out, arches)?;
/// # Ok::<(), unifat::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FatWriter {
    fat64: bool,
    hide_arm64: bool,
}

impl FatWriter {
    /// Create a writer producing 32-bit containers without hidden architectures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the 64-bit header layout, needed once any body ends past 4 GiB.
    pub fn fat64(mut self, fat64: bool) -> Self {
        self.fat64 = fat64;
        self
    }

    /// Hide ARM64 architectures from the declared count.
    ///
    /// Only applies when a 32-bit ARM architecture is also present. Older
    /// iOS loaders then see the ARM slices only.
    pub fn hide_arm64(mut self, hide_arm64: bool) -> Self {
        self.hide_arm64 = hide_arm64;
        self
    }

    /// Header magic selected by this configuration.
    pub fn magic(&self) -> Magic {
        if self.fat64 {
            Magic::Fat64
        } else {
            Magic::Fat32
        }
    }

    /// Container header that [`FatWriter::create`] would write for `arches`.
    pub fn build_header(&self, arches: &[FatArch<'_>]) -> FatHeader {
        build_header(arches, self.magic(), self.hide_arm64)
    }

    /// Write `arches` as a fat container to `output`.
    ///
    /// See [`create`].
    pub fn create<W: Write>(&self, output: W, arches: Vec<FatArch<'_>>) -> Result<FatHeader> {
        create(output, arches, self.magic(), self.hide_arm64)
    }
}

/// Build the container header for `arches`.
///
/// The declared count is the number of architectures, minus the ARM64 ones
/// when `hide_arm64` is requested and a 32-bit ARM architecture is present.
pub fn build_header(arches: &[FatArch<'_>], magic: Magic, hide_arm64: bool) -> FatHeader {
    let total = arches.len() as u32;

    let has_companion = arches
        .iter()
        .any(|a| a.header.cpu_type == HIDE_COMPANION_CPU_TYPE);
    let hidden = if hide_arm64 && has_companion {
        arches
            .iter()
            .filter(|a| a.header.cpu_type == HIDEABLE_CPU_TYPE)
            .count() as u32
    } else {
        if hide_arm64 {
            log::debug!("no 32-bit arm architecture, arm64 stays declared");
        }
        0
    };

    FatHeader {
        magic,
        nfat_arch: total - hidden,
    }
}

/// Write `arches` as a fat container to `output`.
///
/// The architectures are validated, sorted and assigned offsets first; their
/// input order and offsets are ignored. Hidden architectures still get a
/// header table slot and a body, only the declared count leaves them out.
///
/// # Errors
///
/// - [`Error::Validation`] for an empty set, duplicate architectures, an
///   alignment above 2^15, or bodies ending past 4 GiB with [`Magic::Fat32`].
///   Nothing has been written in that case.
/// - [`Error::Write`] if emitting fails; output may be partial.
pub fn create<W: Write>(
    output: W,
    mut arches: Vec<FatArch<'_>>,
    magic: Magic,
    hide_arm64: bool,
) -> Result<FatHeader> {
    if arches.is_empty() {
        return Err(ValidationError::Empty.into());
    }

    let header = build_header(&arches, magic, hide_arm64);
    plan(&mut arches, magic)?;
    log::debug!(
        "writing {} architectures, {} declared",
        arches.len(),
        header.nfat_arch
    );

    let mut w = BufWriter::new(output);

    encode_container_header(&mut w, &header).map_err(Error::write(WritePhase::Header))?;
    for arch in &arches {
        encode_arch_header(&mut w, &arch.header, magic).map_err(Error::write(WritePhase::Header))?;
    }

    let mut cursor = header_size() + arch_header_size(magic) * arches.len() as u64;
    for arch in &arches {
        let offset = arch.header.offset;
        if offset > cursor {
            let padding = offset - cursor;
            io::copy(&mut io::repeat(0).take(padding), &mut w)
                .map_err(Error::write(WritePhase::Padding))?;
            cursor = offset;
        }

        let size = arch.header.size;
        let copied = io::copy(&mut arch.body(), &mut w).map_err(Error::write(WritePhase::Body))?;
        if copied != size {
            return Err(Error::Write {
                phase: WritePhase::Body,
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} body ended after {} of {} bytes", arch.name(), copied, size),
                ),
            });
        }
        cursor += size;
    }

    w.flush().map_err(Error::write(WritePhase::Body))?;
    Ok(header)
}
