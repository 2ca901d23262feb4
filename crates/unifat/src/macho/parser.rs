//! Mach-O and static archive introspection using goblin
//!
//! Only what the fat writer needs is extracted: the CPU identifiers and the
//! load addresses of the segment commands, in load command order.

use crate::{Error, Result};
use goblin::archive::Archive;
use goblin::mach::load_command::CommandVariant;
use goblin::mach::MachO;

/// Prefix of the BSD symbol index member (`__.SYMDEF`, `__.SYMDEF SORTED`, ...)
const SYMDEF_PREFIX: &str = "__.SYMDEF";

/// CPU identifiers and segment layout of a single-architecture object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    /// Segment commands in load command order
    pub segments: Vec<SegmentInfo>,
}

/// A single `LC_SEGMENT` / `LC_SEGMENT_64` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Linked virtual address of the segment
    pub address: u64,
    /// `LC_SEGMENT_64` rather than `LC_SEGMENT`
    pub is_64: bool,
}

/// Inspect a thin Mach-O object.
///
/// # Errors
///
/// Returns [`Error::MachO`] if the bytes are not a single-architecture Mach-O.
pub fn inspect_object(data: &[u8]) -> Result<ObjectInfo> {
    let macho =
        MachO::parse(data, 0).map_err(|e| Error::MachO(format!("Failed to parse: {}", e)))?;

    let segments = macho
        .load_commands
        .iter()
        .filter_map(|lc| match &lc.command {
            CommandVariant::Segment64(seg) => Some(SegmentInfo {
                address: seg.vmaddr,
                is_64: true,
            }),
            CommandVariant::Segment32(seg) => Some(SegmentInfo {
                address: seg.vmaddr as u64,
                is_64: false,
            }),
            _ => None,
        })
        .collect();

    Ok(ObjectInfo {
        cpu_type: macho.header.cputype as u32,
        cpu_subtype: macho.header.cpusubtype as u32,
        segments,
    })
}

/// Inspect a static archive through its first object member.
///
/// Members are taken in archive order. The symbol index member is skipped;
/// the first remaining member must be a Mach-O object.
///
/// # Errors
///
/// Returns [`Error::Archive`] if the bytes are not an archive or hold no
/// members, and [`Error::MachO`] if the first member is not an object.
pub fn inspect_archive(data: &[u8]) -> Result<ObjectInfo> {
    let archive =
        Archive::parse(data).map_err(|e| Error::Archive(format!("Failed to parse: {}", e)))?;

    let member = (0..archive.len())
        .filter_map(|i| archive.get_at(i))
        .find(|member| !member.extended_name().starts_with(SYMDEF_PREFIX))
        .ok_or_else(|| Error::Archive("archive has no object members".into()))?;

    let start = member.offset as usize;
    let body = start
        .checked_add(member.size())
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| {
            Error::Archive(format!("Member {}: truncated", member.extended_name()))
        })?;

    inspect_object(body)
}
