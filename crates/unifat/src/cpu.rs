//! CPU type constants and architecture names
//!
//! The special cases below exist to match the ordering and hiding behavior of
//! Apple's `lipo`, see cctools `misc/lipo.c`.

use goblin::mach::cputype::{self, get_arch_from_flag, get_arch_name_from_types};

pub use goblin::mach::cputype::{CPU_TYPE_ARM, CPU_TYPE_ARM64, CPU_TYPE_X86_64};

/// Capability bits of a cpusubtype, ignored when ordering architectures
pub const SUBTYPE_CAPABILITY_MASK: u32 = cputype::CPU_SUBTYPE_MASK;

/// CPU type that always sorts after every other type, and the only one that
/// may be hidden from the declared count
pub const HIDEABLE_CPU_TYPE: u32 = CPU_TYPE_ARM64;

/// CPU type that must be present for hiding to apply
pub const HIDE_COMPANION_CPU_TYPE: u32 = CPU_TYPE_ARM;

/// Strip the capability bits from a cpusubtype.
pub fn masked_subtype(cpu_subtype: u32) -> u32 {
    cpu_subtype & !SUBTYPE_CAPABILITY_MASK
}

/// Architecture name as printed by `lipo`, e.g. `arm64` or `x86_64`.
///
/// Unknown combinations render as `cputype (N) cpusubtype (M)`.
pub fn arch_name(cpu_type: u32, cpu_subtype: u32) -> String {
    get_arch_name_from_types(cpu_type, cpu_subtype)
        .or_else(|| get_arch_name_from_types(cpu_type, masked_subtype(cpu_subtype)))
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "cputype ({}) cpusubtype ({})",
                cpu_type,
                masked_subtype(cpu_subtype)
            )
        })
}

/// Resolve an architecture name to its cputype and cpusubtype.
pub fn arch_from_name(name: &str) -> Option<(u32, u32)> {
    get_arch_from_flag(name)
}

/// Whether `name` designates the given cputype and cpusubtype.
///
/// Capability bits are ignored, so `arm64e` matches regardless of its
/// pointer authentication ABI version.
pub fn arch_matches(name: &str, cpu_type: u32, cpu_subtype: u32) -> bool {
    match arch_from_name(name) {
        Some((ty, sub)) => ty == cpu_type && masked_subtype(sub) == masked_subtype(cpu_subtype),
        None => false,
    }
}
