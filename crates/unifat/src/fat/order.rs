//! Architecture validation, ordering and offset assignment
//!
//! The order reproduces `lipo`'s comparator, see `cmp_qsort` in cctools
//! `misc/lipo.c`:
//!
//! 1. same cputype: ascending cpusubtype with capability bits cleared
//! 2. ARM64 sorts after every other cputype
//! 3. otherwise ascending alignment

use super::arch::FatArch;
use super::header::{arch_header_size, header_size, FatArchHeader, Magic};
use super::ALIGN_BIT_MAX;
use crate::cpu::{self, HIDEABLE_CPU_TYPE};
use crate::error::ValidationError;
use crate::Result;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Largest end offset a 32-bit fat container can describe, exclusive
const FAT32_LIMIT: u64 = 1 << 32;

/// Compare two architectures the way `lipo` orders them.
pub fn compare_arches(a: &FatArchHeader, b: &FatArchHeader) -> Ordering {
    if a.cpu_type == b.cpu_type {
        return cpu::masked_subtype(a.cpu_subtype).cmp(&cpu::masked_subtype(b.cpu_subtype));
    }
    if a.cpu_type == HIDEABLE_CPU_TYPE {
        return Ordering::Greater;
    }
    if b.cpu_type == HIDEABLE_CPU_TYPE {
        return Ordering::Less;
    }
    a.align.cmp(&b.align)
}

/// Reject empty sets, duplicate architectures and oversized alignments.
pub fn validate(arches: &[FatArch<'_>]) -> Result<()> {
    if arches.is_empty() {
        return Err(ValidationError::Empty.into());
    }

    let mut seen = HashSet::with_capacity(arches.len());
    for arch in arches {
        let hdr = &arch.header;
        if !seen.insert((hdr.cpu_type, hdr.cpu_subtype)) {
            return Err(ValidationError::Duplicate {
                cpu_type: hdr.cpu_type,
                cpu_subtype: hdr.cpu_subtype,
                name: arch.name(),
            }
            .into());
        }
    }

    for arch in arches {
        let hdr = &arch.header;
        if hdr.align > ALIGN_BIT_MAX {
            return Err(ValidationError::AlignTooLarge {
                align: hdr.align,
                cpu_type: hdr.cpu_type,
                cpu_subtype: cpu::masked_subtype(hdr.cpu_subtype),
            }
            .into());
        }
    }

    Ok(())
}

/// Validate, order and place `arches`, all before any output is produced.
pub fn plan(arches: &mut [FatArch<'_>], magic: Magic) -> Result<()> {
    validate(arches)?;
    sort_arches(arches, magic)
}

/// Sort `arches` into `lipo` order and assign packed, aligned offsets.
///
/// The first body starts right after the header table, each body is placed
/// at the next multiple of its own alignment.
///
/// The comparator is not transitive across mixed cputypes, so this uses an
/// insertion sort, the path `qsort` takes for the handful of architectures a
/// container holds.
pub(crate) fn sort_arches(arches: &mut [FatArch<'_>], magic: Magic) -> Result<()> {
    for i in 1..arches.len() {
        let mut j = i;
        while j > 0 && compare_arches(&arches[j - 1].header, &arches[j].header) == Ordering::Greater
        {
            arches.swap(j - 1, j);
            j -= 1;
        }
    }

    let mut offset = header_size() + arch_header_size(magic) * arches.len() as u64;
    for arch in arches.iter_mut() {
        offset = align_to(offset, 1u64 << arch.header.align)
            .and_then(|start| {
                arch.header.offset = start;
                start.checked_add(arch.header.size)
            })
            .ok_or(ValidationError::OffsetOverflow {
                cpu_type: arch.header.cpu_type,
                cpu_subtype: cpu::masked_subtype(arch.header.cpu_subtype),
            })?;

        if magic == Magic::Fat32 && offset >= FAT32_LIMIT {
            return Err(ValidationError::Fat32Overflow {
                cpu_type: arch.header.cpu_type,
                cpu_subtype: cpu::masked_subtype(arch.header.cpu_subtype),
            }
            .into());
        }
        log::debug!(
            "{} at {:#x} size {:#x} align 2^{}",
            arch.name(),
            arch.header.offset,
            arch.header.size,
            arch.header.align
        );
    }

    Ok(())
}

/// Aligns a value up to the specified power-of-two alignment, `None` on overflow.
fn align_to(value: u64, alignment: u64) -> Option<u64> {
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CPU_TYPE_ARM, CPU_TYPE_ARM64, CPU_TYPE_X86_64};
    use crate::fat::source::SectionReader;
    use crate::Error;

    static EMPTY: &[u8] = &[];

    fn arch(cpu_type: u32, cpu_subtype: u32, size: u64, align: u32) -> FatArch<'static> {
        let header = FatArchHeader {
            cpu_type,
            cpu_subtype,
            offset: 0,
            size,
            align,
        };
        FatArch::new(header, SectionReader::new(&EMPTY, 0, size))
    }

    fn cpus(arches: &[FatArch<'_>]) -> Vec<(u32, u32)> {
        arches
            .iter()
            .map(|a| (a.header.cpu_type, a.header.cpu_subtype))
            .collect()
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 16), Some(0));
        assert_eq!(align_to(1, 16), Some(16));
        assert_eq!(align_to(48, 1), Some(48));
        assert_eq!(align_to(48, 0x4000), Some(0x4000));
        assert_eq!(align_to(0x4001, 0x4000), Some(0x8000));
        assert_eq!(align_to(u64::MAX - 1, 16), None);
    }

    #[test]
    fn test_arm64_sorts_last() {
        for input in [
            vec![arch(CPU_TYPE_ARM64, 0, 16, 14), arch(CPU_TYPE_X86_64, 3, 16, 12)],
            vec![arch(CPU_TYPE_X86_64, 3, 16, 12), arch(CPU_TYPE_ARM64, 0, 16, 14)],
            vec![arch(CPU_TYPE_ARM64, 0, 16, 2), arch(CPU_TYPE_X86_64, 3, 16, 15)],
        ] {
            let mut arches = input;
            sort_arches(&mut arches, Magic::Fat32).unwrap();
            assert_eq!(arches[0].header.cpu_type, CPU_TYPE_X86_64);
            assert_eq!(arches[1].header.cpu_type, CPU_TYPE_ARM64);
        }
    }

    #[test]
    fn test_masked_subtype_tie_break() {
        let mut arches = vec![
            arch(CPU_TYPE_X86_64, 0x8000_0002, 16, 12),
            arch(CPU_TYPE_X86_64, 1, 16, 12),
        ];
        sort_arches(&mut arches, Magic::Fat32).unwrap();
        assert_eq!(
            cpus(&arches),
            [(CPU_TYPE_X86_64, 1), (CPU_TYPE_X86_64, 0x8000_0002)]
        );
    }

    #[test]
    fn test_alignment_ascending() {
        let mut arches = vec![arch(CPU_TYPE_X86_64, 3, 16, 14), arch(CPU_TYPE_ARM, 9, 16, 12)];
        sort_arches(&mut arches, Magic::Fat32).unwrap();
        assert_eq!(cpus(&arches), [(CPU_TYPE_ARM, 9), (CPU_TYPE_X86_64, 3)]);
    }

    #[test]
    fn test_offsets_packed_and_aligned() {
        let mut arches = vec![
            arch(CPU_TYPE_ARM, 9, 0x10, 4),
            arch(CPU_TYPE_X86_64, 3, 0x1001, 12),
            arch(CPU_TYPE_ARM64, 0, 0x20, 14),
        ];
        sort_arches(&mut arches, Magic::Fat32).unwrap();
        // table ends at 8 + 3 * 20 = 68
        assert_eq!(arches[0].header.offset, 80);
        assert_eq!(arches[1].header.offset, 0x1000);
        assert_eq!(arches[2].header.offset, 0x4000);

        let mut arches = vec![arch(CPU_TYPE_ARM, 9, 0x10, 0)];
        sort_arches(&mut arches, Magic::Fat64).unwrap();
        assert_eq!(arches[0].header.offset, 40);
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            validate(&[]),
            Err(Error::Validation(ValidationError::Empty))
        ));

        let dup = [arch(CPU_TYPE_ARM64, 0, 16, 14), arch(CPU_TYPE_ARM64, 0, 32, 12)];
        match validate(&dup) {
            Err(Error::Validation(ValidationError::Duplicate {
                cpu_type,
                cpu_subtype,
                name,
            })) => {
                assert_eq!((cpu_type, cpu_subtype), (CPU_TYPE_ARM64, 0));
                assert_eq!(name, "arm64");
            }
            other => panic!("unexpected {other:?}"),
        }

        let big = [arch(CPU_TYPE_ARM64, 0, 16, 16)];
        assert!(matches!(
            validate(&big),
            Err(Error::Validation(ValidationError::AlignTooLarge { align: 16, .. }))
        ));

        let ok = [arch(CPU_TYPE_ARM64, 0, 16, 15), arch(CPU_TYPE_ARM64, 1, 16, 15)];
        assert!(validate(&ok).is_ok());
    }

    #[test]
    fn test_fat32_overflow() {
        let mut arches = vec![
            arch(CPU_TYPE_ARM, 9, 0x8000_0000, 14),
            arch(CPU_TYPE_ARM64, 0, 0x8000_0000, 14),
        ];
        assert!(matches!(
            sort_arches(&mut arches, Magic::Fat32),
            Err(Error::Validation(ValidationError::Fat32Overflow { .. }))
        ));
        assert!(sort_arches(&mut arches, Magic::Fat64).is_ok());
        assert_eq!(arches[1].header.offset, 0x8000_4000);
    }

    #[test]
    fn test_offset_overflow_under_fat64() {
        let mut arches = vec![
            arch(CPU_TYPE_ARM, 9, u64::MAX - 0x100, 2),
            arch(CPU_TYPE_ARM64, 0, 0x10, 14),
        ];
        assert!(matches!(
            sort_arches(&mut arches, Magic::Fat64),
            Err(Error::Validation(ValidationError::OffsetOverflow { .. }))
        ));

        let mut arches = vec![arch(CPU_TYPE_ARM64, 0, u64::MAX, 14)];
        assert!(matches!(
            plan(&mut arches, Magic::Fat64),
            Err(Error::Validation(ValidationError::OffsetOverflow { .. }))
        ));
    }

    #[test]
    fn test_plan_validates_first() {
        let mut arches = vec![arch(CPU_TYPE_ARM, 9, 16, 40)];
        assert!(matches!(
            plan(&mut arches, Magic::Fat64),
            Err(Error::Validation(ValidationError::AlignTooLarge { align: 40, .. }))
        ));
    }
}
