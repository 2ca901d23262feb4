//! Alignment inference from segment load addresses
//!
//! The lowest set bit of a linked address is the coarsest alignment the
//! linker already assumed for that segment. An architecture body is aligned
//! to the minimum over all of its segments.

use super::ALIGN_BIT_MAX;
use crate::macho::ObjectInfo;

/// Minimum alignment exponent for `LC_SEGMENT` objects
pub const ALIGN_BIT_MIN_32: u32 = 2;

/// Minimum alignment exponent for `LC_SEGMENT_64` objects
pub const ALIGN_BIT_MIN_64: u32 = 3;

/// Guess the alignment exponent of a segment linked at `addr`.
///
/// Returns `max` for address zero, otherwise the shift count of the lowest
/// set bit clamped into `[min, max]`.
pub fn guess_align_bit(addr: u64, min: u32, max: u32) -> u32 {
    if addr == 0 {
        return max;
    }
    addr.trailing_zeros().max(min).min(max)
}

/// Alignment exponent for an object body, the minimum across its segments.
///
/// Objects without segments get [`ALIGN_BIT_MAX`].
pub fn segment_align_bit(object: &ObjectInfo) -> u32 {
    object
        .segments
        .iter()
        .map(|seg| {
            let min = if seg.is_64 {
                ALIGN_BIT_MIN_64
            } else {
                ALIGN_BIT_MIN_32
            };
            guess_align_bit(seg.address, min, ALIGN_BIT_MAX)
        })
        .fold(ALIGN_BIT_MAX, u32::min)
}
