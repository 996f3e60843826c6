//! Compact reading-position encoding.
//!
//! A saved position is a single signed integer. Two schemes coexist:
//!
//! * legacy values (`>= 0`): a raw scroll offset in pixels, written by
//!   earlier releases;
//! * packed values (`< 0`): an (item index, sub-item offset) pair,
//!   `packed = -((index << 16) | offset) - 1`.
//!
//! Packed values are always negative and legacy values always
//! non-negative, so the two are losslessly distinguishable by sign and no
//! data migration is needed.

/// Upper bound for the sub-item offset field (16 bits).
pub const MAX_SUB_OFFSET: u32 = 0xFFFF;

/// A decoded reading position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Exact (item index, sub-item offset) pair from a packed value.
    Packed { index: u32, offset: u16 },
    /// Raw pixel offset written by an earlier format version. Needs an
    /// approximate measurement pass to turn into an index.
    LegacyPixels(i64),
}

/// Pack an (index, offset) pair. The offset is clamped to 16 bits; the
/// result is always negative.
pub fn pack(index: u32, offset: u32) -> i64 {
    let offset = offset.min(MAX_SUB_OFFSET) as i64;
    -(((index as i64) << 16) | offset) - 1
}

/// Whether a stored value uses the packed scheme.
pub fn is_packed(value: i64) -> bool {
    value < 0
}

/// Decode a stored value. Packed values decode exactly; non-negative
/// values are legacy raw pixel offsets.
pub fn unpack(value: i64) -> Position {
    if value >= 0 {
        return Position::LegacyPixels(value);
    }
    let raw = -(value + 1);
    Position::Packed {
        index: (raw >> 16) as u32,
        offset: (raw & 0xFFFF) as u16,
    }
}

/// Bound on the paragraph sample used for legacy conversion.
const HEIGHT_SAMPLE_LIMIT: usize = 32;

/// Convert a legacy raw pixel offset into an approximate (index, offset)
/// pair, given rendered heights for a leading sample of items. The average
/// item height over a bounded sample estimates which item the offset lands
/// in; the remainder becomes the sub-item offset.
pub fn approximate_from_pixels(raw_pixels: i64, sampled_heights: &[u32]) -> (u32, u16) {
    let raw = raw_pixels.max(0) as u64;
    let sample = &sampled_heights[..sampled_heights.len().min(HEIGHT_SAMPLE_LIMIT)];
    let total: u64 = sample.iter().map(|&h| h as u64).sum();
    let avg = if sample.is_empty() { 0 } else { total / sample.len() as u64 };
    if avg == 0 {
        return (0, 0);
    }
    let index = (raw / avg).min(u32::MAX as u64) as u32;
    let remainder = (raw % avg).min(MAX_SUB_OFFSET as u64) as u16;
    (index, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        for (index, offset) in [(0, 0), (0, 1), (3, 120), (1024, 0xFFFF), (0x7FFF, 7)] {
            let packed = pack(index, offset);
            assert!(packed < 0, "packed value must be negative");
            assert_eq!(
                unpack(packed),
                Position::Packed { index, offset: offset as u16 }
            );
        }
    }

    #[test]
    fn offset_is_clamped() {
        let packed = pack(2, 0x1_0000);
        assert_eq!(unpack(packed), Position::Packed { index: 2, offset: 0xFFFF });
    }

    #[test]
    fn legacy_values_keep_their_sign() {
        assert!(!is_packed(0));
        assert!(!is_packed(123_456));
        assert_eq!(unpack(500), Position::LegacyPixels(500));
    }

    #[test]
    fn approximate_conversion() {
        // Ten paragraphs of ~100px; offset 450px lands in paragraph 4.
        let heights = [100u32; 10];
        assert_eq!(approximate_from_pixels(450, &heights), (4, 50));
        assert_eq!(approximate_from_pixels(0, &heights), (0, 0));
        // No sample at all: nothing to estimate from.
        assert_eq!(approximate_from_pixels(450, &[]), (0, 0));
    }

    proptest! {
        #[test]
        fn pack_is_always_negative_and_reversible(index in 0u32..=0x7FFF_FFFF, offset in 0u32..=0xFFFF) {
            let packed = pack(index, offset);
            prop_assert!(is_packed(packed));
            prop_assert_eq!(unpack(packed), Position::Packed { index, offset: offset as u16 });
        }

        #[test]
        fn legacy_is_never_packed(v in 0i64..=i64::MAX) {
            prop_assert!(!is_packed(v));
            prop_assert_eq!(unpack(v), Position::LegacyPixels(v));
        }
    }
}
