// The two-level key derivation path of an address is persisted as a
// single signed integer column: the first component occupies bits 31
// and up, the second contributes its low 31 bits. The layout must
// stay bit-for-bit stable; existing rows depend on it.

/// Packs a two-level derivation index into the persisted column
/// value. The second component is masked to 31 bits, so values at or
/// above 2^31 lose their top bit; callers keep derivation indices
/// below 2^31.
pub fn pack_key_index(a: u32, b: u32) -> i64 {
    (a as i64) << 31 | (b & 0x7fff_ffff) as i64
}

/// Inverts `pack_key_index` for values produced by it.
pub fn unpack_key_index(packed: i64) -> (u32, u32) {
    ((packed >> 31) as u32, (packed & 0x7fff_ffff) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_index_round_trip() {
        let samples = [
            0u32,
            1,
            2,
            1000,
            0x1234_5678,
            0x7fff_fffe,
            0x7fff_ffff, // 2^31 - 1, the largest lossless value
        ];
        for &a in &samples {
            for &b in &samples {
                assert_eq!(unpack_key_index(pack_key_index(a, b)), (a, b));
            }
        }
    }

    #[test]
    fn test_key_index_layout() {
        // The persisted layout is load-bearing, not just round-trip.
        assert_eq!(pack_key_index(0, 0), 0);
        assert_eq!(pack_key_index(0, 1), 1);
        assert_eq!(pack_key_index(1, 0), 1 << 31);
        assert_eq!(pack_key_index(1, 1), (1 << 31) | 1);
        assert_eq!(pack_key_index(0x7fff_ffff, 0x7fff_ffff), 0x3fff_ffff_ffff_ffff);
    }

    #[test]
    fn test_key_index_masks_high_bit() {
        // The second component's top bit is dropped by the layout.
        assert_eq!(pack_key_index(0, 0x8000_0000), 0);
        assert_eq!(pack_key_index(0, 0x8000_0001), 1);
    }
}
