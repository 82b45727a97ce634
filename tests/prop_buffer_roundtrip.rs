#![forbid(unsafe_code)]

//! Round-trip property for `Buffer`'s bounds-checked integer accessors
//! (`spec.md` §8: "write_uint{N}_{le,be}(o,v); read_uint{N}_{le,be}(o) ==
//! Some(v) for all v in [0, 2^N) and valid o").

use proptest::prelude::*;

use osiris_relay::core::buffer::Buffer;

proptest! {
    #[test]
    fn u8_round_trips(offset in 0usize..64, v in any::<u8>()) {
        let mut buf = Buffer::new(64 + 1);
        prop_assert!(buf.write_uint8_le(offset, v));
        prop_assert_eq!(buf.read_uint8_le(offset), Some(v));
        prop_assert!(buf.write_uint8_be(offset, v));
        prop_assert_eq!(buf.read_uint8_be(offset), Some(v));
    }

    #[test]
    fn u16_round_trips(offset in 0usize..64, v in any::<u16>()) {
        let mut buf = Buffer::new(64 + 2);
        prop_assert!(buf.write_uint16_le(offset, v));
        prop_assert_eq!(buf.read_uint16_le(offset), Some(v));
        prop_assert!(buf.write_uint16_be(offset, v));
        prop_assert_eq!(buf.read_uint16_be(offset), Some(v));
    }

    #[test]
    fn u32_round_trips(offset in 0usize..64, v in any::<u32>()) {
        let mut buf = Buffer::new(64 + 4);
        prop_assert!(buf.write_uint32_le(offset, v));
        prop_assert_eq!(buf.read_uint32_le(offset), Some(v));
        prop_assert!(buf.write_uint32_be(offset, v));
        prop_assert_eq!(buf.read_uint32_be(offset), Some(v));
    }

    #[test]
    fn u64_round_trips(offset in 0usize..64, v in any::<u64>()) {
        let mut buf = Buffer::new(64 + 8);
        prop_assert!(buf.write_uint64_le(offset, v));
        prop_assert_eq!(buf.read_uint64_le(offset), Some(v));
        prop_assert!(buf.write_uint64_be(offset, v));
        prop_assert_eq!(buf.read_uint64_be(offset), Some(v));
    }

    /// An offset that would overrun the buffer never writes and never reads.
    #[test]
    fn out_of_bounds_offset_is_rejected(size in 0usize..32, v in any::<u32>()) {
        let mut buf = Buffer::new(size);
        let offset = size + 1;
        prop_assert!(!buf.write_uint32_le(offset, v));
        prop_assert_eq!(buf.read_uint32_le(offset), None);
    }
}
