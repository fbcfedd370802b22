// Round-trip properties of the JDWP string codec

use jdwp_wire::{decode_string, encode_string};
use proptest::prelude::*;

fn bmp_char() -> impl Strategy<Value = char> {
    prop_oneof![
        (0x01u32..=0x7f).prop_map(|c| char::from_u32(c).unwrap()),
        (0x80u32..=0x7ff).prop_map(|c| char::from_u32(c).unwrap()),
        (0x800u32..=0xd7ff).prop_map(|c| char::from_u32(c).unwrap()),
        (0xe000u32..=0xffff).prop_map(|c| char::from_u32(c).unwrap()),
    ]
}

proptest! {
    #[test]
    fn bmp_strings_round_trip(chars in prop::collection::vec(bmp_char(), 0..64)) {
        let value: String = chars.into_iter().collect();
        let encoded = encode_string(&value).unwrap();

        let declared = i32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        prop_assert_eq!(declared as usize, encoded.len() - 4);

        let mut buf = encoded.as_slice();
        prop_assert_eq!(decode_string(&mut buf).unwrap(), value);
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn any_string_round_trips(value in any::<String>()) {
        let encoded = encode_string(&value).unwrap();
        prop_assert!(!encoded[4..].contains(&0));

        let mut buf = encoded.as_slice();
        prop_assert_eq!(decode_string(&mut buf).unwrap(), value);
    }
}
