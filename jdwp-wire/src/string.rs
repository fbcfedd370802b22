// JDWP string codec and StringReference commands
//
// Strings travel as a 4-byte signed byte count followed by modified UTF-8:
// each UTF-16 unit takes 1, 2 or 3 bytes, U+0000 is written as C0 80 and
// supplementary characters appear as two 3-byte surrogates.

use crate::commands::{command_sets, string_reference_commands, vm_commands};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpError, JdwpResult};
use crate::reader::{read_i32, read_object_id};
use crate::types::StringId;
use crate::writer::put_object_id;
use bytes::{Buf, BufMut};

fn unit_len(unit: u16) -> usize {
    match unit {
        0x01..=0x7f => 1,
        0x00 | 0x80..=0x7ff => 2,
        _ => 3,
    }
}

/// Number of payload bytes `value` occupies on the wire, excluding the
/// 4-byte length prefix.
pub fn encoded_len(value: &str) -> usize {
    value.encode_utf16().map(unit_len).sum()
}

/// Write `value` as a JDWP string (length prefix + modified UTF-8)
pub fn put_string<B: BufMut>(buf: &mut B, value: &str) -> JdwpResult<()> {
    let len = encoded_len(value);
    let prefix = i32::try_from(len).map_err(|_| {
        JdwpError::InvalidInput(format!("string of {} bytes exceeds JDWP length prefix", len))
    })?;

    buf.put_i32(prefix);
    for unit in value.encode_utf16() {
        match unit_len(unit) {
            1 => buf.put_u8(unit as u8),
            2 => {
                buf.put_u8(0xc0 | (0x1f & (unit >> 6)) as u8);
                buf.put_u8(0x80 | (0x3f & unit) as u8);
            }
            _ => {
                buf.put_u8(0xe0 | (0x0f & (unit >> 12)) as u8);
                buf.put_u8(0x80 | (0x3f & (unit >> 6)) as u8);
                buf.put_u8(0x80 | (0x3f & unit) as u8);
            }
        }
    }

    Ok(())
}

/// Encode `value` into a fresh buffer
pub fn encode_string(value: &str) -> JdwpResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(4 + encoded_len(value));
    put_string(&mut buf, value)?;
    Ok(buf)
}

/// Read a JDWP string, consuming exactly the declared number of bytes
pub fn decode_string(buf: &mut &[u8]) -> JdwpResult<String> {
    let declared = read_i32(buf)?;
    if declared < 0 {
        return Err(JdwpError::InvalidInput(format!(
            "negative string length: {}",
            declared
        )));
    }

    let len = declared as usize;
    if buf.remaining() < len {
        return Err(JdwpError::TruncatedPacket {
            needed: len,
            available: buf.remaining(),
        });
    }

    let bytes = &buf[..len];
    buf.advance(len);

    let units = decode_units(bytes)?;
    String::from_utf16(&units)
        .map_err(|_| JdwpError::MalformedEncoding("unpaired surrogate in string".to_string()))
}

fn decode_units(bytes: &[u8]) -> JdwpResult<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let a = bytes[i];
        match a >> 4 {
            0..=11 => {
                if a == 0 {
                    return Err(JdwpError::MalformedEncoding(format!(
                        "bare null byte at offset {}",
                        i
                    )));
                }
                units.push(a as u16);
                i += 1;
            }
            12 | 13 => {
                let b = continuation(bytes, i, 1)?;
                units.push(((a as u16 & 0x1f) << 6) | (b as u16 & 0x3f));
                i += 2;
            }
            14 => {
                let b = continuation(bytes, i, 1)?;
                let c = continuation(bytes, i, 2)?;
                units.push(((a as u16 & 0x0f) << 12) | ((b as u16 & 0x3f) << 6) | (c as u16 & 0x3f));
                i += 3;
            }
            _ => {
                return Err(JdwpError::MalformedEncoding(format!(
                    "invalid lead byte {:#04x} at offset {}",
                    a, i
                )));
            }
        }
    }

    Ok(units)
}

fn continuation(bytes: &[u8], lead: usize, offset: usize) -> JdwpResult<u8> {
    let pos = lead + offset;
    let b = *bytes.get(pos).ok_or_else(|| {
        JdwpError::MalformedEncoding(format!("sequence starting at offset {} is cut off", lead))
    })?;

    if b & 0xc0 != 0x80 {
        return Err(JdwpError::MalformedEncoding(format!(
            "byte {:#04x} at offset {} is not a continuation byte",
            b, pos
        )));
    }

    Ok(b)
}

impl JdwpConnection {
    /// Get the string value from a String object (StringReference.Value command)
    ///
    /// # Arguments
    /// * `string_id` - The ObjectId of the String object
    ///
    /// # Returns
    /// The actual string value
    pub async fn get_string_value(&mut self, string_id: StringId) -> JdwpResult<String> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(
            id,
            command_sets::STRING_REFERENCE,
            string_reference_commands::VALUE,
        );

        put_object_id(&mut packet.data, string_id, &self.id_sizes());

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        decode_string(&mut data)
    }

    /// Create a String object in the target VM (VirtualMachine.CreateString)
    pub async fn create_string(&mut self, value: &str) -> JdwpResult<StringId> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::CREATE_STRING);

        put_string(&mut packet.data, value)?;

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_object_id(&mut data, &self.id_sizes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(value: &str) -> String {
        let encoded = encode_string(value).unwrap();
        let mut buf = encoded.as_slice();
        let decoded = decode_string(&mut buf).unwrap();
        assert!(buf.is_empty(), "decoder left {} bytes", buf.len());
        decoded
    }

    #[test]
    fn test_empty_string() {
        let encoded = encode_string("").unwrap();
        assert_eq!(encoded, vec![0, 0, 0, 0]);
        assert_eq!(round_trip(""), "");
    }

    #[test]
    fn test_one_char_per_length_class() {
        // 'A' = 1 byte, U+00E9 = 2 bytes, U+20AC = 3 bytes
        let encoded = encode_string("A\u{e9}\u{20ac}").unwrap();

        assert_eq!(&encoded[..4], &[0, 0, 0, 6]);
        assert_eq!(&encoded[4..], &[0x41, 0xc3, 0xa9, 0xe2, 0x82, 0xac]);
        assert_eq!(round_trip("A\u{e9}\u{20ac}"), "A\u{e9}\u{20ac}");
    }

    #[test]
    fn test_nul_is_two_bytes() {
        let encoded = encode_string("a\0b").unwrap();

        assert_eq!(&encoded[..4], &[0, 0, 0, 4]);
        assert_eq!(&encoded[4..], &[b'a', 0xc0, 0x80, b'b']);
        assert!(!encoded[4..].contains(&0));
        assert_eq!(round_trip("a\0b"), "a\0b");
    }

    #[test]
    fn test_supplementary_char_uses_surrogates() {
        let value = "\u{1f600}";
        let encoded = encode_string(value).unwrap();

        assert_eq!(encoded_len(value), 6);
        assert_eq!(&encoded[4..], &[0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80]);
        assert_eq!(round_trip(value), value);
    }

    #[test]
    fn test_decode_consumes_only_declared_bytes() {
        let mut bytes = encode_string("hi").unwrap();
        bytes.extend_from_slice(&[0xde, 0xad]);

        let mut buf = bytes.as_slice();
        assert_eq!(decode_string(&mut buf).unwrap(), "hi");
        assert_eq!(buf, &[0xde, 0xad]);
    }

    #[test]
    fn test_bad_continuation_is_malformed() {
        // 2-byte lead followed by an ASCII byte instead of 10xxxxxx
        let mut buf: &[u8] = &[0, 0, 0, 2, 0xc3, 0x41];
        assert!(matches!(
            decode_string(&mut buf),
            Err(JdwpError::MalformedEncoding(_))
        ));

        let mut buf: &[u8] = &[0, 0, 0, 3, 0xe2, 0x82, 0xc0];
        assert!(matches!(
            decode_string(&mut buf),
            Err(JdwpError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_cut_off_sequence_is_malformed() {
        let mut buf: &[u8] = &[0, 0, 0, 2, 0xe2, 0x82];
        assert!(matches!(
            decode_string(&mut buf),
            Err(JdwpError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_bare_null_and_four_byte_lead_are_malformed() {
        let mut buf: &[u8] = &[0, 0, 0, 1, 0x00];
        assert!(matches!(
            decode_string(&mut buf),
            Err(JdwpError::MalformedEncoding(_))
        ));

        let mut buf: &[u8] = &[0, 0, 0, 4, 0xf0, 0x9f, 0x98, 0x80];
        assert!(matches!(
            decode_string(&mut buf),
            Err(JdwpError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_lone_surrogate_is_malformed() {
        let mut buf: &[u8] = &[0, 0, 0, 3, 0xed, 0xa0, 0xbd];
        assert!(matches!(
            decode_string(&mut buf),
            Err(JdwpError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_short_payload_is_truncated() {
        let mut buf: &[u8] = &[0, 0, 0, 5, b'a', b'b'];
        assert!(matches!(
            decode_string(&mut buf),
            Err(JdwpError::TruncatedPacket { needed: 5, available: 2 })
        ));
    }

    #[test]
    fn test_negative_length_is_invalid() {
        let mut buf: &[u8] = &[0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            decode_string(&mut buf),
            Err(JdwpError::InvalidInput(_))
        ));
    }
}
