// Helper functions for reading JDWP data types from buffers
//
// Every reader checks the remaining length first so a short buffer surfaces
// as TruncatedPacket instead of a panic inside `bytes`.

use crate::protocol::{JdwpError, JdwpResult};
use crate::types::{IdSizes, Location, ObjectId, TypeTag, Value, ValueData};
use bytes::Buf;

fn require(buf: &&[u8], needed: usize) -> JdwpResult<()> {
    if buf.remaining() < needed {
        return Err(JdwpError::TruncatedPacket {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

/// Read a JDWP string (4-byte length prefix + modified UTF-8 bytes)
pub fn read_string(buf: &mut &[u8]) -> JdwpResult<String> {
    crate::string::decode_string(buf)
}

/// Read a u32
pub fn read_u32(buf: &mut &[u8]) -> JdwpResult<u32> {
    require(buf, 4)?;
    Ok(buf.get_u32())
}

/// Read a i32
pub fn read_i32(buf: &mut &[u8]) -> JdwpResult<i32> {
    require(buf, 4)?;
    Ok(buf.get_i32())
}

/// Read a u8
pub fn read_u8(buf: &mut &[u8]) -> JdwpResult<u8> {
    require(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a u16
pub fn read_u16(buf: &mut &[u8]) -> JdwpResult<u16> {
    require(buf, 2)?;
    Ok(buf.get_u16())
}

/// Read a u64
pub fn read_u64(buf: &mut &[u8]) -> JdwpResult<u64> {
    require(buf, 8)?;
    Ok(buf.get_u64())
}

/// Read a reference id of `size` bytes, zero-extended to 64 bits
pub fn read_id(buf: &mut &[u8], size: usize) -> JdwpResult<u64> {
    if size == 0 || size > 8 {
        return Err(JdwpError::Protocol(format!("Invalid id size: {}", size)));
    }
    require(buf, size)?;
    Ok(buf.get_uint(size))
}

pub fn read_object_id(buf: &mut &[u8], sizes: &IdSizes) -> JdwpResult<ObjectId> {
    read_id(buf, sizes.object_id_size)
}

pub fn read_reference_type_id(buf: &mut &[u8], sizes: &IdSizes) -> JdwpResult<u64> {
    read_id(buf, sizes.reference_type_id_size)
}

/// Read a location (type tag, class id, method id, 8-byte code index)
pub fn read_location(buf: &mut &[u8], sizes: &IdSizes) -> JdwpResult<Location> {
    let type_tag = read_u8(buf)?;
    let class_id = read_reference_type_id(buf, sizes)?;
    let method_id = read_id(buf, sizes.method_id_size)?;
    let index = read_u64(buf)?;

    Ok(Location {
        type_tag,
        class_id,
        method_id,
        index,
    })
}

/// Read a tagged value: one tag byte followed by the value it describes
pub fn read_tagged_value(buf: &mut &[u8], sizes: &IdSizes) -> JdwpResult<Value> {
    let tag = read_u8(buf)?;
    read_value(buf, tag, sizes)
}

/// Read an untagged value whose tag is already known
pub fn read_value(buf: &mut &[u8], tag: u8, sizes: &IdSizes) -> JdwpResult<Value> {
    let data = match TypeTag::from_u8(tag) {
        Some(TypeTag::Byte) => ValueData::Byte(read_u8(buf)? as i8),
        Some(TypeTag::Char) => ValueData::Char(read_u16(buf)?),
        Some(TypeTag::Float) => ValueData::Float(f32::from_bits(read_u32(buf)?)),
        Some(TypeTag::Double) => ValueData::Double(f64::from_bits(read_u64(buf)?)),
        Some(TypeTag::Int) => ValueData::Int(read_i32(buf)?),
        Some(TypeTag::Long) => ValueData::Long(read_u64(buf)? as i64),
        Some(TypeTag::Short) => ValueData::Short(read_u16(buf)? as i16),
        Some(TypeTag::Boolean) => ValueData::Boolean(read_u8(buf)? != 0),
        Some(TypeTag::Void) => ValueData::Void,
        Some(_) => ValueData::Object(read_object_id(buf, sizes)?),
        None => {
            return Err(JdwpError::Protocol(format!("Unknown value tag: {:#x}", tag)));
        }
    };

    Ok(Value { tag, data })
}
