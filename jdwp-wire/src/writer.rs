// Helper functions for writing JDWP data types into command payloads

use crate::types::{IdSizes, Location, ObjectId};
use bytes::BufMut;

/// Write the low `size` bytes of `id`, big-endian
pub fn put_id<B: BufMut>(buf: &mut B, id: u64, size: usize) {
    buf.put_uint(id, size);
}

pub fn put_object_id<B: BufMut>(buf: &mut B, id: ObjectId, sizes: &IdSizes) {
    put_id(buf, id, sizes.object_id_size);
}

pub fn put_location<B: BufMut>(buf: &mut B, location: &Location, sizes: &IdSizes) {
    buf.put_u8(location.type_tag);
    put_id(buf, location.class_id, sizes.reference_type_id_size);
    put_id(buf, location.method_id, sizes.method_id_size);
    buf.put_u64(location.index);
}
