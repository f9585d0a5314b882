use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::Rid;

/// Fixed-width encoding for a bucket slot component. Keys and values stored
/// in hash bucket pages go through this trait so slot offsets are pure
/// arithmetic.
pub trait SlotCodec: Sized {
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl SlotCodec for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl SlotCodec for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl SlotCodec for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl SlotCodec for u64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl SlotCodec for Rid {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot);
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            page_id: LittleEndian::read_i32(&buf[0..4]),
            slot: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}
