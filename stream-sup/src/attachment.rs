use zenoh::bytes::ZBytes;
use zenoh_ext::{ZDeserializer, ZSerializer};

/// Per-sample header published next to a chunk payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_offset: u64,
    pub entries_count: u32,
    pub crc32: u32,
}

impl ChunkHeader {
    pub fn for_payload(chunk_offset: u64, entries_count: u32, payload: &[u8]) -> Self {
        Self {
            chunk_offset,
            entries_count,
            crc32: crc32fast::hash(payload),
        }
    }

    pub fn matches(&self, payload: &[u8]) -> bool {
        crc32fast::hash(payload) == self.crc32
    }
}

impl TryFrom<&ZBytes> for ChunkHeader {
    type Error = zenoh::Error;
    fn try_from(value: &ZBytes) -> Result<Self, Self::Error> {
        let mut des = ZDeserializer::new(value);
        let chunk_offset = des.deserialize::<u64>()?;
        let entries_count = des.deserialize::<u32>()?;
        let crc32 = des.deserialize::<u32>()?;
        Ok(ChunkHeader {
            chunk_offset,
            entries_count,
            crc32,
        })
    }
}

impl From<ChunkHeader> for ZBytes {
    fn from(value: ChunkHeader) -> Self {
        let mut ser = ZSerializer::new();
        ser.serialize(value.chunk_offset);
        ser.serialize(value.entries_count);
        ser.serialize(value.crc32);
        ser.finish()
    }
}
