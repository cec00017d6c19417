use byteorder::{ByteOrder, LittleEndian};

/// Fixed-width key codec for B+Tree pages.
///
/// Node pages store keys as densely packed fixed-size byte runs; a key
/// type supplies its encoded width and the conversions. Comparison happens
/// on decoded values, so the byte encoding does not need to be
/// order-preserving.
pub trait IndexKey: Ord + Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Encoded width in bytes. Constant per type.
    const ENCODED_SIZE: usize;

    /// Write the key into `buf[..Self::ENCODED_SIZE]`.
    fn encode(&self, buf: &mut [u8]);

    /// Read a key back from `buf[..Self::ENCODED_SIZE]`.
    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl IndexKey for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl IndexKey for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl IndexKey for u64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_i64() {
        let mut buf = [0u8; 8];
        (-42i64).encode(&mut buf);
        assert_eq!(i64::decode(&buf), -42);
    }

    #[test]
    fn test_roundtrip_u32() {
        let mut buf = [0u8; 4];
        7u32.encode(&mut buf);
        assert_eq!(u32::decode(&buf), 7);
    }
}
