use crate::codec::CodecError;
use bytes::{Buf, Bytes};

/// ByteReader is a bounds-checked big-endian cursor. Every read verifies enough bytes remain, so a
/// length field from a peer can never point us past the end of the buffer.
pub(crate) struct ByteReader {
    buf: Bytes,
    offset: usize,
}

impl ByteReader {
    pub(crate) fn new(buf: Bytes) -> Self {
        ByteReader { buf, offset: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.ensure(1)?;
        self.offset += 1;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.ensure(2)?;
        self.offset += 2;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.ensure(4)?;
        self.offset += 4;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.ensure(8)?;
        self.offset += 8;
        Ok(self.buf.get_u64())
    }

    /// Zero-copy read of `len` bytes.
    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<Bytes, CodecError> {
        self.ensure(len)?;
        self.offset += len;
        Ok(self.buf.split_to(len))
    }

    /// Consume everything that is left.
    pub(crate) fn read_rest(&mut self) -> Bytes {
        self.offset += self.buf.len();
        self.buf.split_to(self.buf.len())
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                offset: self.offset,
                needed,
                remaining: self.buf.remaining(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let mut reader = ByteReader::new(Bytes::from_static(&[0x01, 0x02, 0, 0, 0, 7, 0xFF]));
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_u8().unwrap(), 0xFF);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn short_read_reports_position() {
        let mut reader = ByteReader::new(Bytes::from_static(&[0x00, 0x03, b'a']));
        let len = reader.read_u16().unwrap() as usize;
        assert_eq!(
            reader.read_bytes(len),
            Err(CodecError::Truncated {
                offset: 2,
                needed: 3,
                remaining: 1
            })
        );
    }
}
