//! Shared framing for encoded entries and encoded mods:
//!
//! ```text
//! <u16 attrCount><u16 valueCount>
//! { <u16 attrId><u16 numValues>[<u8 modOp>] { <u16 valueLen><value bytes><NUL> }* }*
//! ```
//!
//! `valueCount` counts every value plus one implicit terminating slot per attribute. The terminating
//! slot occupies no bytes.

use crate::codec::{ByteReader, CodecError, EncodedSize};
use bytes::{BufMut, Bytes, BytesMut};

const LEN_OF_LEN: usize = 2;
pub(super) const MAX_VALUE_LEN: usize = u16::MAX as usize - 1;

pub(super) struct BlockRef<'a> {
    pub(super) name: &'a str,
    pub(super) attr_id: Option<u16>,
    pub(super) op: Option<u8>,
    pub(super) values: &'a [Bytes],
}

pub(super) struct RawBlock {
    pub(super) attr_id: u16,
    pub(super) op: Option<u8>,
    pub(super) values: Vec<Bytes>,
}

pub(super) fn compute_size(blocks: &[BlockRef<'_>]) -> Result<EncodedSize, CodecError> {
    let mut size = LEN_OF_LEN + LEN_OF_LEN;
    let mut num_attrs = 0usize;
    let mut num_values = 0usize;

    for block in blocks {
        size += LEN_OF_LEN + LEN_OF_LEN;
        if block.op.is_some() {
            size += 1;
        }
        for value in block.values {
            if value.len() > MAX_VALUE_LEN {
                return Err(CodecError::AttributeTooLarge {
                    attribute: block.name.to_string(),
                    len: value.len(),
                    max: MAX_VALUE_LEN,
                });
            }
            size += LEN_OF_LEN + value.len() + 1;
            num_values += 1;
        }
        // Terminating empty value.
        num_values += 1;
        num_attrs += 1;
    }

    if num_attrs > u16::MAX as usize {
        return Err(CodecError::InvalidEntry("too many attributes"));
    }
    if num_values > u16::MAX as usize {
        return Err(CodecError::InvalidEntry("too many attribute values"));
    }

    Ok(EncodedSize {
        attr_count: num_attrs as u16,
        value_count: num_values as u16,
        byte_size: size,
    })
}

pub(super) fn write_blocks(blocks: &[BlockRef<'_>]) -> Result<Bytes, CodecError> {
    let size = compute_size(blocks)?;
    let mut buf = BytesMut::with_capacity(size.byte_size);

    buf.put_u16(size.attr_count);
    buf.put_u16(size.value_count);
    for block in blocks {
        let attr_id = block
            .attr_id
            .ok_or_else(|| CodecError::MissingAttributeDescriptor(block.name.to_string()))?;
        buf.put_u16(attr_id);
        buf.put_u16(block.values.len() as u16);
        if let Some(op) = block.op {
            buf.put_u8(op);
        }
        for value in block.values {
            buf.put_u16(value.len() as u16);
            buf.put_slice(value);
            buf.put_u8(0);
        }
    }

    debug_assert_eq!(buf.len(), size.byte_size);
    Ok(buf.freeze())
}

pub(super) fn read_blocks(encoded: Bytes, with_op: bool) -> Result<Vec<RawBlock>, CodecError> {
    let mut reader = ByteReader::new(encoded);
    let num_attrs = reader.read_u16()? as usize;
    let declared_values = reader.read_u16()? as usize;

    let mut blocks = Vec::with_capacity(num_attrs);
    let mut counted_values = 0usize;
    for _ in 0..num_attrs {
        let attr_id = reader.read_u16()?;
        let num_values = reader.read_u16()? as usize;
        let op = if with_op { Some(reader.read_u8()?) } else { None };

        let mut values = Vec::with_capacity(num_values);
        for _ in 0..num_values {
            let len = reader.read_u16()? as usize;
            let value = reader.read_bytes(len)?;
            let offset = reader.offset();
            if reader.read_u8()? != 0 {
                return Err(CodecError::Malformed(format!("missing NUL terminator at offset {}", offset)));
            }
            values.push(value);
        }

        counted_values += num_values + 1;
        blocks.push(RawBlock { attr_id, op, values });
    }

    if counted_values != declared_values {
        return Err(CodecError::Malformed(format!(
            "header declares {} values, found {}",
            declared_values, counted_values
        )));
    }
    if reader.remaining() != 0 {
        return Err(CodecError::Malformed(format!(
            "{} trailing bytes after last attribute",
            reader.remaining()
        )));
    }

    Ok(blocks)
}
