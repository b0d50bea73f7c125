use crate::codec::framing::{self, BlockRef};
use crate::codec::{Attribute, CodecError, SchemaContext};
use bytes::Bytes;
use std::convert::TryFrom;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModOp {
    Add = 0,
    Delete = 1,
    Replace = 2,
}

impl TryFrom<u8> for ModOp {
    type Error = CodecError;

    fn try_from(op: u8) -> Result<Self, Self::Error> {
        match op {
            0 => Ok(ModOp::Add),
            1 => Ok(ModOp::Delete),
            2 => Ok(ModOp::Replace),
            other => Err(CodecError::Malformed(format!("unknown modify operation {}", other))),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: Attribute,
}

impl Modification {
    pub fn new(op: ModOp, attribute: Attribute) -> Self {
        Modification { op, attribute }
    }
}

/// Same framing as an entry, plus a leading op byte per attribute. Unlike entries, modifications
/// without values are kept: "delete the whole attribute" has no values.
pub fn encode_mods(mods: &[Modification]) -> Result<Bytes, CodecError> {
    let blocks: Vec<_> = mods
        .iter()
        .map(|m| BlockRef {
            name: &m.attribute.name,
            attr_id: m.attribute.descriptor.as_ref().map(|d| d.id),
            op: Some(m.op as u8),
            values: &m.attribute.values,
        })
        .collect();

    framing::write_blocks(&blocks)
}

/// Decoded values come back schema-normalized.
pub fn decode_mods(ctx: &SchemaContext, encoded: Bytes) -> Result<Vec<Modification>, CodecError> {
    let raw_blocks = framing::read_blocks(encoded, true)?;

    let mut mods = Vec::with_capacity(raw_blocks.len());
    for raw in raw_blocks {
        let descriptor = ctx
            .resolver()
            .attr_id_to_descriptor(raw.attr_id)
            .ok_or(CodecError::UnknownAttributeType(raw.attr_id))?;
        let op = ModOp::try_from(raw.op.unwrap_or_default())?;

        let mut values = Vec::with_capacity(raw.values.len());
        for value in raw.values {
            values.push(ctx.resolver().normalize(&descriptor, &value)?);
        }

        mods.push(Modification::new(op, Attribute::resolved(descriptor, values)));
    }

    Ok(mods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StaticSchema;
    use std::sync::Arc;

    fn ctx() -> SchemaContext {
        SchemaContext::new(Arc::new(StaticSchema::core()))
    }

    fn resolved(ctx: &SchemaContext, name: &str, values: Vec<&'static str>) -> Attribute {
        let descriptor = ctx.resolver().name_to_descriptor(name).unwrap();
        Attribute::resolved(descriptor, values.into_iter().map(Bytes::from).collect())
    }

    #[test]
    fn round_trip_normalizes_values() {
        let ctx = ctx();
        let mods = vec![
            Modification::new(ModOp::Replace, resolved(&ctx, "cn", vec!["  Alice  Smith"])),
            Modification::new(ModOp::Add, resolved(&ctx, "member", vec!["CN=Bob, DC=Example"])),
            Modification::new(ModOp::Delete, resolved(&ctx, "description", vec![])),
        ];

        let decoded = decode_mods(&ctx, encode_mods(&mods).unwrap()).unwrap();

        let summary: Vec<_> = decoded
            .iter()
            .map(|m| (m.attribute.name.as_str(), m.op, m.attribute.values.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("cn", ModOp::Replace, vec![Bytes::from("alice smith")]),
                ("member", ModOp::Add, vec![Bytes::from("cn=bob,dc=example")]),
                ("description", ModOp::Delete, vec![]),
            ]
        );
    }

    #[test]
    fn rejects_unknown_op_and_attribute() {
        let ctx = ctx();
        let mods = vec![Modification::new(ModOp::Add, resolved(&ctx, "cn", vec!["x"]))];
        let encoded = encode_mods(&mods).unwrap();

        // <attrCount><valueCount><attrId><numValues><op> puts the op byte at offset 8.
        let mut bad_op = encoded.to_vec();
        bad_op[8] = 9;
        assert!(matches!(
            decode_mods(&ctx, Bytes::from(bad_op)),
            Err(CodecError::Malformed(_))
        ));

        let mut bad_attr = encoded.to_vec();
        bad_attr[4] = 0x7F;
        assert!(matches!(
            decode_mods(&ctx, Bytes::from(bad_attr)),
            Err(CodecError::UnknownAttributeType(_))
        ));
    }

    #[test]
    fn unresolved_attribute_cannot_be_encoded() {
        let mods = vec![Modification::new(ModOp::Add, Attribute::new("cn", vec!["x"]))];
        assert_eq!(
            encode_mods(&mods),
            Err(CodecError::MissingAttributeDescriptor("cn".to_string()))
        );
    }
}
