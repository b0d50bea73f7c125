use crate::codec::{
    decode_entry, decode_mods, encode_entry, encode_mods, ByteReader, CodecError, Dn, Entry, Modification,
    SchemaContext,
};
use bytes::{BufMut, Bytes, BytesMut};

/// DirectoryChange is one directory write, as carried by a replicated log record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DirectoryChange {
    Add(Entry),
    Modify { dn: Dn, mods: Vec<Modification> },
    Delete { dn: Dn },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

impl DirectoryChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            DirectoryChange::Add(_) => ChangeKind::Add,
            DirectoryChange::Modify { .. } => ChangeKind::Modify,
            DirectoryChange::Delete { .. } => ChangeKind::Delete,
        }
    }

    pub fn dn(&self) -> Option<&Dn> {
        match self {
            DirectoryChange::Add(entry) => entry.dn.as_ref(),
            DirectoryChange::Modify { dn, .. } => Some(dn),
            DirectoryChange::Delete { dn } => Some(dn),
        }
    }
}

/// Layout per kind:
///
/// * Add - encoded entry
/// * Modify - `<u16 dnLen><dn bytes>` followed by encoded mods
/// * Delete - dn bytes
pub(crate) fn encode_change(change: &DirectoryChange) -> Result<Bytes, CodecError> {
    match change {
        DirectoryChange::Add(entry) => encode_entry(entry),
        DirectoryChange::Modify { dn, mods } => {
            let dn_bytes = dn.value.as_bytes();
            if dn_bytes.len() > u16::MAX as usize {
                return Err(CodecError::InvalidEntry("dn too long"));
            }
            let encoded_mods = encode_mods(mods)?;

            let mut buf = BytesMut::with_capacity(2 + dn_bytes.len() + encoded_mods.len());
            buf.put_u16(dn_bytes.len() as u16);
            buf.put_slice(dn_bytes);
            buf.put_slice(&encoded_mods);
            Ok(buf.freeze())
        }
        DirectoryChange::Delete { dn } => Ok(Bytes::copy_from_slice(dn.value.as_bytes())),
    }
}

pub(crate) fn decode_change(
    ctx: &SchemaContext,
    kind: ChangeKind,
    entry_id: u64,
    encoded: Bytes,
) -> Result<DirectoryChange, CodecError> {
    match kind {
        ChangeKind::Add => Ok(DirectoryChange::Add(decode_entry(ctx, entry_id, encoded)?)),
        ChangeKind::Modify => {
            let mut reader = ByteReader::new(encoded);
            let dn_len = reader.read_u16()? as usize;
            let dn = parse_dn(ctx, reader.read_bytes(dn_len)?)?;
            let mods = decode_mods(ctx, reader.read_rest())?;
            Ok(DirectoryChange::Modify { dn, mods })
        }
        ChangeKind::Delete => Ok(DirectoryChange::Delete {
            dn: parse_dn(ctx, encoded)?,
        }),
    }
}

fn parse_dn(ctx: &SchemaContext, raw: Bytes) -> Result<Dn, CodecError> {
    let value = String::from_utf8(raw.to_vec()).map_err(|_| CodecError::Malformed("dn is not utf-8".into()))?;
    if value.is_empty() {
        return Err(CodecError::InvalidEntry("missing dn"));
    }
    Dn::parse(ctx, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Attribute, ModOp, StaticSchema};
    use std::sync::Arc;

    #[test]
    fn modify_and_delete_carry_dn() {
        let ctx = SchemaContext::new(Arc::new(StaticSchema::core()));
        let cn = ctx.resolver().name_to_descriptor("cn").unwrap();
        let dn = Dn::parse(&ctx, "CN=Alice,DC=Example").unwrap();

        let modify = DirectoryChange::Modify {
            dn: dn.clone(),
            mods: vec![Modification::new(
                ModOp::Replace,
                Attribute::resolved(cn, vec![Bytes::from("alice")]),
            )],
        };
        let decoded = decode_change(&ctx, ChangeKind::Modify, 0, encode_change(&modify).unwrap()).unwrap();
        assert_eq!(decoded, modify);

        let delete = DirectoryChange::Delete { dn };
        let decoded = decode_change(&ctx, ChangeKind::Delete, 0, encode_change(&delete).unwrap()).unwrap();
        assert_eq!(decoded.dn().unwrap().normalized, "cn=alice,dc=example");
    }

    #[test]
    fn truncated_modify_is_rejected() {
        let ctx = SchemaContext::new(Arc::new(StaticSchema::core()));
        let payload = Bytes::from_static(&[0, 40, b'c', b'n']);
        assert!(matches!(
            decode_change(&ctx, ChangeKind::Modify, 0, payload),
            Err(CodecError::Truncated { .. })
        ));
        assert_eq!(
            decode_change(&ctx, ChangeKind::Delete, 0, Bytes::new()),
            Err(CodecError::InvalidEntry("missing dn"))
        );
    }
}
