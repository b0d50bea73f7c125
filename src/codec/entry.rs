use crate::codec::framing::{self, BlockRef};
use crate::codec::{AttributeDescriptor, CodecError, SchemaContext, SUB_SCHEMA_SUB_ENTRY_ID};
use bytes::Bytes;

pub const ATTR_DN: &str = "dn";
pub const ATTR_OBJECT_CLASS: &str = "objectClass";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dn {
    pub value: String,
    pub normalized: String,
}

impl Dn {
    pub fn parse(ctx: &SchemaContext, value: impl Into<String>) -> Result<Self, CodecError> {
        let value = value.into();
        let normalized = ctx.resolver().normalize_dn(&value)?;
        Ok(Dn { value, normalized })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub descriptor: Option<AttributeDescriptor>,
    pub values: Vec<Bytes>,
}

impl Attribute {
    /// An attribute whose descriptor is looked up later with `Entry::resolve_descriptors`.
    pub fn new<V: Into<Bytes>>(name: impl Into<String>, values: Vec<V>) -> Self {
        Attribute {
            name: name.into(),
            descriptor: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn resolved(descriptor: AttributeDescriptor, values: Vec<Bytes>) -> Self {
        Attribute {
            name: descriptor.name.clone(),
            descriptor: Some(descriptor),
            values,
        }
    }

    fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub entry_id: u64,
    pub dn: Option<Dn>,
    pub attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(entry_id: u64) -> Self {
        Entry {
            entry_id,
            dn: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_named(name))
    }

    /// Fill in missing descriptors by name, and set the DN field from the `dn` attribute.
    /// Attributes the schema doesn't know keep `descriptor: None` and fail at encode time.
    pub fn resolve_descriptors(&mut self, ctx: &SchemaContext) -> Result<(), CodecError> {
        for attribute in self.attributes.iter_mut() {
            if attribute.descriptor.is_none() {
                attribute.descriptor = ctx.resolver().name_to_descriptor(&attribute.name);
            }
        }

        if let Some(dn_value) = self.attribute(ATTR_DN).and_then(|a| a.values.first()) {
            let dn_str = std::str::from_utf8(dn_value).map_err(|_| CodecError::Malformed("dn is not utf-8".into()))?;
            self.dn = Some(Dn::parse(ctx, dn_str)?);
        }

        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EncodedSize {
    pub attr_count: u16,
    pub value_count: u16,
    pub byte_size: usize,
}

fn blocks(entry: &Entry) -> Vec<BlockRef<'_>> {
    entry
        .attributes
        .iter()
        .filter(|a| !a.values.is_empty())
        .map(|a| BlockRef {
            name: &a.name,
            attr_id: a.descriptor.as_ref().map(|d| d.id),
            op: None,
            values: &a.values,
        })
        .collect()
}

/// Attributes without values don't take part in the encoding.
pub fn compute_encoded_size(entry: &Entry) -> Result<EncodedSize, CodecError> {
    framing::compute_size(&blocks(entry))
}

pub fn encode_entry(entry: &Entry) -> Result<Bytes, CodecError> {
    entry_sanity_check(entry)?;
    framing::write_blocks(&blocks(entry))
}

pub fn decode_entry(ctx: &SchemaContext, entry_id: u64, encoded: Bytes) -> Result<Entry, CodecError> {
    let raw_blocks = framing::read_blocks(encoded, false)?;

    let mut entry = Entry::new(entry_id);
    let mut dn_value = None;
    for raw in raw_blocks {
        let descriptor = match ctx.resolver().attr_id_to_descriptor(raw.attr_id) {
            Some(d) => d,
            None if ctx.is_bootstrap() && entry_id == SUB_SCHEMA_SUB_ENTRY_ID => continue,
            None => return Err(CodecError::UnknownAttributeType(raw.attr_id)),
        };

        if descriptor.name.eq_ignore_ascii_case(ATTR_DN) {
            match raw.values.first() {
                Some(v) => dn_value = Some(v.clone()),
                None => return Err(CodecError::InvalidEntry("dn attribute has no value")),
            }
        }

        entry.attributes.push(Attribute::resolved(descriptor, raw.values));
    }

    if entry.attributes.is_empty() {
        return Err(CodecError::InvalidEntry("no resolvable attributes"));
    }

    if let Some(dn_value) = dn_value {
        let dn_str = std::str::from_utf8(&dn_value).map_err(|_| CodecError::Malformed("dn is not utf-8".into()))?;
        entry.dn = Some(Dn::parse(ctx, dn_str)?);
    }

    Ok(entry)
}

/// An entry is fit to store only with exactly one single-valued dn and a non-empty objectClass.
pub fn entry_sanity_check(entry: &Entry) -> Result<(), CodecError> {
    let mut has_dn = false;
    let mut has_object_class = false;

    for attribute in &entry.attributes {
        if attribute.descriptor.is_none() {
            return Err(CodecError::MissingAttributeDescriptor(attribute.name.clone()));
        }

        if attribute.is_named(ATTR_DN) {
            if has_dn || attribute.values.len() != 1 {
                return Err(CodecError::InvalidEntry("dn must be a single value"));
            }
            has_dn = true;
        } else if attribute.is_named(ATTR_OBJECT_CLASS) && !attribute.values.is_empty() {
            has_object_class = true;
        }
    }

    if !has_dn {
        return Err(CodecError::InvalidEntry("missing dn"));
    }
    if !has_object_class {
        return Err(CodecError::InvalidEntry("missing objectClass"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{StaticSchema, Syntax};
    use std::sync::Arc;

    fn ctx() -> SchemaContext {
        SchemaContext::new(Arc::new(StaticSchema::core()))
    }

    fn person(ctx: &SchemaContext) -> Entry {
        let mut entry = Entry::new(17)
            .with_attribute(Attribute::new("dn", vec!["CN=Alice,DC=Example,DC=com"]))
            .with_attribute(Attribute::new("objectClass", vec!["top", "person"]))
            .with_attribute(Attribute::new("cn", vec!["Alice"]))
            .with_attribute(Attribute::new("description", Vec::<Bytes>::new()))
            .with_attribute(Attribute::new("userPassword", vec![Bytes::from(vec![0u8, 1, 2, 0])]));
        entry.resolve_descriptors(ctx).unwrap();
        entry
    }

    #[test]
    fn size_accounts_for_terminators() {
        let ctx = ctx();
        let entry = person(&ctx);
        let size = compute_encoded_size(&entry).unwrap();

        // dn, objectClass, cn, userPassword. description has no values.
        assert_eq!(size.attr_count, 4);
        assert_eq!(size.value_count, 5 + 4);
        let value_bytes: usize = ["CN=Alice,DC=Example,DC=com", "top", "person", "Alice"]
            .iter()
            .map(|v| 2 + v.len() + 1)
            .sum::<usize>()
            + (2 + 4 + 1);
        assert_eq!(size.byte_size, 4 + 4 * 4 + value_bytes);
        assert_eq!(encode_entry(&entry).unwrap().len(), size.byte_size);
    }

    #[test]
    fn round_trip_keeps_values_and_dn() {
        let ctx = ctx();
        let entry = person(&ctx);
        let decoded = decode_entry(&ctx, 17, encode_entry(&entry).unwrap()).unwrap();

        let expected: Vec<_> = entry.attributes.into_iter().filter(|a| !a.values.is_empty()).collect();
        assert_eq!(decoded.attributes, expected);
        assert_eq!(decoded.dn, entry.dn);
        assert_eq!(decoded.dn.unwrap().normalized, "cn=alice,dc=example,dc=com");
    }

    #[test]
    fn value_too_large_is_rejected() {
        let ctx = ctx();
        let mut entry = person(&ctx);
        entry.attributes.push(Attribute::resolved(
            AttributeDescriptor::new(5, "description", Syntax::CaseExactString),
            vec![Bytes::from(vec![b'x'; 65535])],
        ));
        match encode_entry(&entry) {
            Err(CodecError::AttributeTooLarge { len, max, .. }) => {
                assert_eq!(len, 65535);
                assert_eq!(max, 65534);
            }
            other => panic!("Unexpected: {:?}", other),
        }

        entry.attributes.pop();
        entry.attributes.push(Attribute::resolved(
            AttributeDescriptor::new(5, "description", Syntax::CaseExactString),
            vec![Bytes::from(vec![b'x'; 65534])],
        ));
        assert!(encode_entry(&entry).is_ok());
    }

    #[test]
    fn sanity_check() {
        let ctx = ctx();
        let mut no_oc = Entry::new(1).with_attribute(Attribute::new("dn", vec!["cn=a"]));
        no_oc.resolve_descriptors(&ctx).unwrap();
        assert_eq!(entry_sanity_check(&no_oc), Err(CodecError::InvalidEntry("missing objectClass")));

        let mut two_dns = Entry::new(1)
            .with_attribute(Attribute::new("dn", vec!["cn=a", "cn=b"]))
            .with_attribute(Attribute::new("objectClass", vec!["top"]));
        two_dns.resolve_descriptors(&ctx).unwrap();
        assert_eq!(
            entry_sanity_check(&two_dns),
            Err(CodecError::InvalidEntry("dn must be a single value"))
        );

        let mut unknown = person(&ctx).with_attribute(Attribute::new("favoriteColor", vec!["blue"]));
        unknown.resolve_descriptors(&ctx).unwrap();
        assert_eq!(
            encode_entry(&unknown),
            Err(CodecError::MissingAttributeDescriptor("favoriteColor".to_string()))
        );
    }

    #[test]
    fn unknown_attribute_id_is_fatal_outside_bootstrap() {
        let full = ctx();
        let entry = person(&full);
        let encoded = encode_entry(&entry).unwrap();

        // Bootstrap table without `cn`.
        let bootstrap_table = Arc::new(StaticSchema::new(vec![
            AttributeDescriptor::new(1, "dn", Syntax::DistinguishedName),
            AttributeDescriptor::new(2, "objectClass", Syntax::CaseIgnoreString),
            AttributeDescriptor::new(8, "userPassword", Syntax::Binary),
        ]));

        let not_bootstrap = SchemaContext::new(bootstrap_table.clone());
        assert_eq!(
            decode_entry(&not_bootstrap, SUB_SCHEMA_SUB_ENTRY_ID, encoded.clone()),
            Err(CodecError::UnknownAttributeType(3))
        );

        let bootstrap = SchemaContext::bootstrap(bootstrap_table);
        assert_eq!(
            decode_entry(&bootstrap, 17, encoded.clone()),
            Err(CodecError::UnknownAttributeType(3))
        );

        let decoded = decode_entry(&bootstrap, SUB_SCHEMA_SUB_ENTRY_ID, encoded).unwrap();
        let names: Vec<_> = decoded.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["dn", "objectClass", "userPassword"]);
    }

    #[test]
    fn entry_with_no_surviving_attribute_is_invalid() {
        let ctx = ctx();
        let entry = person(&ctx);
        let encoded = encode_entry(&entry).unwrap();

        let empty_bootstrap = SchemaContext::bootstrap(Arc::new(StaticSchema::new(Vec::new())));
        assert_eq!(
            decode_entry(&empty_bootstrap, SUB_SCHEMA_SUB_ENTRY_ID, encoded),
            Err(CodecError::InvalidEntry("no resolvable attributes"))
        );
    }

    #[test]
    fn malformed_input_never_reads_out_of_bounds() {
        let ctx = ctx();
        let encoded = encode_entry(&person(&ctx)).unwrap();

        for cut in 0..encoded.len() {
            assert!(decode_entry(&ctx, 17, encoded.slice(0..cut)).is_err(), "cut at {}", cut);
        }

        // Value length pointing past the end of the buffer.
        let bogus = Bytes::from_static(&[0, 1, 0, 2, 0, 3, 0, 1, 0xFF, 0xFF, b'a', 0]);
        assert!(matches!(decode_entry(&ctx, 17, bogus), Err(CodecError::Truncated { .. })));

        let mut trailing = encoded.to_vec();
        trailing.push(7);
        assert!(matches!(
            decode_entry(&ctx, 17, Bytes::from(trailing)),
            Err(CodecError::Malformed(_))
        ));
    }
}
