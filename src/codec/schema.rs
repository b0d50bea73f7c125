use crate::codec::CodecError;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Entry id of the sub-schema entry. It is the only entry allowed to carry attributes the bootstrap
/// schema can't resolve, because the full schema is itself loaded out of that entry.
pub const SUB_SCHEMA_SUB_ENTRY_ID: u64 = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Syntax {
    CaseIgnoreString,
    CaseExactString,
    DistinguishedName,
    Integer,
    Binary,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeDescriptor {
    pub id: u16,
    pub name: String,
    pub syntax: Syntax,
}

impl AttributeDescriptor {
    pub fn new(id: u16, name: impl Into<String>, syntax: Syntax) -> Self {
        AttributeDescriptor {
            id,
            name: name.into(),
            syntax,
        }
    }
}

/// SchemaResolver is the directory schema as seen by the codec. Schema validation itself is not the
/// codec's business; it only needs id/name lookups and value normalization.
pub trait SchemaResolver: Send + Sync {
    fn attr_id_to_descriptor(&self, id: u16) -> Option<AttributeDescriptor>;

    fn name_to_descriptor(&self, name: &str) -> Option<AttributeDescriptor>;

    fn normalize(&self, descriptor: &AttributeDescriptor, value: &[u8]) -> Result<Bytes, CodecError>;

    fn normalize_dn(&self, dn: &str) -> Result<String, CodecError>;
}

#[derive(Clone)]
pub struct SchemaContext {
    resolver: Arc<dyn SchemaResolver>,
    bootstrap: bool,
}

impl SchemaContext {
    pub fn new(resolver: Arc<dyn SchemaResolver>) -> Self {
        SchemaContext {
            resolver,
            bootstrap: false,
        }
    }

    /// A context used while the schema is loaded from its own entry.
    pub fn bootstrap(resolver: Arc<dyn SchemaResolver>) -> Self {
        SchemaContext {
            resolver,
            bootstrap: true,
        }
    }

    pub fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }

    pub fn resolver(&self) -> &dyn SchemaResolver {
        self.resolver.as_ref()
    }
}

impl fmt::Debug for SchemaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaContext(bootstrap={})", self.bootstrap)
    }
}

/// StaticSchema is a fixed attribute table. It is enough for tests and for embedding applications
/// with a closed schema.
pub struct StaticSchema {
    by_id: HashMap<u16, AttributeDescriptor>,
    by_name: HashMap<String, AttributeDescriptor>,
}

impl StaticSchema {
    pub fn new(descriptors: Vec<AttributeDescriptor>) -> Self {
        let mut by_id = HashMap::with_capacity(descriptors.len());
        let mut by_name = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            by_name.insert(descriptor.name.to_ascii_lowercase(), descriptor.clone());
            by_id.insert(descriptor.id, descriptor);
        }

        StaticSchema { by_id, by_name }
    }

    /// The attribute table every directory needs to bootstrap.
    pub fn core() -> Self {
        Self::new(vec![
            AttributeDescriptor::new(1, "dn", Syntax::DistinguishedName),
            AttributeDescriptor::new(2, "objectClass", Syntax::CaseIgnoreString),
            AttributeDescriptor::new(3, "cn", Syntax::CaseIgnoreString),
            AttributeDescriptor::new(4, "sn", Syntax::CaseIgnoreString),
            AttributeDescriptor::new(5, "description", Syntax::CaseExactString),
            AttributeDescriptor::new(6, "member", Syntax::DistinguishedName),
            AttributeDescriptor::new(7, "uSNChanged", Syntax::Integer),
            AttributeDescriptor::new(8, "userPassword", Syntax::Binary),
            AttributeDescriptor::new(9, "attributeTypes", Syntax::CaseExactString),
            AttributeDescriptor::new(10, "objectClasses", Syntax::CaseExactString),
        ])
    }
}

impl SchemaResolver for StaticSchema {
    fn attr_id_to_descriptor(&self, id: u16) -> Option<AttributeDescriptor> {
        self.by_id.get(&id).cloned()
    }

    fn name_to_descriptor(&self, name: &str) -> Option<AttributeDescriptor> {
        self.by_name.get(&name.to_ascii_lowercase()).cloned()
    }

    fn normalize(&self, descriptor: &AttributeDescriptor, value: &[u8]) -> Result<Bytes, CodecError> {
        let failure = |reason| CodecError::Normalization {
            attribute: descriptor.name.clone(),
            reason,
        };

        match descriptor.syntax {
            Syntax::Binary => Ok(Bytes::copy_from_slice(value)),
            Syntax::CaseExactString => {
                let s = std::str::from_utf8(value).map_err(|_| failure("not utf-8"))?;
                Ok(Bytes::from(collapse_whitespace(s)))
            }
            Syntax::CaseIgnoreString => {
                let s = std::str::from_utf8(value).map_err(|_| failure("not utf-8"))?;
                Ok(Bytes::from(collapse_whitespace(s).to_lowercase()))
            }
            Syntax::Integer => {
                let s = std::str::from_utf8(value).map_err(|_| failure("not utf-8"))?;
                let n: i64 = s.trim().parse().map_err(|_| failure("not an integer"))?;
                Ok(Bytes::from(n.to_string()))
            }
            Syntax::DistinguishedName => {
                let s = std::str::from_utf8(value).map_err(|_| failure("not utf-8"))?;
                Ok(Bytes::from(self.normalize_dn(s)?))
            }
        }
    }

    fn normalize_dn(&self, dn: &str) -> Result<String, CodecError> {
        if dn.trim().is_empty() {
            return Ok(String::new());
        }

        let mut rdns = Vec::new();
        for rdn in dn.split(',') {
            let mut parts = rdn.splitn(2, '=');
            let attr = parts.next().unwrap_or_default().trim();
            let value = match parts.next() {
                Some(v) => v,
                None => {
                    return Err(CodecError::Normalization {
                        attribute: "dn".to_string(),
                        reason: "RDN without '='",
                    })
                }
            };
            if attr.is_empty() {
                return Err(CodecError::Normalization {
                    attribute: "dn".to_string(),
                    reason: "RDN without attribute type",
                });
            }
            rdns.push(format!(
                "{}={}",
                attr.to_ascii_lowercase(),
                collapse_whitespace(value).to_lowercase()
            ));
        }

        Ok(rdns.join(","))
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_by_syntax() {
        let schema = StaticSchema::core();
        let cn = schema.name_to_descriptor("CN").unwrap();
        let desc = schema.name_to_descriptor("description").unwrap();
        let usn = schema.name_to_descriptor("usnchanged").unwrap();

        assert_eq!(schema.normalize(&cn, b"  Alice   Smith ").unwrap(), Bytes::from("alice smith"));
        assert_eq!(schema.normalize(&desc, b" Mixed  Case ").unwrap(), Bytes::from("Mixed Case"));
        assert_eq!(schema.normalize(&usn, b" 0042").unwrap(), Bytes::from("42"));
        assert!(schema.normalize(&usn, b"forty-two").is_err());
    }

    #[test]
    fn normalizes_dn() {
        let schema = StaticSchema::core();
        assert_eq!(
            schema.normalize_dn("CN=Alice Smith , OU=People,DC=Example,DC=com").unwrap(),
            "cn=alice smith,ou=people,dc=example,dc=com"
        );
        assert_eq!(schema.normalize_dn("").unwrap(), "");
        assert!(schema.normalize_dn("cn=a,garbage").is_err());
    }

    #[test]
    fn lookup_by_id_and_name_agree() {
        let schema = StaticSchema::core();
        let by_name = schema.name_to_descriptor("objectclass").unwrap();
        assert_eq!(schema.attr_id_to_descriptor(by_name.id), Some(by_name));
        assert_eq!(schema.attr_id_to_descriptor(999), None);
    }
}
