//! Binary entry/mods codec. This is the payload format carried inside replicated log records and the
//! record format handed to the storage engine.

mod change;
mod entry;
mod error;
mod framing;
mod mods;
mod reader;
mod schema;

pub use change::ChangeKind;
pub use change::DirectoryChange;
pub use entry::Attribute;
pub use entry::Dn;
pub use entry::EncodedSize;
pub use entry::Entry;
pub use entry::ATTR_DN;
pub use entry::ATTR_OBJECT_CLASS;
pub use error::CodecError;
pub use mods::ModOp;
pub use mods::Modification;
pub use schema::AttributeDescriptor;
pub use schema::SchemaContext;
pub use schema::SchemaResolver;
pub use schema::StaticSchema;
pub use schema::Syntax;
pub use schema::SUB_SCHEMA_SUB_ENTRY_ID;

pub use entry::compute_encoded_size;
pub use entry::decode_entry;
pub use entry::encode_entry;
pub use entry::entry_sanity_check;
pub use mods::decode_mods;
pub use mods::encode_mods;

pub(crate) use change::decode_change;
pub(crate) use change::encode_change;
pub(crate) use reader::ByteReader;
