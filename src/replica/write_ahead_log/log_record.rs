use crate::codec::{decode_change, encode_change, ByteReader, ChangeKind, CodecError, DirectoryChange, SchemaContext};
use crate::commitlog::{self, Index};
use crate::replica::Term;
use bytes::{BufMut, Bytes, BytesMut};
use std::convert::TryFrom;
use std::io;

/// Byte representation (big-endian):
///
/// ```text
/// | 0 .. 8       | 8 .. 12     | 12 .. 20        | 20 .. 24          | 24 ..          |
/// +--------------+-------------+-----------------+-------------------+----------------+
/// | Index (u64)  | Term (u32)  | Entry id (u64)  | Request code (u32)| Change (bytes) |
/// ```
///
/// The same bytes are written to disk and shipped to followers inside AppendEntries.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LogRecord {
    pub(crate) index: Index,
    pub(crate) term: Term,
    pub(crate) entry_id: u64,
    pub(crate) request_code: RequestCode,
    pub(crate) change: Bytes,
}

pub(crate) const LOG_RECORD_HEADER_LEN: usize = 8 + 4 + 8 + 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum RequestCode {
    NoOp = 0,
    Add = 1,
    Modify = 2,
    Delete = 3,
}

impl RequestCode {
    fn change_kind(self) -> Option<ChangeKind> {
        match self {
            RequestCode::NoOp => None,
            RequestCode::Add => Some(ChangeKind::Add),
            RequestCode::Modify => Some(ChangeKind::Modify),
            RequestCode::Delete => Some(ChangeKind::Delete),
        }
    }
}

impl TryFrom<u32> for RequestCode {
    type Error = CodecError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RequestCode::NoOp),
            1 => Ok(RequestCode::Add),
            2 => Ok(RequestCode::Modify),
            3 => Ok(RequestCode::Delete),
            other => Err(CodecError::Malformed(format!("unknown log request code {}", other))),
        }
    }
}

impl LogRecord {
    /// Appended by a new leader to commit entries from earlier terms.
    pub(crate) fn no_op(index: Index, term: Term) -> Self {
        LogRecord {
            index,
            term,
            entry_id: 0,
            request_code: RequestCode::NoOp,
            change: Bytes::new(),
        }
    }

    /// Add records are assigned the log index as entry id.
    pub(crate) fn for_change(index: Index, term: Term, change: &DirectoryChange) -> Result<Self, CodecError> {
        let (entry_id, request_code) = match change {
            DirectoryChange::Add(_) => (index.as_u64(), RequestCode::Add),
            DirectoryChange::Modify { .. } => (0, RequestCode::Modify),
            DirectoryChange::Delete { .. } => (0, RequestCode::Delete),
        };

        Ok(LogRecord {
            index,
            term,
            entry_id,
            request_code,
            change: encode_change(change)?,
        })
    }

    pub(crate) fn is_no_op(&self) -> bool {
        self.request_code == RequestCode::NoOp
    }

    /// Decodes the carried change. `None` for NoOp records.
    pub(crate) fn decode_change(&self, ctx: &SchemaContext) -> Result<Option<DirectoryChange>, CodecError> {
        match self.request_code.change_kind() {
            None => Ok(None),
            Some(kind) => decode_change(ctx, kind, self.entry_id, self.change.clone()).map(Some),
        }
    }

    pub(crate) fn pack(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LOG_RECORD_HEADER_LEN + self.change.len());
        buf.put_u64(self.index.as_u64());
        buf.put_u32(self.term.as_u32());
        buf.put_u64(self.entry_id);
        buf.put_u32(self.request_code as u32);
        buf.put_slice(&self.change);
        buf.freeze()
    }

    pub(crate) fn unpack(packed: Bytes) -> Result<Self, CodecError> {
        if packed.len() < LOG_RECORD_HEADER_LEN {
            return Err(CodecError::Truncated {
                offset: 0,
                needed: LOG_RECORD_HEADER_LEN,
                remaining: packed.len(),
            });
        }

        let mut reader = ByteReader::new(packed);
        let index = Index::from_u64_opt(reader.read_u64()?)
            .ok_or_else(|| CodecError::Malformed("log record with index 0".to_string()))?;
        let term = Term::new(reader.read_u32()?);
        let entry_id = reader.read_u64()?;
        let request_code = RequestCode::try_from(reader.read_u32()?)?;

        Ok(LogRecord {
            index,
            term,
            entry_id,
            request_code,
            change: reader.read_rest(),
        })
    }
}

impl commitlog::Entry for LogRecord {}

impl TryFrom<Vec<u8>> for LogRecord {
    type Error = io::Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        LogRecord::unpack(Bytes::from(bytes)).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl From<LogRecord> for Vec<u8> {
    fn from(record: LogRecord) -> Self {
        record.pack().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Attribute, Entry, StaticSchema};
    use std::sync::Arc;

    fn ctx() -> SchemaContext {
        SchemaContext::new(Arc::new(StaticSchema::core()))
    }

    fn person(ctx: &SchemaContext) -> Entry {
        let mut entry = Entry::new(0)
            .with_attribute(Attribute::new("dn", vec!["cn=alice,dc=example"]))
            .with_attribute(Attribute::new("objectClass", vec!["person"]))
            .with_attribute(Attribute::new("cn", vec!["alice"]));
        entry.resolve_descriptors(ctx).unwrap();
        entry
    }

    #[test]
    fn add_record_uses_index_as_entry_id() {
        let ctx = ctx();
        let record = LogRecord::for_change(Index::new(11), Term::new(5), &DirectoryChange::Add(person(&ctx))).unwrap();

        let packed = record.pack();
        assert_eq!(&packed[..8], &11u64.to_be_bytes());
        assert_eq!(&packed[8..12], &5u32.to_be_bytes());
        assert_eq!(&packed[12..20], &11u64.to_be_bytes());
        assert_eq!(&packed[20..24], &1u32.to_be_bytes());

        let unpacked = LogRecord::unpack(packed).unwrap();
        assert_eq!(unpacked, record);
        match unpacked.decode_change(&ctx).unwrap() {
            Some(DirectoryChange::Add(entry)) => {
                assert_eq!(entry.entry_id, 11);
                assert_eq!(entry.dn.unwrap().normalized, "cn=alice,dc=example");
            }
            other => panic!("Unexpected change {:?}", other),
        }
    }

    #[test]
    fn no_op_has_empty_change() {
        let record = LogRecord::no_op(Index::new(1), Term::new(2));
        assert_eq!(record.pack().len(), LOG_RECORD_HEADER_LEN);
        assert_eq!(record.decode_change(&ctx()).unwrap(), None);
        assert!(LogRecord::unpack(record.pack()).unwrap().is_no_op());
    }

    #[test]
    fn unpack_rejects_short_and_unknown_code() {
        assert!(matches!(
            LogRecord::unpack(Bytes::from_static(b"p")),
            Err(CodecError::Truncated { .. })
        ));

        let mut packed = LogRecord::no_op(Index::new(1), Term::new(2)).pack().to_vec();
        packed[23] = 9;
        assert!(matches!(
            LogRecord::unpack(Bytes::from(packed)),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn disk_conversion_reports_invalid_data() {
        let err = LogRecord::try_from(vec![0u8; 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
