/// CodecError is returned by every encode/decode operation. None of these are retried; the
/// operation that produced the bytes (or the peer that shipped them) is at fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid entry: {0}")]
    InvalidEntry(&'static str),

    #[error("Value of attribute '{attribute}' is {len} bytes, max is {max}")]
    AttributeTooLarge { attribute: String, len: usize, max: usize },

    #[error("Attribute '{0}' has no resolved type descriptor")]
    MissingAttributeDescriptor(String),

    #[error("Unknown attribute type id {0}")]
    UnknownAttributeType(u16),

    #[error("Buffer truncated at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("Malformed encoding: {0}")]
    Malformed(String),

    #[error("Failed to normalize value of attribute '{attribute}': {reason}")]
    Normalization { attribute: String, reason: &'static str },
}
