use std::convert::TryFrom;
use std::{fmt, io};

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
struct U64NonZero(u64);

impl U64NonZero {
    fn new(val: u64) -> Self {
        assert_ne!(val, 0);
        U64NonZero(val)
    }
}

/// Index is an index of an entry in the log; i.e. a log entry's index.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Index(U64NonZero);

impl Index {
    pub fn new(index: u64) -> Self {
        Index(U64NonZero::new(index))
    }

    pub fn new_usize(index: usize) -> Self {
        Self::new(index as u64)
    }

    pub fn start_index() -> Self {
        Self::new(1)
    }

    /// Wire and disk formats use 0 for "no index".
    pub fn from_u64_opt(index: u64) -> Option<Self> {
        if index == 0 {
            None
        } else {
            Some(Self::new(index))
        }
    }

    pub fn opt_as_u64(index: Option<Index>) -> u64 {
        index.map(|i| i.as_u64()).unwrap_or(0)
    }

    pub fn as_u64(&self) -> u64 {
        self.0 .0
    }

    pub fn plus(&self, delta: u64) -> Index {
        Index::new(self.as_u64() + delta)
    }

    pub fn minus(&self, delta: u64) -> Index {
        Index::new(self.as_u64() - delta)
    }

    pub fn checked_minus(&self, delta: u64) -> Option<Index> {
        Self::from_u64_opt(self.as_u64().saturating_sub(delta))
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 .0)
    }
}

/// Log is an append only log intended for use as a replicated commit log in a database.
///
/// Log indexes entries starting from 1. There will be no entry existing at index 0. The first
/// entry is written at index 1. Once the head of the log has been trimmed, `first_index()` moves
/// forward and reads below it return `None`.
pub trait Log<E: Entry> {
    /// append() appends a log entry to the log at the next log entry index, then returns
    /// the log entry index that was just used to append the entry.
    fn append(&mut self, entry: E) -> Result<Index, io::Error>;

    /// Read log entry at specified index.
    fn read(&self, index: Index) -> Result<Option<E>, io::Error>;

    /// Removes `index` and everything after it.
    fn truncate(&mut self, index: Index) -> Result<(), io::Error>;

    /// Discards everything before `index`. The log keeps its numbering.
    fn trim_before(&mut self, index: Index) -> Result<(), io::Error>;

    /// next_index returns the next index that will be used to append an entry.
    fn next_index(&self) -> Index;

    /// first_index is the lowest index still readable (equal to `next_index()` for an empty log).
    fn first_index(&self) -> Index;
}

// Choice of Vec<u8> vs Bytes will depend on whats easier for disk to use.
pub trait Entry: Clone + TryFrom<Vec<u8>, Error = io::Error> + Into<Vec<u8>> {}
