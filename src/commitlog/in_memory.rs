use crate::commitlog::{Entry, Index, Log};
use std::collections::VecDeque;
use std::convert::TryFrom;
use std::io;
use std::marker::PhantomData;

/// InMemoryLog keeps the serialized form of each entry, so the byte conversions get exercised the
/// same way as with `FileLog`.
pub struct InMemoryLog<E: Entry> {
    log: VecDeque<Vec<u8>>,
    first_index: Index,
    _pd: PhantomData<E>,
}

impl<E: Entry> InMemoryLog<E> {
    pub fn create() -> Result<Self, io::Error> {
        Ok(InMemoryLog {
            log: VecDeque::new(),
            first_index: Index::start_index(),
            _pd: PhantomData::default(),
        })
    }

    fn vec_index(&self, index: Index) -> Option<usize> {
        if index < self.first_index {
            return None;
        }
        Some((index.as_u64() - self.first_index.as_u64()) as usize)
    }
}

impl<E: Entry> Log<E> for InMemoryLog<E> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        self.log.push_back(entry.into());

        Ok(self.first_index.plus(self.log.len() as u64 - 1))
    }

    fn read(&self, index: Index) -> Result<Option<E>, io::Error> {
        match self.vec_index(index).and_then(|i| self.log.get(i)) {
            Some(bytes) => E::try_from(bytes.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        let keep = self.vec_index(index).unwrap_or(0);
        self.log.truncate(keep);
        Ok(())
    }

    fn trim_before(&mut self, index: Index) -> Result<(), io::Error> {
        let index = std::cmp::min(index, self.next_index());
        if let Some(drop_count) = self.vec_index(index) {
            self.log.drain(..drop_count);
            self.first_index = index;
        }
        Ok(())
    }

    fn next_index(&self) -> Index {
        self.first_index.plus(self.log.len() as u64)
    }

    fn first_index(&self) -> Index {
        self.first_index
    }
}
