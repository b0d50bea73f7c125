use crate::commitlog::{Entry, Index, Log};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

const LOG_FILE_NAME: &str = "raft.log";
const RECORD_HEADER_LEN: u64 = 8 + 4;

/// FileLog is a single append-only file of records:
///
/// ```text
/// <u64 index><u32 len><len bytes>
/// ```
///
/// Every append is synced before returning. Truncating the tail is an in-place `set_len`; trimming
/// the head rewrites the surviving records to a temp file and renames it over the log.
///
/// On open, a partially written record at the end of the file (crash mid-append) is cut off.
pub struct FileLog<E: Entry> {
    path: PathBuf,
    file: File,
    // Byte offset of each record, starting at `first_index`.
    offsets: VecDeque<u64>,
    first_index: Index,
    end_offset: u64,
    _pd: PhantomData<E>,
}

impl<E: Entry> FileLog<E> {
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, io::Error> {
        fs::create_dir_all(directory.as_ref())?;
        let path = directory.as_ref().join(LOG_FILE_NAME);

        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let (first_index, offsets, end_offset) = Self::scan(&file)?;
        if end_offset != file.metadata()?.len() {
            file.set_len(end_offset)?;
            file.sync_all()?;
        }

        Ok(FileLog {
            path,
            file,
            offsets,
            first_index,
            end_offset,
            _pd: PhantomData::default(),
        })
    }

    fn scan(file: &File) -> Result<(Index, VecDeque<u64>, u64), io::Error> {
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0))?;

        let mut offsets = VecDeque::new();
        let mut first_index = None;
        let mut offset = 0;
        while offset + RECORD_HEADER_LEN <= file_len {
            let (index, len) = read_header(&mut reader)?;
            if offset + RECORD_HEADER_LEN + len as u64 > file_len {
                break;
            }
            let expected = first_index.map(|first: Index| first.plus(offsets.len() as u64));
            match expected {
                Some(expected) if expected.as_u64() != index => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("log record {:?} found where {} was expected", expected, index),
                    ));
                }
                None => first_index = Some(Index::from_u64_opt(index).ok_or_else(zero_index_error)?),
                _ => {}
            }
            reader.seek(SeekFrom::Current(len as i64))?;
            offsets.push_back(offset);
            offset += RECORD_HEADER_LEN + len as u64;
        }

        Ok((first_index.unwrap_or_else(Index::start_index), offsets, offset))
    }

    fn vec_index(&self, index: Index) -> Option<usize> {
        if index < self.first_index {
            return None;
        }
        let i = (index.as_u64() - self.first_index.as_u64()) as usize;
        if i < self.offsets.len() {
            Some(i)
        } else {
            None
        }
    }

    fn read_at(&self, offset: u64) -> Result<(u64, Vec<u8>), io::Error> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(offset))?;
        let (index, len) = read_header(&mut reader)?;
        let mut bytes = vec![0; len as usize];
        reader.read_exact(&mut bytes)?;
        Ok((index, bytes))
    }
}

impl<E: Entry> Log<E> for FileLog<E> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        let index = self.next_index();
        let bytes: Vec<u8> = entry.into();

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN as usize + bytes.len());
        record.extend_from_slice(&index.as_u64().to_be_bytes());
        record.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        record.extend_from_slice(&bytes);

        self.file.seek(SeekFrom::Start(self.end_offset))?;
        self.file.write_all(&record)?;
        self.file.sync_data()?;

        self.offsets.push_back(self.end_offset);
        self.end_offset += record.len() as u64;
        Ok(index)
    }

    fn read(&self, index: Index) -> Result<Option<E>, io::Error> {
        let offset = match self.vec_index(index) {
            Some(i) => self.offsets[i],
            None => return Ok(None),
        };

        let (stored_index, bytes) = self.read_at(offset)?;
        if stored_index != index.as_u64() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("read log record {} at slot for {:?}", stored_index, index),
            ));
        }
        E::try_from(bytes).map(Some)
    }

    fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        let keep = match self.vec_index(index) {
            Some(i) => i,
            None if index < self.first_index => 0,
            None => return Ok(()),
        };
        let new_end = self.offsets.get(keep).copied().unwrap_or(self.end_offset);

        self.file.set_len(new_end)?;
        self.file.sync_all()?;
        self.offsets.truncate(keep);
        self.end_offset = new_end;
        Ok(())
    }

    fn trim_before(&mut self, index: Index) -> Result<(), io::Error> {
        let index = std::cmp::min(index, self.next_index());
        if index <= self.first_index {
            return Ok(());
        }
        let drop_count = (index.as_u64() - self.first_index.as_u64()) as usize;
        let cut = self.offsets.get(drop_count).copied().unwrap_or(self.end_offset);

        let temp_path = self.path.with_extension("tmp");
        {
            let mut src = BufReader::new(File::open(&self.path)?);
            src.seek(SeekFrom::Start(cut))?;
            let mut dst = File::create(&temp_path)?;
            io::copy(&mut src.take(self.end_offset - cut), &mut dst)?;
            dst.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        self.offsets.drain(..drop_count);
        for offset in self.offsets.iter_mut() {
            *offset -= cut;
        }
        self.end_offset -= cut;
        self.first_index = index;
        Ok(())
    }

    fn next_index(&self) -> Index {
        self.first_index.plus(self.offsets.len() as u64)
    }

    fn first_index(&self) -> Index {
        self.first_index
    }
}

fn read_header(reader: &mut impl Read) -> Result<(u64, u32), io::Error> {
    let mut index = [0; 8];
    let mut len = [0; 4];
    reader.read_exact(&mut index)?;
    reader.read_exact(&mut len)?;
    Ok((u64::from_be_bytes(index), u32::from_be_bytes(len)))
}

fn zero_index_error() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "log record with index 0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::in_memory::tests::{entry, exercise_log, TestEntry};

    #[test]
    fn file_log_contract() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = FileLog::open(dir.path()).unwrap();
        exercise_log(&mut log);
    }

    #[test]
    fn survives_reopen_after_trim_and_truncate() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut log: FileLog<TestEntry> = FileLog::open(dir.path()).unwrap();
            for v in 1..=6 {
                log.append(entry(v)).unwrap();
            }
            log.trim_before(Index::new(3)).unwrap();
            log.truncate(Index::new(6)).unwrap();
        }

        let log: FileLog<TestEntry> = FileLog::open(dir.path()).unwrap();
        assert_eq!(log.first_index(), Index::new(3));
        assert_eq!(log.next_index(), Index::new(6));
        assert_eq!(log.read(Index::new(2)).unwrap(), None);
        assert_eq!(log.read(Index::new(5)).unwrap(), Some(entry(5)));
    }

    #[test]
    fn torn_tail_is_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut log: FileLog<TestEntry> = FileLog::open(dir.path()).unwrap();
            log.append(entry(1)).unwrap();
            log.append(entry(2)).unwrap();
        }
        let path = dir.path().join(LOG_FILE_NAME);
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 1).unwrap();

        let mut log: FileLog<TestEntry> = FileLog::open(dir.path()).unwrap();
        assert_eq!(log.next_index(), Index::new(2));
        assert_eq!(log.append(entry(7)).unwrap(), Index::new(2));
        assert_eq!(log.read(Index::new(2)).unwrap(), Some(entry(7)));
    }

    #[test]
    fn corrupt_entry_surfaces_as_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut log: FileLog<TestEntry> = FileLog::open(dir.path()).unwrap();
        let index = log.append(TestEntry(vec![])).unwrap();
        assert_eq!(log.read(index).unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
