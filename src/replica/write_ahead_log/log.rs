use crate::commitlog::{self, Index};
use crate::replica::write_ahead_log::commit_stream::CommitStreamPublisher;
use crate::replica::{LogRecord, Term};
use std::io;

#[derive(Debug, thiserror::Error)]
pub(crate) enum LogStoreError {
    #[error("log record {actual:?} is out of order, next index is {expected:?}")]
    OutOfOrder { expected: Index, actual: Index },
    #[error("log store IO failure: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of checking a leader's `(preLogIndex, preLogTerm)` against the local log.
#[derive(Debug, PartialEq)]
pub(crate) enum LookupResult {
    NotFound,
    Mismatch(Term),
    Match,
}

/// WriteAheadLog is the raft-specific log facade.
///
/// Note: A log entry has 3 states (not modeled directly in code):
/// 1. Persisted - written to disk, not yet replicated to majority
/// 2. Committed - written to disk, replicated to majority
/// 3. Applied - a committed entry that the apply task has written to the storage engine
///
/// A log entry's state has no global truth. Each replica will have their own local view of what
/// state the log entry is in.
pub(crate) struct WriteAheadLog<L>
where
    L: commitlog::Log<LogRecord>,
{
    logger: slog::Logger,

    log: L,
    // Highest locally written entry (lastLogTerm, lastLogIndex).
    latest_entry_metadata: Option<(Term, Index)>,

    // Committed entries are published here, in order, for the apply task.
    commit_stream: CommitStreamPublisher,
    // Index of highest log entry known to be committed.
    commit_index: Option<Index>,
    // Index of highest entry handed to the apply task.
    index_to_apply: Option<Index>,
    // Index of highest entry the apply task reported as applied.
    last_applied_index: Option<Index>,
}

impl<L> WriteAheadLog<L>
where
    L: commitlog::Log<LogRecord>,
{
    /// `last_applied` comes from the storage engine. Everything up to it is known committed, so
    /// commit and apply tracking restart from there.
    pub(crate) fn open(
        logger: slog::Logger,
        log: L,
        commit_stream: CommitStreamPublisher,
        last_applied: Option<Index>,
    ) -> io::Result<Self> {
        let latest_index = log.next_index().checked_minus(1).filter(|i| *i >= log.first_index());
        let latest_entry_metadata = match latest_index {
            None => None,
            Some(index) => match log.read(index)? {
                Some(record) => Some((record.term, index)),
                None => return Err(invalid_data(format!("log is missing its last entry {:?}", index))),
            },
        };

        let applied_u64 = Index::opt_as_u64(last_applied);
        if applied_u64 > Index::opt_as_u64(latest_index) {
            return Err(invalid_data(format!(
                "storage engine has applied index {} but the log ends at {:?}",
                applied_u64, latest_index
            )));
        }
        if applied_u64 + 1 < log.first_index().as_u64() {
            return Err(invalid_data(format!(
                "storage engine has applied index {} but the log starts at {:?}",
                applied_u64,
                log.first_index()
            )));
        }

        slog::info!(
            logger,
            "Opened log. Latest entry: {:?}, last applied: {:?}",
            latest_entry_metadata,
            last_applied
        );

        Ok(WriteAheadLog {
            logger,
            log,
            latest_entry_metadata,
            commit_stream,
            commit_index: last_applied,
            index_to_apply: last_applied,
            last_applied_index: last_applied,
        })
    }

    pub(crate) fn latest_entry(&self) -> Option<(Term, Index)> {
        self.latest_entry_metadata
    }

    pub(crate) fn latest_index(&self) -> Option<Index> {
        self.latest_entry_metadata.map(|(_, index)| index)
    }

    pub(crate) fn next_index(&self) -> Index {
        self.log.next_index()
    }

    /// Lowest index still readable. Anything below was trimmed after being applied.
    pub(crate) fn first_index(&self) -> Index {
        self.log.first_index()
    }

    pub(crate) fn read(&self, index: Index) -> Result<Option<LogRecord>, io::Error> {
        self.log.read(index)
    }

    fn read_required(&self, index: Index) -> Result<LogRecord, io::Error> {
        match self.read(index)? {
            Some(record) => Ok(record),
            None => panic!("read_required() found no log entry for index {:?}", index),
        }
    }

    pub(crate) fn lookup_term(&self, index: Index, expected_term: Term) -> Result<LookupResult, io::Error> {
        if index < self.log.first_index() {
            // Trimmed entries were applied, so they're committed and match any leader's log.
            return Ok(match self.commit_index {
                Some(ci) if index <= ci => LookupResult::Match,
                _ => LookupResult::NotFound,
            });
        }

        Ok(match self.read(index)? {
            None => LookupResult::NotFound,
            Some(record) if record.term == expected_term => LookupResult::Match,
            Some(record) => LookupResult::Mismatch(record.term),
        })
    }

    /// Appends at `record.index`, which must be the next index.
    pub(crate) fn append_at(&mut self, record: LogRecord) -> Result<Index, LogStoreError> {
        let expected = self.log.next_index();
        if record.index != expected {
            return Err(LogStoreError::OutOfOrder {
                expected,
                actual: record.index,
            });
        }

        let appended_term = record.term;
        let appended_index = self.log.append(record)?;
        assert_eq!(appended_index, expected, "Appended log entry to unexpected index.");

        // Only update state after log action completes.
        self.latest_entry_metadata = Some((appended_term, appended_index));
        Ok(appended_index)
    }

    /// Removes every entry after `index` (everything, for `None`).
    ///
    /// Panics if that would remove a committed entry. Committed entries exist on a majority and
    /// may already be applied, so there is no safe way to continue.
    pub(crate) fn delete_after(&mut self, index: Option<Index>) -> Result<(), io::Error> {
        let first_removed = index.map(|i| i.plus(1)).unwrap_or_else(Index::start_index);
        match self.latest_index() {
            Some(latest) if latest >= first_removed => {}
            _ => return Ok(()),
        }

        if let Some(commit_index) = self.commit_index {
            if commit_index >= first_removed {
                panic!(
                    "FatalLogInconsistency: deleting log entries from {:?} would remove committed entry {:?}",
                    first_removed, commit_index
                );
            }
        }

        let new_latest_entry_metadata = match index {
            None => None,
            Some(i) => Some((self.read_required(i)?.term, i)),
        };

        self.log.truncate(first_removed)?;
        slog::info!(self.logger, "Deleted uncommitted log entries from {:?}", first_removed);

        self.latest_entry_metadata = new_latest_entry_metadata;
        Ok(())
    }

    pub(crate) fn commit_index(&self) -> Option<Index> {
        self.commit_index
    }

    /// Leader path. Returns true if the commit index moved.
    pub(crate) fn ratchet_fwd_commit_index_if_valid(
        &mut self,
        tentative_new_commit_index: Index,
        current_term: Term,
    ) -> Result<bool, io::Error> {
        if matches!(self.commit_index, Some(ci) if tentative_new_commit_index <= ci) {
            return Ok(false);
        }

        // > If there exists an N such that N > commitIndex, a majority
        // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
        // > set commitIndex = N (§5.3, §5.4).
        let record = self.read_required(tentative_new_commit_index)?;
        if record.term != current_term {
            return Ok(false);
        }

        self.ratchet_fwd_commit_index_panicking(tentative_new_commit_index);
        Ok(true)
    }

    /// Follower path. The commit index never moves backwards; a lower value is ignored.
    pub(crate) fn ratchet_fwd_commit_index_if_changed(&mut self, new_commit_index: Index) -> bool {
        if matches!(self.commit_index, Some(ci) if new_commit_index <= ci) {
            return false;
        }

        self.ratchet_fwd_commit_index_panicking(new_commit_index);
        true
    }

    fn ratchet_fwd_commit_index_panicking(&mut self, new_commit_index: Index) {
        let latest_locally_written_index = self.latest_index();
        assert!(
            matches!(latest_locally_written_index, Some(latest) if latest >= new_commit_index),
            "Can't ratchet commit index forwards past our local log. Expected [latest log] {:?} >= {:?} [input]",
            latest_locally_written_index,
            new_commit_index,
        );

        self.commit_index.replace(new_commit_index);
    }

    /// Hands every committed entry that hasn't been handed over yet to the apply task.
    pub(crate) fn apply_all_committed_entries(&mut self) {
        if let Err(e) = self.try_apply_all_committed_entries() {
            // Already persisted. We retry next time the commit index moves.
            slog::error!(self.logger, "Failed to read a committed log entry. {:?}", e);
        }
    }

    fn try_apply_all_committed_entries(&mut self) -> Result<(), io::Error> {
        let commit_index = match self.commit_index {
            Some(ci) => ci,
            None => return Ok(()),
        };

        let mut next = self
            .index_to_apply
            .map(|i| i.plus(1))
            .unwrap_or_else(Index::start_index);
        while next <= commit_index {
            let record = self.read_required(next)?;
            self.commit_stream.notify_commit(&self.logger, record);
            self.index_to_apply.replace(next);
            next = next.plus(1);
        }

        Ok(())
    }

    pub(crate) fn index_to_apply(&self) -> Option<Index> {
        self.index_to_apply
    }

    pub(crate) fn last_applied(&self) -> Option<Index> {
        self.last_applied_index
    }

    pub(crate) fn mark_applied(&mut self, index: Index) {
        if matches!(self.last_applied_index, Some(la) if index <= la) {
            return;
        }
        self.last_applied_index.replace(index);
    }

    /// Number of written entries the storage engine hasn't caught up with yet.
    pub(crate) fn apply_lag(&self) -> u64 {
        Index::opt_as_u64(self.latest_index()).saturating_sub(Index::opt_as_u64(self.last_applied_index))
    }

    /// Discards applied entries, keeping the `keep` most recent applied ones for lagging peers.
    pub(crate) fn retention_trim(&mut self, keep: u64) -> Result<(), io::Error> {
        let applied = Index::opt_as_u64(self.last_applied_index);
        let boundary = match (applied + 1).checked_sub(keep).and_then(Index::from_u64_opt) {
            Some(boundary) => boundary,
            None => return Ok(()),
        };

        if boundary > self.log.first_index() {
            self.log.trim_before(boundary)?;
            slog::debug!(self.logger, "Trimmed log before {:?}", boundary);
        }
        Ok(())
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::{FileLog, InMemoryLog, Log};
    use crate::replica::write_ahead_log::{commit_stream, CommitStream};

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn wal_with_terms(terms: &[u32]) -> (WriteAheadLog<InMemoryLog<LogRecord>>, CommitStream) {
        let (publisher, stream) = commit_stream::new();
        let mut wal = WriteAheadLog::open(logger(), InMemoryLog::create().unwrap(), publisher, None).unwrap();
        for term in terms {
            let index = wal.next_index();
            wal.append_at(LogRecord::no_op(index, Term::new(*term))).unwrap();
        }
        (wal, stream)
    }

    #[test]
    fn append_at_rejects_gaps() {
        let (mut wal, _stream) = wal_with_terms(&[1, 1]);

        let err = wal.append_at(LogRecord::no_op(Index::new(5), Term::new(1))).unwrap_err();
        assert!(matches!(
            err,
            LogStoreError::OutOfOrder { expected, actual } if expected == Index::new(3) && actual == Index::new(5)
        ));
        assert_eq!(wal.latest_entry(), Some((Term::new(1), Index::new(2))));
    }

    #[test]
    fn lookup_distinguishes_missing_and_mismatch() {
        let (wal, _stream) = wal_with_terms(&[1, 1, 4]);

        assert_eq!(wal.lookup_term(Index::new(3), Term::new(4)).unwrap(), LookupResult::Match);
        assert_eq!(
            wal.lookup_term(Index::new(3), Term::new(6)).unwrap(),
            LookupResult::Mismatch(Term::new(4))
        );
        assert_eq!(wal.lookup_term(Index::new(9), Term::new(4)).unwrap(), LookupResult::NotFound);
    }

    #[test]
    fn delete_after_rewinds_latest_entry() {
        let (mut wal, _stream) = wal_with_terms(&[1, 2, 2, 3]);

        wal.delete_after(Some(Index::new(2))).unwrap();
        assert_eq!(wal.latest_entry(), Some((Term::new(2), Index::new(2))));
        assert_eq!(wal.next_index(), Index::new(3));

        // Nothing after the end: no-op.
        wal.delete_after(Some(Index::new(2))).unwrap();
        wal.delete_after(Some(Index::new(7))).unwrap();
        assert_eq!(wal.next_index(), Index::new(3));

        wal.delete_after(None).unwrap();
        assert_eq!(wal.latest_entry(), None);
    }

    #[test]
    #[should_panic(expected = "FatalLogInconsistency")]
    fn delete_after_refuses_committed_entries() {
        let (mut wal, _stream) = wal_with_terms(&[1, 1, 1]);
        wal.ratchet_fwd_commit_index_if_changed(Index::new(2));

        wal.delete_after(Some(Index::new(1))).unwrap();
    }

    #[test]
    fn leader_commits_only_current_term_entries() {
        let (mut wal, _stream) = wal_with_terms(&[1, 1, 2]);

        assert!(!wal.ratchet_fwd_commit_index_if_valid(Index::new(2), Term::new(2)).unwrap());
        assert_eq!(wal.commit_index(), None);

        assert!(wal.ratchet_fwd_commit_index_if_valid(Index::new(3), Term::new(2)).unwrap());
        assert_eq!(wal.commit_index(), Some(Index::new(3)));

        // Never backwards.
        assert!(!wal.ratchet_fwd_commit_index_if_valid(Index::new(3), Term::new(2)).unwrap());
        assert!(!wal.ratchet_fwd_commit_index_if_changed(Index::new(1)));
        assert_eq!(wal.commit_index(), Some(Index::new(3)));
    }

    #[tokio::test]
    async fn committed_entries_are_published_once_in_order() {
        let (mut wal, mut stream) = wal_with_terms(&[1, 1, 1, 1]);

        wal.ratchet_fwd_commit_index_if_changed(Index::new(2));
        wal.apply_all_committed_entries();
        wal.apply_all_committed_entries();
        wal.ratchet_fwd_commit_index_if_changed(Index::new(3));
        wal.apply_all_committed_entries();

        for expected in 1..=3 {
            let entry = stream.recv().await.unwrap();
            assert_eq!(entry.record.index, Index::new(expected));
        }
        assert_eq!(wal.index_to_apply(), Some(Index::new(3)));
        drop(wal);
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn retention_trim_keeps_recent_applied_entries() {
        let terms = vec![1; 10];
        let (mut wal, _stream) = wal_with_terms(&terms);
        wal.ratchet_fwd_commit_index_if_changed(Index::new(8));
        wal.apply_all_committed_entries();

        // Nothing applied yet, nothing to trim.
        wal.retention_trim(3).unwrap();
        assert_eq!(wal.first_index(), Index::new(1));

        wal.mark_applied(Index::new(8));
        assert_eq!(wal.apply_lag(), 2);
        wal.retention_trim(3).unwrap();
        assert_eq!(wal.first_index(), Index::new(6));

        // Trimmed-but-committed entries still match.
        assert_eq!(wal.lookup_term(Index::new(2), Term::new(9)).unwrap(), LookupResult::Match);
    }

    #[test]
    fn reopen_recovers_latest_entry_and_apply_position() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut log: FileLog<LogRecord> = FileLog::open(dir.path()).unwrap();
            for (i, term) in [1, 1, 3].iter().enumerate() {
                log.append(LogRecord::no_op(Index::new_usize(i + 1), Term::new(*term)))
                    .unwrap();
            }
        }

        let (publisher, _stream) = commit_stream::new();
        let log: FileLog<LogRecord> = FileLog::open(dir.path()).unwrap();
        let wal = WriteAheadLog::open(logger(), log, publisher, Some(Index::new(2))).unwrap();
        assert_eq!(wal.latest_entry(), Some((Term::new(3), Index::new(3))));
        assert_eq!(wal.commit_index(), Some(Index::new(2)));
        assert_eq!(wal.index_to_apply(), Some(Index::new(2)));

        // Storage can't be ahead of the log.
        let (publisher, _stream) = commit_stream::new();
        let log: FileLog<LogRecord> = FileLog::open(dir.path()).unwrap();
        let err = WriteAheadLog::open(logger(), log, publisher, Some(Index::new(4))).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
