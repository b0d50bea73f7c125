use crate::replica::ReplicaId;
use std::convert::TryInto;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::fmt;

const STATE_FILE_NAME: &str = "raft_state";
const STATE_FORMAT_VERSION: u8 = 1;

#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub(crate) struct Term(u32);

impl Term {
    pub(crate) fn new(term: u32) -> Self {
        Term(term)
    }

    pub(crate) fn as_u32(&self) -> u32 {
        self.0
    }

    pub(crate) fn incr(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PersistentLocalState is used whenever raft requires that something is persisted to a durable
/// store to guarantee safety. Not everything that uses disk has to go through this, only
/// algorithm-correctness-critical ones.
///
/// Store methods are CAS-like: they return `Ok(true)` if state was mutated. A method returns only
/// after the new state is durable, so callers may reply to peers right after.
pub(crate) trait PersistentLocalState: Send + 'static {
    /// Set current term to `new_term` atomically, iff it is larger than current term. Clears the
    /// vote.
    fn store_term_if_increased(&mut self, new_term: Term) -> io::Result<bool>;

    /// Store our vote for the latest term iff the latest term (internal state) is the same term as
    /// the one provided, and we have not stored a vote for the latest term.
    fn store_vote_for_term_if_unvoted(&mut self, expected_current_term: Term, vote: ReplicaId) -> io::Result<bool>;

    /// Return the new term. Used when transitioning to candidate.
    fn increment_term_and_vote_for_self(&mut self) -> io::Result<Term>;

    fn current_term(&self) -> Term;

    fn voted_for_current_term(&self) -> (Term, Option<ReplicaId>);
}

#[derive(Clone, Debug, PartialEq)]
struct TermAndVote {
    current_term: Term,
    voted_for: Option<ReplicaId>,
}

impl TermAndVote {
    fn initial() -> Self {
        TermAndVote {
            current_term: Term::new(0),
            voted_for: None,
        }
    }

    fn increased(&self, new_term: Term) -> Option<Self> {
        if new_term <= self.current_term {
            return None;
        }
        Some(TermAndVote {
            current_term: new_term,
            voted_for: None,
        })
    }

    fn voted(&self, expected_term: Term, vote: ReplicaId) -> Option<Self> {
        if expected_term != self.current_term || self.voted_for.is_some() {
            return None;
        }
        Some(TermAndVote {
            current_term: self.current_term,
            voted_for: Some(vote),
        })
    }

    fn next_term_voting_for(&self, me: &ReplicaId) -> Self {
        let mut current_term = self.current_term;
        current_term.incr();
        TermAndVote {
            current_term,
            voted_for: Some(me.clone()),
        }
    }
}

/// In-memory term/vote. Used when the application runs without a data directory.
pub(crate) struct VolatileLocalState {
    state: TermAndVote,
    my_replica_id: ReplicaId,
}

impl VolatileLocalState {
    pub(crate) fn new(my_replica_id: ReplicaId) -> Self {
        VolatileLocalState {
            state: TermAndVote::initial(),
            my_replica_id,
        }
    }
}

impl PersistentLocalState for VolatileLocalState {
    fn store_term_if_increased(&mut self, new_term: Term) -> io::Result<bool> {
        Ok(match self.state.increased(new_term) {
            Some(new_state) => {
                self.state = new_state;
                true
            }
            None => false,
        })
    }

    fn store_vote_for_term_if_unvoted(&mut self, expected_term: Term, vote: ReplicaId) -> io::Result<bool> {
        Ok(match self.state.voted(expected_term, vote) {
            Some(new_state) => {
                self.state = new_state;
                true
            }
            None => false,
        })
    }

    fn increment_term_and_vote_for_self(&mut self) -> io::Result<Term> {
        self.state = self.state.next_term_voting_for(&self.my_replica_id);
        Ok(self.state.current_term)
    }

    fn current_term(&self) -> Term {
        self.state.current_term
    }

    fn voted_for_current_term(&self) -> (Term, Option<ReplicaId>) {
        (self.state.current_term, self.state.voted_for.clone())
    }
}

/// FileLocalState keeps term and vote in a single small file:
///
/// ```text
/// <u8 version><u32 term><u16 votedForLen><votedFor bytes>
/// ```
///
/// A zero-length votedFor means no vote. Each update writes a temp file, fsyncs it and renames it
/// over the old one, so a crash leaves either the old or the new state. A missing file is a
/// fresh replica.
pub(crate) struct FileLocalState {
    path: PathBuf,
    state: TermAndVote,
    my_replica_id: ReplicaId,
}

impl FileLocalState {
    pub(crate) fn open(directory: impl AsRef<Path>, my_replica_id: ReplicaId) -> io::Result<Self> {
        fs::create_dir_all(directory.as_ref())?;
        let path = directory.as_ref().join(STATE_FILE_NAME);
        let state = if path.exists() {
            Self::decode(&fs::read(&path)?)?
        } else {
            TermAndVote::initial()
        };

        Ok(FileLocalState {
            path,
            state,
            my_replica_id,
        })
    }

    fn persist(&mut self, new_state: TermAndVote) -> io::Result<()> {
        let voted_for = new_state.voted_for.as_ref().map(|id| id.as_str()).unwrap_or("");
        let mut bytes = Vec::with_capacity(1 + 4 + 2 + voted_for.len());
        bytes.push(STATE_FORMAT_VERSION);
        bytes.extend_from_slice(&new_state.current_term.as_u32().to_be_bytes());
        bytes.extend_from_slice(&(voted_for.len() as u16).to_be_bytes());
        bytes.extend_from_slice(voted_for.as_bytes());

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;

        // Only update memory once disk has the new state.
        self.state = new_state;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> io::Result<TermAndVote> {
        let invalid = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, format!("raft state file: {}", msg));

        if bytes.len() < 7 {
            return Err(invalid("too short"));
        }
        if bytes[0] != STATE_FORMAT_VERSION {
            return Err(invalid("unknown version"));
        }
        let term = u32::from_be_bytes(bytes[1..5].try_into().map_err(|_| invalid("bad term"))?);
        let vote_len = u16::from_be_bytes(bytes[5..7].try_into().map_err(|_| invalid("bad vote length"))?) as usize;
        let vote_bytes = bytes.get(7..7 + vote_len).ok_or_else(|| invalid("truncated vote"))?;

        let voted_for = if vote_len == 0 {
            None
        } else {
            let id = String::from_utf8(vote_bytes.to_vec()).map_err(|_| invalid("vote is not utf-8"))?;
            Some(ReplicaId::new(id))
        };

        Ok(TermAndVote {
            current_term: Term::new(term),
            voted_for,
        })
    }
}

impl PersistentLocalState for FileLocalState {
    fn store_term_if_increased(&mut self, new_term: Term) -> io::Result<bool> {
        match self.state.increased(new_term) {
            Some(new_state) => self.persist(new_state).map(|_| true),
            None => Ok(false),
        }
    }

    fn store_vote_for_term_if_unvoted(&mut self, expected_term: Term, vote: ReplicaId) -> io::Result<bool> {
        match self.state.voted(expected_term, vote) {
            Some(new_state) => self.persist(new_state).map(|_| true),
            None => Ok(false),
        }
    }

    fn increment_term_and_vote_for_self(&mut self) -> io::Result<Term> {
        let new_state = self.state.next_term_voting_for(&self.my_replica_id);
        let term = new_state.current_term;
        self.persist(new_state)?;
        Ok(term)
    }

    fn current_term(&self) -> Term {
        self.state.current_term
    }

    fn voted_for_current_term(&self) -> (Term, Option<ReplicaId>) {
        (self.state.current_term, self.state.voted_for.clone())
    }
}
