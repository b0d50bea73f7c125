use crate::commitlog::{Index, Log};
use crate::replica::write_ahead_log::{commit_stream, CommitStream, LogRecord, WriteAheadLog};
use std::io;

/// Opens the log facade over `log`, with a fresh commit stream for the apply task.
pub(crate) fn wired<L>(
    logger: slog::Logger,
    log: L,
    last_applied: Option<Index>,
) -> io::Result<(WriteAheadLog<L>, CommitStream)>
where
    L: Log<LogRecord>,
{
    let (publisher, stream) = commit_stream::new();

    let wal = WriteAheadLog::open(logger, log, publisher, last_applied)?;

    Ok((wal, stream))
}
