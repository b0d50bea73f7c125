//! Raft-specific log facade over the generic `commitlog`.

mod commit_stream;
mod log;
mod log_record;
mod wiring;

pub(crate) use commit_stream::CommitStream;
pub(crate) use commit_stream::CommittedEntry;
pub(crate) use log::LogStoreError;
pub(crate) use log::LookupResult;
pub(crate) use log::WriteAheadLog;
pub(crate) use log_record::LogRecord;
pub(crate) use log_record::RequestCode;
pub(crate) use wiring::wired;
