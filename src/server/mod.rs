mod controls;
mod server;
mod shutdown;

pub(crate) use controls::append_entries_request;
pub(crate) use controls::initiate_vote_request;
pub(crate) use controls::parse_append_entries_reply;
pub(crate) use controls::parse_initiate_vote_reply;
pub(crate) use controls::parse_request_vote_reply;
pub(crate) use controls::request_vote_request;
pub(crate) use server::RpcServer;
pub(crate) use shutdown::shutdown_signal;
pub(crate) use shutdown::RpcServerShutdownHandle;
pub(crate) use shutdown::RpcServerShutdownSignal;
