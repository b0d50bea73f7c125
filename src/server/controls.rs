//! Replica-to-replica RPCs ride on a base-scope search against a well-known pseudo-DN. The RPC
//! arguments travel in a request control, and the reply comes back as a single result entry whose
//! attributes hold decimal strings.

use crate::commitlog::Index;
use crate::grpc::proto_append_entries_control::Payload;
use crate::grpc::{
    ProtoAppendEntriesControl, ProtoAttribute, ProtoControl, ProtoHeartbeat, ProtoInitiateVoteControl,
    ProtoRequestVoteControl, ProtoScope, ProtoSearchEntry, ProtoSearchRequest, ProtoSearchResult,
};
use crate::replica::{
    AppendEntriesInput, AppendEntriesOutput, AppendEntriesPayload, AppendEntriesStatus, InitiateVoteInput, LogRecord,
    ReplicaId, RequestVoteInput, RequestVoteOutput, Term, TransportError, VoteDecision,
};
use bytes::Bytes;
use prost::Message;

pub(crate) const APPEND_ENTRIES_DN: &str = "cn=appendentries,cn=raftcontext";
pub(crate) const REQUEST_VOTE_DN: &str = "cn=requestvote,cn=raftcontext";
pub(crate) const INITIATE_VOTE_DN: &str = "cn=initiatevote,cn=raftcontext";

const APPEND_ENTRIES_OID: &str = "1.3.6.1.4.1.6876.40.10.1";
const REQUEST_VOTE_OID: &str = "1.3.6.1.4.1.6876.40.10.2";
const INITIATE_VOTE_OID: &str = "1.3.6.1.4.1.6876.40.10.3";

pub(crate) const RESULT_SUCCESS: u32 = 0;
pub(crate) const RESULT_PROTOCOL_ERROR: u32 = 2;
pub(crate) const RESULT_NO_SUCH_OBJECT: u32 = 32;
pub(crate) const RESULT_UNWILLING_TO_PERFORM: u32 = 53;

const ATTR_TERM: &str = "term";
const ATTR_STATUS: &str = "status";
const ATTR_VOTE_GRANTED: &str = "voteGranted";

// Older peers mark heartbeats with a one byte record instead of the dedicated payload variant.
const HEARTBEAT_SENTINEL: &[u8] = b"p";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ControlError {
    #[error("request has no control {0}")]
    MissingControl(&'static str),
    #[error("control value can't be decoded: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("invalid control: {0}")]
    Invalid(String),
}

// ---- client side ----

pub(crate) fn append_entries_request(input: &AppendEntriesInput) -> ProtoSearchRequest {
    let (pre_log_term, pre_log_index) = log_position_to_wire(input.previous_log_entry);
    let payload = match &input.payload {
        AppendEntriesPayload::Heartbeat => Payload::Heartbeat(ProtoHeartbeat {}),
        AppendEntriesPayload::Record(record) => Payload::LogRecord(record.pack().to_vec()),
    };

    let control = ProtoAppendEntriesControl {
        term: input.leader_term.as_u32(),
        leader: input.leader_id.as_str().to_string(),
        pre_log_index,
        pre_log_term,
        leader_commit: Index::opt_as_u64(input.leader_commit_index),
        payload: Some(payload),
    };
    search_request(APPEND_ENTRIES_DN, APPEND_ENTRIES_OID, &control)
}

pub(crate) fn request_vote_request(input: &RequestVoteInput) -> ProtoSearchRequest {
    let (last_log_term, last_log_index) = log_position_to_wire(input.candidate_last_log_entry);
    let control = ProtoRequestVoteControl {
        term: input.candidate_term.as_u32(),
        candidate_id: input.candidate_id.as_str().to_string(),
        last_log_index,
        last_log_term,
    };
    search_request(REQUEST_VOTE_DN, REQUEST_VOTE_OID, &control)
}

pub(crate) fn initiate_vote_request(requested_by: &ReplicaId) -> ProtoSearchRequest {
    let control = ProtoInitiateVoteControl {
        requested_by: requested_by.as_str().to_string(),
    };
    search_request(INITIATE_VOTE_DN, INITIATE_VOTE_OID, &control)
}

fn search_request<M: Message>(base_dn: &str, oid: &str, control: &M) -> ProtoSearchRequest {
    let mut value = Vec::with_capacity(control.encoded_len());
    control
        .encode(&mut value)
        .expect("Vec<u8> has unbounded capacity");

    ProtoSearchRequest {
        base_dn: base_dn.to_string(),
        scope: ProtoScope::BaseObject as i32,
        filter: "(objectClass=*)".to_string(),
        attributes: Vec::new(),
        controls: vec![ProtoControl {
            oid: oid.to_string(),
            critical: true,
            value,
        }],
    }
}

pub(crate) fn parse_append_entries_reply(result: ProtoSearchResult) -> Result<AppendEntriesOutput, TransportError> {
    check_result_code(&result)?;
    let term = Term::new(reply_u32(&result, ATTR_TERM)?);
    let status = match reply_u64(&result, ATTR_STATUS)? {
        0 => AppendEntriesStatus::Accepted,
        next_expected => AppendEntriesStatus::Rejected {
            last_log_index: Index::from_u64_opt(next_expected - 1),
        },
    };

    Ok(AppendEntriesOutput { term, status })
}

pub(crate) fn parse_request_vote_reply(result: ProtoSearchResult) -> Result<RequestVoteOutput, TransportError> {
    check_result_code(&result)?;
    let term = Term::new(reply_u32(&result, ATTR_TERM)?);
    let decision = match reply_u64(&result, ATTR_VOTE_GRANTED)? {
        0 => VoteDecision::Granted,
        1 => VoteDecision::Denied,
        2 => VoteDecision::StrongDenied,
        other => return Err(TransportError::Malformed(format!("unknown vote decision {}", other))),
    };

    Ok(RequestVoteOutput { term, decision })
}

pub(crate) fn parse_initiate_vote_reply(result: ProtoSearchResult) -> Result<(), TransportError> {
    check_result_code(&result)
}

fn check_result_code(result: &ProtoSearchResult) -> Result<(), TransportError> {
    match result.result_code {
        RESULT_SUCCESS => Ok(()),
        RESULT_UNWILLING_TO_PERFORM => Err(TransportError::Unwilling),
        code => Err(TransportError::Malformed(format!(
            "result code {}: {}",
            code, result.diagnostic_message
        ))),
    }
}

fn reply_u64(result: &ProtoSearchResult, name: &str) -> Result<u64, TransportError> {
    let value = result
        .entries
        .first()
        .and_then(|entry| {
            entry
                .attributes
                .iter()
                .find(|attr| attr.name.eq_ignore_ascii_case(name))
        })
        .and_then(|attr| attr.values.first())
        .ok_or_else(|| TransportError::Malformed(format!("reply has no {} attribute", name)))?;

    value
        .parse()
        .map_err(|_| TransportError::Malformed(format!("{} is not a number: {:?}", name, value)))
}

fn reply_u32(result: &ProtoSearchResult, name: &str) -> Result<u32, TransportError> {
    let value = reply_u64(result, name)?;
    if value > u32::MAX as u64 {
        return Err(TransportError::Malformed(format!("{} is out of range: {}", name, value)));
    }
    Ok(value as u32)
}

// ---- server side ----

pub(crate) fn decode_append_entries(request: &ProtoSearchRequest) -> Result<AppendEntriesInput, ControlError> {
    let control = ProtoAppendEntriesControl::decode(find_control(request, APPEND_ENTRIES_OID)?)?;
    let previous_log_entry = log_position_from_wire(control.pre_log_term, control.pre_log_index)?;

    let payload = match control.payload {
        None => return Err(ControlError::Invalid("missing payload".to_string())),
        Some(Payload::Heartbeat(_)) => AppendEntriesPayload::Heartbeat,
        Some(Payload::LogRecord(bytes)) if bytes == HEARTBEAT_SENTINEL => AppendEntriesPayload::Heartbeat,
        Some(Payload::LogRecord(bytes)) => {
            let record =
                LogRecord::unpack(Bytes::from(bytes)).map_err(|e| ControlError::Invalid(e.to_string()))?;
            let expected = Index::opt_as_u64(previous_log_entry.map(|(_, i)| i)) + 1;
            if record.index.as_u64() != expected {
                return Err(ControlError::Invalid(format!(
                    "record index {:?} doesn't follow pre_log_index {}",
                    record.index, control.pre_log_index
                )));
            }
            AppendEntriesPayload::Record(record)
        }
    };

    Ok(AppendEntriesInput {
        leader_term: Term::new(control.term),
        leader_id: ReplicaId::new(control.leader),
        previous_log_entry,
        leader_commit_index: Index::from_u64_opt(control.leader_commit),
        payload,
    })
}

pub(crate) fn decode_request_vote(request: &ProtoSearchRequest) -> Result<RequestVoteInput, ControlError> {
    let control = ProtoRequestVoteControl::decode(find_control(request, REQUEST_VOTE_OID)?)?;

    Ok(RequestVoteInput {
        candidate_term: Term::new(control.term),
        candidate_id: ReplicaId::new(control.candidate_id),
        candidate_last_log_entry: log_position_from_wire(control.last_log_term, control.last_log_index)?,
    })
}

pub(crate) fn decode_initiate_vote(request: &ProtoSearchRequest) -> Result<InitiateVoteInput, ControlError> {
    let control = ProtoInitiateVoteControl::decode(find_control(request, INITIATE_VOTE_OID)?)?;

    Ok(InitiateVoteInput {
        requested_by: ReplicaId::new(control.requested_by),
    })
}

fn find_control<'a>(request: &'a ProtoSearchRequest, oid: &'static str) -> Result<&'a [u8], ControlError> {
    request
        .controls
        .iter()
        .find(|control| control.oid == oid)
        .map(|control| control.value.as_slice())
        .ok_or(ControlError::MissingControl(oid))
}

pub(crate) fn append_entries_reply(output: &AppendEntriesOutput) -> ProtoSearchResult {
    // A rejection carries lastLogIndex + 1, not lastLogIndex: 0 means accepted, so an empty
    // follower log must still encode as a non-zero status.
    let status = match output.status {
        AppendEntriesStatus::Accepted => 0,
        AppendEntriesStatus::Rejected { last_log_index } => Index::opt_as_u64(last_log_index) + 1,
    };
    reply_entry(APPEND_ENTRIES_DN, output.term, ATTR_STATUS, status)
}

pub(crate) fn request_vote_reply(output: &RequestVoteOutput) -> ProtoSearchResult {
    reply_entry(REQUEST_VOTE_DN, output.term, ATTR_VOTE_GRANTED, output.decision as u64)
}

pub(crate) fn empty_success() -> ProtoSearchResult {
    error_result(RESULT_SUCCESS, String::new())
}

pub(crate) fn error_result(result_code: u32, diagnostic_message: String) -> ProtoSearchResult {
    ProtoSearchResult {
        result_code,
        diagnostic_message,
        entries: Vec::new(),
    }
}

fn reply_entry(dn: &str, term: Term, status_attr: &str, status: u64) -> ProtoSearchResult {
    let attribute = |name: &str, value: String| ProtoAttribute {
        name: name.to_string(),
        values: vec![value],
    };

    ProtoSearchResult {
        result_code: RESULT_SUCCESS,
        diagnostic_message: String::new(),
        entries: vec![ProtoSearchEntry {
            dn: dn.to_string(),
            attributes: vec![
                attribute(ATTR_TERM, term.as_u32().to_string()),
                attribute(status_attr, status.to_string()),
            ],
        }],
    }
}

// Index 0 on the wire means "no entry". Term must be 0 exactly when index is.
fn log_position_to_wire(position: Option<(Term, Index)>) -> (u32, u64) {
    match position {
        None => (0, 0),
        Some((term, index)) => (term.as_u32(), index.as_u64()),
    }
}

fn log_position_from_wire(term: u32, index: u64) -> Result<Option<(Term, Index)>, ControlError> {
    match (term, Index::from_u64_opt(index)) {
        (0, None) => Ok(None),
        (_, None) => Err(ControlError::Invalid(format!("log index 0 with non-zero term {}", term))),
        (term, Some(index)) => Ok(Some((Term::new(term), index))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_entries(payload: AppendEntriesPayload) -> AppendEntriesInput {
        AppendEntriesInput {
            leader_term: Term::new(5),
            leader_id: ReplicaId::new("leader-a"),
            previous_log_entry: Some((Term::new(5), Index::new(10))),
            leader_commit_index: Some(Index::new(9)),
            payload,
        }
    }

    #[test]
    fn append_entries_control_carries_record() {
        let record = LogRecord::no_op(Index::new(11), Term::new(5));
        let request = append_entries_request(&append_entries(AppendEntriesPayload::Record(record.clone())));
        assert_eq!(request.base_dn, APPEND_ENTRIES_DN);
        assert_eq!(request.scope, ProtoScope::BaseObject as i32);

        let decoded = decode_append_entries(&request).unwrap();
        assert_eq!(decoded.leader_id, ReplicaId::new("leader-a"));
        assert_eq!(decoded.previous_log_entry, Some((Term::new(5), Index::new(10))));
        assert_eq!(decoded.leader_commit_index, Some(Index::new(9)));
        match decoded.payload {
            AppendEntriesPayload::Record(decoded_record) => assert_eq!(decoded_record, record),
            other => panic!("Unexpected payload {:?}", other),
        }
    }

    #[test]
    fn sentinel_record_is_a_heartbeat() {
        let mut control = ProtoAppendEntriesControl {
            term: 5,
            leader: "leader-a".to_string(),
            pre_log_index: 10,
            pre_log_term: 5,
            leader_commit: 10,
            payload: Some(Payload::LogRecord(b"p".to_vec())),
        };
        let request = search_request(APPEND_ENTRIES_DN, APPEND_ENTRIES_OID, &control);
        assert!(matches!(
            decode_append_entries(&request).unwrap().payload,
            AppendEntriesPayload::Heartbeat
        ));

        control.payload = None;
        let request = search_request(APPEND_ENTRIES_DN, APPEND_ENTRIES_OID, &control);
        assert!(matches!(decode_append_entries(&request), Err(ControlError::Invalid(_))));
    }

    #[test]
    fn record_must_follow_previous_entry() {
        let record = LogRecord::no_op(Index::new(14), Term::new(5));
        let request = append_entries_request(&append_entries(AppendEntriesPayload::Record(record)));
        assert!(matches!(decode_append_entries(&request), Err(ControlError::Invalid(_))));

        let mut request = append_entries_request(&append_entries(AppendEntriesPayload::Heartbeat));
        request.controls[0].oid = REQUEST_VOTE_OID.to_string();
        assert!(matches!(
            decode_append_entries(&request),
            Err(ControlError::MissingControl(APPEND_ENTRIES_OID))
        ));
    }

    #[test]
    fn rejection_of_empty_log_is_not_success() {
        let reply = append_entries_reply(&AppendEntriesOutput {
            term: Term::new(7),
            status: AppendEntriesStatus::Rejected { last_log_index: None },
        });
        let attrs = &reply.entries[0].attributes;
        assert_eq!(attrs[0].values, vec!["7".to_string()]);
        assert_eq!(attrs[1].values, vec!["1".to_string()]);

        let parsed = parse_append_entries_reply(reply).unwrap();
        assert_eq!(parsed.term, Term::new(7));
        assert_eq!(parsed.status, AppendEntriesStatus::Rejected { last_log_index: None });

        let reply = append_entries_reply(&AppendEntriesOutput {
            term: Term::new(7),
            status: AppendEntriesStatus::Rejected {
                last_log_index: Some(Index::new(9)),
            },
        });
        assert_eq!(
            parse_append_entries_reply(reply).unwrap().status,
            AppendEntriesStatus::Rejected {
                last_log_index: Some(Index::new(9))
            }
        );
    }

    #[test]
    fn vote_reply_codes() {
        let input = RequestVoteInput {
            candidate_term: Term::new(3),
            candidate_id: ReplicaId::new("b"),
            candidate_last_log_entry: None,
        };
        let decoded = decode_request_vote(&request_vote_request(&input)).unwrap();
        assert_eq!(decoded.candidate_last_log_entry, None);
        assert_eq!(decoded.candidate_id, ReplicaId::new("b"));

        let reply = request_vote_reply(&RequestVoteOutput {
            term: Term::new(3),
            decision: VoteDecision::StrongDenied,
        });
        assert_eq!(reply.entries[0].attributes[1].name, ATTR_VOTE_GRANTED);
        assert_eq!(
            parse_request_vote_reply(reply).unwrap().decision,
            VoteDecision::StrongDenied
        );

        assert!(matches!(
            parse_request_vote_reply(error_result(RESULT_UNWILLING_TO_PERFORM, "busy".to_string())),
            Err(TransportError::Unwilling)
        ));
        assert!(matches!(
            parse_request_vote_reply(empty_success()),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn zero_index_with_term_is_invalid() {
        assert!(matches!(log_position_from_wire(4, 0), Err(ControlError::Invalid(_))));
        assert_eq!(log_position_from_wire(0, 0).unwrap(), None);
    }
}
