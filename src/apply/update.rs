use crate::apply::AppliedChange;
use crate::codec::{Attribute, DirectoryChange, ModOp};
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// ReplicationUpdate describes one change after it reached the storage engine. It is what the
/// application sees on the commit stream, in index order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicationUpdate {
    pub index: u64,
    pub term: u32,
    pub entry_id: u64,
    pub change: DirectoryChange,
    pub sync_state: SyncState,
    pub metadata_list: Vec<AttributeMetadata>,
    pub value_metadata_list: Vec<ValueMetadata>,
    /// The log index doubles as the update sequence number replicas exchange.
    pub partner_usn: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncState {
    Add,
    Modify,
    Delete,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeMetadata {
    pub attribute: String,
    pub local_usn: u64,
    pub version: u64,
    pub originating_id: String,
    pub originating_time: DateTime<Utc>,
    pub originating_usn: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueOp {
    Add,
    Delete,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValueMetadata {
    pub attribute: String,
    pub op: ValueOp,
    pub value: Bytes,
}

impl ReplicationUpdate {
    pub(crate) fn new(
        applied: AppliedChange,
        entry_id: u64,
        originating_id: &str,
        originating_time: DateTime<Utc>,
    ) -> Self {
        let usn = applied.index;
        // No per-attribute history is kept here, so every touched attribute is reported at version 1.
        let metadata = |attr: &Attribute| AttributeMetadata {
            attribute: attr.name.clone(),
            local_usn: usn,
            version: 1,
            originating_id: originating_id.to_string(),
            originating_time,
            originating_usn: usn,
        };

        let (sync_state, metadata_list, value_metadata_list) = match &applied.change {
            DirectoryChange::Add(entry) => (
                SyncState::Add,
                entry
                    .attributes
                    .iter()
                    .filter(|attr| !attr.values.is_empty())
                    .map(metadata)
                    .collect(),
                Vec::new(),
            ),
            DirectoryChange::Modify { mods, .. } => {
                let values = mods
                    .iter()
                    .filter_map(|m| match m.op {
                        ModOp::Add => Some((ValueOp::Add, &m.attribute)),
                        ModOp::Delete => Some((ValueOp::Delete, &m.attribute)),
                        ModOp::Replace => None,
                    })
                    .flat_map(|(op, attr)| {
                        attr.values.iter().map(move |value| ValueMetadata {
                            attribute: attr.name.clone(),
                            op,
                            value: value.clone(),
                        })
                    })
                    .collect();
                (
                    SyncState::Modify,
                    mods.iter().map(|m| metadata(&m.attribute)).collect(),
                    values,
                )
            }
            DirectoryChange::Delete { .. } => (SyncState::Delete, Vec::new(), Vec::new()),
        };

        ReplicationUpdate {
            index: applied.index,
            term: applied.term,
            entry_id,
            change: applied.change,
            sync_state,
            metadata_list,
            value_metadata_list,
            partner_usn: usn,
        }
    }
}
