use crate::error::TransportError;
use serde::{Deserialize, Serialize};

/// Operation kinds carried in the message envelope.
pub mod op {
    pub const REQ: i32 = 1;
    pub const RSP: i32 = 2;
    pub const EVT: i32 = 3;
}

/// Message type tags carried in the message envelope. Only the sync
/// messages are decoded by the transport; everything else is opaque data
/// in transit.
pub mod msg_type {
    pub const ERR: i32 = 1;
    pub const SYNC: i32 = 2;
    pub const SYNC_EVT: i32 = 3;
}

const WILDCARD: i32 = -1;

fn wildcard() -> i32 {
    WILDCARD
}

/// Common envelope present on every message exchanged with the host
/// daemon. `seq` and `conn_handle` are -1 on the wire when unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: i32,
    #[serde(rename = "type")]
    pub msg_type: i32,
    #[serde(default = "wildcard")]
    pub seq: i32,
    #[serde(default = "wildcard")]
    pub conn_handle: i32,
}

/// Sync-status request sent at the start of every orchestration attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReq {
    pub op: i32,
    #[serde(rename = "type")]
    pub msg_type: i32,
    pub seq: i32,
}

impl SyncReq {
    pub fn new(seq: i32) -> Self {
        SyncReq {
            op: op::REQ,
            msg_type: msg_type::SYNC,
            seq,
        }
    }
}

/// Response to the sync-status request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRsp {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub synced: bool,
}

/// Asynchronous sync event; the controller may report sync (or its loss)
/// at arbitrary times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvt {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub synced: bool,
}

/// A decoded inbound message. Non-sync message types are routed by their
/// envelope but their payload is left as raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SyncRsp(SyncRsp),
    SyncEvt(SyncEvt),
    Other {
        envelope: Envelope,
        body: serde_json::Value,
    },
}

impl Message {
    pub fn envelope(&self) -> &Envelope {
        match self {
            Message::SyncRsp(rsp) => &rsp.envelope,
            Message::SyncEvt(evt) => &evt.envelope,
            Message::Other { envelope, .. } => envelope,
        }
    }
}

/// Decode one inbound frame into a routable message.
pub fn decode(buf: &[u8]) -> Result<Message, TransportError> {
    let body: serde_json::Value =
        serde_json::from_slice(buf).map_err(|e| TransportError::Codec(e.to_string()))?;
    let envelope: Envelope = serde_json::from_value(body.clone())
        .map_err(|e| TransportError::Codec(e.to_string()))?;

    match (envelope.op, envelope.msg_type) {
        (op::RSP, msg_type::SYNC) => {
            let rsp: SyncRsp = serde_json::from_value(body)
                .map_err(|e| TransportError::Codec(e.to_string()))?;
            Ok(Message::SyncRsp(rsp))
        }
        (op::EVT, msg_type::SYNC_EVT) => {
            let evt: SyncEvt = serde_json::from_value(body)
                .map_err(|e| TransportError::Codec(e.to_string()))?;
            Ok(Message::SyncEvt(evt))
        }
        _ => Ok(Message::Other { envelope, body }),
    }
}

/// Matching key correlating an inbound message to a registered listener.
///
/// `None` fields are wildcards (the wire-level -1 convention). At most one
/// listener may be registered per distinct selector at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selector {
    pub op: Option<i32>,
    pub msg_type: Option<i32>,
    pub seq: Option<i32>,
    pub conn_handle: Option<i32>,
}

impl Selector {
    /// Standing selector for asynchronous sync events.
    pub fn sync_evt() -> Self {
        Selector {
            op: Some(op::EVT),
            msg_type: Some(msg_type::SYNC_EVT),
            seq: None,
            conn_handle: None,
        }
    }

    /// Selector correlating a request's response by sequence number alone.
    pub fn for_seq(seq: i32) -> Self {
        Selector {
            op: None,
            msg_type: None,
            seq: Some(seq),
            conn_handle: None,
        }
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.op.is_none_or(|op| op == envelope.op)
            && self.msg_type.is_none_or(|t| t == envelope.msg_type)
            && self.seq.is_none_or(|seq| seq == envelope.seq)
            && self.conn_handle.is_none_or(|ch| ch == envelope.conn_handle)
    }

    /// Number of exact (non-wildcard) fields; used to prefer the most
    /// specific listener when several selectors match.
    pub fn specificity(&self) -> usize {
        self.op.is_some() as usize
            + self.msg_type.is_some() as usize
            + self.seq.is_some() as usize
            + self.conn_handle.is_some() as usize
    }
}
