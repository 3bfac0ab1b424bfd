//! Response envelopes for single and batched commands.

use serde::Serialize;
use serde_json::{json, Value};

use super::conflict::{Conflict, STATUS_OK};
use crate::domain::{InstanceId, InstancePath};

/// Route-level reply: an HTTP-equivalent status and a JSON body.
///
/// This is the shape the idempotency cache stores and replays verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::new(STATUS_OK, body)
    }

    /// Serialize an envelope. Serialization of these types cannot fail in
    /// practice; if it ever does the reply degrades to a 500 body.
    #[must_use]
    pub fn from_body<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => Self::new(status, value),
            Err(err) => Self::new(
                500,
                json!({ "success": false, "status": 500, "error": err.to_string() }),
            ),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// What a successful command did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub op: &'static str,
    pub id: InstanceId,
    pub path: InstancePath,
    pub path_string: String,
    /// Name actually applied, after collision resolution.
    pub name: String,
    pub revision: u64,
}

/// Body of a single-command reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    pub status: u16,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
}

impl CommandResponse {
    #[must_use]
    pub fn from_outcome(outcome: Result<CommandOutput, Conflict>, revision: u64) -> Self {
        match outcome {
            Ok(output) => Self {
                success: true,
                status: STATUS_OK,
                revision,
                result: Some(output),
                conflict: None,
            },
            Err(conflict) => Self {
                success: false,
                status: conflict.status(),
                revision,
                result: None,
                conflict: Some(conflict),
            },
        }
    }

    #[must_use]
    pub fn into_response(self) -> Response {
        Response::from_body(self.status, &self)
    }
}

/// Per-command entry of a batch reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub index: usize,
    pub success: bool,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
}

impl BatchItem {
    #[must_use]
    pub fn from_outcome(index: usize, outcome: Result<CommandOutput, Conflict>) -> Self {
        match outcome {
            Ok(output) => Self {
                index,
                success: true,
                status: STATUS_OK,
                result: Some(output),
                conflict: None,
            },
            Err(conflict) => Self {
                index,
                success: false,
                status: conflict.status(),
                result: None,
                conflict: Some(conflict),
            },
        }
    }
}

/// Body of a batch reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success: bool,
    pub status: u16,
    pub transactional: bool,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub rolled_back: bool,
    pub results: Vec<BatchItem>,
    pub revision: u64,
    /// Batch-level rejection (stale base revision, malformed envelope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
}

impl BatchResponse {
    #[must_use]
    pub fn rejected(conflict: Conflict, transactional: bool, total: usize, revision: u64) -> Self {
        Self {
            success: false,
            status: conflict.status(),
            transactional,
            total,
            success_count: 0,
            failure_count: 0,
            rolled_back: false,
            results: Vec::new(),
            revision,
            conflict: Some(conflict),
        }
    }

    #[must_use]
    pub fn into_response(self) -> Response {
        Response::from_body(self.status, &self)
    }
}
