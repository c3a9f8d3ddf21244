//! Wire contract: request body parsing and the response envelope.
//!
//! The request body is the loosely-shaped JSON clients send; it is
//! validated here, at the boundary, into a typed [`Command`] before
//! anything is queued or executed. Scalars become cell text; nested
//! structures are rejected rather than silently stringified.

use crate::error::{Error, Result};
use crate::model::{Attachment, AuditDraft, Command, KeyedFields};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The raw request body shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub action: String,
    pub sheet_name: String,
    #[serde(default)]
    pub new_data: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub new_datas: Option<Vec<serde_json::Map<String, Value>>>,
    #[serde(default)]
    pub match_value: Option<String>,
    #[serde(default)]
    pub updated_data: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub history_record: Option<WireHistoryRecord>,
    #[serde(default)]
    pub history_records: Option<Vec<WireHistoryRecord>>,
}

/// An audit record as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHistoryRecord {
    pub system_type: String,
    pub task: String,
    pub changed_by: String,
    pub change: String,
}

impl From<WireHistoryRecord> for AuditDraft {
    fn from(record: WireHistoryRecord) -> Self {
        AuditDraft {
            system_type: record.system_type,
            task_ref: record.task,
            changed_by: record.changed_by,
            description: record.change,
        }
    }
}

/// The response envelope for every request, synchronous or queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Parse and validate a request body into a command.
pub fn parse_request(body: &str) -> Result<Command> {
    let req: WireRequest =
        serde_json::from_str(body).map_err(|e| Error::Parse(format!("bad request body: {e}")))?;
    request_to_command(req)
}

/// Validate an already-deserialized request into a command.
pub fn request_to_command(req: WireRequest) -> Result<Command> {
    let target = req.sheet_name;
    if target.trim().is_empty() {
        return Err(Error::Parse("sheetName must not be empty".to_string()));
    }

    let mut audit: Vec<AuditDraft> = Vec::new();
    if let Some(record) = req.history_record {
        audit.push(record.into());
    }
    if let Some(records) = req.history_records {
        audit.extend(records.into_iter().map(Into::into));
    }

    match req.action.as_str() {
        "create" => {
            let fields = keyed_fields(
                req.new_data
                    .ok_or_else(|| Error::Parse("create requires newData".to_string()))?,
            )?;
            Ok(Command::Create {
                target,
                fields,
                attachment: req.attachment,
                audit,
            })
        }
        "batchCreate" => {
            let datas = req
                .new_datas
                .ok_or_else(|| Error::Parse("batchCreate requires newDatas".to_string()))?;
            let rows = datas
                .into_iter()
                .map(keyed_fields)
                .collect::<Result<Vec<_>>>()?;
            Ok(Command::BatchCreate {
                target,
                rows,
                audit,
            })
        }
        "update" => Ok(Command::Update {
            target,
            match_value: req
                .match_value
                .ok_or_else(|| Error::Parse("update requires matchValue".to_string()))?,
            fields: keyed_fields(
                req.updated_data
                    .ok_or_else(|| Error::Parse("update requires updatedData".to_string()))?,
            )?,
            audit,
        }),
        "delete" => Ok(Command::Delete {
            target,
            match_value: req
                .match_value
                .ok_or_else(|| Error::Parse("delete requires matchValue".to_string()))?,
            audit,
        }),
        other => Err(Error::Parse(format!("unknown action: {other}"))),
    }
}

fn keyed_fields(map: serde_json::Map<String, Value>) -> Result<KeyedFields> {
    let mut fields = KeyedFields::new();
    for (key, value) in map {
        fields.insert(key.clone(), scalar_to_cell(&key, &value)?);
    }
    Ok(fields)
}

fn scalar_to_cell(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(Error::Parse(format!(
            "field '{key}' must be a scalar value"
        ))),
    }
}
