//! Response model decoded from a frame payload.
//!
//! The server answers every command with a JSON object. A successful answer
//! carries the action that was performed and, for row-returning actions, a
//! column list plus one batch of rows:
//!
//! ```json
//! {"status":"ok","action":"select","rows":3,"fromrow":1,"torow":3,
//!  "columns":["id","col1"],"data":[["1","a"],["2","b"],["3","c"]]}
//! ```
//!
//! Large result sets are split over several frames; `fromrow`/`torow` give the
//! 1-based position of the batch within the `rows` total. Errors carry a
//! non-"ok" status and a `msg`.
//!
//! Cell values are kept as text exactly as the server sent them.
use std::str::Utf8Error;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    status: Option<String>,
    msg: Option<String>,
    action: Option<String>,
    pubsubid: Option<Value>,
    id: Option<Value>,
    rows: Option<Value>,
    fromrow: Option<Value>,
    torow: Option<Value>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<WireRow>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRow {
    Values(Vec<Value>),
    Named(Map<String, Value>),
}

/// Outcome of decoding one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(ResultSet),
    Err { message: String },
}

/// Decode a raw payload. Returns the reply along with the JSON text.
pub fn decode(payload: &[u8]) -> Result<(Reply, String), DecodeError> {
    let json = std::str::from_utf8(payload)?;
    let wire: WireResponse = serde_json::from_str(json)?;

    // push deliveries may omit the status
    let succeeded = matches!(wire.status.as_deref(), None | Some("ok"));
    let reply = if succeeded {
        Reply::Ok(ResultSet::from(wire))
    } else {
        Reply::Err {
            message: wire.msg.unwrap_or_default(),
        }
    };

    Ok((reply, json.to_string()))
}

/// One decoded batch of rows with a forward-only cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    action: String,
    pubsub_id: Option<String>,
    id: Option<String>,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    total_rows: usize,
    to_row: usize,
    position: Option<usize>,
}

impl ResultSet {
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn pubsub_id(&self) -> Option<&str> {
        self.pubsub_id.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Case-sensitive position of `name` in the column list.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Rows in the whole result set, not just this batch.
    pub fn row_count(&self) -> usize {
        self.total_rows
    }

    /// Number of rows carried by this batch.
    pub fn batch_len(&self) -> usize {
        self.rows.len()
    }

    /// 1-based index of the last row in this batch.
    pub fn to_row(&self) -> usize {
        self.to_row
    }

    /// True while further batches of the same result set are still on the wire.
    pub fn has_more_batches(&self) -> bool {
        self.to_row < self.total_rows
    }

    /// Move to the next row of this batch. Once exhausted the cursor stays exhausted.
    pub fn advance(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.rows.len());
            false
        }
    }

    pub fn current_row(&self) -> Option<&[String]> {
        self.position
            .and_then(|p| self.rows.get(p))
            .map(Vec::as_slice)
    }
}

impl From<WireResponse> for ResultSet {
    fn from(wire: WireResponse) -> Self {
        let mut columns = wire.columns;
        if columns.is_empty() {
            if let Some(WireRow::Named(first)) = wire.data.first() {
                columns = first.keys().cloned().collect();
            }
        }

        let rows: Vec<Vec<String>> = wire
            .data
            .into_iter()
            .map(|row| match row {
                WireRow::Values(values) => values.into_iter().map(cell).collect(),
                WireRow::Named(mut named) => columns
                    .iter()
                    .map(|c| named.remove(c).map(cell).unwrap_or_default())
                    .collect(),
            })
            .collect();

        let batch = rows.len();
        let total_rows = wire.rows.as_ref().and_then(count).unwrap_or(batch);
        let from_row = wire.fromrow.as_ref().and_then(count).unwrap_or(1);
        let to_row = wire
            .torow
            .as_ref()
            .and_then(count)
            .unwrap_or_else(|| from_row.saturating_add(batch).saturating_sub(1));

        Self {
            action: wire.action.unwrap_or_default(),
            pubsub_id: wire.pubsubid.map(cell).filter(|s| !s.is_empty()),
            id: wire.id.map(cell).filter(|s| !s.is_empty()),
            columns,
            rows,
            total_rows,
            to_row,
            position: None,
        }
    }
}

fn cell(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
