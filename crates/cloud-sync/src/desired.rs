//! Desired-Config Documents
//!
//! The remote side pushes JSON documents carrying `obdii_query_interval`
//! either under `"desired"` or at the top level. When both are present the
//! top-level value wins.

use crate::error::CloudError;
use serde_json::Value;

/// Field carrying the poll/publish interval in seconds
pub const INTERVAL_FIELD: &str = "obdii_query_interval";

/// Extract the requested interval, if the document carries one
pub fn desired_interval(doc: &Value) -> Result<Option<f64>, CloudError> {
    let nested = doc.get("desired").and_then(|d| d.get(INTERVAL_FIELD));
    let field = doc.get(INTERVAL_FIELD).or(nested);

    match field {
        None => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            CloudError::InvalidConfig(format!("{} is not a number: {}", INTERVAL_FIELD, value))
        }),
    }
}

/// Parse a raw desired-config payload
pub fn parse_document(payload: &[u8]) -> Result<Value, CloudError> {
    serde_json::from_slice(payload).map_err(|e| CloudError::InvalidConfig(e.to_string()))
}
