//! Generic fallback normalizer for channels with no dedicated adapter.
//! Looks for a `text` field; otherwise returns an empty string without
//! failing.

use flowrunner_common::NormalizedMessage;
use serde_json::Value;

pub fn normalize(payload: &Value) -> NormalizedMessage {
    let mut msg = NormalizedMessage::empty(payload.clone());
    msg.text = payload.get("text").and_then(Value::as_str).map(str::to_string);
    msg
}
