//! SMS normalizer: the whole message is a raw text body.

use flowrunner_common::NormalizedMessage;
use serde_json::Value;

pub fn normalize(payload: &Value) -> NormalizedMessage {
    let mut msg = NormalizedMessage::empty(payload.clone());
    msg.text = payload
        .get("text")
        .or_else(|| payload.get("body"))
        .and_then(Value::as_str)
        .map(str::to_string);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_text_field() {
        let msg = normalize(&serde_json::json!({"text": "hi"}));
        assert_eq!(msg.get_text_content(), "hi");
    }

    #[test]
    fn falls_back_to_body_field() {
        let msg = normalize(&serde_json::json!({"body": "STOP"}));
        assert_eq!(msg.get_text_content(), "STOP");
    }
}
