//! Telegram normalizer. Plain text messages carry their text directly;
//! callback-query updates (inline keyboard taps) surface as a button reply.

use flowrunner_common::{InteractiveType, NormalizedMessage};
use serde_json::Value;

pub fn normalize(message_type: &str, payload: &Value) -> NormalizedMessage {
    let mut msg = NormalizedMessage::empty(payload.clone());

    if message_type == "callback_query" {
        msg.interactive_type = InteractiveType::ButtonReply;
        msg.button_payload = payload.get("data").and_then(Value::as_str).map(str::to_string);
        msg.interactive_value = msg.button_payload.clone();
        return msg;
    }

    msg.text = payload.get("text").and_then(Value::as_str).map(str::to_string);
    msg
}
