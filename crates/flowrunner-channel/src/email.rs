//! Email normalizer. `get_text_content()` precedence: `subject + "\n" + body`.

use flowrunner_common::NormalizedMessage;
use serde_json::Value;

pub fn normalize(payload: &Value) -> NormalizedMessage {
    let mut msg = NormalizedMessage::empty(payload.clone());
    msg.subject = payload.get("subject").and_then(Value::as_str).map(str::to_string);
    msg.body = payload.get("body").and_then(Value::as_str).map(str::to_string);
    msg.text = Some(match (&msg.subject, &msg.body) {
        (Some(s), Some(b)) => format!("{s}\n{b}"),
        (Some(s), None) => s.clone(),
        (None, Some(b)) => b.clone(),
        (None, None) => String::new(),
    });
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_subject_and_body() {
        let msg = normalize(&serde_json::json!({"subject": "Re: order", "body": "where is it"}));
        assert_eq!(msg.get_text_content(), "Re: order\nwhere is it");
    }

    #[test]
    fn subject_only() {
        let msg = normalize(&serde_json::json!({"subject": "learn"}));
        assert_eq!(msg.get_text_content(), "learn");
    }
}
