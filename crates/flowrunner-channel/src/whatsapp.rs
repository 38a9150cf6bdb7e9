//! WhatsApp normalizer. `get_text_content()` precedence: `interactive_value`
//! if present, else the plain text body.

use flowrunner_common::{InteractiveType, NormalizedMessage};
use serde_json::Value;

pub fn normalize(message_type: &str, payload: &Value) -> NormalizedMessage {
    let mut msg = NormalizedMessage::empty(payload.clone());

    match message_type {
        "interactive" => normalize_interactive(payload, &mut msg),
        "button" => {
            msg.button_text = payload.pointer("/button/text").and_then(Value::as_str).map(str::to_string);
            msg.button_payload = payload.pointer("/button/payload").and_then(Value::as_str).map(str::to_string);
            msg.interactive_value = msg.button_payload.clone().or_else(|| msg.button_text.clone());
        }
        "image" | "video" | "document" | "audio" | "sticker" => {
            msg.media_url = payload.pointer(&format!("/{message_type}/link")).and_then(Value::as_str).map(str::to_string);
            msg.media_type = Some(message_type.to_string());
            msg.text = payload.pointer(&format!("/{message_type}/caption")).and_then(Value::as_str).map(str::to_string);
        }
        _ => {
            msg.text = payload.pointer("/text/body").and_then(Value::as_str).map(str::to_string);
        }
    }

    msg
}

fn normalize_interactive(payload: &Value, msg: &mut NormalizedMessage) {
    let interactive = payload.pointer("/interactive").unwrap_or(&Value::Null);
    match interactive.get("type").and_then(Value::as_str) {
        Some("button_reply") => {
            msg.interactive_type = InteractiveType::ButtonReply;
            msg.button_payload = interactive.pointer("/button_reply/id").and_then(Value::as_str).map(str::to_string);
            msg.button_text = interactive.pointer("/button_reply/title").and_then(Value::as_str).map(str::to_string);
            msg.interactive_value = msg.button_text.clone().or_else(|| msg.button_payload.clone());
        }
        Some("list_reply") => {
            msg.interactive_type = InteractiveType::ListReply;
            msg.button_payload = interactive.pointer("/list_reply/id").and_then(Value::as_str).map(str::to_string);
            msg.button_text = interactive.pointer("/list_reply/title").and_then(Value::as_str).map(str::to_string);
            msg.interactive_value = msg.button_text.clone().or_else(|| msg.button_payload.clone());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_uses_text_body() {
        let msg = normalize("text", &serde_json::json!({"type": "text", "text": {"body": "learn"}}));
        assert_eq!(msg.get_text_content(), "learn");
    }

    #[test]
    fn button_reply_prefers_interactive_value_over_text() {
        let payload = serde_json::json!({
            "type": "interactive",
            "text": {"body": "ignored"},
            "interactive": {"type": "button_reply", "button_reply": {"id": "b1", "title": "IIT"}},
        });
        let msg = normalize("interactive", &payload);
        assert_eq!(msg.get_text_content(), "IIT");
        assert_eq!(msg.button_payload.as_deref(), Some("b1"));
        assert_eq!(msg.interactive_type, InteractiveType::ButtonReply);
    }

    #[test]
    fn list_reply_is_captured() {
        let payload = serde_json::json!({
            "type": "interactive",
            "interactive": {"type": "list_reply", "list_reply": {"id": "l1", "title": "Option A"}},
        });
        let msg = normalize("interactive", &payload);
        assert_eq!(msg.get_text_content(), "Option A");
        assert_eq!(msg.interactive_type, InteractiveType::ListReply);
    }

    #[test]
    fn image_message_captures_media_and_caption() {
        let payload = serde_json::json!({"type": "image", "image": {"link": "https://x/y.png", "caption": "look"}});
        let msg = normalize("image", &payload);
        assert_eq!(msg.media_url.as_deref(), Some("https://x/y.png"));
        assert_eq!(msg.media_type.as_deref(), Some("image"));
        assert_eq!(msg.get_text_content(), "look");
    }
}
