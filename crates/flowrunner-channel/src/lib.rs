//! Channel normalization (C2): collapses heterogeneous channel payloads into
//! one canonical [`NormalizedMessage`]. Channel differences live entirely
//! here — everything downstream of this crate treats the normalized message
//! as an opaque value (see `flowrunner_common::NormalizedMessage`).

mod email;
mod generic;
mod sms;
mod system;
mod telegram;
mod whatsapp;

use flowrunner_common::{Channel, NormalizedMessage};

/// Normalize an inbound webhook payload for the given channel and message
/// type. Unknown channels fall back to the generic normalizer, which never
/// fails — it just returns an empty text content.
pub fn normalize(channel: Channel, message_type: &str, payload: &serde_json::Value) -> NormalizedMessage {
    match channel {
        Channel::Whatsapp => whatsapp::normalize(message_type, payload),
        Channel::Sms => sms::normalize(payload),
        Channel::Telegram => telegram::normalize(message_type, payload),
        Channel::Email => email::normalize(payload),
        Channel::System => system::normalize(payload),
        Channel::Unknown => generic::normalize(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrunner_common::InteractiveType;

    #[test]
    fn unknown_channel_falls_back_to_generic() {
        let msg = normalize(Channel::Unknown, "text", &serde_json::json!({"text": "hi"}));
        assert_eq!(msg.get_text_content(), "hi");
        assert_eq!(msg.interactive_type, InteractiveType::None);
    }

    #[test]
    fn unknown_channel_with_no_text_field_is_empty_not_failing() {
        let msg = normalize(Channel::Unknown, "text", &serde_json::json!({"weird": 1}));
        assert_eq!(msg.get_text_content(), "");
    }
}
