//! Pseudo-channel normalizer for scheduler-injected `delay_complete` events.
//! Never participates in trigger matching — the User State Service routes
//! `system` events directly, so this just preserves the raw payload.

use flowrunner_common::NormalizedMessage;
use serde_json::Value;

pub fn normalize(payload: &Value) -> NormalizedMessage {
    NormalizedMessage::empty(payload.clone())
}
