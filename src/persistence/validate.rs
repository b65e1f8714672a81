//! Shape checks for records crossing the bridge, and for composed messages

use crate::consts::MAX_MESSAGE_LEN;
use crate::error::{MalformedRecord, MessageError};
use crate::sim::Bubble;

/// Reject records the store must never hold
pub fn validate_record(bubble: &Bubble) -> Result<(), MalformedRecord> {
    if bubble.id.as_str().trim().is_empty() {
        return Err(MalformedRecord::EmptyId);
    }

    let non_finite = |field| MalformedRecord::NonFinite {
        id: bubble.id.clone(),
        field,
    };
    if !bubble.pos.is_finite() {
        return Err(non_finite("position"));
    }
    if !bubble.vel.is_finite() {
        return Err(non_finite("velocity"));
    }

    if bubble.message.trim().is_empty() {
        return Err(MalformedRecord::EmptyMessage {
            id: bubble.id.clone(),
        });
    }
    let len = bubble.message.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(MalformedRecord::MessageTooLong {
            id: bubble.id.clone(),
            len,
        });
    }

    Ok(())
}

/// Trim user input and enforce the length limit
pub fn clean_message(raw: &str) -> Result<String, MessageError> {
    let message = raw.trim();
    if message.is_empty() {
        return Err(MessageError::Empty);
    }
    let len = message.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(MessageError::TooLong {
            len,
            max: MAX_MESSAGE_LEN,
        });
    }
    Ok(message.to_string())
}
