use serde_json::Value;

use crate::domain::entities::{InboundMessage, UserIdentity};
use crate::domain::errors::AuthError;

pub const AUTH_SUCCESS: &str = "AUTH_SUCCESS";
pub const AUTH_ERROR: &str = "AUTH_ERROR";

// Decide what an inbound message means for the pending attempt.
// `None` means the message is not ours (wrong origin, not a handshake envelope)
// and must be ignored; `Some` settles the attempt.
pub fn interpret(
    message: &InboundMessage,
    expected_origin: &str,
) -> Option<Result<UserIdentity, AuthError>> {
    if message.origin != expected_origin {
        return None;
    }

    let kind = message.data.get("type").and_then(Value::as_str)?;
    match kind {
        AUTH_SUCCESS => Some(
            message
                .data
                .get("user")
                .ok_or(AuthError::MalformedResponse)
                .and_then(UserIdentity::from_payload),
        ),
        AUTH_ERROR => Some(match message.data.get("error").and_then(Value::as_str) {
            Some(error) => Err(AuthError::ProviderError(error.to_string())),
            None => Err(AuthError::MalformedResponse),
        }),
        _ => None,
    }
}
