use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::AuthError;

// Identity returned by the provider and kept in durable session storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
    // Full provider payload, including the fields lifted out above.
    pub raw: Map<String, Value>,
}

impl UserIdentity {
    // Build an identity from a provider user object; name and email must be non-empty strings.
    pub fn from_payload(payload: &Value) -> Result<Self, AuthError> {
        let raw = payload.as_object().ok_or(AuthError::MalformedResponse)?;
        let name = required_text(raw, "name")?;
        let email = required_text(raw, "email")?;

        Ok(Self {
            name,
            email,
            raw: raw.clone(),
        })
    }
}

fn required_text(raw: &Map<String, Value>, field: &str) -> Result<String, AuthError> {
    match raw.get(field).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(AuthError::MalformedResponse),
    }
}

// Opaque token identifying one sign-in attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttemptId(Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptStatus {
    Created,
    Pending,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl AttemptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptStatus::Succeeded
                | AttemptStatus::Failed
                | AttemptStatus::TimedOut
                | AttemptStatus::Cancelled
        )
    }
}

// What an attempt settled with.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptResult {
    Identity(UserIdentity),
    Error(AuthError),
}

// One in-flight (or finished) sign-in attempt.
#[derive(Clone, Debug)]
pub struct AuthAttempt {
    pub id: AttemptId,
    pub started_at: u64,
    pub status: AttemptStatus,
    pub result: Option<AttemptResult>,
}

impl AuthAttempt {
    pub fn new(started_at: u64) -> Self {
        Self {
            id: AttemptId::new(),
            started_at,
            status: AttemptStatus::Created,
            result: None,
        }
    }

    // Created -> Pending. Any other starting status is left alone.
    pub fn begin(&mut self) -> bool {
        if self.status != AttemptStatus::Created {
            return false;
        }
        self.status = AttemptStatus::Pending;
        true
    }

    // Move a pending attempt into its terminal status. Terminal states are absorbing,
    // so a second settle is refused and leaves the first outcome in place.
    pub fn settle(&mut self, outcome: &Result<UserIdentity, AuthError>) -> bool {
        if self.status != AttemptStatus::Pending {
            return false;
        }

        let (status, result) = match outcome {
            Ok(identity) => (
                AttemptStatus::Succeeded,
                AttemptResult::Identity(identity.clone()),
            ),
            Err(AuthError::Cancelled) => (
                AttemptStatus::Cancelled,
                AttemptResult::Error(AuthError::Cancelled),
            ),
            Err(AuthError::Timeout) => (
                AttemptStatus::TimedOut,
                AttemptResult::Error(AuthError::Timeout),
            ),
            Err(err) => (AttemptStatus::Failed, AttemptResult::Error(err.clone())),
        };

        self.status = status;
        self.result = Some(result);
        true
    }
}

// Message delivered by the host to a registered listener.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub origin: String,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pilot() -> UserIdentity {
        UserIdentity::from_payload(&json!({"name": "Ada", "email": "ada@example.com"}))
            .expect("expected valid identity")
    }

    #[test]
    fn when_payload_has_name_and_email_then_identity_keeps_raw_fields() {
        let payload = json!({
            "name": "Ada",
            "email": "ada@example.com",
            "id": "abc-123"
        });

        let identity = UserIdentity::from_payload(&payload).expect("expected valid identity");

        assert_eq!(identity.name, "Ada");
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.raw.get("id"), Some(&json!("abc-123")));
    }

    #[test]
    fn when_payload_is_empty_object_then_returns_malformed_response() {
        let result = UserIdentity::from_payload(&json!({}));

        assert!(matches!(result, Err(AuthError::MalformedResponse)));
    }

    #[test]
    fn when_email_is_blank_then_returns_malformed_response() {
        let result = UserIdentity::from_payload(&json!({"name": "Ada", "email": "  "}));

        assert!(matches!(result, Err(AuthError::MalformedResponse)));
    }

    #[test]
    fn when_payload_is_not_an_object_then_returns_malformed_response() {
        let result = UserIdentity::from_payload(&json!("Ada"));

        assert!(matches!(result, Err(AuthError::MalformedResponse)));
    }

    #[test]
    fn when_pending_attempt_settles_then_second_settle_is_refused() {
        let mut attempt = AuthAttempt::new(1_700_000_000_000);
        assert!(attempt.begin());

        assert!(attempt.settle(&Ok(pilot())));
        assert!(!attempt.settle(&Err(AuthError::Timeout)));

        assert_eq!(attempt.status, AttemptStatus::Succeeded);
        assert_eq!(attempt.result, Some(AttemptResult::Identity(pilot())));
    }

    #[test]
    fn when_created_attempt_is_settled_then_nothing_changes() {
        let mut attempt = AuthAttempt::new(0);

        assert!(!attempt.settle(&Err(AuthError::Cancelled)));
        assert_eq!(attempt.status, AttemptStatus::Created);
        assert!(attempt.result.is_none());
    }

    #[test]
    fn when_error_outcomes_settle_then_status_matches_reason() {
        let cases = [
            (AuthError::Cancelled, AttemptStatus::Cancelled),
            (AuthError::Timeout, AttemptStatus::TimedOut),
            (AuthError::MalformedResponse, AttemptStatus::Failed),
            (
                AuthError::ProviderError("denied".to_string()),
                AttemptStatus::Failed,
            ),
        ];

        for (err, expected) in cases {
            let mut attempt = AuthAttempt::new(0);
            attempt.begin();
            attempt.settle(&Err(err));
            assert_eq!(attempt.status, expected);
            assert!(attempt.status.is_terminal());
        }
    }

    #[test]
    fn when_attempt_begins_twice_then_second_begin_is_refused() {
        let mut attempt = AuthAttempt::new(0);

        assert!(attempt.begin());
        assert!(!attempt.begin());
        assert!(!attempt.status.is_terminal());
    }
}
