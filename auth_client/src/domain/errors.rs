use std::fmt;

// Domain-level errors for the sign-in handshake.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthError {
    Cancelled,
    ProviderError(String),
    Timeout,
    MalformedResponse,
    PopupBlocked(String),
    StorageFailure,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Cancelled => write!(f, "sign-in was cancelled"),
            AuthError::ProviderError(message) => write!(f, "identity provider error: {message}"),
            AuthError::Timeout => write!(f, "sign-in timed out"),
            AuthError::MalformedResponse => write!(f, "identity provider sent a malformed response"),
            AuthError::PopupBlocked(reason) => write!(f, "could not open sign-in window: {reason}"),
            AuthError::StorageFailure => write!(f, "session storage error"),
        }
    }
}

impl std::error::Error for AuthError {}
