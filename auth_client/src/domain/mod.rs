// Domain layer: handshake entities, errors and the ports adapters implement.

pub mod entities;
pub mod errors;
pub mod ports;

pub use entities::{AttemptId, AttemptStatus, AuthAttempt, InboundMessage, UserIdentity};
pub use errors::AuthError;
