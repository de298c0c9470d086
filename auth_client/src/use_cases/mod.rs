// Use cases layer: sign-in handshake workflows.

pub mod authorize_url;
pub mod handshake_message;
pub mod sign_in;

#[cfg(test)]
pub(crate) mod test_support;

pub use authorize_url::{ProviderSettings, build_authorize_url};
pub use sign_in::{HandshakeCoordinator, HandshakeSettings};
