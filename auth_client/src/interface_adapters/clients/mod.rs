// Outbound HTTP clients: the portal API and the identity provider.

pub mod portal;
pub mod provider;

pub use portal::{PortalClient, PortalClientError, UploadFile, mime_type_for_path};
pub use provider::{ProviderClient, ProviderClientError, TokenExchangeSettings};
