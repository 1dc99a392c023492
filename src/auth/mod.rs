//! OAuth2 client-credentials handling for the platform APIs.

mod broker;

pub use broker::{ClientCredentials, Clock, Credential, CredentialBroker, REFRESH_BUFFER_SECS};
