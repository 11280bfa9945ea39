//! Domain layer: credentials, request descriptors and responses (no I/O).

mod credentials;
mod error;
mod request;
mod response;
mod value;

pub use credentials::{
    AuthRule, AuthRules, AuthScheme, Basic, Credential, CredentialContainer, CredentialKind,
    Keypair, OAuth, ResolvedAuth, SignatureMethod, SignatureSecret, TOKEN_TTL_SECS,
};
pub use error::ConfigurationError;
pub use request::{ContentType, Method, Params, RequestDescriptor};
pub use response::Response;
pub use value::{
    ApiKey, ApiSecret, ApiStatusCode, ApplicationId, KnownApiStatus, UnixTimestamp,
};
