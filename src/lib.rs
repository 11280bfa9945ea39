//! Typed Rust client core for the Vonage (Nexmo) communications APIs.
//!
//! The crate covers the request pipeline shared by every sub-API: a domain
//! layer of credentials and request descriptors, a transport layer for wire
//! formats and signing, and a client layer that authenticates, dispatches,
//! classifies errors and redrives throttled requests.
//!
//! ```rust,no_run
//! use vonage::{ApiResource, Basic, Client, ContentType, Params};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vonage::VonageError> {
//!     let client = Client::new(Basic::new("api-key", "api-secret")?);
//!     let sms = ApiResource::new(client.clone(), "https://rest.nexmo.com/sms/json")
//!         .with_content_type(ContentType::Form)
//!         .errors_on_200(true);
//!
//!     let mut message = Params::new();
//!     message.insert("from".into(), "Acme".into());
//!     message.insert("to".into(), "447700900000".into());
//!     message.insert("text".into(), "hello".into());
//!     let response = sms.create(message).await?;
//!     println!("{}", response.require_field("messages")?);
//!     Ok(())
//! }
//! ```
#![forbid(unsafe_code)]

pub mod client;
pub mod domain;
mod transport;

pub use client::{
    ApiResource, Client, ClientBuilder, DEFAULT_MAX_DELAY, DEFAULT_RETRY_AFTER, ErrorClassifier,
    Page, Pager, RetryPolicy, VonageError,
};
pub use domain::{
    ApiKey, ApiSecret, ApiStatusCode, ApplicationId, AuthRule, AuthRules, AuthScheme, Basic,
    ConfigurationError, ContentType, Credential, CredentialContainer, CredentialKind, Keypair,
    KnownApiStatus, Method, OAuth, Params, RequestDescriptor, Response, SignatureMethod,
    SignatureSecret, UnixTimestamp,
};
pub use transport::{
    BoxFuture, HttpRequest, HttpResponse, HttpTransport, InvalidParameter, ReqwestTransport,
    TransportFailure, signature,
};
