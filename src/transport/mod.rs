//! Transport layer: HTTP and wire-format details (encoding, signing, error bodies).

pub(crate) mod encode;
pub(crate) mod error_body;
mod http;
pub(crate) mod oauth;
pub mod signature;

pub use error_body::InvalidParameter;
pub use http::{
    BoxFuture, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportFailure,
};
