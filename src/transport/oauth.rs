//! OAuth 1.0a `Authorization` header (HMAC-SHA1).

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use hmac::Hmac;
use hmac::Mac;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;
use url::Url;

use crate::domain::{Method, OAuth, UnixTimestamp};

/// RFC 3986 unreserved characters stay as is; everything else is encoded.
static OAUTH_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const VERSION: &str = "1.0";

/// Build the header value for a request to `url`.
///
/// `body_params` are the form-encoded body parameters; JSON bodies are not part
/// of the OAuth signature and must be passed as empty.
pub fn authorization_header(
    credential: &OAuth,
    method: Method,
    url: &Url,
    body_params: &[(String, String)],
    nonce: &str,
    timestamp: UnixTimestamp,
) -> String {
    let timestamp = timestamp.value().to_string();
    let oauth_params = [
        ("oauth_consumer_key", credential.consumer_key()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", SIGNATURE_METHOD),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", credential.token()),
        ("oauth_version", VERSION),
    ];

    let mut pairs = url
        .query_pairs()
        .map(|(key, value)| (encode(&key), encode(&value)))
        .chain(body_params.iter().map(|(key, value)| (encode(key), encode(value))))
        .chain(oauth_params.iter().map(|(key, value)| (encode(key), encode(value))))
        .collect::<Vec<_>>();
    pairs.sort();
    let normalized = pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.as_str(),
        encode(&base_url(url)),
        encode(&normalized)
    );
    let key = format!(
        "{}&{}",
        encode(credential.consumer_secret()),
        encode(credential.token_secret())
    );

    // SAFETY: HMAC's new_from_slice always returns Ok - it handles any key length
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes()).unwrap();
    mac.update(base.as_bytes());
    let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

    let mut fields = oauth_params
        .iter()
        .map(|(key, value)| (*key, value.to_string()))
        .collect::<Vec<_>>();
    fields.push(("oauth_signature", signature));
    fields.sort();

    let rendered = fields
        .iter()
        .map(|(key, value)| format!("{key}=\"{}\"", encode(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {rendered}")
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, &OAUTH_ENCODE_SET).to_string()
}

fn base_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}
