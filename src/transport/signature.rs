//! Request signing for [`SignatureSecret`] credentials.
//!
//! The signed string is `&k1=v1&k2=v2...` over every parameter except `sig`,
//! sorted by key, with `&` and `=` inside values replaced by `_`.

use std::collections::BTreeMap;

use hmac::Hmac;
use hmac::Mac;
use hmac::digest::KeyInit;
use md5::{Digest, Md5};
use serde_json::Value;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::domain::{
    ContentType, Params, RequestDescriptor, SignatureMethod, SignatureSecret, UnixTimestamp,
};
use crate::transport::encode::param_to_string;

/// Parameter carrying the signature.
pub const SIG_FIELD: &str = "sig";

/// Sign `descriptor` in place.
///
/// Parameters are gathered from where they travel: the URL query plus the
/// parameter bag for query-string descriptors, the body parameters otherwise.
/// `sig` and `timestamp` are written back to the same place, so signing a body
/// never touches the URL query. An existing `timestamp` is kept and a stale
/// `sig` is replaced, which makes signing idempotent.
pub fn sign(descriptor: &mut RequestDescriptor, credential: &SignatureSecret, now: UnixTimestamp) {
    let mut signed = BTreeMap::<String, String>::new();

    if descriptor.content_type() == ContentType::Query {
        let has_stale_sig = descriptor.url().query_pairs().any(|(key, _)| key == SIG_FIELD);
        if has_stale_sig {
            strip_query_sig(descriptor);
        }
        for (key, value) in descriptor.url().query_pairs() {
            signed.insert(key.into_owned(), value.into_owned());
        }
    }

    let nested_is_signed = descriptor.content_type() != ContentType::Json;
    for (key, value) in descriptor.get_params() {
        if !nested_is_signed && matches!(value, Value::Array(_) | Value::Object(_)) {
            continue;
        }
        if let Some(value) = param_to_string(value) {
            signed.insert(key.clone(), value);
        }
    }
    signed.remove(SIG_FIELD);

    let params = descriptor.params_mut();
    params.remove(SIG_FIELD);
    if !signed.contains_key(UnixTimestamp::FIELD) {
        let timestamp = now.value().to_string();
        signed.insert(UnixTimestamp::FIELD.to_owned(), timestamp.clone());
        params.insert(UnixTimestamp::FIELD.to_owned(), Value::from(timestamp));
    }

    let sig = digest(
        &signature_base(&signed),
        credential.secret().as_str(),
        credential.method(),
    );
    params.insert(SIG_FIELD.to_owned(), Value::from(sig));
}

/// Recompute the signature of received parameters and compare it with their
/// `sig`, ignoring case. Nested values are not part of the signature.
pub fn check(params: &Params, secret: &str, method: SignatureMethod) -> bool {
    let Some(expected) = params.get(SIG_FIELD).and_then(Value::as_str) else {
        return false;
    };

    let signed = params
        .iter()
        .filter(|(key, _)| key.as_str() != SIG_FIELD)
        .filter(|(_, value)| !matches!(value, Value::Array(_) | Value::Object(_)))
        .filter_map(|(key, value)| param_to_string(value).map(|value| (key.clone(), value)))
        .collect::<BTreeMap<_, _>>();

    let actual = digest(&signature_base(&signed), secret, method);
    eq_ignore_case_constant_time(&actual, expected)
}

/// String fed into the digest.
pub fn signature_base(signed: &BTreeMap<String, String>) -> String {
    let mut base = String::new();
    for (key, value) in signed {
        if key == SIG_FIELD {
            continue;
        }
        base.push('&');
        base.push_str(key);
        base.push('=');
        base.push_str(&value.replace(['&', '='], "_"));
    }
    base
}

pub fn digest(base: &str, secret: &str, method: SignatureMethod) -> String {
    match method {
        SignatureMethod::Md5Hash => {
            let mut hasher = Md5::new();
            hasher.update(base.as_bytes());
            hasher.update(secret.as_bytes());
            hex::encode(hasher.finalize())
        }
        SignatureMethod::Md5 => hex_hmac::<Hmac<Md5>>(secret.as_bytes(), base.as_bytes()),
        SignatureMethod::Sha1 => hex_hmac::<Hmac<Sha1>>(secret.as_bytes(), base.as_bytes()),
        SignatureMethod::Sha256 => hex_hmac::<Hmac<Sha256>>(secret.as_bytes(), base.as_bytes()),
        SignatureMethod::Sha512 => hex_hmac::<Hmac<Sha512>>(secret.as_bytes(), base.as_bytes()),
    }
}

/// Uppercase hex HMAC.
fn hex_hmac<M: Mac + KeyInit>(key: &[u8], content: &[u8]) -> String {
    // SAFETY: HMAC's new_from_slice always returns Ok - it handles any key length
    let mut mac = <M as Mac>::new_from_slice(key).unwrap();
    mac.update(content);
    hex::encode_upper(mac.finalize().into_bytes())
}

fn strip_query_sig(descriptor: &mut RequestDescriptor) {
    let kept = descriptor
        .url()
        .query_pairs()
        .filter(|(key, _)| key != SIG_FIELD)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();
    let url = descriptor.url_mut();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

fn eq_ignore_case_constant_time(left: &str, right: &str) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.bytes()
        .zip(right.bytes())
        .fold(0u8, |acc, (l, r)| {
            acc | (l.to_ascii_lowercase() ^ r.to_ascii_lowercase())
        })
        == 0
}
