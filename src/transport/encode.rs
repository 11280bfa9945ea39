use serde_json::Value;
use url::form_urlencoded;

use crate::domain::{ContentType, Params, RequestDescriptor};
use crate::transport::http::HttpRequest;

/// Flatten one parameter into its wire text. `null` values are dropped; nested
/// arrays/objects travel as JSON text.
pub fn param_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

pub fn flatten_params(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(key, value)| param_to_string(value).map(|value| (key.clone(), value)))
        .collect()
}

/// Encode a (normally already authenticated) descriptor into a transport request.
pub fn encode_request(
    descriptor: &RequestDescriptor,
    user_agent: &str,
) -> Result<HttpRequest, serde_json::Error> {
    let mut url = descriptor.url().clone();
    let params = descriptor.get_params();

    let body = match descriptor.content_type() {
        ContentType::Query => {
            let pairs = flatten_params(params);
            let overridden = |key: &str| pairs.iter().any(|(name, _)| name == key);
            if url.query_pairs().any(|(key, _)| overridden(key.as_ref())) {
                // Parameters replace URL pairs of the same name, as when signing.
                let kept = url
                    .query_pairs()
                    .filter(|(key, _)| !overridden(key.as_ref()))
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect::<Vec<_>>();
                url.query_pairs_mut().clear().extend_pairs(kept);
            }
            if !pairs.is_empty() {
                url.query_pairs_mut().extend_pairs(&pairs);
            }
            None
        }
        ContentType::Form => Some(
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(flatten_params(params))
                .finish()
                .into_bytes(),
        ),
        ContentType::Json => Some(serde_json::to_vec(params)?),
    };

    let mut headers = descriptor.headers().to_vec();
    push_default(&mut headers, "Accept", "application/json");
    push_default(&mut headers, "User-Agent", user_agent);
    if let Some(content_type) = descriptor.content_type().header_value() {
        push_default(&mut headers, "Content-Type", content_type);
    }

    Ok(HttpRequest {
        method: descriptor.method(),
        url: url.into(),
        headers,
        body,
    })
}

fn push_default(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    if !headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name)) {
        headers.push((name.to_owned(), value.to_owned()));
    }
}
