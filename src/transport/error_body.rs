//! Error body shapes returned by the sub-APIs, normalized into one record.
//!
//! Shapes are tried in order and the first match wins:
//! 1. problem details: `{type, title, detail?, invalid_parameters?}`
//! 2. legacy account/numbers errors: `{error-code, error-code-label}`
//!
//! Bodies of the errors-on-200 APIs (SMS, Verify) carry a business `status`
//! instead, read with [`failed_body_status`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ApiStatusCode;

/// Fields whose presence marks a body as an error payload even when it matches
/// no known shape.
const ERROR_MARKER_FIELDS: &[&str] = &[
    "type",
    "title",
    "detail",
    "error-code",
    "error-code-label",
    "error_text",
    "error-text",
    "error_title",
    "message",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One rejected request field, as listed in `invalid_parameters`.
pub struct InvalidParameter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Error body normalized from whichever shape matched.
pub struct ErrorShape {
    pub message: String,
    pub code: Option<String>,
    pub invalid_parameters: Option<Vec<InvalidParameter>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProblemJsonBody {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    #[serde(default)]
    detail: Value,
    #[serde(default)]
    invalid_parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyErrorBody {
    #[serde(rename = "error-code")]
    error_code: TransportCode,
    #[serde(rename = "error-code-label")]
    error_code_label: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TransportCode {
    Int(i64),
    String(String),
}

impl TransportCode {
    fn into_string(self) -> String {
        match self {
            Self::Int(value) => value.to_string(),
            Self::String(value) => value,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::String(value) => value.trim().parse::<i64>().ok(),
        }
    }
}

type ShapeMatcher = fn(&Value) -> Option<ErrorShape>;

const SHAPE_MATCHERS: &[ShapeMatcher] = &[match_problem_details, match_legacy_error_code];

/// Normalize an error body, `None` when no shape matches.
pub fn match_shape(body: &Value) -> Option<ErrorShape> {
    SHAPE_MATCHERS.iter().find_map(|matcher| matcher(body))
}

/// `true` when the body is a JSON object carrying at least one error field.
pub fn has_error_marker(body: &Value) -> bool {
    body.as_object()
        .is_some_and(|object| ERROR_MARKER_FIELDS.iter().any(|field| object.contains_key(*field)))
}

fn match_problem_details(body: &Value) -> Option<ErrorShape> {
    let parsed = ProblemJsonBody::deserialize(body).ok()?;
    // Malformed entries are skipped; a broken list never hides the title.
    let invalid_parameters = parsed.invalid_parameters.as_array().map(|entries| {
        entries
            .iter()
            .filter_map(|entry| InvalidParameter::deserialize(entry).ok())
            .collect::<Vec<_>>()
    });
    let message = match parsed.detail.as_str().map(str::trim) {
        Some(detail) if !detail.is_empty() => format!(
            "{}: {}. See {} for more information",
            parsed.title, detail, parsed.kind
        ),
        _ => format!("{}. See {} for more information", parsed.title, parsed.kind),
    };
    Some(ErrorShape {
        message,
        code: None,
        invalid_parameters,
    })
}

fn match_legacy_error_code(body: &Value) -> Option<ErrorShape> {
    let parsed = LegacyErrorBody::deserialize(body).ok()?;
    Some(ErrorShape {
        message: parsed.error_code_label,
        code: Some(parsed.error_code.into_string()),
        invalid_parameters: None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A non-zero business status found in an errors-on-200 body.
pub struct FailedBodyStatus {
    pub status: ApiStatusCode,
    pub message: Option<String>,
}

/// Find the first failing business status: the top-level `status`, or the
/// first failing entry of a multi-part `messages` array.
pub fn failed_body_status(body: &Value) -> Option<FailedBodyStatus> {
    if let Some(found) = failed_status_of(body) {
        return Some(found);
    }
    body.get("messages")?
        .as_array()?
        .iter()
        .find_map(failed_status_of)
}

fn failed_status_of(part: &Value) -> Option<FailedBodyStatus> {
    let code = TransportCode::deserialize(part.get(ApiStatusCode::FIELD)?).ok()?;
    let status = ApiStatusCode::new(code.as_i64()?);
    if status.is_success() {
        return None;
    }
    Some(FailedBodyStatus {
        status,
        message: error_text(part),
    })
}

fn error_text(part: &Value) -> Option<String> {
    ["error_text", "error-text"]
        .iter()
        .find_map(|field| part.get(*field).and_then(Value::as_str))
        .map(str::to_owned)
}

/// `true` when the body signals throttling through its business status.
pub fn is_rate_limit_marker(body: &Value) -> bool {
    failed_body_status(body).is_some_and(|failed| failed.status.is_retryable())
}

/// Retry delay suggested by the body: a `retry_after`/`retry-after` field in
/// seconds, or a `please wait [ N ]` millisecond hint in the error text.
pub fn retry_after_from_body(body: &Value) -> Option<Duration> {
    let explicit = ["retry_after", "retry-after"]
        .iter()
        .find_map(|field| body.get(*field))
        .and_then(seconds_of);
    if explicit.is_some() {
        return explicit;
    }

    failed_body_status(body)
        .and_then(|failed| failed.message)
        .or_else(|| error_text(body))
        .and_then(|text| wait_hint_millis(&text))
        .map(Duration::from_millis)
}

/// Parse a `Retry-After` header value (delta seconds).
pub fn retry_after_from_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn seconds_of(value: &Value) -> Option<Duration> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
        Value::String(text) => text.trim().parse::<u64>().ok().map(Duration::from_secs),
        _ => None,
    }
}

fn wait_hint_millis(text: &str) -> Option<u64> {
    let start = text.find('[')? + 1;
    let len = text[start..].find(']')?;
    text[start..start + len].trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn problem_details_without_detail() {
        let shape = match_shape(&json!({
            "type": "http://x",
            "title": "Maximum number of flibbets met"
        }))
        .unwrap();
        assert_eq!(
            shape.message,
            "Maximum number of flibbets met. See http://x for more information"
        );
        assert_eq!(shape.invalid_parameters, None);
    }

    #[test]
    fn problem_details_with_detail() {
        let shape = match_shape(&json!({
            "type": "http://x",
            "title": "Maximum number of flibbets met",
            "detail": "Only allowed 3"
        }))
        .unwrap();
        assert_eq!(
            shape.message,
            "Maximum number of flibbets met: Only allowed 3. See http://x for more information"
        );
    }

    #[test]
    fn problem_details_keep_invalid_parameters() {
        let shape = match_shape(&json!({
            "type": "https://developer.nexmo.com/api-errors#bad-request",
            "title": "Bad Request",
            "invalid_parameters": [
                {"name": "primary_colour", "reason": "Must be one of: blue, red, yellow"}
            ]
        }))
        .unwrap();
        assert_eq!(
            shape.invalid_parameters,
            Some(vec![InvalidParameter {
                name: "primary_colour".to_owned(),
                reason: "Must be one of: blue, red, yellow".to_owned(),
            }])
        );
    }

    #[test]
    fn problem_details_survive_malformed_optional_fields() {
        let shape = match_shape(&json!({
            "type": "http://x",
            "title": "Bad Request",
            "detail": {"unexpected": true},
            "invalid_parameters": [{"reason": "missing"}, "garbage"]
        }))
        .unwrap();
        assert_eq!(shape.message, "Bad Request. See http://x for more information");
        assert_eq!(
            shape.invalid_parameters,
            Some(vec![InvalidParameter {
                name: String::new(),
                reason: "missing".to_owned(),
            }])
        );

        let shape = match_shape(&json!({
            "type": "http://x",
            "title": "Bad Request",
            "invalid_parameters": "not a list"
        }))
        .unwrap();
        assert_eq!(shape.invalid_parameters, None);
    }

    #[test]
    fn legacy_error_code_accepts_string_or_number_codes() {
        let shape = match_shape(&json!({
            "error-code": "420",
            "error-code-label": "Numbers from this country can be requested only"
        }))
        .unwrap();
        assert_eq!(shape.code.as_deref(), Some("420"));
        assert_eq!(
            shape.message,
            "Numbers from this country can be requested only"
        );

        let shape = match_shape(&json!({"error-code": 401, "error-code-label": "auth failed"}))
            .unwrap();
        assert_eq!(shape.code.as_deref(), Some("401"));
    }

    #[test]
    fn unknown_shapes_do_not_match_but_may_carry_markers() {
        let body = json!({"title": "Only a title"});
        assert_eq!(match_shape(&body), None);
        assert!(has_error_marker(&body));

        let body = json!({"id": "abc"});
        assert_eq!(match_shape(&body), None);
        assert!(!has_error_marker(&body));
        assert!(!has_error_marker(&json!("text")));
    }

    #[test]
    fn failed_status_reads_top_level_and_nested_parts() {
        let verify = json!({"status": "2", "error_text": "Your request is incomplete"});
        let failed = failed_body_status(&verify).unwrap();
        assert_eq!(failed.status, ApiStatusCode::new(2));
        assert_eq!(failed.message.as_deref(), Some("Your request is incomplete"));

        let sms = json!({
            "message-count": "2",
            "messages": [
                {"status": "0", "message-id": "a"},
                {"status": "4", "error-text": "Bad Credentials"}
            ]
        });
        let failed = failed_body_status(&sms).unwrap();
        assert_eq!(failed.status, ApiStatusCode::new(4));
        assert_eq!(failed.message.as_deref(), Some("Bad Credentials"));

        assert_eq!(failed_body_status(&json!({"status": "0"})), None);
        assert_eq!(failed_body_status(&json!({"status": "started"})), None);
    }

    #[test]
    fn rate_limit_marker_is_business_status_one() {
        assert!(is_rate_limit_marker(&json!({"status": 1, "error_text": "Throttled"})));
        assert!(!is_rate_limit_marker(&json!({"status": 3})));
    }

    #[test]
    fn retry_after_prefers_explicit_field() {
        assert_eq!(
            retry_after_from_body(&json!({"retry_after": 2})),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            retry_after_from_body(&json!({"retry-after": "4"})),
            Some(Duration::from_secs(4))
        );
    }

    #[test]
    fn retry_after_ignores_values_out_of_duration_range() {
        assert_eq!(retry_after_from_body(&json!({"retry_after": 1e20})), None);
        assert_eq!(retry_after_from_body(&json!({"retry_after": -3})), None);
        assert_eq!(
            retry_after_from_body(&json!({"retry_after": 0.5})),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn retry_after_reads_wait_hint_in_error_text() {
        let body = json!({
            "messages": [{
                "status": "1",
                "error-text": "Throughput Rate Exceeded - please wait [ 500 ] and retry"
            }]
        });
        assert_eq!(retry_after_from_body(&body), Some(Duration::from_millis(500)));
        assert_eq!(retry_after_from_body(&json!({"status": "1"})), None);
    }

    #[test]
    fn retry_after_header_is_delta_seconds() {
        assert_eq!(retry_after_from_header(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(
            retry_after_from_header("Wed, 21 Oct 2015 07:28:00 GMT"),
            None
        );
    }
}
