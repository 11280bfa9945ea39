use std::time::Duration;

use serde_json::Value;

use crate::client::VonageError;
use crate::domain::{KnownApiStatus, Response};
use crate::transport::error_body::{
    FailedBodyStatus, failed_body_status, has_error_marker, is_rate_limit_marker, match_shape,
    retry_after_from_body, retry_after_from_header,
};

/// Delay used when a throttled response carries no retry hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

const THROTTLE_MESSAGE: &str = "rate limit exceeded";
const UNEXPECTED_ERROR_MESSAGE: &str = "Unexpected error";
const ERROR_STATUS_MESSAGE: &str = "error status from API";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Maps a response to a [`VonageError`], or to `None` when it succeeded.
///
/// Decision order:
/// 1. business `status` of an errors-on-200 body (opt-in),
/// 2. HTTP 429 or a throttling body marker on a failed response,
/// 3. 4xx and 5xx statuses, using the best matching error body shape.
pub struct ErrorClassifier {
    errors_on_200: bool,
    default_retry_after: Duration,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            errors_on_200: false,
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier for APIs (SMS, Verify) that report failures with HTTP 200 and
    /// a non-zero business `status` in the body.
    pub fn errors_on_200() -> Self {
        Self::default().with_errors_on_200(true)
    }

    pub fn with_errors_on_200(mut self, enabled: bool) -> Self {
        self.errors_on_200 = enabled;
        self
    }

    /// Delay reported by throttle errors that carry no hint of their own.
    pub fn with_default_retry_after(mut self, delay: Duration) -> Self {
        self.default_retry_after = delay;
        self
    }

    pub fn is_errors_on_200(&self) -> bool {
        self.errors_on_200
    }

    /// Classify a status and an already parsed body.
    pub fn classify(&self, status: u16, body: Option<&Value>) -> Option<VonageError> {
        self.classify_with_hint(status, body, None)
    }

    /// Classify a buffered response; a `Retry-After` header wins over body hints.
    pub fn classify_response(&self, response: &Response) -> Option<VonageError> {
        let body = response.json_value();
        let hint = response
            .header("Retry-After")
            .and_then(retry_after_from_header);
        self.classify_with_hint(response.status, body.as_ref(), hint)
    }

    /// `Err` with the classified error, `Ok` for successful responses.
    pub fn check(&self, response: &Response) -> Result<(), VonageError> {
        match self.classify_response(response) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn classify_with_hint(
        &self,
        status: u16,
        body: Option<&Value>,
        hint: Option<Duration>,
    ) -> Option<VonageError> {
        if self.errors_on_200 {
            if let Some(failed) = body.and_then(failed_body_status) {
                return Some(self.business_error(status, failed, body, hint));
            }
        }

        let failed_status = !(200..=299).contains(&status);
        if status == 429 || (failed_status && body.is_some_and(is_rate_limit_marker)) {
            return Some(self.throttle(status, body, hint));
        }

        if (400..=599).contains(&status) {
            return Some(http_error(status, body));
        }
        None
    }

    fn retry_after(&self, body: Option<&Value>, hint: Option<Duration>) -> Duration {
        hint.or_else(|| body.and_then(retry_after_from_body))
            .unwrap_or(self.default_retry_after)
    }

    fn throttle(&self, status: u16, body: Option<&Value>, hint: Option<Duration>) -> VonageError {
        let message = body
            .and_then(match_shape)
            .map(|shape| shape.message)
            .or_else(|| {
                body.and_then(failed_body_status)
                    .and_then(|failed| failed.message)
            })
            .unwrap_or_else(|| THROTTLE_MESSAGE.to_owned());
        VonageError::Throttle {
            status,
            message,
            retry_after: self.retry_after(body, hint),
            entity: body.cloned(),
        }
    }

    fn business_error(
        &self,
        status: u16,
        failed: FailedBodyStatus,
        body: Option<&Value>,
        hint: Option<Duration>,
    ) -> VonageError {
        let entity = body.cloned();
        let code = Some(failed.status.as_i64().to_string());
        match failed.status.known_kind() {
            Some(KnownApiStatus::Throttled) => VonageError::Throttle {
                status,
                message: failed
                    .message
                    .unwrap_or_else(|| THROTTLE_MESSAGE.to_owned()),
                retry_after: self.retry_after(body, hint),
                entity,
            },
            Some(KnownApiStatus::InternalError) => VonageError::Server {
                status,
                message: failed
                    .message
                    .unwrap_or_else(|| UNEXPECTED_ERROR_MESSAGE.to_owned()),
                code,
                entity,
            },
            _ => VonageError::Request {
                status,
                message: failed
                    .message
                    .unwrap_or_else(|| UNEXPECTED_ERROR_MESSAGE.to_owned()),
                code,
                entity,
            },
        }
    }
}

fn http_error(status: u16, body: Option<&Value>) -> VonageError {
    let entity = body.cloned();
    let server = status >= 500;

    let Some(shape) = body.and_then(match_shape) else {
        let message = if body.is_some_and(has_error_marker) {
            UNEXPECTED_ERROR_MESSAGE
        } else {
            ERROR_STATUS_MESSAGE
        }
        .to_owned();
        return if server {
            VonageError::Server {
                status,
                message,
                code: None,
                entity,
            }
        } else {
            VonageError::Request {
                status,
                message,
                code: None,
                entity,
            }
        };
    };

    match shape.invalid_parameters {
        _ if server => VonageError::Server {
            status,
            message: shape.message,
            code: shape.code,
            entity,
        },
        Some(invalid_parameters) => VonageError::Validation {
            status,
            message: shape.message,
            code: shape.code,
            invalid_parameters,
            entity,
        },
        None => VonageError::Request {
            status,
            message: shape.message,
            code: shape.code,
            entity,
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(status: u16, headers: Vec<(&str, &str)>, body: &str) -> Response {
        Response {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
            body: body.as_bytes().to_vec(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn success_statuses_are_not_errors() {
        let classifier = ErrorClassifier::new();
        assert!(classifier.classify(200, Some(&json!({"id": "abc"}))).is_none());
        assert!(classifier.classify(204, None).is_none());
        assert!(classifier.check(&response(201, vec![], "")).is_ok());
    }

    #[test]
    fn problem_details_400_becomes_request_error() {
        let body = json!({
            "type": "http://x",
            "title": "Maximum number of flibbets met",
            "detail": "Only allowed 3"
        });
        let err = ErrorClassifier::new().classify(400, Some(&body)).unwrap();
        assert!(matches!(err, VonageError::Request { status: 400, .. }));
        assert!(err.is_request_error());
        assert_eq!(
            err.to_string(),
            "Maximum number of flibbets met: Only allowed 3. See http://x for more information"
        );
        assert_eq!(err.entity(), Some(&body));
    }

    #[test]
    fn invalid_parameters_become_validation_error() {
        let body = json!({
            "type": "https://developer.nexmo.com/api-errors#bad-request",
            "title": "Bad Request",
            "invalid_parameters": [{"name": "primary_colour", "reason": "Must be one of: blue, red, yellow"}]
        });
        let err = ErrorClassifier::new().classify(422, Some(&body)).unwrap();
        assert!(matches!(err, VonageError::Validation { .. }));
        assert!(err.is_request_error());
        assert_eq!(err.invalid_parameters()[0].name, "primary_colour");
    }

    #[test]
    fn malformed_invalid_parameters_keep_the_problem_message() {
        let body = json!({
            "type": "http://x",
            "title": "Bad Request",
            "invalid_parameters": [{"reason": "missing"}]
        });
        let err = ErrorClassifier::new().classify(400, Some(&body)).unwrap();
        assert!(matches!(err, VonageError::Validation { status: 400, .. }));
        assert_eq!(err.to_string(), "Bad Request. See http://x for more information");
        assert_eq!(err.invalid_parameters()[0].reason, "missing");
    }

    #[test]
    fn legacy_error_code_keeps_code() {
        let body = json!({"error-code": "420", "error-code-label": "Numbers from this country can be requested only"});
        let err = ErrorClassifier::new().classify(420, Some(&body)).unwrap();
        assert!(err.is_request_error());
        assert_eq!(err.code(), Some("420"));
        assert_eq!(err.to_string(), "Numbers from this country can be requested only");
    }

    #[test]
    fn server_errors_with_and_without_body() {
        let classifier = ErrorClassifier::new();

        let err = classifier.classify(500, None).unwrap();
        assert!(err.is_server_error());
        assert_eq!(err.to_string(), "error status from API");

        let body = json!({"type": "http://x", "title": "Internal"});
        let err = classifier.classify(503, Some(&body)).unwrap();
        assert!(err.is_server_error());
        assert_eq!(err.to_string(), "Internal. See http://x for more information");
    }

    #[test]
    fn unrecognized_error_bodies_fall_back_to_generic_messages() {
        let classifier = ErrorClassifier::new();
        let err = classifier
            .classify(400, Some(&json!({"title": "no type here"})))
            .unwrap();
        assert_eq!(err.to_string(), "Unexpected error");

        let err = classifier.classify(404, Some(&json!({"id": 1}))).unwrap();
        assert_eq!(err.to_string(), "error status from API");
    }

    #[test]
    fn status_429_is_throttle_with_header_delay() {
        let err = ErrorClassifier::new()
            .classify_response(&response(429, vec![("retry-after", "7")], ""))
            .unwrap();
        assert!(err.is_throttle());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn status_429_without_hint_uses_default_delay() {
        let err = ErrorClassifier::new().classify(429, None).unwrap();
        assert_eq!(err.retry_after(), Some(DEFAULT_RETRY_AFTER));

        let err = ErrorClassifier::new()
            .with_default_retry_after(Duration::from_millis(20))
            .classify(429, Some(&json!({"retry_after": 3})))
            .unwrap();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn huge_body_retry_after_falls_back_to_default_delay() {
        let err = ErrorClassifier::new()
            .classify(429, Some(&json!({"retry_after": 1e20})))
            .unwrap();
        assert!(err.is_throttle());
        assert_eq!(err.retry_after(), Some(DEFAULT_RETRY_AFTER));
    }

    #[test]
    fn errors_on_200_require_opt_in() {
        let body = json!({"status": "3", "error_text": "Invalid value for param: number"});
        assert!(ErrorClassifier::new().classify(200, Some(&body)).is_none());

        let err = ErrorClassifier::errors_on_200()
            .classify(200, Some(&body))
            .unwrap();
        assert!(err.is_request_error());
        assert_eq!(err.code(), Some("3"));
        assert_eq!(err.to_string(), "Invalid value for param: number");
        assert_eq!(err.status(), Some(200));
    }

    #[test]
    fn errors_on_200_business_statuses_map_to_kinds() {
        let classifier = ErrorClassifier::errors_on_200();

        let throttled = json!({
            "message-count": "1",
            "messages": [{"status": "1", "error-text": "Throughput Rate Exceeded - please wait [ 250 ] and retry"}]
        });
        let err = classifier.classify(200, Some(&throttled)).unwrap();
        assert!(err.is_throttle());
        assert_eq!(err.retry_after(), Some(Duration::from_millis(250)));

        let internal = json!({"status": "5", "error_text": "Internal Error"});
        assert!(classifier.classify(200, Some(&internal)).unwrap().is_server_error());

        assert!(classifier.classify(200, Some(&json!({"status": "0"}))).is_none());
        assert!(classifier.classify(200, None).is_none());
    }

    #[test]
    fn errors_on_200_reads_body_before_http_status() {
        let body = json!({"status": "1", "error_text": "Throttled"});
        let err = ErrorClassifier::errors_on_200()
            .classify(500, Some(&body))
            .unwrap();
        assert!(err.is_throttle());
        assert_eq!(err.to_string(), "Throttled (retry after 1s)");
    }

    #[test]
    fn throttling_marker_on_failed_status_is_throttle() {
        let body = json!({"status": 1, "error_text": "Throttled"});
        let err = ErrorClassifier::new().classify(400, Some(&body)).unwrap();
        assert!(err.is_throttle());
    }
}
