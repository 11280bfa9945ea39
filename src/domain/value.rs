use crate::domain::error::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Vonage account API key (`api_key`).
///
/// Invariant: non-empty after trimming.
pub struct ApiKey(String);

impl ApiKey {
    /// Parameter name used by the REST APIs (`api_key`).
    pub const FIELD: &'static str = "api_key";

    /// Create a validated [`ApiKey`].
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigurationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ConfigurationError::Empty { field: Self::FIELD });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the validated key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
/// Shared secret paired with an [`ApiKey`].
///
/// Used both as `api_secret` and as the signature secret. Invariant: must not
/// be empty (whitespace is preserved). `Debug` output is redacted.
pub struct ApiSecret(String);

impl ApiSecret {
    /// Parameter name used by the REST APIs (`api_secret`).
    pub const FIELD: &'static str = "api_secret";

    /// Create a validated [`ApiSecret`].
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigurationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ConfigurationError::Empty { field: Self::FIELD });
        }
        Ok(Self(value))
    }

    /// Borrow the secret as provided.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiSecret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Application id a keypair belongs to (`application_id`).
///
/// Invariant: non-empty after trimming.
pub struct ApplicationId(String);

impl ApplicationId {
    /// Claim name used in generated tokens (`application_id`).
    pub const FIELD: &'static str = "application_id";

    /// Create a validated [`ApplicationId`].
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigurationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ConfigurationError::Empty { field: Self::FIELD });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the validated id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Unix timestamp in seconds (`timestamp`), as injected by request signing.
pub struct UnixTimestamp(i64);

impl UnixTimestamp {
    /// Parameter name used by signed requests (`timestamp`).
    pub const FIELD: &'static str = "timestamp";

    /// Wrap a raw Unix timestamp.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    /// Return the raw timestamp value.
    pub fn value(self) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Business status carried in the body of APIs that report errors on HTTP 200
/// (SMS `messages[].status`, Verify `status`).
///
/// Unknown codes are preserved.
pub struct ApiStatusCode(i64);

impl ApiStatusCode {
    /// Body field name (`status`).
    pub const FIELD: &'static str = "status";

    /// Wrap a raw status code.
    pub fn new(code: i64) -> Self {
        Self(code)
    }

    /// Return the raw status code.
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Return a typed kind for codes with a pipeline-wide meaning.
    pub fn known_kind(self) -> Option<KnownApiStatus> {
        KnownApiStatus::from_code(self.0)
    }

    /// `true` for the success code (`0`).
    pub fn is_success(self) -> bool {
        self.known_kind() == Some(KnownApiStatus::Success)
    }

    /// `true` when the code signals throttling and the request may be sent again.
    pub fn is_retryable(self) -> bool {
        self.known_kind() == Some(KnownApiStatus::Throttled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Body status codes shared by the errors-on-200 APIs.
pub enum KnownApiStatus {
    /// `0`: request accepted.
    Success,
    /// `1`: sent too frequently; retry later.
    Throttled,
    /// `5`: platform-side failure.
    InternalError,
}

impl KnownApiStatus {
    /// Map a raw code onto a known kind.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Throttled),
            5 => Some(Self::InternalError),
            _ => None,
        }
    }
}

pub(crate) fn non_empty(field: &'static str, value: String) -> Result<String, ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::Empty { field });
    }
    Ok(value)
}
