//! Client layer: authenticates and dispatches requests, classifies error
//! responses and redrives throttled ones.

mod classify;
mod resource;
mod retry;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use crate::domain::{
    AuthRules, AuthScheme, ConfigurationError, ContentType, Credential, CredentialContainer,
    Method, Params, RequestDescriptor, ResolvedAuth, Response, UnixTimestamp,
};
use crate::transport::encode::{encode_request, flatten_params};
use crate::transport::{
    HttpTransport, InvalidParameter, ReqwestTransport, TransportFailure, oauth, signature,
};

pub use classify::{DEFAULT_RETRY_AFTER, ErrorClassifier};
pub use resource::{ApiResource, Page, Pager};
pub use retry::{DEFAULT_MAX_DELAY, RetryPolicy};

pub const DEFAULT_API_URL: &str = "https://api.nexmo.com";
pub const DEFAULT_REST_URL: &str = "https://rest.nexmo.com";

/// Message of [`VonageError::UnexpectedResponse`] raised for empty or
/// incomplete success bodies.
pub const UNEXPECTED_RESPONSE_MESSAGE: &str = "unexpected response from API";

const SDK_USER_AGENT: &str = concat!("vonage-rust/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
/// Errors returned by [`Client`] and [`ApiResource`].
///
/// HTTP-level failures keep the upstream API's own message when the body has
/// one, and the parsed body as `entity` for introspection.
pub enum VonageError {
    /// Local misuse: invalid credentials, URLs, or no credential for a target.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// 4xx response (or a failing business status on an errors-on-200 API).
    #[error("{message}")]
    Request {
        status: u16,
        message: String,
        code: Option<String>,
        entity: Option<Value>,
    },

    /// 4xx response listing the rejected request fields.
    #[error("{message}")]
    Validation {
        status: u16,
        message: String,
        code: Option<String>,
        invalid_parameters: Vec<InvalidParameter>,
        entity: Option<Value>,
    },

    /// 5xx response (or business status `5`).
    #[error("{message}")]
    Server {
        status: u16,
        message: String,
        code: Option<String>,
        entity: Option<Value>,
    },

    /// Rate limited; redriven by [`RetryPolicy`].
    #[error("{message} (retry after {retry_after:?})")]
    Throttle {
        status: u16,
        message: String,
        retry_after: Duration,
        entity: Option<Value>,
    },

    /// Success status with an empty or incomplete body.
    #[error("{message}")]
    UnexpectedResponse {
        status: u16,
        message: String,
        entity: Option<Value>,
    },

    /// HTTP client / transport failure (DNS, TLS, timeouts, etc).
    #[error("transport error: {0}")]
    Transport(#[source] TransportFailure),

    /// Bearer token could not be signed.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Request body could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VonageError {
    pub(crate) fn unexpected_response(status: u16, entity: Option<Value>) -> Self {
        Self::UnexpectedResponse {
            status,
            message: UNEXPECTED_RESPONSE_MESSAGE.to_owned(),
            entity,
        }
    }

    /// HTTP status of the response that caused the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. }
            | Self::Validation { status, .. }
            | Self::Server { status, .. }
            | Self::Throttle { status, .. }
            | Self::UnexpectedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Upstream error code (`error-code`, business status), if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Request { code, .. } | Self::Validation { code, .. } | Self::Server { code, .. } => {
                code.as_deref()
            }
            _ => None,
        }
    }

    /// Parsed body of the offending response.
    pub fn entity(&self) -> Option<&Value> {
        match self {
            Self::Request { entity, .. }
            | Self::Validation { entity, .. }
            | Self::Server { entity, .. }
            | Self::Throttle { entity, .. }
            | Self::UnexpectedResponse { entity, .. } => entity.as_ref(),
            _ => None,
        }
    }

    /// Rejected fields of a [`VonageError::Validation`]; empty otherwise.
    pub fn invalid_parameters(&self) -> &[InvalidParameter] {
        match self {
            Self::Validation {
                invalid_parameters, ..
            } => invalid_parameters,
            _ => &[],
        }
    }

    /// Delay requested by a throttled response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttle { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// `true` for [`VonageError::Request`] and its [`VonageError::Validation`] subtype.
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Validation { .. })
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttle { .. })
    }
}

impl Response {
    /// Body as JSON, or [`VonageError::UnexpectedResponse`] when it is empty or
    /// not JSON.
    pub fn require_json(&self) -> Result<Value, VonageError> {
        self.json_value()
            .ok_or_else(|| VonageError::unexpected_response(self.status, None))
    }

    /// One top-level body field, or [`VonageError::UnexpectedResponse`] when
    /// the body lacks it.
    pub fn require_field(&self, field: &str) -> Result<Value, VonageError> {
        let body = self.require_json()?;
        match body.get(field) {
            Some(value) => Ok(value.clone()),
            None => Err(VonageError::unexpected_response(self.status, Some(body))),
        }
    }
}

#[derive(Clone)]
/// Builder for [`Client`].
///
/// Use this when you need several credentials, custom base URLs, URL remapping,
/// per-route auth rules, a timeout or a custom transport.
pub struct ClientBuilder {
    credentials: CredentialContainer,
    rules: AuthRules,
    url_map: Vec<(String, String)>,
    api_url: String,
    rest_url: String,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    app: Option<(String, String)>,
    signature_timestamp: Option<UnixTimestamp>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl ClientBuilder {
    /// Create a builder with the default endpoints, auth rules and transport.
    pub fn new(credentials: impl Into<CredentialContainer>) -> Self {
        Self {
            credentials: credentials.into(),
            rules: AuthRules::default(),
            url_map: Vec::new(),
            api_url: DEFAULT_API_URL.to_owned(),
            rest_url: DEFAULT_REST_URL.to_owned(),
            timeout: None,
            user_agent: None,
            app: None,
            signature_timestamp: None,
            transport: None,
        }
    }

    /// Override the base URL of the `api.nexmo.com` family of APIs.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Override the base URL of the `rest.nexmo.com` family of APIs.
    pub fn rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = url.into();
        self
    }

    /// Send requests for origin `from` (e.g. `https://api.nexmo.com`) to `to`
    /// instead. Only scheme, host and port are replaced.
    pub fn remap_url(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.url_map.push((from.into(), to.into()));
        self
    }

    /// Replace the per-route credential precedence table.
    pub fn auth_rules(mut self, rules: AuthRules) -> Self {
        self.rules = rules;
        self
    }

    /// Set an HTTP client timeout applied to the entire request.
    ///
    /// Ignored when a custom transport is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the HTTP `User-Agent` header entirely.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Append `name/version` of the calling application to the `User-Agent`.
    pub fn app(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app = Some((name.into(), version.into()));
        self
    }

    /// Sign every request with a fixed timestamp instead of the current time.
    pub fn signature_timestamp(mut self, timestamp: UnixTimestamp) -> Self {
        self.signature_timestamp = Some(timestamp);
        self
    }

    /// Send requests through `transport` instead of the default reqwest client.
    pub fn transport(mut self, transport: impl HttpTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Build a [`Client`].
    pub fn build(self) -> Result<Client, VonageError> {
        if self.credentials.is_empty() {
            return Err(ConfigurationError::NoCredentials.into());
        }

        let url_map = self
            .url_map
            .iter()
            .map(|(from, to)| {
                let from = parse_url(from)?.origin().ascii_serialization();
                Ok((from, origin_only(parse_url(to)?)))
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let user_agent = match (self.user_agent, self.app) {
            (Some(user_agent), _) => user_agent,
            (None, Some((name, version))) => format!("{SDK_USER_AGENT} {name}/{version}"),
            (None, None) => SDK_USER_AGENT.to_owned(),
        };

        let http: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                let client = builder
                    .build()
                    .map_err(|err| VonageError::Transport(Box::new(err)))?;
                Arc::new(ReqwestTransport::new(client))
            }
        };

        Ok(Client {
            credentials: Arc::new(self.credentials),
            rules: Arc::new(self.rules),
            url_map: Arc::new(url_map),
            api_url: parse_url(&self.api_url)?,
            rest_url: parse_url(&self.rest_url)?,
            user_agent,
            signature_timestamp: self.signature_timestamp,
            http,
        })
    }
}

#[derive(Clone)]
/// Authenticating dispatcher shared by every sub-API.
///
/// The client never interprets status codes: [`Client::send`] returns the
/// response as received. Classification is done by [`ErrorClassifier`],
/// usually through an [`ApiResource`]. Cloning is cheap and clones share the
/// transport.
pub struct Client {
    credentials: Arc<CredentialContainer>,
    rules: Arc<AuthRules>,
    url_map: Arc<Vec<(String, Url)>>,
    api_url: Url,
    rest_url: Url,
    user_agent: String,
    signature_timestamp: Option<UnixTimestamp>,
    http: Arc<dyn HttpTransport>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("credentials", &self.credentials.kinds().collect::<Vec<_>>())
            .field("rules", &self.rules)
            .field("url_map", &self.url_map)
            .field("api_url", &self.api_url.as_str())
            .field("rest_url", &self.rest_url.as_str())
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client with a single credential and default settings.
    ///
    /// For more customization, use [`Client::builder`].
    pub fn new(credential: impl Into<Credential>) -> Self {
        Self {
            credentials: Arc::new(CredentialContainer::from(credential.into())),
            rules: Arc::new(AuthRules::default()),
            url_map: Arc::new(Vec::new()),
            api_url: default_url(DEFAULT_API_URL),
            rest_url: default_url(DEFAULT_REST_URL),
            user_agent: SDK_USER_AGENT.to_owned(),
            signature_timestamp: None,
            http: Arc::new(ReqwestTransport::default()),
        }
    }

    /// Start building a client with custom settings.
    pub fn builder(credentials: impl Into<CredentialContainer>) -> ClientBuilder {
        ClientBuilder::new(credentials)
    }

    /// Base URL of the `api.nexmo.com` family of APIs.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Base URL of the `rest.nexmo.com` family of APIs.
    pub fn rest_url(&self) -> &Url {
        &self.rest_url
    }

    pub fn credentials(&self) -> &CredentialContainer {
        &self.credentials
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Authenticate and send a descriptor; the response is returned unchanged
    /// whatever its status.
    ///
    /// Errors:
    /// - [`VonageError::Configuration`] when no credential can authenticate the target,
    /// - [`VonageError::Token`] when a bearer token cannot be signed,
    /// - [`VonageError::Transport`] for transport failures.
    pub async fn send(&self, mut descriptor: RequestDescriptor) -> Result<Response, VonageError> {
        self.remap(&mut descriptor);
        self.authenticate(&mut descriptor)?;
        let request = encode_request(&descriptor, &self.user_agent)?;

        let target = descriptor.url();
        debug!(
            method = %request.method,
            host = target.host_str().unwrap_or_default(),
            path = target.path(),
            "sending request"
        );

        let started = Instant::now();
        let response = self
            .http
            .send(request)
            .await
            .map_err(VonageError::Transport)?;
        let elapsed = started.elapsed();

        debug!(
            status = response.status,
            elapsed_ms = elapsed.as_millis() as u64,
            "received response"
        );

        Ok(Response {
            status: response.status,
            headers: response.headers,
            body: response.body,
            elapsed,
        })
    }

    /// Apply the credential resolved for the descriptor's target.
    ///
    /// Already authenticated descriptors are left untouched.
    pub fn authenticate(&self, descriptor: &mut RequestDescriptor) -> Result<(), VonageError> {
        if descriptor.is_authenticated() {
            return Ok(());
        }

        let ResolvedAuth { scheme, credential } = match descriptor.auth_schemes() {
            Some(schemes) => self.credentials.resolve_with(descriptor.url(), schemes)?,
            None => self.credentials.resolve_for(descriptor.url(), &self.rules)?,
        };
        trace!(?scheme, path = descriptor.url().path(), "resolved credential");

        match (scheme, credential) {
            (AuthScheme::Bearer, Credential::Keypair(keypair)) => {
                let token = keypair.generate_token(Params::new())?;
                descriptor.set_header("Authorization", format!("Bearer {token}"));
            }
            (AuthScheme::Signature, Credential::SignatureSecret(secret)) => {
                descriptor.params_mut().extend(secret.auth_params());
                let now = self
                    .signature_timestamp
                    .unwrap_or_else(UnixTimestamp::now);
                signature::sign(descriptor, secret, now);
            }
            (AuthScheme::BasicParams, Credential::Basic(basic)) => {
                descriptor.params_mut().extend(basic.auth_params());
            }
            (AuthScheme::BasicHeader, Credential::Basic(basic)) => {
                descriptor.set_header("Authorization", basic.authorization_header());
            }
            (AuthScheme::OAuth, Credential::OAuth(credential)) => {
                let signed_params = match descriptor.content_type() {
                    ContentType::Json => Vec::new(),
                    ContentType::Query | ContentType::Form => {
                        flatten_params(descriptor.get_params())
                    }
                };
                let header = oauth::authorization_header(
                    credential,
                    descriptor.method(),
                    descriptor.url(),
                    &signed_params,
                    &Uuid::new_v4().simple().to_string(),
                    self.signature_timestamp.unwrap_or_else(UnixTimestamp::now),
                );
                descriptor.set_header("Authorization", header);
            }
            (scheme, credential) => {
                return Err(ConfigurationError::NoMatchingCredential {
                    target: format!(
                        "{} ({scheme:?} cannot use a {} credential)",
                        descriptor.url(),
                        credential.kind()
                    ),
                }
                .into());
            }
        }

        descriptor.mark_authenticated();
        Ok(())
    }

    /// `GET` with `params` in the query string.
    pub async fn get(&self, url: &str, params: Params) -> Result<Response, VonageError> {
        self.send(RequestDescriptor::new(Method::Get, url)?.params(params))
            .await
    }

    /// `POST` with `params` as a JSON body.
    pub async fn post(&self, url: &str, params: Params) -> Result<Response, VonageError> {
        self.send(RequestDescriptor::new(Method::Post, url)?.params(params))
            .await
    }

    /// `POST` with `params` as a form-urlencoded body.
    pub async fn post_form(&self, url: &str, params: Params) -> Result<Response, VonageError> {
        let descriptor = RequestDescriptor::new(Method::Post, url)?
            .with_content_type(ContentType::Form)
            .params(params);
        self.send(descriptor).await
    }

    /// `PUT` with `params` as a JSON body.
    pub async fn put(&self, url: &str, params: Params) -> Result<Response, VonageError> {
        self.send(RequestDescriptor::new(Method::Put, url)?.params(params))
            .await
    }

    /// `PATCH` with `params` as a JSON body.
    pub async fn patch(&self, url: &str, params: Params) -> Result<Response, VonageError> {
        self.send(RequestDescriptor::new(Method::Patch, url)?.params(params))
            .await
    }

    /// `DELETE` with `params` in the query string.
    pub async fn delete(&self, url: &str, params: Params) -> Result<Response, VonageError> {
        self.send(RequestDescriptor::new(Method::Delete, url)?.params(params))
            .await
    }

    fn remap(&self, descriptor: &mut RequestDescriptor) {
        if self.url_map.is_empty() {
            return;
        }
        let origin = descriptor.url().origin().ascii_serialization();
        let Some((_, replacement)) = self.url_map.iter().find(|(from, _)| *from == origin) else {
            return;
        };

        let current = descriptor.url();
        let mut remapped = replacement.clone();
        remapped.set_path(current.path());
        remapped.set_query(current.query());
        remapped.set_fragment(current.fragment());
        trace!(from = %origin, to = %replacement, "remapped request origin");
        *descriptor.url_mut() = remapped;
    }
}

fn parse_url(input: &str) -> Result<Url, ConfigurationError> {
    Url::parse(input).map_err(|err| ConfigurationError::InvalidUrl {
        input: input.to_owned(),
        reason: err.to_string(),
    })
}

fn origin_only(mut url: Url) -> Url {
    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn default_url(raw: &'static str) -> Url {
    // SAFETY: the default base URLs are valid absolute URLs
    Url::parse(raw).unwrap()
}
