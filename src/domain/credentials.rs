use std::fmt;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::domain::error::ConfigurationError;
use crate::domain::request::Params;
use crate::domain::value::{ApiKey, ApiSecret, ApplicationId, non_empty};

/// Lifetime of generated bearer tokens unless the caller overrides `exp`.
pub const TOKEN_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Credential variant tag; a [`CredentialContainer`] holds at most one of each.
pub enum CredentialKind {
    Basic,
    SignatureSecret,
    Keypair,
    OAuth,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Basic => "basic",
            Self::SignatureSecret => "signature_secret",
            Self::Keypair => "keypair",
            Self::OAuth => "oauth",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Digest used to sign requests with a [`SignatureSecret`].
pub enum SignatureMethod {
    /// `md5(params + secret)`, lowercase hex.
    #[default]
    Md5Hash,
    /// HMAC-MD5, uppercase hex.
    Md5,
    /// HMAC-SHA1, uppercase hex.
    Sha1,
    /// HMAC-SHA256, uppercase hex.
    Sha256,
    /// HMAC-SHA512, uppercase hex.
    Sha512,
}

impl SignatureMethod {
    /// Name used in the dashboard settings (`md5hash`, `sha256`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5Hash => "md5hash",
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Parse a dashboard setting name; `None` for unknown methods.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "md5hash" => Some(Self::Md5Hash),
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Shared-secret credential sent as `api_key` + `api_secret` parameters, or as
/// an HTTP basic `Authorization` header.
pub struct Basic {
    key: ApiKey,
    secret: ApiSecret,
}

impl Basic {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            key: ApiKey::new(key)?,
            secret: ApiSecret::new(secret)?,
        })
    }

    pub fn key(&self) -> &ApiKey {
        &self.key
    }

    pub fn secret(&self) -> &ApiSecret {
        &self.secret
    }

    /// Parameters merged into the query or body of an outgoing request.
    pub fn auth_params(&self) -> Params {
        let mut params = Params::new();
        params.insert(ApiKey::FIELD.to_owned(), Value::from(self.key.as_str()));
        params.insert(ApiSecret::FIELD.to_owned(), Value::from(self.secret.as_str()));
        params
    }

    /// Read a credential back out of parameters produced by [`Basic::auth_params`]
    /// (or received from a caller). `None` when either field is missing or empty.
    pub fn from_auth_params(params: &Params) -> Option<Self> {
        let key = params.get(ApiKey::FIELD)?.as_str()?;
        let secret = params.get(ApiSecret::FIELD)?.as_str()?;
        Self::new(key, secret).ok()
    }

    /// `Authorization` header value for HTTP basic auth.
    pub fn authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.key.as_str(), self.secret.as_str());
        format!("Basic {}", BASE64_STANDARD.encode(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Credential whose secret never leaves the process: requests carry `api_key`
/// plus a `sig` computed with [`SignatureMethod`].
pub struct SignatureSecret {
    key: ApiKey,
    secret: ApiSecret,
    method: SignatureMethod,
}

impl SignatureSecret {
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        method: SignatureMethod,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            key: ApiKey::new(key)?,
            secret: ApiSecret::new(secret)?,
            method,
        })
    }

    pub fn key(&self) -> &ApiKey {
        &self.key
    }

    pub fn secret(&self) -> &ApiSecret {
        &self.secret
    }

    pub fn method(&self) -> SignatureMethod {
        self.method
    }

    /// Parameters injected before signing; the signer adds `timestamp` and `sig`.
    pub fn auth_params(&self) -> Params {
        let mut params = Params::new();
        params.insert(ApiKey::FIELD.to_owned(), Value::from(self.key.as_str()));
        params
    }
}

#[derive(Clone)]
/// Application private key used to mint short-lived RS256 bearer tokens.
pub struct Keypair {
    application_id: ApplicationId,
    key: EncodingKey,
}

impl Keypair {
    /// Parse a PEM encoded RSA private key (PKCS#1 or PKCS#8).
    pub fn new(
        private_key_pem: impl AsRef<[u8]>,
        application_id: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let application_id = ApplicationId::new(application_id)?;
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_ref()).map_err(|err| {
            ConfigurationError::InvalidPrivateKey {
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            application_id,
            key,
        })
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    /// Mint a token with the default claims (`iat`, `jti`, `application_id`,
    /// `exp` one hour out) merged with `claims`.
    ///
    /// Caller claims win over the defaults, including `exp` and
    /// `application_id`.
    pub fn generate_token(&self, claims: Params) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = self.token_claims(claims, chrono::Utc::now().timestamp());
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
    }

    fn token_claims(&self, custom: Params, issued_at: i64) -> Params {
        let mut claims = Params::new();
        claims.insert("iat".to_owned(), Value::from(issued_at));
        claims.insert("jti".to_owned(), Value::from(Uuid::new_v4().to_string()));
        claims.insert(
            ApplicationId::FIELD.to_owned(),
            Value::from(self.application_id.as_str()),
        );
        claims.insert("exp".to_owned(), Value::from(issued_at + TOKEN_TTL_SECS));
        claims.extend(custom);
        claims
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("application_id", &self.application_id)
            .field("key", &"***")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
/// OAuth 1.0a consumer + access token pair; requests are signed with HMAC-SHA1
/// into an `Authorization: OAuth` header.
pub struct OAuth {
    consumer_key: String,
    consumer_secret: String,
    token: String,
    token_secret: String,
}

impl OAuth {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            consumer_key: non_empty("oauth_consumer_key", consumer_key.into())?,
            consumer_secret: non_empty("oauth_consumer_secret", consumer_secret.into())?,
            token: non_empty("oauth_token", token.into())?,
            token_secret: non_empty("oauth_token_secret", token_secret.into())?,
        })
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_secret(&self) -> &str {
        &self.token_secret
    }
}

impl fmt::Debug for OAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth")
            .field("consumer_key", &self.consumer_key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
/// One authentication mechanism.
pub enum Credential {
    Basic(Basic),
    SignatureSecret(SignatureSecret),
    Keypair(Keypair),
    OAuth(OAuth),
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::Basic(_) => CredentialKind::Basic,
            Self::SignatureSecret(_) => CredentialKind::SignatureSecret,
            Self::Keypair(_) => CredentialKind::Keypair,
            Self::OAuth(_) => CredentialKind::OAuth,
        }
    }
}

impl From<Basic> for Credential {
    fn from(value: Basic) -> Self {
        Self::Basic(value)
    }
}

impl From<SignatureSecret> for Credential {
    fn from(value: SignatureSecret) -> Self {
        Self::SignatureSecret(value)
    }
}

impl From<Keypair> for Credential {
    fn from(value: Keypair) -> Self {
        Self::Keypair(value)
    }
}

impl From<OAuth> for Credential {
    fn from(value: OAuth) -> Self {
        Self::OAuth(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// How a resolved credential is applied to an outgoing request.
pub enum AuthScheme {
    /// Keypair → `Authorization: Bearer <jwt>`.
    Bearer,
    /// SignatureSecret → `api_key` + `timestamp` + `sig` params.
    Signature,
    /// Basic → `api_key` + `api_secret` params.
    BasicParams,
    /// Basic → `Authorization: Basic ...`.
    BasicHeader,
    /// OAuth → `Authorization: OAuth ...`.
    OAuth,
}

impl AuthScheme {
    /// Credential variant the scheme needs.
    pub fn credential_kind(self) -> CredentialKind {
        match self {
            Self::Bearer => CredentialKind::Keypair,
            Self::Signature => CredentialKind::SignatureSecret,
            Self::BasicParams | Self::BasicHeader => CredentialKind::Basic,
            Self::OAuth => CredentialKind::OAuth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Maps a URL path prefix onto the ordered list of acceptable schemes.
pub struct AuthRule {
    prefix: String,
    schemes: Vec<AuthScheme>,
}

impl AuthRule {
    pub fn new(prefix: impl Into<String>, schemes: Vec<AuthScheme>) -> Self {
        Self {
            prefix: prefix.into(),
            schemes,
        }
    }

    /// Endpoints that only accept bearer tokens (voice, recordings).
    pub fn bearer_only(prefix: impl Into<String>) -> Self {
        Self::new(prefix, vec![AuthScheme::Bearer])
    }

    /// Bearer first, then `SignatureSecret > Basic > OAuth`.
    pub fn bearer_preferred(prefix: impl Into<String>) -> Self {
        Self::new(
            prefix,
            vec![
                AuthScheme::Bearer,
                AuthScheme::Signature,
                AuthScheme::BasicParams,
                AuthScheme::OAuth,
            ],
        )
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn schemes(&self) -> &[AuthScheme] {
        &self.schemes
    }

    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/'),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Per-endpoint credential precedence, consulted for every outgoing request.
///
/// The first rule whose prefix matches the target path wins; targets no rule
/// matches use the fallback order.
pub struct AuthRules {
    rules: Vec<AuthRule>,
    fallback: Vec<AuthScheme>,
}

impl AuthRules {
    /// Rules with no route entries and the given fallback order.
    pub fn with_fallback(fallback: Vec<AuthScheme>) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Add a rule that takes priority over every rule already present.
    pub fn with_rule(mut self, rule: AuthRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn rules(&self) -> &[AuthRule] {
        &self.rules
    }

    /// Ordered schemes for a target URL.
    pub fn schemes_for(&self, target: &Url) -> &[AuthScheme] {
        let path = target.path();
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(AuthRule::schemes)
            .unwrap_or(self.fallback.as_slice())
    }
}

impl Default for AuthRules {
    /// Voice and file downloads require bearer tokens, redaction uses HTTP basic
    /// auth, everything else prefers shared secrets.
    fn default() -> Self {
        Self {
            rules: vec![
                AuthRule::bearer_only("/v1/calls"),
                AuthRule::bearer_only("/v1/files"),
                AuthRule::new("/v1/redact", vec![AuthScheme::BasicHeader]),
            ],
            fallback: vec![
                AuthScheme::Signature,
                AuthScheme::BasicParams,
                AuthScheme::Bearer,
                AuthScheme::OAuth,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy)]
/// The single credential chosen for one outgoing request.
pub struct ResolvedAuth<'a> {
    pub scheme: AuthScheme,
    pub credential: &'a Credential,
}

#[derive(Debug, Clone, Default)]
/// Holds at most one credential of each [`CredentialKind`].
pub struct CredentialContainer {
    credentials: Vec<Credential>,
}

impl CredentialContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a container, rejecting duplicate variants.
    pub fn from_credentials(
        credentials: impl IntoIterator<Item = Credential>,
    ) -> Result<Self, ConfigurationError> {
        credentials
            .into_iter()
            .try_fold(Self::new(), |container, credential| container.with(credential))
    }

    /// Add one credential; a second credential of the same kind is an error.
    pub fn with(mut self, credential: impl Into<Credential>) -> Result<Self, ConfigurationError> {
        let credential = credential.into();
        let kind = credential.kind();
        if self.get(kind).is_some() {
            return Err(ConfigurationError::DuplicateCredential { kind });
        }
        self.credentials.push(credential);
        Ok(self)
    }

    pub fn get(&self, kind: CredentialKind) -> Option<&Credential> {
        self.credentials.iter().find(|it| it.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = CredentialKind> + '_ {
        self.credentials.iter().map(Credential::kind)
    }

    /// Pick the credential for `target` following `rules`.
    pub fn resolve_for<'a>(
        &'a self,
        target: &Url,
        rules: &AuthRules,
    ) -> Result<ResolvedAuth<'a>, ConfigurationError> {
        self.resolve_with(target, rules.schemes_for(target))
    }

    /// Pick the first credential satisfying one of `schemes`, in order.
    pub fn resolve_with<'a>(
        &'a self,
        target: &Url,
        schemes: &[AuthScheme],
    ) -> Result<ResolvedAuth<'a>, ConfigurationError> {
        schemes
            .iter()
            .find_map(|scheme| {
                self.get(scheme.credential_kind())
                    .map(|credential| ResolvedAuth {
                        scheme: *scheme,
                        credential,
                    })
            })
            .ok_or_else(|| ConfigurationError::NoMatchingCredential {
                target: target.as_str().to_owned(),
            })
    }
}

impl From<Credential> for CredentialContainer {
    fn from(value: Credential) -> Self {
        Self {
            credentials: vec![value],
        }
    }
}
