use std::fmt;

use serde_json::Value;
use url::Url;

use crate::domain::credentials::AuthScheme;
use crate::domain::error::ConfigurationError;

/// Key/value parameter bag. Query-string and form descriptors flatten values
/// to strings on the wire; JSON descriptors send them as is.
pub type Params = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Content type a descriptor gets unless the caller picks one: query
    /// string for `GET`/`DELETE`, JSON otherwise.
    pub fn default_content_type(self) -> ContentType {
        match self {
            Self::Get | Self::Delete => ContentType::Query,
            Self::Post | Self::Put | Self::Patch => ContentType::Json,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Where a descriptor's parameters travel.
pub enum ContentType {
    /// Appended to the URL query string; no body.
    Query,
    /// `application/x-www-form-urlencoded` body.
    Form,
    /// `application/json` body.
    Json,
}

impl ContentType {
    /// `Content-Type` header value, `None` for body-less descriptors.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Self::Query => None,
            Self::Form => Some("application/x-www-form-urlencoded"),
            Self::Json => Some("application/json"),
        }
    }

    /// `true` when parameters live in the body rather than the URL.
    pub fn is_body(self) -> bool {
        !matches!(self, Self::Query)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Outgoing request before authentication.
///
/// Parameters are held separately from any query already present in the URL;
/// for [`ContentType::Query`] they are appended to it when the request is
/// encoded. Only authentication touches a descriptor after it is handed to the
/// client, and it does so once.
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    content_type: ContentType,
    params: Params,
    headers: Vec<(String, String)>,
    auth: Option<Vec<AuthScheme>>,
    authenticated: bool,
}

impl RequestDescriptor {
    /// Parse `url` and use the method's default content type.
    pub fn new(method: Method, url: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(url).map_err(|err| ConfigurationError::InvalidUrl {
            input: url.to_owned(),
            reason: err.to_string(),
        })?;
        Ok(Self::from_url(method, url))
    }

    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            content_type: method.default_content_type(),
            params: Params::new(),
            headers: Vec::new(),
            auth: None,
            authenticated: false,
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Set one parameter, replacing any previous value under `key`.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Merge a parameter bag, later keys winning.
    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Restrict authentication of this request to `schemes`, in order,
    /// bypassing the client's per-route rules.
    pub fn auth_override(mut self, schemes: Vec<AuthScheme>) -> Self {
        self.auth = Some(schemes);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn get_params(&self) -> &Params {
        &self.params
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn auth_schemes(&self) -> Option<&[AuthScheme]> {
        self.auth.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub(crate) fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    pub(crate) fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// Set a header, replacing any existing header with the same name.
    pub(crate) fn set_header(&mut self, name: &str, value: String) {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value));
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_content_type_follows_method() {
        let get = RequestDescriptor::new(Method::Get, "https://api.nexmo.com/x").unwrap();
        assert_eq!(get.content_type(), ContentType::Query);
        let post = RequestDescriptor::new(Method::Post, "https://api.nexmo.com/x").unwrap();
        assert_eq!(post.content_type(), ContentType::Json);
        let delete = RequestDescriptor::new(Method::Delete, "https://api.nexmo.com/x").unwrap();
        assert_eq!(delete.content_type(), ContentType::Query);
    }

    #[test]
    fn invalid_url_is_a_configuration_error() {
        let err = RequestDescriptor::new(Method::Get, "not a url").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidUrl { .. }));
    }

    #[test]
    fn later_params_replace_earlier_ones() {
        let mut extra = Params::new();
        extra.insert("to".to_owned(), Value::from("447700900001"));
        let descriptor = RequestDescriptor::new(Method::Post, "https://rest.nexmo.com/sms/json")
            .unwrap()
            .param("to", "447700900000")
            .param("text", "hi")
            .params(extra);
        assert_eq!(
            descriptor.get_params().get("to"),
            Some(&Value::from("447700900001"))
        );
        assert_eq!(descriptor.get_params().len(), 2);
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut descriptor = RequestDescriptor::new(Method::Get, "https://api.nexmo.com/x")
            .unwrap()
            .header("authorization", "old");
        descriptor.set_header("Authorization", "new".to_owned());
        assert_eq!(
            descriptor.headers(),
            &[("Authorization".to_owned(), "new".to_owned())]
        );
    }
}
