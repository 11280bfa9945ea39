use serde_json::Value;
use url::Url;

use crate::client::{Client, ErrorClassifier, RetryPolicy, VonageError};
use crate::domain::{
    AuthScheme, ConfigurationError, ContentType, Method, Params, RequestDescriptor, Response,
};

const DEFAULT_PAGE_INDEX_PARAM: &str = "page_index";

#[derive(Debug, Clone)]
/// Shared plumbing of one sub-API resource (e.g. `/v1/calls`).
///
/// Every operation authenticates through the [`Client`], is redriven by the
/// [`RetryPolicy`] while throttled, and returns the raw [`Response`] once the
/// [`ErrorClassifier`] accepts it.
pub struct ApiResource {
    client: Client,
    base_uri: String,
    collection: String,
    hal: bool,
    content_type: ContentType,
    auth: Option<Vec<AuthScheme>>,
    page_index_param: String,
    classifier: ErrorClassifier,
    retry: RetryPolicy,
}

impl ApiResource {
    /// `base_uri` is absolute, e.g. `https://api.nexmo.com/v1/calls`.
    pub fn new(client: Client, base_uri: impl Into<String>) -> Self {
        Self {
            client,
            base_uri: base_uri.into(),
            collection: String::new(),
            hal: false,
            content_type: ContentType::Json,
            auth: None,
            page_index_param: DEFAULT_PAGE_INDEX_PARAM.to_owned(),
            classifier: ErrorClassifier::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Name of the item array in list responses.
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collection = name.into();
        self
    }

    /// Read list responses as HAL documents (`_embedded`, `_links.next`).
    pub fn hal(mut self, enabled: bool) -> Self {
        self.hal = enabled;
        self
    }

    /// Treat a non-zero business `status` in 200 bodies as an error.
    pub fn errors_on_200(mut self, enabled: bool) -> Self {
        self.classifier = self.classifier.with_errors_on_200(enabled);
        self
    }

    /// Body encoding for `create`/`update` (JSON unless set).
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Restrict authentication of this resource to `schemes`.
    pub fn with_auth(mut self, schemes: Vec<AuthScheme>) -> Self {
        self.auth = Some(schemes);
        self
    }

    /// Query parameter incremented by non-HAL paging.
    pub fn with_page_index_param(mut self, name: impl Into<String>) -> Self {
        self.page_index_param = name.into();
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_hal(&self) -> bool {
        self.hal
    }

    /// URL of a single item.
    pub fn item_uri(&self, id: &str) -> String {
        format!("{}/{}", self.base_uri.trim_end_matches('/'), id)
    }

    /// `POST` `body` to the base URI.
    pub async fn create(&self, body: Params) -> Result<Response, VonageError> {
        let descriptor = RequestDescriptor::new(Method::Post, &self.base_uri)?
            .with_content_type(self.content_type)
            .params(body);
        self.submit(descriptor).await
    }

    /// `GET` one item.
    pub async fn get(&self, id: &str, query: Params) -> Result<Response, VonageError> {
        let descriptor = RequestDescriptor::new(Method::Get, &self.item_uri(id))?.params(query);
        self.submit(descriptor).await
    }

    /// `PUT` `body` to one item.
    pub async fn update(&self, id: &str, body: Params) -> Result<Response, VonageError> {
        let descriptor = RequestDescriptor::new(Method::Put, &self.item_uri(id))?
            .with_content_type(self.content_type)
            .params(body);
        self.submit(descriptor).await
    }

    /// `DELETE` one item.
    pub async fn delete(&self, id: &str) -> Result<Response, VonageError> {
        self.submit(RequestDescriptor::new(Method::Delete, &self.item_uri(id))?)
            .await
    }

    /// Send a prepared descriptor with this resource's auth, retry and
    /// classification settings.
    pub async fn submit(&self, descriptor: RequestDescriptor) -> Result<Response, VonageError> {
        let descriptor = match &self.auth {
            Some(schemes) if descriptor.auth_schemes().is_none() => {
                descriptor.auth_override(schemes.clone())
            }
            _ => descriptor,
        };

        self.retry
            .run(|| {
                let descriptor = descriptor.clone();
                async move {
                    let response = self.client.send(descriptor).await?;
                    self.classifier.check(&response)?;
                    Ok::<_, VonageError>(response)
                }
            })
            .await
    }

    /// Page through the collection matching `filter`.
    pub fn search(&self, filter: Params) -> Pager<'_> {
        let cursor = if self.hal {
            Cursor::First
        } else {
            let start = filter
                .get(&self.page_index_param)
                .and_then(page_index_of)
                .unwrap_or(1);
            Cursor::Index(start)
        };
        Pager {
            resource: self,
            filter,
            cursor: Some(cursor),
            seen: 0,
        }
    }
}

fn page_index_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    First,
    Link(Url),
    Index(u64),
}

#[derive(Debug, Clone, PartialEq)]
/// One fetched page.
pub struct Page {
    pub items: Vec<Value>,
    /// Total reported by the API (`count`), when present.
    pub count: Option<u64>,
    pub response: Response,
}

#[derive(Debug)]
/// Lazily fetches the pages of an [`ApiResource::search`].
pub struct Pager<'a> {
    resource: &'a ApiResource,
    filter: Params,
    cursor: Option<Cursor>,
    seen: u64,
}

impl Pager<'_> {
    /// Fetch the next page; `Ok(None)` once the collection is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Page>, VonageError> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };
        let resource = self.resource;

        let descriptor = match &cursor {
            Cursor::First => {
                RequestDescriptor::new(Method::Get, &resource.base_uri)?.params(self.filter.clone())
            }
            Cursor::Link(url) => RequestDescriptor::from_url(Method::Get, url.clone()),
            Cursor::Index(index) => {
                RequestDescriptor::new(Method::Get, &resource.base_uri)?
                    .params(self.filter.clone())
                    .param(resource.page_index_param.as_str(), index.to_string())
            }
        };
        let page_url = descriptor.url().clone();

        let response = resource.submit(descriptor).await?;
        let body = response.require_json()?;

        let items = if resource.hal {
            body.get("_embedded")
                .and_then(|embedded| embedded.get(&resource.collection))
        } else {
            body.get(&resource.collection)
        }
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

        if items.is_empty() {
            return Ok(None);
        }

        let count = body.get("count").and_then(page_index_of);
        self.seen += items.len() as u64;
        let exhausted = count.is_some_and(|count| self.seen >= count);

        self.cursor = match cursor {
            _ if exhausted => None,
            Cursor::Index(index) => Some(Cursor::Index(index + 1)),
            Cursor::First | Cursor::Link(_) => next_link(&body, &page_url)?.map(Cursor::Link),
        };

        Ok(Some(Page {
            items,
            count,
            response,
        }))
    }

    /// Drain the remaining pages into one list of items.
    pub async fn collect_items(mut self) -> Result<Vec<Value>, VonageError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page.items);
        }
        Ok(items)
    }
}

fn next_link(body: &Value, page_url: &Url) -> Result<Option<Url>, ConfigurationError> {
    let Some(href) = body
        .pointer("/_links/next/href")
        .and_then(Value::as_str)
        .filter(|href| !href.trim().is_empty())
    else {
        return Ok(None);
    };
    page_url
        .join(href)
        .map(Some)
        .map_err(|err| ConfigurationError::InvalidUrl {
            input: href.to_owned(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::client::tests::{FakeTransport, make_client};
    use crate::domain::{Basic, Credential};

    use super::*;

    fn client(transport: &FakeTransport) -> Client {
        make_client(
            Credential::from(Basic::new("key", "secret").unwrap()),
            transport.clone(),
        )
    }

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn create_posts_json_and_returns_raw_response() {
        let transport = FakeTransport::new(vec![(201, r#"{"id": "app-1"}"#)]);
        let resource = ApiResource::new(client(&transport), "https://api.nexmo.com/v2/applications");

        let response = resource
            .create(params(json!({"name": "demo"})))
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.require_field("id").unwrap(), json!("app-1"));

        let request = transport.last_request();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://api.nexmo.com/v2/applications");
        let body: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["name"], json!("demo"));
    }

    #[tokio::test]
    async fn item_operations_target_item_uri() {
        let transport = FakeTransport::new(vec![(200, "{}")]);
        let resource = ApiResource::new(client(&transport), "https://api.nexmo.com/v2/applications/")
            .with_auth(vec![AuthScheme::BasicHeader]);

        resource.get("abc", Params::new()).await.unwrap();
        resource
            .update("abc", params(json!({"name": "renamed"})))
            .await
            .unwrap();
        resource.delete("abc").await.unwrap();

        let requests = transport.requests();
        let methods = requests.iter().map(|r| r.method).collect::<Vec<_>>();
        assert_eq!(methods, vec![Method::Get, Method::Put, Method::Delete]);
        for request in &requests {
            assert_eq!(request.url, "https://api.nexmo.com/v2/applications/abc");
            assert!(request.header("Authorization").unwrap().starts_with("Basic "));
        }
    }

    #[tokio::test]
    async fn form_resources_encode_bodies_as_form() {
        let transport = FakeTransport::new(vec![(200, r#"{"message-count": "1", "messages": [{"status": "0"}]}"#)]);
        let resource = ApiResource::new(client(&transport), "https://rest.nexmo.com/sms/json")
            .with_content_type(ContentType::Form)
            .errors_on_200(true);

        resource
            .create(params(json!({"to": "447700900000", "text": "hi"})))
            .await
            .unwrap();
        let request = transport.last_request();
        assert_eq!(
            request.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[tokio::test]
    async fn classified_errors_are_returned() {
        let transport = FakeTransport::new(vec![(
            400,
            r#"{"type": "http://x", "title": "Bad Request", "invalid_parameters": [{"name": "to", "reason": "missing"}]}"#,
        )]);
        let resource = ApiResource::new(client(&transport), "https://api.nexmo.com/v2/applications");

        let err = resource.create(Params::new()).await.unwrap_err();
        assert!(matches!(err, VonageError::Validation { status: 400, .. }));
        assert_eq!(err.invalid_parameters()[0].name, "to");
    }

    #[tokio::test]
    async fn errors_on_200_flag_controls_business_status_checks() {
        let body = r#"{"status": "3", "error_text": "Invalid value for param: number"}"#;

        let transport = FakeTransport::new(vec![(200, body)]);
        let plain = ApiResource::new(client(&transport), "https://api.nexmo.com/verify/json");
        assert!(plain.create(Params::new()).await.is_ok());

        let strict = plain.clone().errors_on_200(true);
        let err = strict.create(Params::new()).await.unwrap_err();
        assert!(err.is_request_error());
        assert_eq!(err.code(), Some("3"));
    }

    #[tokio::test]
    async fn throttled_requests_are_redriven() {
        let transport = FakeTransport::default();
        transport.push(429, vec![("Retry-After", "0")], "");
        transport.push(200, vec![], r#"{"id": "ok"}"#);
        let resource = ApiResource::new(client(&transport), "https://api.nexmo.com/v2/applications")
            .with_retry(fast_retry());

        let response = resource.get("ok", Params::new()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn throttle_propagates_after_max_attempts() {
        let transport = FakeTransport::default();
        transport.push(429, vec![("Retry-After", "0")], "");
        let resource = ApiResource::new(client(&transport), "https://api.nexmo.com/v2/applications")
            .with_retry(fast_retry());

        let err = resource.get("x", Params::new()).await.unwrap_err();
        assert!(err.is_throttle());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn hal_pager_follows_next_links() {
        let transport = FakeTransport::default();
        transport.push(
            200,
            vec![],
            r#"{"_embedded": {"applications": [{"id": "a"}, {"id": "b"}]},
                "_links": {"next": {"href": "/v2/applications?page=2"}}}"#,
        );
        transport.push(
            200,
            vec![],
            r#"{"_embedded": {"applications": [{"id": "c"}]}, "_links": {}}"#,
        );
        let resource = ApiResource::new(client(&transport), "https://api.nexmo.com/v2/applications")
            .with_collection("applications")
            .hal(true);

        let mut pager = resource.search(params(json!({"page_size": 2})));
        let first = pager.next_page().await.unwrap().unwrap();
        assert_eq!(first.items.len(), 2);
        let second = pager.next_page().await.unwrap().unwrap();
        assert_eq!(second.items, vec![json!({"id": "c"})]);
        assert!(pager.next_page().await.unwrap().is_none());

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.contains("page_size=2"));
        assert!(
            requests[1]
                .url
                .starts_with("https://api.nexmo.com/v2/applications?page=2&")
        );
    }

    #[tokio::test]
    async fn index_pager_increments_page_index_until_count() {
        let transport = FakeTransport::default();
        transport.push(200, vec![], r#"{"count": 3, "numbers": [{"msisdn": "1"}, {"msisdn": "2"}]}"#);
        transport.push(200, vec![], r#"{"count": 3, "numbers": [{"msisdn": "3"}]}"#);
        let resource = ApiResource::new(client(&transport), "https://rest.nexmo.com/account/numbers")
            .with_collection("numbers");

        let items = resource
            .search(Params::new())
            .collect_items()
            .await
            .unwrap();
        assert_eq!(items.len(), 3);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.contains("page_index=1"));
        assert!(requests[1].url.contains("page_index=2"));
    }

    #[tokio::test]
    async fn index_pager_stops_on_empty_page() {
        let transport = FakeTransport::default();
        transport.push(200, vec![], r#"{"numbers": [{"msisdn": "1"}]}"#);
        transport.push(200, vec![], r#"{"numbers": []}"#);
        let resource = ApiResource::new(client(&transport), "https://rest.nexmo.com/account/numbers")
            .with_collection("numbers")
            .with_page_index_param("index");

        let mut pager = resource.search(params(json!({"index": 4})));
        assert!(pager.next_page().await.unwrap().is_some());
        assert!(pager.next_page().await.unwrap().is_none());
        assert!(pager.next_page().await.unwrap().is_none());

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.contains("index=4"));
        assert!(requests[1].url.contains("index=5"));
    }

    #[tokio::test]
    async fn pager_requires_a_json_body() {
        let transport = FakeTransport::new(vec![(200, "")]);
        let resource = ApiResource::new(client(&transport), "https://rest.nexmo.com/account/numbers")
            .with_collection("numbers");

        let err = resource.search(Params::new()).next_page().await.unwrap_err();
        assert!(matches!(err, VonageError::UnexpectedResponse { .. }));
    }
}
