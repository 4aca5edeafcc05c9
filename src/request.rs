//! Request and response objects exchanged with the host router

use crate::Result;
use crate::error::DiError;
use crate::provider::Value;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::Serialize;

/// An incoming request, as handed over by the router.
///
/// Header lookup is case-insensitive. Query parameters keep their order and
/// may repeat.
///
/// # Examples
///
/// ```rust
/// use route_injector::Request;
/// use http::Method;
///
/// let request = Request::builder()
///     .method(Method::POST)
///     .uri("/items?tag=a&tag=b")
///     .header("X-Token", "secret")
///     .build()
///     .unwrap();
///
/// assert_eq!(request.path(), "/items");
/// assert_eq!(request.header("x-token"), Some("secret"));
/// assert_eq!(request.query_values("tag").collect::<Vec<_>>(), vec!["a", "b"]);
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Shorthand for a bodiless request.
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        Self::builder().method(method).uri(uri).build()
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query parameter.
    pub fn query_value<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.query_values(name).next()
    }

    /// All values of a query parameter, in order.
    pub fn query_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// True when a non-empty body was sent.
    pub fn has_body(&self) -> bool {
        self.body.as_ref().is_some_and(|b| !b.is_empty())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Parse the body as JSON. A missing body parses as `null`.
    pub fn json(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        match &self.body {
            Some(body) if !body.is_empty() => serde_json::from_slice(body),
            _ => Ok(serde_json::Value::Null),
        }
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    error: Option<String>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: "/".to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            error: None,
        }
    }
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path with an optional query string.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a query parameter after those parsed from the URI.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and set `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.body = Some(Bytes::from(body));
                self.headers
                    .push((CONTENT_TYPE.as_str().to_string(), "application/json".to_string()));
            }
            Err(e) => self.error = Some(e.to_string()),
        }
        self
    }

    pub fn build(self) -> Result<Request> {
        if let Some(error) = self.error {
            return Err(DiError::InvalidRequest(error));
        }

        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e: http::uri::InvalidUri| DiError::InvalidRequest(e.to_string()))?;

        let mut query: Vec<(String, String)> = uri
            .query()
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        query.extend(self.query);

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DiError::InvalidRequest(format!("header name `{name}`: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| DiError::InvalidRequest(format!("header `{name}`: {e}")))?;
            headers.append(name, value);
        }

        Ok(Request {
            method: self.method,
            path: uri.path().to_string(),
            headers,
            query,
            body: self.body,
        })
    }
}

/// Rendered handler result or error.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    body: serde_json::Value,
}

impl Response {
    pub fn new(status: StatusCode, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(StatusCode::OK, body)
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    /// Render a handler's return value.
    ///
    /// Handlers may return `Response`, `serde_json::Value`, `String`,
    /// `&'static str`, `()`, `bool`, or a primitive integer/float.
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some(response) = value.downcast_ref::<Response>() {
            return Ok(response.clone());
        }
        if let Some(json) = value.downcast_ref::<serde_json::Value>() {
            return Ok(Self::ok(json.clone()));
        }
        if let Some(s) = value.downcast_ref::<String>() {
            return Ok(Self::ok(serde_json::Value::String(s.clone())));
        }
        if let Some(s) = value.downcast_ref::<&'static str>() {
            return Ok(Self::ok(serde_json::Value::String((*s).to_string())));
        }
        if value.downcast_ref::<()>().is_some() {
            return Ok(Self::ok(serde_json::Value::Null));
        }
        if let Some(b) = value.downcast_ref::<bool>() {
            return Ok(Self::ok(serde_json::Value::Bool(*b)));
        }
        macro_rules! numbers {
            ($($ty:ty),*) => {
                $(
                    if let Some(n) = value.downcast_ref::<$ty>() {
                        return Ok(Self::ok(serde_json::json!(*n)));
                    }
                )*
            };
        }
        numbers!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

        Err(DiError::Internal(
            "handler returned a type that cannot be rendered as JSON".to_string(),
        ))
    }

    /// Render an error as `{"detail": ...}`.
    ///
    /// Validation errors list their `{loc, msg}` entries. Internal failures
    /// only expose their message when `debug` is set.
    pub fn from_error(error: &DiError, debug: bool) -> Self {
        let status = error.status_code();
        let detail = match error {
            DiError::Validation(validation) => {
                serde_json::to_value(validation.errors()).unwrap_or(serde_json::Value::Null)
            }
            DiError::Http { detail, .. } => serde_json::Value::String(detail.clone()),
            DiError::RouteNotFound { .. } => serde_json::Value::String("Not Found".to_string()),
            other if debug => serde_json::Value::String(other.to_string()),
            _ => serde_json::Value::String(
                status
                    .canonical_reason()
                    .unwrap_or("Internal Server Error")
                    .to_string(),
            ),
        };
        Self::new(status, serde_json::json!({ "detail": detail }))
    }
}
