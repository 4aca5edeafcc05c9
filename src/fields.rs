//! Custom field markers: values pulled straight out of the request
//!
//! [`Header`], [`HeaderModel`], [`QueryParams`], [`QueryList`],
//! [`QueryModel`] and [`JsonBody`] implement [`CustomField`]. A field does
//! not know which parameter it is attached to; the graph walker pairs it
//! with its parameter in a [`FieldBinding`], so the same marker can be
//! reused across routes safely.

use crate::error::ValidationError;
use crate::provider::{Injectable, TypeInfo, Value};
use crate::request::Request;
use crate::signature::Parameter;
use crate::{DiError, Result};
use serde::de::DeserializeOwned;
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

/// Where a custom field reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSource {
    Header,
    Query,
    Body,
}

impl FieldSource {
    /// First element of a validation error's `loc`.
    pub fn location(&self) -> &'static str {
        match self {
            FieldSource::Header => "header",
            FieldSource::Query => "query",
            FieldSource::Body => "body",
        }
    }
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.location())
    }
}

/// A marker that extracts and coerces one value from the request.
pub trait CustomField: Send + Sync + 'static {
    fn source(&self) -> FieldSource;

    /// Source name given at construction, if any.
    fn explicit_name(&self) -> Option<&str>;

    /// Type of the extracted value.
    fn target(&self) -> TypeInfo;

    /// Source name to use when none was given explicitly.
    fn infer_name(&self, param_name: &str) -> String {
        param_name.to_string()
    }

    fn required(&self) -> bool;

    /// Marker-level fallback for an absent value.
    fn default_value(&self) -> Option<Value> {
        None
    }

    /// `Ok(None)` when the request does not carry the value.
    fn extract(
        &self,
        binding: &FieldBinding,
        request: &Request,
    ) -> std::result::Result<Option<Value>, ValidationError>;

    /// Error reported when a required value is absent.
    fn missing(&self, binding: &FieldBinding, request: &Request) -> ValidationError;
}

/// A custom field paired with the parameter it fills.
#[derive(Clone)]
pub struct FieldBinding {
    field: Arc<dyn CustomField>,
    param_name: String,
    source_name: String,
    declared: TypeInfo,
    default: Option<Value>,
}

impl FieldBinding {
    /// Pair `field` with `param`, checking the declared type against the field's target.
    pub fn classify(param: &Parameter, field: &Arc<dyn CustomField>) -> Result<Self> {
        let declared = param.type_info();
        let target = field.target();
        if declared != target {
            return Err(DiError::TypeMismatch {
                name: param.name().to_string(),
                expected: declared.name(),
                found: target.name(),
            });
        }

        let source_name = match field.explicit_name() {
            Some(name) => name.to_string(),
            None => field.infer_name(param.name()),
        };

        Ok(Self {
            field: Arc::clone(field),
            param_name: param.name().to_string(),
            source_name,
            declared,
            default: param.default().cloned(),
        })
    }

    #[inline]
    pub fn param_name(&self) -> &str {
        &self.param_name
    }

    /// Header, query or body key the value is read from.
    #[inline]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    #[inline]
    pub fn declared_type(&self) -> TypeInfo {
        self.declared
    }

    #[inline]
    pub fn source(&self) -> FieldSource {
        self.field.source()
    }

    /// Extract the value, falling back to the marker default, then the
    /// parameter default. `Ok(None)` means the parameter is omitted.
    pub fn resolve(
        &self,
        request: &Request,
    ) -> std::result::Result<Option<Value>, ValidationError> {
        if let Some(value) = self.field.extract(self, request)? {
            return Ok(Some(value));
        }
        if let Some(default) = self.field.default_value() {
            return Ok(Some(default));
        }
        if let Some(default) = &self.default {
            return Ok(Some(Arc::clone(default)));
        }
        if self.field.required() {
            return Err(self.field.missing(self, request));
        }
        Ok(None)
    }

    fn invalid(&self, reason: impl Display) -> ValidationError {
        let source = self.source();
        let msg = match source {
            FieldSource::Header => format!("Invalid header {}: {reason}", self.source_name),
            FieldSource::Query => format!("Invalid query parameter {}: {reason}", self.source_name),
            FieldSource::Body => format!("Invalid request body: {reason}"),
        };
        ValidationError::new([source.location(), self.source_name.as_str()], msg)
    }
}

impl fmt::Debug for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("source", &self.source())
            .field("param_name", &self.param_name)
            .field("source_name", &self.source_name)
            .field("declared", &self.declared.name())
            .finish()
    }
}

/// Shared builder state of the request-field markers.
struct FieldOptions {
    name: Option<String>,
    required: bool,
    default: Option<Value>,
}

impl FieldOptions {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            required: true,
            default: None,
        }
    }
}

fn parse<T>(binding: &FieldBinding, raw: &str) -> std::result::Result<Value, ValidationError>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    raw.parse::<T>()
        .map(|value| Arc::new(value) as Value)
        .map_err(|e| binding.invalid(e))
}

/// A request header.
///
/// The header name defaults to the parameter name with underscores turned
/// into dashes. Lookup ignores case and treats `_` and `-` as the same
/// character, so `x_token`, `X-Token` and `X_TOKEN` all name one header.
///
/// # Examples
///
/// ```rust
/// use route_injector::{Header, Provider};
///
/// let handler = Provider::builder("whoami")
///     .field::<String>("x_api_key", Header::<String>::new())
///     .field::<u32>("limit", Header::<u32>::named("X-Limit").with_default(10))
///     .sync(|args| Ok(format!("{}", args.get::<String>("x_api_key")?)));
///
/// assert_eq!(handler.signature().len(), 2);
/// ```
pub struct Header<T> {
    options: FieldOptions,
    convert_underscores: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Header<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    /// Required header named after the parameter.
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(None),
            convert_underscores: true,
            _marker: PhantomData,
        }
    }

    /// Required header with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(Some(name.into())),
            ..Self::new()
        }
    }

    /// Omit the argument instead of failing when the header is absent.
    pub fn optional(mut self) -> Self {
        self.options.required = false;
        self
    }

    pub fn with_default(mut self, default: T) -> Self {
        self.options.default = Some(Arc::new(default));
        self
    }

    /// With `false`, keep underscores in inferred names and match `_` and
    /// `-` literally.
    pub fn convert_underscores(mut self, convert: bool) -> Self {
        self.convert_underscores = convert;
        self
    }
}

impl<T> Default for Header<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CustomField for Header<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    fn source(&self) -> FieldSource {
        FieldSource::Header
    }

    fn explicit_name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    fn target(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn infer_name(&self, param_name: &str) -> String {
        if self.convert_underscores {
            param_name.replace('_', "-")
        } else {
            param_name.to_string()
        }
    }

    fn required(&self) -> bool {
        self.options.required
    }

    fn default_value(&self) -> Option<Value> {
        self.options.default.clone()
    }

    fn extract(
        &self,
        binding: &FieldBinding,
        request: &Request,
    ) -> std::result::Result<Option<Value>, ValidationError> {
        let found = if self.convert_underscores {
            request
                .headers()
                .iter()
                .find(|(name, _)| same_header_name(name.as_str(), binding.source_name()))
                .map(|(_, value)| value)
        } else {
            request.headers().get(binding.source_name())
        };
        let Some(raw) = found else {
            return Ok(None);
        };
        let raw = raw.to_str().map_err(|e| binding.invalid(e))?;
        parse::<T>(binding, raw).map(Some)
    }

    fn missing(&self, binding: &FieldBinding, _request: &Request) -> ValidationError {
        ValidationError::new(
            ["header", binding.source_name()],
            format!("Missing header: {}", binding.source_name()),
        )
    }
}

/// Header names compare case-insensitively with `_` folded to `-`.
fn same_header_name(a: &str, b: &str) -> bool {
    let fold = |c: u8| if c == b'_' { b'-' } else { c.to_ascii_lowercase() };
    a.len() == b.len() && a.bytes().zip(b.bytes()).all(|(x, y)| fold(x) == fold(y))
}

/// The whole header map deserialized into `T`.
///
/// Header names are lowercased with dashes turned into underscores, so
/// `X-Request-Id` fills a field named `x_request_id`. Repeated headers fill
/// sequence fields; values are coerced the way query strings are.
///
/// # Examples
///
/// ```rust
/// use route_injector::{HeaderModel, Provider};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Client {
///     user_agent: String,
///     x_request_id: Option<u64>,
/// }
///
/// let handler = Provider::builder("client")
///     .field::<Client>("client", HeaderModel::<Client>::new())
///     .sync(|args| Ok(args.get::<Client>("client")?.user_agent.clone()));
///
/// assert_eq!(handler.signature().len(), 1);
/// ```
pub struct HeaderModel<T> {
    options: FieldOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HeaderModel<T>
where
    T: DeserializeOwned + Injectable,
{
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(None),
            _marker: PhantomData,
        }
    }

    pub fn optional(mut self) -> Self {
        self.options.required = false;
        self
    }

    pub fn with_default(mut self, default: T) -> Self {
        self.options.default = Some(Arc::new(default));
        self
    }
}

impl<T> Default for HeaderModel<T>
where
    T: DeserializeOwned + Injectable,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CustomField for HeaderModel<T>
where
    T: DeserializeOwned + Injectable,
{
    fn source(&self) -> FieldSource {
        FieldSource::Header
    }

    fn explicit_name(&self) -> Option<&str> {
        None
    }

    fn target(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn required(&self) -> bool {
        self.options.required
    }

    fn default_value(&self) -> Option<Value> {
        self.options.default.clone()
    }

    fn extract(
        &self,
        binding: &FieldBinding,
        request: &Request,
    ) -> std::result::Result<Option<Value>, ValidationError> {
        let pairs: Vec<(String, &str)> = request
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().replace('-', "_"), value))
            })
            .collect();
        deserialize_pairs::<T>(binding, pairs.as_slice())
    }

    fn missing(&self, binding: &FieldBinding, _request: &Request) -> ValidationError {
        ValidationError::new(
            ["header", binding.source_name()],
            format!("Missing headers: {}", binding.source_name()),
        )
    }
}

/// Build `T` from name/value pairs.
///
/// An empty source that `T` cannot be built from counts as absent, so
/// defaults and optional markers still apply.
fn deserialize_pairs<T>(
    binding: &FieldBinding,
    pairs: &[(impl AsRef<str>, impl AsRef<str>)],
) -> std::result::Result<Option<Value>, ValidationError>
where
    T: DeserializeOwned + Injectable,
{
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
        .finish();
    match serde_html_form::from_str::<T>(&encoded) {
        Ok(value) => Ok(Some(Arc::new(value))),
        Err(_) if pairs.is_empty() => Ok(None),
        Err(e) => Err(binding.invalid(e)),
    }
}

/// A single query parameter.
pub struct QueryParams<T> {
    options: FieldOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueryParams<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(None),
            _marker: PhantomData,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(Some(name.into())),
            _marker: PhantomData,
        }
    }

    pub fn optional(mut self) -> Self {
        self.options.required = false;
        self
    }

    pub fn with_default(mut self, default: T) -> Self {
        self.options.default = Some(Arc::new(default));
        self
    }
}

impl<T> Default for QueryParams<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CustomField for QueryParams<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    fn source(&self) -> FieldSource {
        FieldSource::Query
    }

    fn explicit_name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    fn target(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn required(&self) -> bool {
        self.options.required
    }

    fn default_value(&self) -> Option<Value> {
        self.options.default.clone()
    }

    fn extract(
        &self,
        binding: &FieldBinding,
        request: &Request,
    ) -> std::result::Result<Option<Value>, ValidationError> {
        match request.query_value(binding.source_name()) {
            Some(raw) => parse::<T>(binding, raw).map(Some),
            None => Ok(None),
        }
    }

    fn missing(&self, binding: &FieldBinding, _request: &Request) -> ValidationError {
        query_missing(binding)
    }
}

/// A repeated query parameter collected into `Vec<T>`.
pub struct QueryList<T> {
    options: FieldOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueryList<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(None),
            _marker: PhantomData,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(Some(name.into())),
            _marker: PhantomData,
        }
    }

    pub fn optional(mut self) -> Self {
        self.options.required = false;
        self
    }

    pub fn with_default(mut self, default: Vec<T>) -> Self {
        self.options.default = Some(Arc::new(default));
        self
    }
}

impl<T> Default for QueryList<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CustomField for QueryList<T>
where
    T: FromStr + Injectable,
    T::Err: Display,
{
    fn source(&self) -> FieldSource {
        FieldSource::Query
    }

    fn explicit_name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    fn target(&self) -> TypeInfo {
        TypeInfo::of::<Vec<T>>()
    }

    fn required(&self) -> bool {
        self.options.required
    }

    fn default_value(&self) -> Option<Value> {
        self.options.default.clone()
    }

    fn extract(
        &self,
        binding: &FieldBinding,
        request: &Request,
    ) -> std::result::Result<Option<Value>, ValidationError> {
        let mut values = Vec::new();
        for raw in request.query_values(binding.source_name()) {
            let value = raw.parse::<T>().map_err(|e| binding.invalid(e))?;
            values.push(value);
        }
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(Arc::new(values)))
    }

    fn missing(&self, binding: &FieldBinding, _request: &Request) -> ValidationError {
        query_missing(binding)
    }
}

/// The whole query string deserialized into `T`.
///
/// Repeated keys fill sequence fields, so `?tag=a&tag=b` gives
/// `tag: vec!["a", "b"]`.
///
/// # Examples
///
/// ```rust
/// use route_injector::{Provider, QueryModel};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Search {
///     q: String,
///     #[serde(default)]
///     tag: Vec<String>,
/// }
///
/// let search = Provider::builder("search")
///     .field::<Search>("search", QueryModel::<Search>::new())
///     .sync(|args| Ok(args.get::<Search>("search")?.q.clone()));
///
/// assert_eq!(search.signature().len(), 1);
/// ```
pub struct QueryModel<T> {
    options: FieldOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueryModel<T>
where
    T: DeserializeOwned + Injectable,
{
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(None),
            _marker: PhantomData,
        }
    }

    pub fn optional(mut self) -> Self {
        self.options.required = false;
        self
    }

    pub fn with_default(mut self, default: T) -> Self {
        self.options.default = Some(Arc::new(default));
        self
    }
}

impl<T> Default for QueryModel<T>
where
    T: DeserializeOwned + Injectable,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CustomField for QueryModel<T>
where
    T: DeserializeOwned + Injectable,
{
    fn source(&self) -> FieldSource {
        FieldSource::Query
    }

    fn explicit_name(&self) -> Option<&str> {
        None
    }

    fn target(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn required(&self) -> bool {
        self.options.required
    }

    fn default_value(&self) -> Option<Value> {
        self.options.default.clone()
    }

    fn extract(
        &self,
        binding: &FieldBinding,
        request: &Request,
    ) -> std::result::Result<Option<Value>, ValidationError> {
        deserialize_pairs::<T>(binding, request.query())
    }

    fn missing(&self, binding: &FieldBinding, _request: &Request) -> ValidationError {
        ValidationError::new(
            ["query", binding.source_name()],
            format!("Missing query parameters: {}", binding.source_name()),
        )
    }
}

fn query_missing(binding: &FieldBinding) -> ValidationError {
    ValidationError::new(
        ["query", binding.source_name()],
        format!("Missing query parameter: {}", binding.source_name()),
    )
}

/// The JSON request body, or one key of it when embedded.
///
/// # Examples
///
/// ```rust
/// use route_injector::{JsonBody, Provider};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct NewItem {
///     name: String,
/// }
///
/// let create = Provider::builder("create")
///     .field::<NewItem>("item", JsonBody::<NewItem>::new())
///     .sync(|args| Ok(args.get::<NewItem>("item")?.name.clone()));
///
/// assert_eq!(create.signature().len(), 1);
/// ```
pub struct JsonBody<T> {
    options: FieldOptions,
    embed: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonBody<T>
where
    T: DeserializeOwned + Injectable,
{
    /// Deserialize the whole body.
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(None),
            embed: false,
            _marker: PhantomData,
        }
    }

    /// Deserialize the body key named after the parameter.
    pub fn embed() -> Self {
        Self {
            embed: true,
            ..Self::new()
        }
    }

    /// Deserialize the body key `name`.
    pub fn embedded(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(Some(name.into())),
            embed: true,
            _marker: PhantomData,
        }
    }

    pub fn optional(mut self) -> Self {
        self.options.required = false;
        self
    }

    pub fn with_default(mut self, default: T) -> Self {
        self.options.default = Some(Arc::new(default));
        self
    }

    #[inline]
    pub fn is_embedded(&self) -> bool {
        self.embed
    }
}

impl<T> Default for JsonBody<T>
where
    T: DeserializeOwned + Injectable,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CustomField for JsonBody<T>
where
    T: DeserializeOwned + Injectable,
{
    fn source(&self) -> FieldSource {
        FieldSource::Body
    }

    fn explicit_name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    fn target(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn required(&self) -> bool {
        self.options.required
    }

    fn default_value(&self) -> Option<Value> {
        self.options.default.clone()
    }

    fn extract(
        &self,
        binding: &FieldBinding,
        request: &Request,
    ) -> std::result::Result<Option<Value>, ValidationError> {
        if !request.has_body() {
            return Ok(None);
        }
        let mut body = request.json().map_err(|e| binding.invalid(e))?;

        let data = if self.embed {
            match body.get_mut(binding.source_name()).map(serde_json::Value::take) {
                Some(serde_json::Value::Null) | None => return Ok(None),
                Some(data) => data,
            }
        } else {
            body
        };

        serde_json::from_value::<T>(data)
            .map(|value| Some(Arc::new(value) as Value))
            .map_err(|e| binding.invalid(e))
    }

    fn missing(&self, binding: &FieldBinding, request: &Request) -> ValidationError {
        if self.embed && request.has_body() {
            ValidationError::new(
                ["body", binding.source_name()],
                format!("Missing request body: {}", binding.source_name()),
            )
        } else {
            ValidationError::new(["body"], "Missing request body")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Marker;
    use serde::Deserialize;
    use serde_json::json;

    fn bind<T: Injectable>(name: &str, field: impl CustomField) -> FieldBinding {
        let marker = Marker::field(field);
        let param = Parameter::annotated(name, TypeInfo::of::<T>(), marker.clone());
        FieldBinding::classify(&param, marker.as_field().unwrap()).unwrap()
    }

    fn request_with_header(name: &str, value: &str) -> Request {
        Request::builder().header(name, value).build().unwrap()
    }

    #[test]
    fn test_header_present_any_case() {
        let binding = bind::<String>("token", Header::<String>::named("X-Token"));
        for name in ["X-Token", "x-token", "X-TOKEN"] {
            let value = binding
                .resolve(&request_with_header(name, "abc"))
                .unwrap()
                .unwrap();
            assert_eq!(value.downcast_ref::<String>().unwrap(), "abc");
        }
    }

    #[test]
    fn test_header_missing_names_the_header() {
        let binding = bind::<String>("token", Header::<String>::named("X-Token"));
        let err = binding.resolve(&Request::builder().build().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "Missing header: X-Token");
        assert_eq!(err.errors()[0].loc, vec!["header", "X-Token"]);
    }

    #[test]
    fn test_header_name_inferred_with_dashes() {
        let binding = bind::<String>("x_infer_dash_me", Header::<String>::new());
        assert_eq!(binding.source_name(), "x-infer-dash-me");

        let value = binding
            .resolve(&request_with_header("X-Infer-Dash-Me", "ok"))
            .unwrap()
            .unwrap();
        assert_eq!(value.downcast_ref::<String>().unwrap(), "ok");

        let binding = bind::<String>("x_raw", Header::<String>::new().convert_underscores(false));
        assert_eq!(binding.source_name(), "x_raw");
    }

    const SPELLINGS: [&str; 5] = [
        "x_custom_header",
        "x-custom-header",
        "X-CUSTOM-HEADER",
        "X-Custom-Header",
        "x-CuStOm-HeAdEr",
    ];

    #[test]
    fn test_header_spellings_all_match() {
        for declared in SPELLINGS {
            let binding = bind::<String>("value", Header::<String>::named(declared));
            for sent in SPELLINGS {
                let value = binding
                    .resolve(&request_with_header(sent, "v"))
                    .unwrap_or_else(|e| panic!("declared {declared}, sent {sent}: {e}"))
                    .unwrap();
                assert_eq!(value.downcast_ref::<String>().unwrap(), "v");
            }
        }
    }

    #[test]
    fn test_inferred_header_accepts_underscored_name() {
        let binding = bind::<String>("x_custom_header", Header::<String>::new());
        let value = binding
            .resolve(&request_with_header("x_custom_header", "v"))
            .unwrap()
            .unwrap();
        assert_eq!(value.downcast_ref::<String>().unwrap(), "v");
    }

    #[test]
    fn test_header_missing_keeps_declared_spelling() {
        let binding = bind::<String>("value", Header::<String>::named("x_custom_header"));
        let err = binding
            .resolve(&request_with_header("x-other", "v"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing header: x_custom_header");
    }

    #[test]
    fn test_header_literal_match_without_conversion() {
        let binding = bind::<String>("x_raw", Header::<String>::new().convert_underscores(false));
        let value = binding.resolve(&request_with_header("x_raw", "v")).unwrap();
        assert!(value.is_some());
        assert!(binding.resolve(&request_with_header("x-raw", "v")).is_err());
    }

    #[test]
    fn test_header_coercion() {
        let binding = bind::<u32>("limit", Header::<u32>::named("X-Limit"));
        let value = binding
            .resolve(&request_with_header("x-limit", "25"))
            .unwrap()
            .unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&25));

        let err = binding
            .resolve(&request_with_header("x-limit", "lots"))
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid header X-Limit"));
    }

    #[test]
    fn test_header_defaults_and_optional() {
        let empty = Request::builder().build().unwrap();

        let binding = bind::<u32>("limit", Header::<u32>::new().with_default(10));
        let value = binding.resolve(&empty).unwrap().unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&10));

        let binding = bind::<u32>("limit", Header::<u32>::new().optional());
        assert!(binding.resolve(&empty).unwrap().is_none());
    }

    #[test]
    fn test_parameter_default_used_when_marker_has_none() {
        let marker = Marker::field(QueryParams::<u32>::new());
        let param = Parameter::annotated("page", TypeInfo::of::<u32>(), marker.clone())
            .with_default(Arc::new(1_u32));
        let binding = FieldBinding::classify(&param, marker.as_field().unwrap()).unwrap();

        let value = binding
            .resolve(&Request::builder().build().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&1));
    }

    #[test]
    fn test_declared_type_must_match_target() {
        let marker = Marker::field(Header::<u32>::new());
        let param = Parameter::annotated("limit", TypeInfo::of::<String>(), marker.clone());
        let err = FieldBinding::classify(&param, marker.as_field().unwrap()).unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch { .. }));
    }

    #[test]
    fn test_query_params() {
        let binding = bind::<u32>("page", QueryParams::<u32>::new());
        let request = Request::builder().uri("/?page=3").build().unwrap();
        let value = binding.resolve(&request).unwrap().unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&3));

        let err = binding
            .resolve(&Request::builder().build().unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing query parameter: page");
    }

    #[test]
    fn test_query_list() {
        let binding = bind::<Vec<String>>("tag", QueryList::<String>::new());
        let request = Request::builder().uri("/?tag=a&tag=b").build().unwrap();
        let value = binding.resolve(&request).unwrap().unwrap();
        assert_eq!(
            value.downcast_ref::<Vec<String>>().unwrap(),
            &vec!["a".to_string(), "b".to_string()]
        );
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Search {
        q: String,
        #[serde(default)]
        tag: Vec<String>,
        page: Option<u32>,
    }

    #[test]
    fn test_query_model() {
        let binding = bind::<Search>("search", QueryModel::<Search>::new());

        let request = Request::builder()
            .uri("/?q=rust&tag=a&tag=b&page=2")
            .build()
            .unwrap();
        let value = binding.resolve(&request).unwrap().unwrap();
        assert_eq!(
            value.downcast_ref::<Search>(),
            Some(&Search {
                q: "rust".to_string(),
                tag: vec!["a".to_string(), "b".to_string()],
                page: Some(2),
            })
        );

        let request = Request::builder().uri("/?q=rust&tag=a").build().unwrap();
        let value = binding.resolve(&request).unwrap().unwrap();
        assert_eq!(value.downcast_ref::<Search>().unwrap().tag, vec!["a"]);
    }

    #[test]
    fn test_query_model_missing_fields() {
        let binding = bind::<Search>("search", QueryModel::<Search>::new());

        let request = Request::builder().uri("/?page=2").build().unwrap();
        let err = binding.resolve(&request).unwrap_err();
        assert!(err.to_string().contains("missing field `q`"), "{err}");
        assert_eq!(err.errors()[0].loc, vec!["query", "search"]);

        let err = binding
            .resolve(&Request::builder().build().unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing query parameters: search");

        let optional = bind::<Search>("search", QueryModel::<Search>::new().optional());
        let value = optional.resolve(&Request::builder().build().unwrap()).unwrap();
        assert!(value.is_none());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Client {
        user_agent: String,
        x_request_id: Option<u64>,
    }

    #[test]
    fn test_header_model() {
        let binding = bind::<Client>("client", HeaderModel::<Client>::new());
        let request = Request::builder()
            .header("User-Agent", "curl")
            .header("X-Request-Id", "7")
            .build()
            .unwrap();
        let value = binding.resolve(&request).unwrap().unwrap();
        assert_eq!(
            value.downcast_ref::<Client>(),
            Some(&Client {
                user_agent: "curl".to_string(),
                x_request_id: Some(7),
            })
        );
    }

    #[test]
    fn test_header_model_missing_fields() {
        let binding = bind::<Client>("client", HeaderModel::<Client>::new());
        let err = binding
            .resolve(&request_with_header("X-Request-Id", "7"))
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid header client"), "{err}");
        assert!(err.to_string().contains("user_agent"), "{err}");

        let err = binding
            .resolve(&Request::builder().build().unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing headers: client");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
    }

    #[test]
    fn test_json_body_whole() {
        let binding = bind::<Item>("item", JsonBody::<Item>::new());
        let request = Request::builder().json(&json!({"name": "x"})).build().unwrap();
        let value = binding.resolve(&request).unwrap().unwrap();
        assert_eq!(
            value.downcast_ref::<Item>(),
            Some(&Item {
                name: "x".to_string()
            })
        );

        let err = binding
            .resolve(&Request::builder().build().unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing request body");
    }

    #[test]
    fn test_json_body_embedded() {
        let binding = bind::<Item>("item", JsonBody::<Item>::embed());
        let request = Request::builder()
            .json(&json!({"item": {"name": "y"}}))
            .build()
            .unwrap();
        let value = binding.resolve(&request).unwrap().unwrap();
        assert_eq!(value.downcast_ref::<Item>().unwrap().name, "y");

        let request = Request::builder().json(&json!({"other": 1})).build().unwrap();
        let err = binding.resolve(&request).unwrap_err();
        assert_eq!(err.to_string(), "Missing request body: item");
    }

    #[test]
    fn test_json_body_invalid() {
        let binding = bind::<Item>("item", JsonBody::<Item>::new());
        let request = Request::builder().json(&json!({"title": 1})).build().unwrap();
        let err = binding.resolve(&request).unwrap_err();
        assert!(err.to_string().starts_with("Invalid request body:"));
    }
}
