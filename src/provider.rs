//! Providers: the callables that produce dependency values
//!
//! A [`Provider`] pairs an explicitly declared [`Signature`] with the closure
//! that computes the value. Route handlers are providers too.

use crate::fields::CustomField;
use crate::marker::Depends;
use crate::scope::{AsyncTeardown, AsyncYielded, SyncTeardown, Yielded};
use crate::signature::{Parameter, Signature};
use crate::{DiError, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Marker trait for types that can flow through the resolver.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the TypeId of this type (for internal use)
    #[inline]
    fn type_id_of() -> TypeId
    where
        Self: Sized,
    {
        TypeId::of::<Self>()
    }

    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// A type-erased, shareable value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// Describe `T`.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether `value` holds this type.
    #[inline]
    pub fn matches(&self, value: &Value) -> bool {
        (**value).type_id() == self.id
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

/// Unique provider identifier, used for per-request caching and overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}

/// Named arguments handed to a provider.
pub struct Arguments {
    owner: String,
    values: IndexMap<String, Argument>,
}

/// An erased argument and the name of the type it was inserted as.
struct Argument {
    value: Value,
    type_name: &'static str,
}

/// Reported for values inserted without a static type.
const ERASED: &str = "an erased value";

impl Arguments {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::for_provider("<anonymous>")
    }

    pub(crate) fn for_provider(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            values: IndexMap::new(),
        }
    }

    /// Add a typed value.
    pub fn insert<T: Injectable>(&mut self, name: impl Into<String>, value: T) {
        self.insert_typed(name, Arc::new(value), std::any::type_name::<T>());
    }

    /// Add an already erased value.
    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.insert_typed(name, value, ERASED);
    }

    pub(crate) fn insert_typed(
        &mut self,
        name: impl Into<String>,
        value: Value,
        type_name: &'static str,
    ) {
        self.values.insert(name.into(), Argument { value, type_name });
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<T: Injectable>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a required argument.
    pub fn get<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        match self.optional::<T>(name)? {
            Some(value) => Ok(value),
            None => Err(DiError::MissingArgument {
                provider: self.owner.clone(),
                name: name.to_string(),
            }),
        }
    }

    /// Get an argument that may have been omitted.
    pub fn optional<T: Injectable>(&self, name: &str) -> Result<Option<Arc<T>>> {
        let Some(argument) = self.values.get(name) else {
            return Ok(None);
        };
        Arc::clone(&argument.value)
            .downcast::<T>()
            .map(Some)
            .map_err(|_| DiError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
                found: argument.type_name,
            })
    }

    /// Raw access to an erased value.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name).map(|argument| &argument.value)
    }

    /// Remove a value along with the name of the type it was inserted as.
    pub(crate) fn take(&mut self, name: &str) -> Option<(Value, &'static str)> {
        self.values
            .shift_remove(name)
            .map(|argument| (argument.value, argument.type_name))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl Default for Arguments {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments")
            .field("owner", &self.owner)
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// How a provider produces its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Plain function
    Sync,
    /// Returns a future
    Async,
    /// Produces a value plus a teardown that runs after the response
    Yield,
    /// Async setup with async teardown
    AsyncYield,
}

type SyncFn = Box<dyn Fn(Arguments) -> Result<Value> + Send + Sync>;
type AsyncFn = Box<dyn Fn(Arguments) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
type YieldFn = Box<dyn Fn(Arguments) -> Result<(Value, SyncTeardown)> + Send + Sync>;
type AsyncYieldFn =
    Box<dyn Fn(Arguments) -> BoxFuture<'static, Result<(Value, AsyncTeardown)>> + Send + Sync>;

pub(crate) enum ProviderFn {
    Sync(SyncFn),
    Async(AsyncFn),
    Yield(YieldFn),
    AsyncYield(AsyncYieldFn),
}

/// A callable with an introspectable signature.
///
/// # Examples
///
/// ```rust
/// use route_injector::{Depends, Provider};
///
/// let base = Provider::builder("base").sync(|_| Ok(String::from("base")));
///
/// let wrapped = Provider::builder("wrapped")
///     .depends::<String>("inner", Depends::on(&base))
///     .sync(|args| Ok(format!("{}+wrapped", args.get::<String>("inner")?)));
///
/// assert_eq!(wrapped.signature().len(), 1);
/// assert!(!wrapped.is_async());
/// ```
pub struct Provider {
    id: ProviderId,
    name: String,
    signature: Signature,
    func: ProviderFn,
}

impl Provider {
    /// Start declaring a provider.
    pub fn builder(name: impl Into<String>) -> ProviderBuilder {
        ProviderBuilder {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ProviderId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn kind(&self) -> ProviderKind {
        match self.func {
            ProviderFn::Sync(_) => ProviderKind::Sync,
            ProviderFn::Async(_) => ProviderKind::Async,
            ProviderFn::Yield(_) => ProviderKind::Yield,
            ProviderFn::AsyncYield(_) => ProviderKind::AsyncYield,
        }
    }

    /// True when the provider must be awaited.
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(self.kind(), ProviderKind::Async | ProviderKind::AsyncYield)
    }

    /// True when the provider registers a teardown.
    #[inline]
    pub fn is_generator(&self) -> bool {
        matches!(self.kind(), ProviderKind::Yield | ProviderKind::AsyncYield)
    }

    pub(crate) fn func(&self) -> &ProviderFn {
        &self.func
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("signature", &self.signature)
            .finish()
    }
}

/// Declares a provider's parameters, then its body.
pub struct ProviderBuilder {
    name: String,
    parameters: Vec<Parameter>,
}

impl ProviderBuilder {
    /// Add a parameter classified from its name and type.
    ///
    /// `Request`, `Settings`, `App` and `State` (or the names `request`,
    /// `settings`, `app`, `state`) become auto-injected parameters.
    pub fn param<T: Injectable>(self, name: impl Into<String>) -> Self {
        self.parameter(Parameter::new(name, TypeInfo::of::<T>()))
    }

    /// Add a plain parameter with a default value.
    pub fn param_with_default<T: Injectable>(self, name: impl Into<String>, default: T) -> Self {
        self.parameter(Parameter::new(name, TypeInfo::of::<T>()).with_default(Arc::new(default)))
    }

    /// Add a parameter resolved by calling another provider.
    pub fn depends<T: Injectable>(self, name: impl Into<String>, depends: Depends) -> Self {
        self.parameter(Parameter::annotated(
            name,
            TypeInfo::of::<T>(),
            depends.into(),
        ))
    }

    /// Add a parameter extracted from the request by a custom field.
    pub fn field<T: Injectable>(self, name: impl Into<String>, field: impl CustomField) -> Self {
        self.parameter(Parameter::annotated(
            name,
            TypeInfo::of::<T>(),
            crate::Marker::field(field),
        ))
    }

    /// Custom field with a parameter-level default used when the value is absent.
    pub fn field_with_default<T: Injectable>(
        self,
        name: impl Into<String>,
        field: impl CustomField,
        default: T,
    ) -> Self {
        self.parameter(
            Parameter::annotated(name, TypeInfo::of::<T>(), crate::Marker::field(field))
                .with_default(Arc::new(default)),
        )
    }

    /// Add a pre-built parameter.
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Finish with a synchronous body.
    pub fn sync<T, F>(self, f: F) -> Arc<Provider>
    where
        T: Injectable,
        F: Fn(Arguments) -> Result<T> + Send + Sync + 'static,
    {
        self.finish::<T>(ProviderFn::Sync(Box::new(move |args: Arguments| {
            f(args).map(|value| Arc::new(value) as Value)
        })))
    }

    /// Finish with an async body.
    pub fn asynchronous<T, F, Fut>(self, f: F) -> Arc<Provider>
    where
        T: Injectable,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.finish::<T>(ProviderFn::Async(Box::new(move |args: Arguments| {
            let fut = f(args);
            async move { fut.await.map(|value| Arc::new(value) as Value) }.boxed()
        })))
    }

    /// Finish with a body that yields a value and a teardown.
    pub fn yielding<T, F>(self, f: F) -> Arc<Provider>
    where
        T: Injectable,
        F: Fn(Arguments) -> Result<Yielded<T>> + Send + Sync + 'static,
    {
        self.finish::<T>(ProviderFn::Yield(Box::new(move |args: Arguments| {
            f(args).map(|yielded| {
                let (value, teardown) = yielded.into_parts();
                (Arc::new(value) as Value, teardown)
            })
        })))
    }

    /// Finish with an async body that yields a value and an async teardown.
    pub fn async_yielding<T, F, Fut>(self, f: F) -> Arc<Provider>
    where
        T: Injectable,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AsyncYielded<T>>> + Send + 'static,
    {
        self.finish::<T>(ProviderFn::AsyncYield(Box::new(move |args: Arguments| {
            let fut = f(args);
            async move {
                fut.await.map(|yielded| {
                    let (value, teardown) = yielded.into_parts();
                    (Arc::new(value) as Value, teardown)
                })
            }
            .boxed()
        })))
    }

    fn finish<T: Injectable>(self, func: ProviderFn) -> Arc<Provider> {
        Arc::new(Provider {
            id: ProviderId::next(),
            signature: Signature::new(self.parameters, Some(TypeInfo::of::<T>())),
            name: self.name,
            func,
        })
    }
}
