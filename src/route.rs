//! Route decoration
//!
//! [`RouteDecorator::handler`] turns a handler provider into a registered
//! [`Route`]:
//!
//! 1. recover the original handler if it was decorated before
//! 2. reject handlers that cannot serve as routes
//! 3. keep a copy of the handler's full signature
//! 4. bind the handler's own request/settings/app/state parameters
//! 5. walk the dependency graph
//! 6. refuse sync handlers whose graph needs async providers
//! 7. build the injector
//! 8. compute the public signature (annotated parameters removed)
//! 9. install the route in the app's registry

use crate::app::{App, AppInner};
use crate::binder::{DeferredBinding, RequestContext};
use crate::graph::{GraphWalker, ResolutionPlan};
use crate::inject::Injected;
use crate::provider::{Arguments, Provider, Value};
use crate::signature::Signature;
use crate::{DiError, Request, Result};
use http::Method;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// Something a route can be built from.
#[derive(Clone)]
pub enum Endpoint {
    /// A handler that has not been decorated.
    Provider(Arc<Provider>),
    /// An existing route; its original handler is decorated again.
    Route(Arc<Route>),
}

impl Endpoint {
    /// The undecorated handler.
    pub fn original(&self) -> &Arc<Provider> {
        match self {
            Endpoint::Provider(provider) => provider,
            Endpoint::Route(route) => route.original(),
        }
    }
}

impl From<Arc<Provider>> for Endpoint {
    fn from(provider: Arc<Provider>) -> Self {
        Endpoint::Provider(provider)
    }
}

impl From<&Arc<Provider>> for Endpoint {
    fn from(provider: &Arc<Provider>) -> Self {
        Endpoint::Provider(Arc::clone(provider))
    }
}

impl From<Arc<Route>> for Endpoint {
    fn from(route: Arc<Route>) -> Self {
        Endpoint::Route(route)
    }
}

impl From<&Arc<Route>> for Endpoint {
    fn from(route: &Arc<Route>) -> Self {
        Endpoint::Route(Arc::clone(route))
    }
}

/// Registers a handler for one method and path.
///
/// Obtained from [`App::get`], [`App::post`] and friends.
///
/// # Examples
///
/// ```rust
/// use route_injector::{App, Depends, Provider, Settings};
///
/// let app = App::new(Settings::default());
///
/// let greeting = Provider::builder("greeting").sync(|_| Ok(String::from("hello")));
/// let handler = Provider::builder("index")
///     .param::<u32>("page")
///     .depends::<String>("greeting", Depends::on(&greeting))
///     .sync(|args| {
///         let greeting = args.get::<String>("greeting")?;
///         Ok(format!("{greeting} #{}", args.get::<u32>("page")?))
///     });
///
/// let route = app.get("/").handler(&handler).unwrap();
/// assert_eq!(route.signature().names().collect::<Vec<_>>(), vec!["page"]);
/// assert_eq!(route.original_signature().len(), 2);
/// ```
#[must_use = "a decorator does nothing until `handler` is called"]
pub struct RouteDecorator {
    app: App,
    method: Method,
    path: String,
}

impl RouteDecorator {
    pub(crate) fn new(app: App, method: Method, path: String) -> Self {
        Self { app, method, path }
    }

    /// Decorate `endpoint` and install it.
    pub fn handler(self, endpoint: impl Into<Endpoint>) -> Result<Arc<Route>> {
        let endpoint = endpoint.into();

        #[cfg(feature = "logging")]
        if let Endpoint::Route(previous) = &endpoint {
            debug!(
                target: "route_injector",
                handler = previous.original().name(),
                "Re-decorating route, recovering original handler"
            );
        }

        let handler = Arc::clone(endpoint.original());

        if handler.is_generator() {
            return Err(DiError::InvalidHandler {
                name: handler.name().to_string(),
                reason: "yield providers can only be used as dependencies".to_string(),
            });
        }

        let original_signature = handler.signature().clone();
        let root = DeferredBinding::bind(&handler);

        let plan = GraphWalker::new()
            .max_depth(self.app.settings().max_dependency_depth)
            .with_overrides(self.app.overrides())
            .walk(&handler)?;

        if !handler.is_async() {
            if let Some(provider) = plan.async_dependencies().next() {
                return Err(DiError::AsyncDependencyInSyncRoute {
                    route: handler.name().to_string(),
                    provider: provider.name().to_string(),
                });
            }
        }

        let injected = Injected::new(Arc::clone(&handler), Arc::new(plan), root);
        let public_signature = original_signature.without_annotated();

        let route = Arc::new(Route {
            method: self.method,
            path: self.path,
            is_async: handler.is_async(),
            original: handler,
            original_signature,
            public_signature,
            injected,
            app: Arc::downgrade(&self.app.inner),
        });

        #[cfg(feature = "logging")]
        info!(
            target: "route_injector",
            method = %route.method,
            path = %route.path,
            handler = route.original.name(),
            is_async = route.is_async,
            bindings = route.injected.plan().bindings().count(),
            "Route registered"
        );

        self.app.registry().register(Arc::clone(&route));
        Ok(route)
    }
}

/// A decorated handler, installed for one method and path.
pub struct Route {
    method: Method,
    path: String,
    original: Arc<Provider>,
    original_signature: Signature,
    public_signature: Signature,
    injected: Injected,
    is_async: bool,
    app: Weak<AppInner>,
}

impl Route {
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The handler as it was before decoration.
    #[inline]
    pub fn original(&self) -> &Arc<Provider> {
        &self.original
    }

    /// The handler's full signature, annotated parameters included.
    #[inline]
    pub fn original_signature(&self) -> &Signature {
        &self.original_signature
    }

    /// What the host router's own binder sees: plain and context parameters only.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.public_signature
    }

    #[inline]
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    #[inline]
    pub fn plan(&self) -> &ResolutionPlan {
        self.injected.plan()
    }

    #[inline]
    pub fn injected(&self) -> &Injected {
        &self.injected
    }

    /// Call a synchronous route.
    ///
    /// `args` carries the plain parameters of [`signature`](Self::signature).
    pub fn call(&self, request: Request, args: Arguments) -> Result<Value> {
        if self.is_async {
            return Err(DiError::AsyncHandler {
                route: self.to_string(),
            });
        }
        let ctx = self.context(request)?;
        self.injected.call(&ctx, args)
    }

    /// Call the route, awaiting any async providers.
    pub async fn call_async(&self, request: Request, args: Arguments) -> Result<Value> {
        let ctx = self.context(request)?;
        self.injected.call_async(&ctx, args).await
    }

    fn context(&self, request: Request) -> Result<RequestContext> {
        let inner = self.app.upgrade().ok_or(DiError::AppDropped)?;
        let app = App::from_inner(inner);
        Ok(RequestContext::new(request).with_app(&app))
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("handler", &self.original.name())
            .field("is_async", &self.is_async)
            .field("signature", &self.public_signature)
            .finish()
    }
}
