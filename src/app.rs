//! The application: settings, state, routes and dependency overrides

use crate::graph::Overrides;
use crate::provider::{Arguments, Provider, ProviderId};
use crate::request::{Request, Response};
use crate::route::{Route, RouteDecorator};
use crate::routing::{RouteRegistry, RouteTable};
use crate::settings::Settings;
use crate::state::State;
use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use http::Method;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, error, info};

pub(crate) struct AppInner {
    settings: Arc<Settings>,
    state: State,
    registry: Box<dyn RouteRegistry>,
    overrides: DashMap<ProviderId, Arc<Provider>, RandomState>,
}

/// An application: the owner of routes and of the values injected into them.
///
/// Cloning is cheap; clones share everything.
///
/// # Examples
///
/// ```rust
/// use route_injector::{App, Arguments, Depends, Provider, Request, Settings};
/// use http::{Method, StatusCode};
///
/// let app = App::new(Settings::default());
///
/// let method = Provider::builder("method")
///     .param::<Request>("request")
///     .sync(|args| Ok(args.get::<Request>("request")?.method().to_string()));
/// let handler = Provider::builder("echo_method")
///     .depends::<String>("method", Depends::on(&method))
///     .sync(|args| Ok(args.get::<String>("method")?.to_string()));
///
/// app.put("/echo").handler(&handler).unwrap();
///
/// let request = Request::new(Method::PUT, "/echo").unwrap();
/// let response = app.dispatch_blocking(request, Arguments::new());
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.body(), "PUT");
/// ```
#[derive(Clone)]
pub struct App {
    pub(crate) inner: Arc<AppInner>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self::with_state(settings, State::new())
    }

    pub fn with_state(settings: Settings, state: State) -> Self {
        Self::with_registry(settings, state, RouteTable::new())
    }

    /// Install routes into a custom registry.
    pub fn with_registry(
        settings: Settings,
        state: State,
        registry: impl RouteRegistry + 'static,
    ) -> Self {
        #[cfg(feature = "logging")]
        info!(
            target: "route_injector",
            app = %settings.app_name,
            max_dependency_depth = settings.max_dependency_depth,
            "Creating application"
        );

        Self {
            inner: Arc::new(AppInner {
                settings: Arc::new(settings),
                state,
                registry: Box::new(registry),
                overrides: DashMap::with_capacity_and_hasher_and_shard_amount(
                    0,
                    RandomState::new(),
                    8,
                ),
            }),
        }
    }

    /// Load settings (file + environment) and create the app.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Settings::load()?))
    }

    pub(crate) fn from_inner(inner: Arc<AppInner>) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn settings_arc(&self) -> Arc<Settings> {
        Arc::clone(&self.inner.settings)
    }

    #[inline]
    pub fn state(&self) -> &State {
        &self.inner.state
    }

    #[inline]
    pub fn registry(&self) -> &dyn RouteRegistry {
        self.inner.registry.as_ref()
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.registry().routes()
    }

    pub fn route_for(&self, method: &Method, path: &str) -> Option<Arc<Route>> {
        self.registry().lookup(method, path)
    }

    pub fn route(&self, method: Method, path: impl Into<String>) -> RouteDecorator {
        RouteDecorator::new(self.clone(), method, path.into())
    }

    pub fn get(&self, path: impl Into<String>) -> RouteDecorator {
        self.route(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RouteDecorator {
        self.route(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RouteDecorator {
        self.route(Method::PUT, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RouteDecorator {
        self.route(Method::PATCH, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RouteDecorator {
        self.route(Method::DELETE, path)
    }

    /// Use `replacement` wherever `original` is depended on.
    ///
    /// Applies to routes decorated afterwards; re-decorate existing routes
    /// to pick it up.
    pub fn override_dependency(&self, original: &Arc<Provider>, replacement: &Arc<Provider>) {
        #[cfg(feature = "logging")]
        debug!(
            target: "route_injector",
            original = original.name(),
            replacement = replacement.name(),
            "Dependency override registered"
        );

        self.inner
            .overrides
            .insert(original.id(), Arc::clone(replacement));
    }

    pub fn clear_overrides(&self) {
        self.inner.overrides.clear();
    }

    pub(crate) fn overrides(&self) -> Overrides {
        self.inner
            .overrides
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Route `request` and render the outcome.
    ///
    /// `args` carries the plain parameters the host parsed for the route.
    pub async fn dispatch(&self, request: Request, args: Arguments) -> Response {
        let route = match self.find(&request) {
            Ok(route) => route,
            Err(e) => return self.render_error(e),
        };
        let result = route.call_async(request, args).await;
        self.render(result)
    }

    /// [`dispatch`](Self::dispatch) for synchronous routes.
    pub fn dispatch_blocking(&self, request: Request, args: Arguments) -> Response {
        let route = match self.find(&request) {
            Ok(route) => route,
            Err(e) => return self.render_error(e),
        };
        let result = route.call(request, args);
        self.render(result)
    }

    fn find(&self, request: &Request) -> Result<Arc<Route>> {
        self.route_for(request.method(), request.path())
            .ok_or_else(|| DiError::RouteNotFound {
                method: request.method().to_string(),
                path: request.path().to_string(),
            })
    }

    fn render(&self, result: Result<crate::Value>) -> Response {
        match result.and_then(|value| Response::from_value(&value)) {
            Ok(response) => response,
            Err(e) => self.render_error(e),
        }
    }

    fn render_error(&self, e: DiError) -> Response {
        #[cfg(feature = "logging")]
        if e.status_code().is_server_error() {
            error!(target: "route_injector", error = %e, "Request failed");
        } else {
            debug!(target: "route_injector", error = %e, "Request rejected");
        }

        Response::from_error(&e, self.settings().debug)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.settings().app_name)
            .field("state", &self.inner.state)
            .field("routes", &self.routes().len())
            .field("overrides", &self.inner.overrides.len())
            .finish()
    }
}
