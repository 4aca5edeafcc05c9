//! Deferred request binding
//!
//! The request, settings, app and state are unknown when a route is
//! decorated. Providers that declare them get a [`DeferredBinding`] at
//! decoration time; at call time the binding seeds a fresh [`Arguments`]
//! from the [`RequestContext`] of that one request. Nothing shared is
//! written per request, so concurrent requests never observe each other.

use crate::provider::{Arguments, Provider, Value};
use crate::signature::{AutoInject, Signature};
use crate::{App, DiError, Request, Result, Settings, State};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Context values available to one request.
#[derive(Clone)]
pub struct RequestContext {
    request: Arc<Request>,
    app: Option<App>,
    settings: Option<Arc<Settings>>,
    state: Option<State>,
}

impl RequestContext {
    pub fn new(request: Request) -> Self {
        Self::from_shared(Arc::new(request))
    }

    pub fn from_shared(request: Arc<Request>) -> Self {
        Self {
            request,
            app: None,
            settings: None,
            state: None,
        }
    }

    /// Attach an app together with its settings and state.
    pub fn with_app(mut self, app: &App) -> Self {
        self.settings = Some(app.settings_arc());
        self.state = Some(app.state().clone());
        self.app = Some(app.clone());
        self
    }

    pub fn with_settings(mut self, settings: Arc<Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The erased value for `kind`, or `MissingContext` naming the parameter.
    pub fn value(&self, kind: AutoInject, param: &str) -> Result<Value> {
        let value: Option<Value> = match kind {
            AutoInject::Request => Some(Arc::clone(&self.request) as Value),
            AutoInject::Settings => self.settings.clone().map(|s| s as Value),
            AutoInject::App => self.app.clone().map(|a| Arc::new(a) as Value),
            AutoInject::State => self.state.clone().map(|s| Arc::new(s) as Value),
        };
        value.ok_or_else(|| DiError::MissingContext {
            kind: kind.reserved_name(),
            name: param.to_string(),
        })
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("has_app", &self.app.is_some())
            .field("has_settings", &self.settings.is_some())
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

/// A provider that needs context values filled in at call time.
#[derive(Clone)]
pub struct DeferredBinding {
    provider: Arc<Provider>,
    signature: Signature,
    needs: Vec<(String, AutoInject)>,
}

impl DeferredBinding {
    /// `None` when the provider declares no request/settings/app/state parameter.
    pub fn bind(provider: &Arc<Provider>) -> Option<Self> {
        let needs = provider.signature().auto_injected();
        if needs.is_empty() {
            return None;
        }

        #[cfg(feature = "logging")]
        {
            let kinds: Vec<&str> = needs.iter().map(|(_, kind)| kind.reserved_name()).collect();
            trace!(
                target: "route_injector",
                provider = provider.name(),
                needs = ?kinds,
                "Creating deferred binding"
            );
        }

        Some(Self {
            provider: Arc::clone(provider),
            signature: provider.signature().without_auto_injected(),
            needs,
        })
    }

    #[inline]
    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    /// The provider's signature with the context parameters removed.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// `(parameter name, kind)` still to be filled at call time.
    #[inline]
    pub fn needs(&self) -> &[(String, AutoInject)] {
        &self.needs
    }

    /// Fresh arguments pre-seeded with this request's context values.
    pub fn apply(&self, ctx: &RequestContext) -> Result<Arguments> {
        let mut args = Arguments::for_provider(self.provider.name());
        for (name, kind) in &self.needs {
            args.insert_typed(name.clone(), ctx.value(*kind, name)?, kind.type_info().name());
        }
        Ok(args)
    }
}

impl std::fmt::Debug for DeferredBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredBinding")
            .field("provider", &self.provider.name())
            .field("needs", &self.needs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_bind_skips_providers_without_context() {
        let plain = Provider::builder("plain")
            .param::<u32>("n")
            .sync(|_| Ok(1_u8));
        assert!(DeferredBinding::bind(&plain).is_none());
    }

    #[test]
    fn test_bind_records_needs_and_strips_signature() {
        let provider = Provider::builder("method")
            .param::<Request>("request")
            .param::<u32>("n")
            .param::<Settings>("cfg")
            .sync(|_| Ok(1_u8));

        let binding = DeferredBinding::bind(&provider).unwrap();
        assert_eq!(
            binding.needs(),
            &[
                ("request".to_string(), AutoInject::Request),
                ("cfg".to_string(), AutoInject::Settings),
            ]
        );
        assert_eq!(binding.signature().names().collect::<Vec<_>>(), vec!["n"]);
        assert_eq!(provider.signature().len(), 3);
    }

    #[test]
    fn test_apply_builds_fresh_arguments_per_request() {
        let provider = Provider::builder("method")
            .param::<Request>("request")
            .sync(|_| Ok(1_u8));
        let binding = DeferredBinding::bind(&provider).unwrap();

        let get = RequestContext::new(Request::new(Method::GET, "/").unwrap());
        let post = RequestContext::new(Request::new(Method::POST, "/").unwrap());

        let a = binding.apply(&get).unwrap();
        let b = binding.apply(&post).unwrap();
        assert_eq!(*a.get::<Request>("request").unwrap().method(), Method::GET);
        assert_eq!(*b.get::<Request>("request").unwrap().method(), Method::POST);
    }

    #[test]
    fn test_apply_missing_context() {
        let provider = Provider::builder("cfg")
            .param::<Settings>("settings")
            .sync(|_| Ok(1_u8));
        let binding = DeferredBinding::bind(&provider).unwrap();

        let ctx = RequestContext::new(Request::new(Method::GET, "/").unwrap());
        assert!(matches!(
            binding.apply(&ctx),
            Err(DiError::MissingContext { kind: "settings", .. })
        ));

        let ctx = ctx.with_settings(Arc::new(Settings::default()));
        let args = binding.apply(&ctx).unwrap();
        assert_eq!(
            args.get::<Settings>("settings").unwrap().max_dependency_depth,
            crate::settings::DEFAULT_MAX_DEPTH
        );
    }
}
