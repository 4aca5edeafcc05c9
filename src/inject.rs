//! Injection: resolving a handler's dependencies for one request
//!
//! [`Injected`] owns a [`ResolutionPlan`] and, per call, opens a
//! [`RequestScope`], fills every parameter of every provider in the graph
//! (plain values, context values through deferred bindings, custom fields,
//! nested `Depends`) and calls through. Dependencies run before the
//! providers that consume them; cached dependencies run once per request.

use crate::binder::{DeferredBinding, RequestContext};
use crate::error::ValidationError;
use crate::graph::ResolutionPlan;
use crate::marker::Marker;
use crate::provider::{Arguments, Provider, ProviderFn, Value};
use crate::scope::RequestScope;
use crate::signature::ParamKind;
use crate::{DiError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// A handler bound to its resolution plan.
pub struct Injected {
    endpoint: Arc<Provider>,
    plan: Arc<ResolutionPlan>,
    root: Option<DeferredBinding>,
}

impl Injected {
    pub fn new(
        endpoint: Arc<Provider>,
        plan: Arc<ResolutionPlan>,
        root: Option<DeferredBinding>,
    ) -> Self {
        Self {
            endpoint,
            plan,
            root,
        }
    }

    #[inline]
    pub fn endpoint(&self) -> &Arc<Provider> {
        &self.endpoint
    }

    #[inline]
    pub fn plan(&self) -> &ResolutionPlan {
        &self.plan
    }

    /// Deferred binding of the handler's own context parameters.
    #[inline]
    pub fn root_binding(&self) -> Option<&DeferredBinding> {
        self.root.as_ref()
    }

    /// Resolve and call without awaiting. Fails on the first async provider.
    ///
    /// Teardowns run before this returns, whatever the outcome.
    pub fn call(&self, ctx: &RequestContext, args: Arguments) -> Result<Value> {
        let mut scope = RequestScope::new();
        let result = self.resolve_sync(&self.endpoint, ctx, &mut scope, args);
        scope.close_blocking();
        result
    }

    /// Resolve and call, awaiting async providers.
    ///
    /// Teardowns run before this returns, whatever the outcome. If the
    /// returned future is dropped early, pending teardowns run on drop.
    pub async fn call_async(&self, ctx: &RequestContext, args: Arguments) -> Result<Value> {
        let mut scope = RequestScope::new();
        let result = self
            .resolve_async(&self.endpoint, ctx, &mut scope, args)
            .await;
        scope.close().await;
        result
    }

    fn binding_for(&self, provider: &Provider) -> Option<&DeferredBinding> {
        if provider.id() == self.endpoint.id() {
            self.root.as_ref()
        } else {
            self.plan.binding(provider.id())
        }
    }

    /// Everything except `Depends` parameters.
    fn prepare(
        &self,
        provider: &Provider,
        ctx: &RequestContext,
        mut supplied: Arguments,
    ) -> Result<Arguments> {
        let mut args = match self.binding_for(provider) {
            Some(binding) => binding.apply(ctx)?,
            None => Arguments::for_provider(provider.name()),
        };
        let mut invalid: Option<ValidationError> = None;

        for param in provider.signature() {
            match param.kind() {
                ParamKind::Plain => {
                    let (value, found) = match supplied.take(param.name()) {
                        Some(supplied) => supplied,
                        None => match param.default() {
                            Some(default) => (Arc::clone(default), "the parameter default"),
                            None => {
                                return Err(DiError::MissingArgument {
                                    provider: provider.name().to_string(),
                                    name: param.name().to_string(),
                                });
                            }
                        },
                    };
                    let declared = param.type_info();
                    if !declared.matches(&value) {
                        return Err(DiError::TypeMismatch {
                            name: param.name().to_string(),
                            expected: declared.name(),
                            found,
                        });
                    }
                    args.insert_typed(param.name(), value, declared.name());
                }
                // seeded by the deferred binding
                ParamKind::Auto(_) => {}
                ParamKind::Annotated(Marker::Field(_)) => {
                    let Some(binding) = self.plan.field(provider.id(), param.name()) else {
                        return Err(DiError::Internal(format!(
                            "custom field `{}` of {} was not classified",
                            param.name(),
                            provider.name()
                        )));
                    };
                    match binding.resolve(ctx.request()) {
                        Ok(Some(value)) => {
                            args.insert_typed(param.name(), value, binding.declared_type().name())
                        }
                        Ok(None) => {}
                        Err(e) => {
                            invalid = Some(match invalid {
                                Some(previous) => previous.merge(e),
                                None => e,
                            });
                        }
                    }
                }
                ParamKind::Annotated(Marker::Depends(_)) => {}
            }
        }

        match invalid {
            Some(e) => Err(e.into()),
            None => Ok(args),
        }
    }

    fn resolve_sync(
        &self,
        provider: &Arc<Provider>,
        ctx: &RequestContext,
        scope: &mut RequestScope,
        supplied: Arguments,
    ) -> Result<Value> {
        let mut args = self.prepare(provider, ctx, supplied)?;

        for (param, marker) in provider.signature().annotated() {
            let Marker::Depends(depends) = marker else {
                continue;
            };
            let target = self.plan.effective(depends.provider());

            let value = match self.cached(depends.uses_cache(), target, scope) {
                Some(value) => value,
                None => {
                    let value = self.resolve_sync(
                        target,
                        ctx,
                        scope,
                        Arguments::for_provider(target.name()),
                    )?;
                    self.remember(target, &value, scope);
                    value
                }
            };

            depends.check(param.name(), param.type_info(), &value)?;
            args.insert_typed(param.name(), value, depends.value_type_name());
        }

        self.invoke_sync(provider, args, scope)
    }

    fn resolve_async<'a>(
        &'a self,
        provider: &'a Arc<Provider>,
        ctx: &'a RequestContext,
        scope: &'a mut RequestScope,
        supplied: Arguments,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let mut args = self.prepare(provider, ctx, supplied)?;

            for (param, marker) in provider.signature().annotated() {
                let Marker::Depends(depends) = marker else {
                    continue;
                };
                let target = self.plan.effective(depends.provider());

                let value = match self.cached(depends.uses_cache(), target, scope) {
                    Some(value) => value,
                    None => {
                        let value = self
                            .resolve_async(
                                target,
                                ctx,
                                scope,
                                Arguments::for_provider(target.name()),
                            )
                            .await?;
                        self.remember(target, &value, scope);
                        value
                    }
                };

                depends.check(param.name(), param.type_info(), &value)?;
                args.insert_typed(param.name(), value, depends.value_type_name());
            }

            self.invoke_async(provider, args, scope).await
        })
    }

    fn cached(&self, use_cache: bool, target: &Provider, scope: &RequestScope) -> Option<Value> {
        if !use_cache {
            return None;
        }
        let value = scope.cached(target.id());

        #[cfg(feature = "logging")]
        if value.is_some() {
            trace!(
                target: "route_injector",
                provider = target.name(),
                scope_id = scope.id().id(),
                "Dependency cache hit"
            );
        }

        value
    }

    // The first value computed in a request is the one later cached references see.
    fn remember(&self, target: &Provider, value: &Value, scope: &mut RequestScope) {
        if scope.cached(target.id()).is_none() {
            scope.store(target.id(), Arc::clone(value));
        }
    }

    fn invoke_sync(
        &self,
        provider: &Provider,
        args: Arguments,
        scope: &mut RequestScope,
    ) -> Result<Value> {
        #[cfg(feature = "logging")]
        trace!(target: "route_injector", provider = provider.name(), "Invoking provider");

        match provider.func() {
            ProviderFn::Sync(f) => f(args),
            ProviderFn::Yield(f) => {
                let (value, teardown) = f(args)?;
                scope.push_teardown(provider.name(), teardown);
                Ok(value)
            }
            ProviderFn::Async(_) | ProviderFn::AsyncYield(_) => {
                Err(DiError::AsyncDependencyInSyncRoute {
                    route: self.endpoint.name().to_string(),
                    provider: provider.name().to_string(),
                })
            }
        }
    }

    async fn invoke_async(
        &self,
        provider: &Provider,
        args: Arguments,
        scope: &mut RequestScope,
    ) -> Result<Value> {
        #[cfg(feature = "logging")]
        trace!(target: "route_injector", provider = provider.name(), "Invoking provider");

        match provider.func() {
            ProviderFn::Sync(f) => f(args),
            ProviderFn::Async(f) => f(args).await,
            ProviderFn::Yield(f) => {
                let (value, teardown) = f(args)?;
                scope.push_teardown(provider.name(), teardown);
                Ok(value)
            }
            ProviderFn::AsyncYield(f) => {
                let (value, teardown) = f(args).await?;
                scope.push_async_teardown(provider.name(), teardown);
                Ok(value)
            }
        }
    }
}

impl std::fmt::Debug for Injected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injected")
            .field("endpoint", &self.endpoint.name())
            .field("plan", &self.plan)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphWalker;
    use crate::{AsyncYielded, Depends, Header, Request, Yielded};
    use http::Method;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn inject(handler: &Arc<Provider>) -> Injected {
        let plan = GraphWalker::new().walk(handler).unwrap();
        Injected::new(
            Arc::clone(handler),
            Arc::new(plan),
            DeferredBinding::bind(handler),
        )
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Request::new(Method::GET, "/").unwrap())
    }

    fn counter() -> (Arc<AtomicU32>, Arc<Provider>) {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let provider = Provider::builder("counter")
            .sync(move |_| Ok(seen.fetch_add(1, Ordering::SeqCst) + 1));
        (calls, provider)
    }

    #[test]
    fn test_cached_dependency_runs_once() {
        let (calls, counter) = counter();
        let handler = Provider::builder("handler")
            .depends::<u32>("a", Depends::on(&counter))
            .depends::<u32>("b", Depends::on(&counter))
            .sync(|args| Ok((*args.get::<u32>("a")?, *args.get::<u32>("b")?)));

        let value = inject(&handler).call(&ctx(), Arguments::new()).unwrap();
        assert_eq!(value.downcast_ref::<(u32, u32)>(), Some(&(1, 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uncached_reference_runs_again() {
        let (calls, counter) = counter();
        let handler = Provider::builder("handler")
            .depends::<u32>("a", Depends::on(&counter))
            .depends::<u32>("b", Depends::on(&counter).no_cache())
            .sync(|args| Ok((*args.get::<u32>("a")?, *args.get::<u32>("b")?)));

        let value = inject(&handler).call(&ctx(), Arguments::new()).unwrap();
        assert_eq!(value.downcast_ref::<(u32, u32)>(), Some(&(1, 2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_is_per_request() {
        let (calls, counter) = counter();
        let handler = Provider::builder("handler")
            .depends::<u32>("a", Depends::on(&counter))
            .sync(|args| Ok(*args.get::<u32>("a")?));

        let injected = inject(&handler);
        injected.call(&ctx(), Arguments::new()).unwrap();
        let value = injected.call(&ctx(), Arguments::new()).unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_plain_arguments_and_defaults() {
        let handler = Provider::builder("handler")
            .param::<u32>("page")
            .param_with_default::<u32>("size", 20)
            .sync(|args| Ok(*args.get::<u32>("page")? * *args.get::<u32>("size")?));
        let injected = inject(&handler);

        let value = injected
            .call(&ctx(), Arguments::new().with("page", 3_u32))
            .unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&60));

        let err = injected.call(&ctx(), Arguments::new()).unwrap_err();
        assert!(matches!(err, DiError::MissingArgument { .. }));

        let err = injected
            .call(&ctx(), Arguments::new().with("page", "three"))
            .unwrap_err();
        assert!(matches!(
            err,
            DiError::TypeMismatch {
                expected: "u32",
                found: "&str",
                ..
            }
        ));
    }

    #[test]
    fn test_validation_errors_are_collected() {
        let handler = Provider::builder("handler")
            .field::<String>("a", Header::<String>::named("X-A"))
            .field::<String>("b", Header::<String>::named("X-B"))
            .sync(|_| Ok(()));

        let err = inject(&handler).call(&ctx(), Arguments::new()).unwrap_err();
        match err {
            DiError::Validation(v) => {
                assert_eq!(v.to_string(), "Missing header: X-A; Missing header: X-B")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sync_call_rejects_async_provider() {
        let slow = Provider::builder("slow").asynchronous(|_| async { Ok(1_u8) });
        let handler = Provider::builder("handler")
            .depends::<u8>("v", Depends::on(&slow))
            .sync(|_| Ok(()));

        let err = inject(&handler).call(&ctx(), Arguments::new()).unwrap_err();
        assert!(matches!(err, DiError::AsyncDependencyInSyncRoute { .. }));
    }

    fn tracked(
        name: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
        inner: Option<&Arc<Provider>>,
    ) -> Arc<Provider> {
        let log = Arc::clone(log);
        let mut builder = Provider::builder(name);
        if let Some(inner) = inner {
            builder = builder.depends::<String>("inner", Depends::on(inner));
        }
        builder.yielding(move |_| {
            log.lock().unwrap().push(format!("setup_{name}"));
            let log = Arc::clone(&log);
            Ok(Yielded::new(name.to_string(), move || {
                log.lock().unwrap().push(format!("teardown_{name}"));
                Ok(())
            }))
        })
    }

    #[test]
    fn test_yield_teardown_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let b = tracked("b", &log, None);
        let a = tracked("a", &log, Some(&b));
        let handler = Provider::builder("handler")
            .depends::<String>("a", Depends::on(&a))
            .sync(|args| Ok(args.get::<String>("a")?.to_string()));

        inject(&handler).call(&ctx(), Arguments::new()).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["setup_b", "setup_a", "teardown_a", "teardown_b"]
        );
    }

    #[test]
    fn test_setup_failure_skips_own_teardown_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ok = tracked("ok", &log, None);

        let failing_log = Arc::clone(&log);
        let failing = Provider::builder("failing")
            .depends::<String>("ok", Depends::on(&ok))
            .yielding(move |_| -> Result<Yielded<String>> {
                failing_log.lock().unwrap().push("setup_failing".to_string());
                Err(DiError::failed("setup failed"))
            });
        let handler = Provider::builder("handler")
            .depends::<String>("f", Depends::on(&failing))
            .sync(|_| Ok(()));

        let err = inject(&handler).call(&ctx(), Arguments::new()).unwrap_err();
        assert_eq!(err.to_string(), "setup failed");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["setup_ok", "setup_failing", "teardown_ok"]
        );
    }

    #[tokio::test]
    async fn test_async_resolution_with_mixed_providers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let teardown_log = Arc::clone(&log);

        let base = Provider::builder("base").asynchronous(|_| async { Ok(String::from("base")) });
        let sync_on_async = Provider::builder("sync_on_async")
            .depends::<String>("base", Depends::on(&base))
            .sync(|args| Ok(format!("{}+sync", args.get::<String>("base")?)));
        let resource = Provider::builder("resource").async_yielding(move |_| {
            let log = Arc::clone(&teardown_log);
            async move {
                Ok(AsyncYielded::new(7_u8, move || async move {
                    log.lock().unwrap().push("closed");
                    Ok(())
                }))
            }
        });
        let handler = Provider::builder("handler")
            .depends::<String>("value", Depends::on(&sync_on_async))
            .depends::<u8>("resource", Depends::on(&resource))
            .asynchronous(|args: Arguments| async move {
                let value = args.get::<String>("value")?;
                let resource = args.get::<u8>("resource")?;
                Ok::<_, DiError>(format!("{value}:{resource}"))
            });

        let value = inject(&handler)
            .call_async(&ctx(), Arguments::new())
            .await
            .unwrap();
        assert_eq!(value.downcast_ref::<String>().unwrap(), "base+sync:7");
        assert_eq!(*log.lock().unwrap(), vec!["closed"]);
    }
}
