//! Dependency graph walker
//!
//! Starting from a handler, the walker follows every `Depends` marker into
//! the referenced provider's signature, recursively. It produces a
//! [`ResolutionPlan`]: one [`DeferredBinding`] per provider that needs
//! context values, one [`FieldBinding`] per custom-field parameter, and the
//! set of reachable providers. Cycles and over-deep chains are rejected
//! here, at decoration time.

use crate::binder::DeferredBinding;
use crate::fields::FieldBinding;
use crate::marker::Marker;
use crate::provider::{Provider, ProviderId};
use crate::settings::DEFAULT_MAX_DEPTH;
use crate::{DiError, Result};
use ahash::RandomState;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Provider replacements, keyed by the provider being replaced.
pub type Overrides = HashMap<ProviderId, Arc<Provider>, RandomState>;

/// Everything the injector needs to resolve one route.
pub struct ResolutionPlan {
    root: ProviderId,
    bindings: IndexMap<ProviderId, DeferredBinding>,
    fields: HashMap<(ProviderId, String), FieldBinding, RandomState>,
    providers: IndexMap<ProviderId, Arc<Provider>>,
    overrides: Overrides,
}

impl ResolutionPlan {
    /// Deferred bindings of the dependencies, in discovery order.
    pub fn bindings(&self) -> impl Iterator<Item = &DeferredBinding> {
        self.bindings.values()
    }

    pub fn binding(&self, provider: ProviderId) -> Option<&DeferredBinding> {
        self.bindings.get(&provider)
    }

    /// Classified custom field for `param` of `provider`.
    pub fn field(&self, provider: ProviderId, param: &str) -> Option<&FieldBinding> {
        self.fields.get(&(provider, param.to_string()))
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldBinding> {
        self.fields.values()
    }

    /// The provider that actually runs in place of `provider`.
    pub fn effective<'a>(&'a self, provider: &'a Arc<Provider>) -> &'a Arc<Provider> {
        self.overrides.get(&provider.id()).unwrap_or(provider)
    }

    /// Reachable providers, leaves first. Includes the root.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<Provider>> {
        self.providers.values()
    }

    /// Async providers below the root.
    pub fn async_dependencies(&self) -> impl Iterator<Item = &Arc<Provider>> {
        self.providers
            .values()
            .filter(move |p| p.id() != self.root && p.is_async())
    }

    #[inline]
    pub fn root(&self) -> ProviderId {
        self.root
    }
}

impl std::fmt::Debug for ResolutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionPlan")
            .field("root", &self.root)
            .field("bindings", &self.bindings.len())
            .field("fields", &self.fields.len())
            .field("providers", &self.providers.len())
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

/// Walks a handler's dependency graph into a [`ResolutionPlan`].
///
/// # Examples
///
/// ```rust
/// use route_injector::{Depends, GraphWalker, Provider, Request};
///
/// let method = Provider::builder("method")
///     .param::<Request>("request")
///     .sync(|args| Ok(args.get::<Request>("request")?.method().to_string()));
/// let middle = Provider::builder("middle")
///     .depends::<String>("m", Depends::on(&method))
///     .sync(|args| Ok(format!("{}", args.get::<String>("m")?)));
/// let handler = Provider::builder("handler")
///     .depends::<String>("value", Depends::on(&middle))
///     .sync(|args| Ok(format!("{}", args.get::<String>("value")?)));
///
/// let plan = GraphWalker::new().walk(&handler).unwrap();
/// assert_eq!(plan.bindings().count(), 1);
/// assert!(plan.binding(method.id()).is_some());
/// ```
pub struct GraphWalker {
    max_depth: usize,
    overrides: Overrides,
    stack: Vec<Arc<Provider>>,
    visited: HashSet<ProviderId, RandomState>,
    bindings: IndexMap<ProviderId, DeferredBinding>,
    fields: HashMap<(ProviderId, String), FieldBinding, RandomState>,
    providers: IndexMap<ProviderId, Arc<Provider>>,
}

impl GraphWalker {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            overrides: HashMap::with_hasher(RandomState::new()),
            stack: Vec::new(),
            visited: HashSet::with_hasher(RandomState::new()),
            bindings: IndexMap::new(),
            fields: HashMap::with_hasher(RandomState::new()),
            providers: IndexMap::new(),
        }
    }

    /// Longest accepted `Depends` chain below the handler.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Substitute providers wherever they are referenced.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Walk the graph below `root`.
    ///
    /// The root's own context parameters are not recorded as a binding;
    /// the route decorator handles those itself.
    pub fn walk(mut self, root: &Arc<Provider>) -> Result<ResolutionPlan> {
        self.visit(root, 0)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "route_injector",
            root = root.name(),
            providers = self.providers.len(),
            bindings = self.bindings.len(),
            fields = self.fields.len(),
            "Dependency graph walked"
        );

        Ok(ResolutionPlan {
            root: root.id(),
            bindings: self.bindings,
            fields: self.fields,
            providers: self.providers,
            overrides: self.overrides,
        })
    }

    fn visit(&mut self, provider: &Arc<Provider>, depth: usize) -> Result<()> {
        if self.stack.iter().any(|p| p.id() == provider.id()) {
            let mut chain: Vec<&str> = self.stack.iter().map(|p| p.name()).collect();
            chain.push(provider.name());
            return Err(DiError::CircularDependency {
                chain: chain.join(" -> "),
            });
        }
        if depth > self.max_depth {
            return Err(DiError::DepthExceeded {
                provider: provider.name().to_string(),
                max: self.max_depth,
            });
        }
        if self.visited.contains(&provider.id()) {
            #[cfg(feature = "logging")]
            trace!(
                target: "route_injector",
                provider = provider.name(),
                "Provider already walked"
            );
            return Ok(());
        }

        self.stack.push(Arc::clone(provider));

        for (param, marker) in provider.signature().annotated() {
            match marker {
                Marker::Field(field) => {
                    let binding = FieldBinding::classify(param, field)?;
                    self.fields
                        .insert((provider.id(), param.name().to_string()), binding);
                }
                Marker::Depends(depends) => {
                    let target = match self.overrides.get(&depends.provider().id()) {
                        Some(replacement) => Arc::clone(replacement),
                        None => Arc::clone(depends.provider()),
                    };

                    if let Some(returns) = target.signature().return_type() {
                        if depends.casts() && returns != param.type_info() {
                            return Err(DiError::TypeMismatch {
                                name: param.name().to_string(),
                                expected: param.type_info().name(),
                                found: returns.name(),
                            });
                        }
                    }

                    if !self.bindings.contains_key(&target.id()) {
                        if let Some(binding) = DeferredBinding::bind(&target) {
                            self.bindings.insert(target.id(), binding);
                        }
                    }

                    self.visit(&target, depth + 1)?;
                }
            }
        }

        self.stack.pop();
        self.visited.insert(provider.id());
        self.providers.insert(provider.id(), Arc::clone(provider));
        Ok(())
    }
}

impl Default for GraphWalker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Depends, Header, Request};

    fn chain(depth: usize) -> (Vec<Arc<Provider>>, Arc<Provider>) {
        let leaf = Provider::builder(format!("level{depth}")).sync(|_| Ok(String::new()));
        let mut providers = vec![leaf];
        for level in (1..depth).rev() {
            let previous = providers.last().map(Arc::clone).unwrap();
            providers.push(
                Provider::builder(format!("level{level}"))
                    .depends::<String>("dep", Depends::on(&previous))
                    .sync(|args| Ok(args.get::<String>("dep")?.to_string())),
            );
        }
        let top = providers.last().map(Arc::clone).unwrap();
        let handler = Provider::builder("handler")
            .depends::<String>("result", Depends::on(&top))
            .sync(|_| Ok(()));
        (providers, handler)
    }

    #[test]
    fn test_nested_request_binding_is_found() {
        let leaf = Provider::builder("leaf")
            .param::<Request>("request")
            .sync(|_| Ok(1_u8));
        let mid = Provider::builder("mid")
            .depends::<u8>("leaf", Depends::on(&leaf))
            .sync(|_| Ok(2_u8));
        let handler = Provider::builder("handler")
            .depends::<u8>("mid", Depends::on(&mid))
            .sync(|_| Ok(()));

        let plan = GraphWalker::new().walk(&handler).unwrap();
        assert_eq!(plan.bindings().count(), 1);
        assert!(plan.binding(leaf.id()).is_some());
        assert!(plan.binding(mid.id()).is_none());

        let order: Vec<_> = plan.providers().map(|p| p.name().to_string()).collect();
        assert_eq!(order, vec!["leaf", "mid", "handler"]);
    }

    #[test]
    fn test_diamond_records_one_binding() {
        let shared = Provider::builder("shared")
            .param::<Request>("request")
            .sync(|_| Ok(0_u8));
        let left = Provider::builder("left")
            .depends::<u8>("s", Depends::on(&shared))
            .sync(|_| Ok(1_u8));
        let right = Provider::builder("right")
            .depends::<u8>("s", Depends::on(&shared).no_cache())
            .sync(|_| Ok(2_u8));
        let handler = Provider::builder("handler")
            .depends::<u8>("l", Depends::on(&left))
            .depends::<u8>("r", Depends::on(&right))
            .sync(|_| Ok(()));

        let plan = GraphWalker::new().walk(&handler).unwrap();
        assert_eq!(plan.bindings().count(), 1);
        assert_eq!(plan.providers().count(), 4);
    }

    #[test]
    fn test_fields_classified_per_provider() {
        let token = Provider::builder("token")
            .field::<String>("x_token", Header::<String>::new())
            .sync(|_| Ok(1_u8));
        let handler = Provider::builder("handler")
            .depends::<u8>("t", Depends::on(&token))
            .field::<String>("x_other", Header::<String>::named("X-Custom"))
            .sync(|_| Ok(()));

        let plan = GraphWalker::new().walk(&handler).unwrap();
        assert_eq!(plan.field(token.id(), "x_token").unwrap().source_name(), "x-token");
        assert_eq!(plan.field(handler.id(), "x_other").unwrap().source_name(), "X-Custom");
        assert_eq!(plan.fields().count(), 2);
    }

    #[test]
    fn test_chain_within_depth() {
        let (providers, handler) = chain(100);
        let plan = GraphWalker::new().walk(&handler).unwrap();
        assert_eq!(plan.providers().count(), providers.len() + 1);
    }

    #[test]
    fn test_depth_exceeded() {
        let (_, handler) = chain(10);
        let err = GraphWalker::new().max_depth(5).walk(&handler).err().unwrap();
        assert!(matches!(err, DiError::DepthExceeded { max: 5, .. }));
    }

    #[test]
    fn test_cycle_through_override_is_rejected() {
        let a = Provider::builder("a").sync(|_| Ok(1_u8));
        let b = Provider::builder("b")
            .depends::<u8>("a", Depends::on(&a))
            .sync(|_| Ok(2_u8));
        let handler = Provider::builder("handler")
            .depends::<u8>("a", Depends::on(&a))
            .sync(|_| Ok(()));

        let mut overrides = Overrides::default();
        overrides.insert(a.id(), Arc::clone(&b));

        let err = GraphWalker::new()
            .with_overrides(overrides)
            .walk(&handler)
            .err()
            .unwrap();
        match err {
            DiError::CircularDependency { chain } => assert_eq!(chain, "handler -> b -> b"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_override_replaces_provider() {
        let real = Provider::builder("real").sync(|_| Ok(1_u8));
        let fake = Provider::builder("fake")
            .param::<Request>("request")
            .sync(|_| Ok(2_u8));
        let handler = Provider::builder("handler")
            .depends::<u8>("v", Depends::on(&real))
            .sync(|_| Ok(()));

        let mut overrides = Overrides::default();
        overrides.insert(real.id(), Arc::clone(&fake));

        let plan = GraphWalker::new().with_overrides(overrides).walk(&handler).unwrap();
        assert_eq!(plan.effective(&real).id(), fake.id());
        assert!(plan.binding(fake.id()).is_some());
        assert!(plan.providers().all(|p| p.id() != real.id()));
    }

    #[test]
    fn test_return_type_checked() {
        let number = Provider::builder("number").sync(|_| Ok(1_u32));
        let handler = Provider::builder("handler")
            .depends::<String>("n", Depends::on(&number))
            .sync(|_| Ok(()));
        assert!(matches!(
            GraphWalker::new().walk(&handler),
            Err(DiError::TypeMismatch { .. })
        ));

        let handler = Provider::builder("handler")
            .depends::<String>("n", Depends::on(&number).cast(false))
            .sync(|_| Ok(()));
        assert!(GraphWalker::new().walk(&handler).is_ok());
    }
}
