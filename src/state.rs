//! Application state
//!
//! A typed, thread-safe store shared by every request of an [`App`](crate::App).
//! Values are keyed by their type. Handlers and providers receive the store
//! through a `State`-typed (or `state`-named) parameter.

use crate::provider::{Injectable, Value};
use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::TypeId;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

type LazyInitFn = Box<dyn Fn() -> Value + Send + Sync>;

/// Value created on first access.
struct LazyEntry {
    init: LazyInitFn,
    instance: OnceCell<Value>,
    #[cfg(feature = "logging")]
    type_name: &'static str,
}

impl LazyEntry {
    fn resolve(&self) -> Value {
        Arc::clone(self.instance.get_or_init(|| {
            #[cfg(feature = "logging")]
            debug!(
                target: "route_injector",
                state = self.type_name,
                "Lazy state value initializing on first access"
            );

            (self.init)()
        }))
    }
}

#[derive(Clone)]
enum StateEntry {
    Ready(Value),
    Lazy(Arc<LazyEntry>),
}

/// Shared typed store.
///
/// Cloning is cheap; clones share the same values.
///
/// # Examples
///
/// ```rust
/// use route_injector::State;
///
/// #[derive(Debug)]
/// struct Pool {
///     size: usize,
/// }
///
/// let state = State::new();
/// state.insert(Pool { size: 4 });
/// state.lazy(|| String::from("computed once"));
///
/// assert_eq!(state.get::<Pool>().unwrap().size, 4);
/// assert_eq!(state.get::<String>().unwrap().as_str(), "computed once");
/// assert!(state.get::<u64>().is_err());
/// ```
#[derive(Clone)]
pub struct State {
    entries: Arc<DashMap<TypeId, StateEntry, RandomState>>,
}

impl State {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            )),
        }
    }

    /// Store a value, replacing any previous value of the same type.
    pub fn insert<T: Injectable>(&self, value: T) {
        #[cfg(feature = "logging")]
        debug!(
            target: "route_injector",
            state = std::any::type_name::<T>(),
            "Inserting state value"
        );

        self.entries
            .insert(TypeId::of::<T>(), StateEntry::Ready(Arc::new(value)));
    }

    /// Store a value built on first access.
    pub fn lazy<T, F>(&self, init: F)
    where
        T: Injectable,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let entry = LazyEntry {
            init: Box::new(move || Arc::new(init()) as Value),
            instance: OnceCell::new(),
            #[cfg(feature = "logging")]
            type_name: std::any::type_name::<T>(),
        };
        self.entries
            .insert(TypeId::of::<T>(), StateEntry::Lazy(Arc::new(entry)));
    }

    /// Get a value, or `NotFound`.
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        self.try_get::<T>().ok_or_else(DiError::not_found::<T>)
    }

    pub fn try_get<T: Injectable>(&self) -> Option<Arc<T>> {
        // Clone out of the map so lazy initializers may touch the store.
        let entry = self.entries.get(&TypeId::of::<T>())?.value().clone();

        #[cfg(feature = "logging")]
        trace!(
            target: "route_injector",
            state = std::any::type_name::<T>(),
            "Resolving state value"
        );

        let value = match entry {
            StateEntry::Ready(value) => value,
            StateEntry::Lazy(lazy) => lazy.resolve(),
        };
        value.downcast::<T>().ok()
    }

    pub fn contains<T: Injectable>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Remove a value, returning whether one was stored.
    pub fn remove<T: Injectable>(&self) -> bool {
        self.entries.remove(&TypeId::of::<T>()).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State").field("len", &self.len()).finish()
    }
}
