//! Route registration hook
//!
//! [`RouteRegistry`] is the narrow interface the decorator installs routes
//! through. [`RouteTable`] is the in-process implementation used by
//! [`App`](crate::App): exact `(method, path)` matching on a concurrent map.

use crate::route::Route;
use ahash::RandomState;
use dashmap::DashMap;
use http::Method;
use std::sync::Arc;

/// Where decorated routes are installed.
pub trait RouteRegistry: Send + Sync {
    /// Install `route`, returning the route it replaced.
    fn register(&self, route: Arc<Route>) -> Option<Arc<Route>>;

    fn lookup(&self, method: &Method, path: &str) -> Option<Arc<Route>>;

    /// All installed routes, in no particular order.
    fn routes(&self) -> Vec<Arc<Route>>;
}

/// Concurrent exact-match route table.
pub struct RouteTable {
    routes: DashMap<(Method, String), Arc<Route>, RandomState>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteRegistry for RouteTable {
    fn register(&self, route: Arc<Route>) -> Option<Arc<Route>> {
        let key = (route.method().clone(), route.path().to_string());
        self.routes.insert(key, route)
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<Arc<Route>> {
        self.routes
            .get(&(method.clone(), path.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn routes(&self) -> Vec<Arc<Route>> {
        self.routes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{App, Provider, Settings};

    #[test]
    fn test_register_and_lookup() {
        let app = App::new(Settings::default());
        let handler = Provider::builder("index").sync(|_| Ok("hi"));
        let route = app.get("/").handler(&handler).unwrap();

        let table = RouteTable::new();
        assert!(table.register(Arc::clone(&route)).is_none());
        assert!(table.lookup(&Method::GET, "/").is_some());
        assert!(table.lookup(&Method::POST, "/").is_none());
        assert!(table.lookup(&Method::GET, "/other").is_none());

        let again = app.get("/").handler(&route).unwrap();
        let replaced = table.register(again).unwrap();
        assert!(Arc::ptr_eq(&replaced, &route));
        assert_eq!(table.len(), 1);
        assert_eq!(table.routes().len(), 1);
    }
}
