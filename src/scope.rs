//! Per-request resolution scope
//!
//! A [`RequestScope`] lives for exactly one call of a route. It holds the
//! per-request cache of provider results and the exit stack of teardowns
//! registered by yield providers. Teardowns run in reverse order of setup on
//! every exit path: normal return, error, or the scope being dropped when
//! the surrounding future is cancelled.

use crate::Result;
use crate::provider::{ProviderId, Value};
use ahash::RandomState;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, error, trace, warn};

pub(crate) type SyncTeardown = Box<dyn FnOnce() -> Result<()> + Send>;
pub(crate) type AsyncTeardown = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Value produced by a yield provider, plus the code to run once the
/// response has been produced.
///
/// # Examples
///
/// ```rust
/// use route_injector::{Provider, Yielded};
///
/// let session = Provider::builder("session").yielding(|_| {
///     let conn = String::from("conn-1");
///     Ok(Yielded::new(conn, || {
///         // close the connection
///         Ok(())
///     }))
/// });
///
/// assert!(session.is_generator());
/// ```
pub struct Yielded<T> {
    value: T,
    teardown: SyncTeardown,
}

impl<T> Yielded<T> {
    pub fn new<F>(value: T, teardown: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            value,
            teardown: Box::new(teardown),
        }
    }

    pub(crate) fn into_parts(self) -> (T, SyncTeardown) {
        (self.value, self.teardown)
    }
}

/// Async counterpart of [`Yielded`].
pub struct AsyncYielded<T> {
    value: T,
    teardown: AsyncTeardown,
}

impl<T> AsyncYielded<T> {
    pub fn new<F, Fut>(value: T, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            value,
            teardown: Box::new(move || teardown().boxed()),
        }
    }

    pub(crate) fn into_parts(self) -> (T, AsyncTeardown) {
        (self.value, self.teardown)
    }
}

/// Unique scope identifier.
///
/// Each request scope gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

enum Teardown {
    Sync(SyncTeardown),
    Async(AsyncTeardown),
}

struct ExitEntry {
    provider: String,
    teardown: Teardown,
}

/// Cache and exit stack for one request.
pub struct RequestScope {
    id: ScopeId,
    cache: HashMap<ProviderId, Value, RandomState>,
    exit_stack: Vec<ExitEntry>,
}

impl RequestScope {
    pub fn new() -> Self {
        let id = ScopeId::new();

        #[cfg(feature = "logging")]
        trace!(
            target: "route_injector",
            scope_id = id.id(),
            "Opening request scope"
        );

        Self {
            id,
            cache: HashMap::with_hasher(RandomState::new()),
            exit_stack: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Value computed earlier in this request, if any.
    #[inline]
    pub fn cached(&self, provider: ProviderId) -> Option<Value> {
        self.cache.get(&provider).cloned()
    }

    #[inline]
    pub fn store(&mut self, provider: ProviderId, value: Value) {
        self.cache.insert(provider, value);
    }

    /// Number of teardowns waiting to run.
    #[inline]
    pub fn pending_teardowns(&self) -> usize {
        self.exit_stack.len()
    }

    pub(crate) fn push_teardown(&mut self, provider: &str, teardown: SyncTeardown) {
        self.exit_stack.push(ExitEntry {
            provider: provider.to_string(),
            teardown: Teardown::Sync(teardown),
        });
    }

    pub(crate) fn push_async_teardown(&mut self, provider: &str, teardown: AsyncTeardown) {
        self.exit_stack.push(ExitEntry {
            provider: provider.to_string(),
            teardown: Teardown::Async(teardown),
        });
    }

    /// Run all teardowns, innermost first, awaiting async ones.
    ///
    /// Errors are logged and never returned: the response has already been produced.
    ///
    /// Entries stay on the exit stack until their turn, so if this future is
    /// dropped part way through, `Drop` still runs whatever is left.
    pub async fn close(mut self) {
        #[cfg(feature = "logging")]
        debug!(
            target: "route_injector",
            scope_id = self.id.id(),
            teardowns = self.exit_stack.len(),
            "Closing request scope"
        );

        while let Some(entry) = self.exit_stack.pop() {
            let result = match entry.teardown {
                Teardown::Sync(teardown) => teardown(),
                Teardown::Async(teardown) => teardown().await,
            };
            report(&entry.provider, result);
        }
    }

    /// Run all teardowns without awaiting.
    ///
    /// Async teardowns cannot occur in synchronous routes; any that do are
    /// handed to the current tokio runtime.
    pub fn close_blocking(mut self) {
        #[cfg(feature = "logging")]
        debug!(
            target: "route_injector",
            scope_id = self.id.id(),
            teardowns = self.exit_stack.len(),
            "Closing request scope"
        );

        self.unwind();
    }

    fn unwind(&mut self) {
        while let Some(entry) = self.exit_stack.pop() {
            match entry.teardown {
                Teardown::Sync(teardown) => report(&entry.provider, teardown()),
                Teardown::Async(teardown) => spawn_teardown(entry.provider, teardown),
            }
        }
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.exit_stack.is_empty() {
            return;
        }

        #[cfg(feature = "logging")]
        warn!(
            target: "route_injector",
            scope_id = self.id.id(),
            teardowns = self.exit_stack.len(),
            "Request scope dropped before closing, running pending teardowns"
        );

        self.unwind();
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("cached", &self.cache.len())
            .field("pending_teardowns", &self.exit_stack.len())
            .finish()
    }
}

fn spawn_teardown(provider: String, teardown: AsyncTeardown) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let result = teardown().await;
                report(&provider, result);
            });
        }
        Err(_) => {
            #[cfg(feature = "logging")]
            error!(
                target: "route_injector",
                provider = %provider,
                "No async runtime available, async teardown skipped"
            );
            #[cfg(not(feature = "logging"))]
            let _ = provider;
        }
    }
}

fn report(provider: &str, result: Result<()>) {
    match result {
        Ok(()) => {
            #[cfg(feature = "logging")]
            trace!(target: "route_injector", provider = %provider, "Teardown complete");
        }
        Err(e) => {
            #[cfg(feature = "logging")]
            error!(
                target: "route_injector",
                provider = %provider,
                error = %e,
                "Teardown failed"
            );
            #[cfg(not(feature = "logging"))]
            let _ = e;
        }
    }
    #[cfg(not(feature = "logging"))]
    let _ = provider;
}
