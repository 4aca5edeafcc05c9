//! # Route Injector - Request-Scoped Dependency Injection for Route Handlers
//!
//! Handlers declare what they need as parameters. Some are plain values the
//! host router parses itself, some are filled from the request context
//! (the request, settings, the app, shared state), and some are *annotated*:
//! they carry a [`Depends`] on another provider or a custom field marker
//! ([`Header`], [`HeaderModel`], [`QueryParams`], [`QueryList`], [`QueryModel`],
//! [`JsonBody`]).
//!
//! Decorating a handler with [`App::get`] and friends walks its dependency
//! graph once, checks it (cycles, depth, sync/async mixing, return types),
//! strips the annotated parameters from the public signature and installs
//! the route. Each request then resolves the graph in a fresh
//! [`RequestScope`]: values are cached per provider unless a dependency opts
//! out, and yield-style providers are torn down in reverse order once the
//! handler returns.
//!
//! ## Features
//!
//! - **Nested dependencies** - `Depends` chains of any depth, sync or async
//! - **Per-request cache** - one call per provider per request by default
//! - **Teardown** - [`Yielded`] and [`AsyncYielded`] values run cleanup LIFO
//! - **Field markers** - headers, query parameters and JSON bodies, singly or
//!   as whole structs, with aggregated validation errors
//! - **Overrides** - swap any provider for tests
//! - **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use route_injector::prelude::*;
//! use http::Method;
//!
//! let app = App::new(Settings::default());
//!
//! let token = Provider::builder("token")
//!     .field::<String>("x_token", Header::<String>::new())
//!     .sync(|args| Ok(args.get::<String>("x_token")?.to_string()));
//!
//! let handler = Provider::builder("read_items")
//!     .param::<u32>("limit")
//!     .depends::<String>("token", Depends::on(&token))
//!     .sync(|args| {
//!         let token = args.get::<String>("token")?;
//!         let limit = args.get::<u32>("limit")?;
//!         Ok(format!("{token}:{limit}"))
//!     });
//!
//! let route = app.get("/items").handler(&handler).unwrap();
//! assert_eq!(route.signature().names().collect::<Vec<_>>(), vec!["limit"]);
//!
//! let request = Request::builder()
//!     .method(Method::GET)
//!     .uri("/items")
//!     .header("x-token", "abc")
//!     .build()
//!     .unwrap();
//! let response = app.dispatch_blocking(request, Arguments::new().with("limit", 10_u32));
//! assert_eq!(response.body(), "abc:10");
//! ```
//!
//! ## Teardown
//!
//! ```rust
//! use route_injector::prelude::*;
//! use http::Method;
//! use std::sync::{Arc, Mutex};
//!
//! let closed = Arc::new(Mutex::new(false));
//! let flag = Arc::clone(&closed);
//!
//! let session = Provider::builder("session").yielding(move |_| {
//!     let flag = Arc::clone(&flag);
//!     Ok(Yielded::new(String::from("session-1"), move || {
//!         *flag.lock().unwrap() = true;
//!         Ok(())
//!     }))
//! });
//! let handler = Provider::builder("handler")
//!     .depends::<String>("session", Depends::on(&session))
//!     .sync(|args| Ok(args.get::<String>("session")?.to_string()));
//!
//! let app = App::new(Settings::default());
//! app.get("/").handler(&handler).unwrap();
//! app.dispatch_blocking(Request::new(Method::GET, "/").unwrap(), Arguments::new());
//! assert!(*closed.lock().unwrap());
//! ```

mod app;
mod binder;
mod error;
mod fields;
mod graph;
mod inject;
pub mod logging;
mod marker;
mod provider;
mod request;
mod route;
mod routing;
mod scope;
mod settings;
mod signature;
mod state;

pub use app::*;
pub use binder::*;
pub use error::*;
pub use fields::*;
pub use graph::*;
pub use inject::*;
pub use logging::LogFormat;
pub use marker::*;
pub use provider::*;
pub use request::*;
pub use route::*;
pub use routing::*;
pub use scope::*;
pub use settings::*;
pub use signature::*;
pub use state::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        App, Arguments, AsyncYielded, CustomField, Depends, DiError, Header, HeaderModel,
        JsonBody, Provider, QueryList, QueryModel, QueryParams, Request, Response, Result, Route,
        Settings, State, Yielded,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use http::{Method, StatusCode};
    use serde_json::json;

    #[derive(Debug)]
    struct Db {
        users: Vec<&'static str>,
    }

    #[tokio::test]
    async fn test_full_request_cycle() {
        let state = State::new();
        state.insert(Db {
            users: vec!["ada", "grace"],
        });
        let app = App::with_state(Settings::default(), state);

        let db = Provider::builder("db")
            .param::<State>("state")
            .sync(|args| args.get::<State>("state")?.get::<Db>());
        let user = Provider::builder("user")
            .field::<u32>("user_id", QueryParams::<u32>::new())
            .depends::<Arc<Db>>("db", Depends::on(&db))
            .asynchronous(|args: Arguments| async move {
                let id = *args.get::<u32>("user_id")? as usize;
                let db = args.get::<Arc<Db>>("db")?;
                db.users
                    .get(id)
                    .map(|name| name.to_string())
                    .ok_or_else(|| DiError::http(404, "User not found"))
            });
        let handler = Provider::builder("show_user")
            .param::<Request>("request")
            .depends::<String>("name", Depends::on(&user))
            .asynchronous(|args: Arguments| async move {
                Ok::<_, DiError>(json!({ "name": args.get::<String>("name")?.as_str() }))
            });
        let route = app.get("/user").handler(&handler).unwrap();
        assert_eq!(route.signature().names().collect::<Vec<_>>(), vec!["request"]);

        let get = |id: u32| {
            let app = app.clone();
            async move {
                let uri = format!("/user?user_id={id}");
                app.dispatch(Request::new(Method::GET, &uri).unwrap(), Arguments::new())
                    .await
            }
        };

        let response = get(1).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &json!({"name": "grace"}));

        let response = get(5).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), &json!({"detail": "User not found"}));
    }
}
