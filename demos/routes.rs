//! A small app: header auth, query paging, JSON bodies and a pooled
//! connection torn down after every request.
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example routes --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example routes --features logging-pretty
//! ```

use http::Method;
use route_injector::prelude::*;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Pool {
    opened: AtomicU32,
    items: Mutex<Vec<String>>,
}

#[derive(Debug)]
struct Connection {
    id: u32,
    pool: Arc<Pool>,
}

#[derive(Debug, Deserialize)]
struct NewItem {
    name: String,
}

fn build_app() -> route_injector::Result<App> {
    let settings = Settings {
        app_name: "inventory".to_string(),
        ..Settings::load()?
    };
    let state = State::new();
    state.insert(Pool::default());
    let app = App::with_state(settings, state);

    let connection = Provider::builder("connection")
        .param::<State>("state")
        .yielding(|args| {
            let pool = args.get::<State>("state")?.get::<Pool>()?;
            let id = pool.opened.fetch_add(1, Ordering::SeqCst) + 1;
            println!("  [conn {id}] opened");
            Ok(Yielded::new(Connection { id, pool }, move || {
                println!("  [conn {id}] closed");
                Ok(())
            }))
        });

    let current_user = Provider::builder("current_user")
        .field::<String>("x_token", Header::<String>::new())
        .sync(|args| {
            let token = args.get::<String>("x_token")?;
            match token.as_str() {
                "secret" => Ok(String::from("admin")),
                _ => Err(DiError::http(403, "Invalid token")),
            }
        });

    let list_items = Provider::builder("list_items")
        .field::<usize>("limit", QueryParams::<usize>::new().with_default(10))
        .depends::<Connection>("conn", Depends::on(&connection))
        .sync(|args| {
            let conn = args.get::<Connection>("conn")?;
            let limit = *args.get::<usize>("limit")?;
            let items = conn
                .pool
                .items
                .lock()
                .map_err(|_| DiError::failed("item store poisoned"))?;
            Ok(json!({
                "connection": conn.id,
                "items": items.iter().take(limit).collect::<Vec<_>>(),
            }))
        });
    app.get("/items").handler(&list_items)?;

    let create_item = Provider::builder("create_item")
        .depends::<String>("user", Depends::on(&current_user))
        .depends::<Connection>("conn", Depends::on(&connection))
        .field::<NewItem>("item", JsonBody::<NewItem>::new())
        .asynchronous(|args: Arguments| async move {
            let user = args.get::<String>("user")?;
            let item = args.get::<NewItem>("item")?;
            let conn = args.get::<Connection>("conn")?;
            conn.pool
                .items
                .lock()
                .map_err(|_| DiError::failed("item store poisoned"))?
                .push(item.name.clone());
            Ok::<_, DiError>(json!({ "created": item.name, "by": user.as_str() }))
        });
    app.post("/items").handler(&create_item)?;

    Ok(app)
}

#[tokio::main]
async fn main() -> route_injector::Result<()> {
    let app = build_app()?;

    #[cfg(feature = "logging")]
    route_injector::logging::init_from_settings(app.settings());

    println!("=== Route Injector Demo ===\n");
    for route in app.routes() {
        let params = route.signature().names().collect::<Vec<_>>();
        println!("{route} public parameters: {params:?}");
    }

    let requests = [
        Request::builder()
            .method(Method::POST)
            .uri("/items")
            .header("x-token", "secret")
            .json(&json!({"name": "widget"}))
            .build()?,
        Request::builder()
            .method(Method::POST)
            .uri("/items")
            .header("x-token", "wrong")
            .json(&json!({"name": "gadget"}))
            .build()?,
        Request::builder().method(Method::POST).uri("/items").build()?,
        Request::builder().uri("/items?limit=5").build()?,
        Request::builder().uri("/missing").build()?,
    ];

    for request in requests {
        let label = format!("{} {}", request.method(), request.path());
        let response = app.dispatch(request, Arguments::new()).await;
        println!("\n{label} -> {}\n  {}", response.status(), response.body());
    }

    Ok(())
}
