//! Demo route handlers mounted by the `quay` binary.
//!
//! | key       | handler                          |
//! |-----------|----------------------------------|
//! | `home`    | HTML page describing the request |
//! | `favicon` | random-colour SVG                |
//! | `tasks`   | in-memory task CRUD              |
//! | `echo`    | request metadata as JSON         |
//! | `socket`  | WebSocket echo                   |
//! | `cache`   | response cache inspection        |
//! | `slow`    | delayed gzip stream              |

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::cache::ResponseCache;
use crate::http::{Context, Request};
use crate::routing::{Handler, Registry};

pub mod cache;
pub mod echo;
pub mod favicon;
pub mod home;
pub mod slow;
pub mod socket;
pub mod tasks;

/// Registry with every demo handler. The task list is built on first use.
pub fn registry(cache: ResponseCache, heartbeat: Option<Duration>) -> Registry {
    let mut registry = Registry::new();
    registry
        .register_handler("home", home::home)
        .register_handler("favicon", favicon::favicon)
        .register_handler("echo", echo::Echo)
        .register_handler("slow", slow::slow)
        .register_handler("cache", cache::cache_admin(cache))
        .register("tasks", || async {
            Ok(Arc::new(tasks::Tasks::new()) as Arc<dyn Handler>)
        });
    let socket = socket::Socket::new(heartbeat);
    registry.register_handler(
        "socket",
        move |request: &Request, context: &Context| socket.handle(request, context),
    );
    registry
}

/// Request metadata shared by `home` and `echo`.
pub(crate) fn describe(request: &Request, context: &Context) -> Map<String, Value> {
    let mut headers = Map::new();
    for name in request.headers().keys() {
        let values: Vec<&str> = request
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        headers.insert(name.as_str().to_string(), Value::from(values.join(", ")));
    }

    let mut info = Map::new();
    info.insert("url".into(), Value::from(request.url().as_str()));
    info.insert("method".into(), Value::from(request.method().as_str()));
    info.insert("headers".into(), Value::Object(headers));
    info.insert("mode".into(), Value::from(request.mode()));
    info.insert("destination".into(), Value::from(request.destination()));
    info.insert(
        "referrer".into(),
        Value::from(request.referrer().map_or("about:client", |url| url.as_str())),
    );
    info.insert("credentials".into(), Value::from(request.credentials().as_str()));
    info.insert("cache".into(), Value::from(request.cache().as_str()));
    info.insert("priority".into(), Value::from(request.priority().as_str()));
    info.insert(
        "requestCookies".into(),
        serde_json::to_value(context.cookies()).unwrap_or(Value::Null),
    );
    info.insert("ip".into(), Value::from(context.ip().to_string()));
    info
}
