//! Route handlers and lazily resolved handler references.

use std::future::Future;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use futures_util::future::{self, BoxFuture, FutureExt};
use tokio::sync::OnceCell;

use crate::http::context::{Context, Reply};
use crate::http::error::{ErrorKind, HttpError};
use crate::http::request::Request;

/// Produces the reply for a matched route.
///
/// Returning anything other than a [`Reply`] is impossible by construction;
/// unexpected failures should be surfaced as [`HttpError::contract`].
pub trait Handler: Send + Sync {
    fn call<'a>(&'a self, request: &'a Request, context: &'a Context)
        -> BoxFuture<'a, Result<Reply, HttpError>>;
}

impl<F> Handler for F
where
    F: Fn(&Request, &Context) -> Result<Reply, HttpError> + Send + Sync,
{
    fn call<'a>(
        &'a self,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<Reply, HttpError>> {
        future::ready(self(request, context)).boxed()
    }
}

/// Adapter for async closures: `handler_fn(|req, ctx| async move { … }.boxed())`.
pub struct HandlerFn<F>(F);

pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a Request, &'a Context) -> BoxFuture<'a, Result<Reply, HttpError>>
        + Send
        + Sync,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a Request, &'a Context) -> BoxFuture<'a, Result<Reply, HttpError>>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<Reply, HttpError>> {
        (self.0)(request, context)
    }
}

/// Async constructor for a handler resolved on first use.
pub type HandlerFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Handler>, HttpError>> + Send + Sync>;

/// A handler known up front, or one built on first request and memoized.
#[derive(Clone)]
pub enum HandlerRef {
    Direct(Arc<dyn Handler>),
    Lazy {
        factory: HandlerFactory,
        cell: Arc<OnceCell<Arc<dyn Handler>>>,
    },
}

impl HandlerRef {
    pub fn direct(handler: impl Handler + 'static) -> Self {
        HandlerRef::Direct(Arc::new(handler))
    }

    pub fn lazy<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Handler>, HttpError>> + Send + 'static,
    {
        HandlerRef::Lazy {
            factory: Arc::new(move || factory().boxed()),
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Get the handler, building it if needed. A failed build is retried next time.
    pub async fn resolve(&self) -> Result<Arc<dyn Handler>, HttpError> {
        match self {
            HandlerRef::Direct(handler) => Ok(Arc::clone(handler)),
            HandlerRef::Lazy { factory, cell } => {
                let handler = cell
                    .get_or_try_init(|| async {
                        tracing::debug!("Resolving lazy route handler");
                        factory().await
                    })
                    .await?;
                Ok(Arc::clone(handler))
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        match self {
            HandlerRef::Direct(_) => true,
            HandlerRef::Lazy { cell, .. } => cell.initialized(),
        }
    }
}

impl std::fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerRef::Direct(_) => f.write_str("HandlerRef::Direct"),
            HandlerRef::Lazy { cell, .. } => f
                .debug_struct("HandlerRef::Lazy")
                .field("resolved", &cell.initialized())
                .finish(),
        }
    }
}

/// Dispatch by HTTP method.
///
/// Unknown methods get `405` with an `Allow` header. Failures that are not
/// client errors or aborts are replaced by the generic 500.
#[derive(Clone, Default)]
pub struct Methods {
    routes: Vec<(Method, Arc<dyn Handler>)>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: Method, handler: impl Handler + 'static) -> Self {
        self.routes.push((method, Arc::new(handler)));
        self
    }

    pub fn get(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::GET, handler)
    }

    pub fn post(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::POST, handler)
    }

    pub fn put(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::PUT, handler)
    }

    pub fn patch(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::PATCH, handler)
    }

    pub fn delete(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::DELETE, handler)
    }

    fn allow(&self) -> String {
        self.routes
            .iter()
            .map(|(method, _)| method.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Handler for Methods {
    fn call<'a>(
        &'a self,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<Reply, HttpError>> {
        async move {
            let Some((_, handler)) = self.routes.iter().find(|(m, _)| m == request.method()) else {
                let allow = HeaderValue::from_str(&self.allow())
                    .map_err(|_| HttpError::internal("invalid Allow header"))?;
                return Err(HttpError::new(
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("Method {} not allowed", request.method()),
                )
                .with_header(header::ALLOW, allow));
            };
            handler.call(request, context).await.map_err(|err| match err.kind() {
                ErrorKind::Aggregate | ErrorKind::Transmission => HttpError::contract(err),
                _ => err,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::abort::AbortController;
    use crate::http::context::tests::context;
    use crate::http::response::Response;
    use axum::http::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    fn request(method: Method) -> Request {
        Request::new(
            method,
            Url::parse("http://localhost/tasks").unwrap(),
            HeaderMap::new(),
            None,
            AbortController::new().signal(),
        )
    }

    fn ok(_: &Request, _: &Context) -> Result<Reply, HttpError> {
        Ok(Response::text("ok").into())
    }

    #[tokio::test]
    async fn unknown_method_is_405_with_allow() {
        let methods = Methods::new().get(ok).post(ok);
        let ctx = context("http://localhost/tasks");
        let err = methods.call(&request(Method::PUT), &ctx).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.headers()[header::ALLOW], "GET, POST");

        assert!(methods.call(&request(Method::POST), &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn lazy_handlers_resolve_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let handler = HandlerRef::lazy(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(ok) as Arc<dyn Handler>)
            }
        });
        assert!(!handler.is_resolved());
        handler.resolve().await.unwrap();
        handler.clone().resolve().await.unwrap();
        assert!(handler.is_resolved());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_resolution_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let handler = HandlerRef::lazy(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(HttpError::internal("module missing"))
                } else {
                    Ok(Arc::new(ok) as Arc<dyn Handler>)
                }
            }
        });
        assert!(handler.resolve().await.is_err());
        assert!(handler.resolve().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn async_closures_via_handler_fn() {
        let handler = handler_fn(|request, _| {
            async move { Ok(Response::text(request.method().to_string()).into()) }.boxed()
        });
        let ctx = context("http://localhost/tasks");
        match handler.call(&request(Method::GET), &ctx).await.unwrap() {
            Reply::Response(mut response) => {
                let body = response.take_body().collect().await.unwrap();
                assert_eq!(body, "GET");
            }
            Reply::Redirect(_) => panic!("expected a response"),
        }
    }
}
