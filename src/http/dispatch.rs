//! Request lifecycle orchestration.
//!
//! # Data Flow
//! ```text
//! RECEIVED        adapt request, new token following the server signal
//!   → PREPROCESSING  all preprocessors concurrently
//!       ├─ failure / abort      → REJECTED
//!       └─ context resolved     → (cache hit, skip routing)
//!   → ROUTING        static prefix? → route match? → static file? → 404
//!   → HANDLING       handler raced against the token
//!   → POSTPROCESSING sequential, non-redirect responses only
//!   → TRANSMITTING   transmit.rs
//! ```
//!
//! Every failure before transmission is routed into the context's settlement
//! slot; nothing escapes this module as a Rust error.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderValue, Method, StatusCode};
use futures_util::FutureExt;
use url::Url;

use crate::http::abort::{AbortController, AbortSignal};
use crate::http::context::{Context, Reply};
use crate::http::cookies::CookieMap;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::transmit::{abort_response, transmit, HostResponse};
use crate::middleware::pipeline::Pipeline;
use crate::observability::metrics;
use crate::routing::{HandlerRef, RouteTable, StaticFiles};

/// Everything needed to serve a request. Shared by all connections.
pub struct Engine {
    pub(crate) routes: RouteTable,
    pub(crate) pipeline: Pipeline,
    pub(crate) statics: Option<StaticFiles>,
    pub(crate) static_paths: Vec<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_decoded_body: usize,
    pub(crate) signal: AbortSignal,
}

impl Engine {
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Serve one request from the host stack.
    pub async fn dispatch(
        self: Arc<Self>,
        request: axum::http::Request<axum::body::Body>,
        peer: SocketAddr,
    ) -> HostResponse {
        let start = Instant::now();
        let method = request.method().clone();

        let controller = AbortController::new();
        controller.follow(&self.signal);
        let guard = controller.abort_on_drop(HttpError::aborted("Connection closed"));

        let request = match Request::adapt(request, &controller, self.timeout, self.max_decoded_body) {
            Ok(request) => request,
            Err(err) => {
                guard.disarm();
                metrics::record_request(method.as_str(), err.status().as_u16(), start);
                return abort_response(&err);
            }
        };
        let url = request.url().clone();

        let found = self.routes.find(&url);
        let params = found
            .as_ref()
            .map(|found| found.params.clone())
            .unwrap_or_default();
        let context = Context::new(
            url.clone(),
            params,
            CookieMap::parse(request.headers()),
            peer.ip(),
            controller,
        );

        if let Err(err) = self.pipeline.preprocess(&request, &context).await {
            context.reject(err);
        }
        context.freeze();

        if !context.is_settled() {
            let outcome = self.handle(&request, &context, found.map(|f| f.handler.clone())).await;
            match outcome {
                Ok(reply) => {
                    context.resolve(reply);
                }
                Err(err) => {
                    context.reject(err);
                }
            }
        }

        let outcome = context
            .take_outcome()
            .unwrap_or_else(|| Err(HttpError::internal("request finished without settling")));
        let signal = context.signal();

        let response = match outcome {
            Ok(Reply::Response(mut response)) => {
                let transforms = self.pipeline.postprocess(&mut response, &request, &context).await;
                record(&method, response.status(), &signal, start);
                return transmit(response, transforms, &signal, guard);
            }
            Ok(Reply::Redirect(location)) => redirect(&location),
            // `reject` aborted the token, so the transmitter writes the abort reason.
            Err(err) => Response::from(err),
        };
        record(&method, response.status(), &signal, start);
        transmit(response, Vec::new(), &signal, guard)
    }

    /// Produce the reply for an unsettled request.
    async fn handle(
        &self,
        request: &Request,
        context: &Context,
        handler: Option<HandlerRef>,
    ) -> Result<Reply, HttpError> {
        let pathname = request.url().path();

        if let Some(statics) = &self.statics {
            if self.static_paths.iter().any(|prefix| pathname.starts_with(prefix.as_str())) {
                return match statics.serve(pathname).await? {
                    Some(response) => Ok(response.into()),
                    None => Err(not_found(request.url())),
                };
            }
        }

        if let Some(handler) = handler {
            let handler = handler.resolve().await?;
            let signal = context.signal();
            // Synchronous handlers run inside `call`, so the call itself is deferred into the guarded future.
            let reply = AssertUnwindSafe(async { handler.call(request, context).await }).catch_unwind();
            return tokio::select! {
                biased;
                reason = signal.aborted() => Err(reason),
                reply = reply => reply.unwrap_or_else(|panic| Err(panicked(panic))),
            };
        }

        if let Some(statics) = &self.statics {
            if let Some(response) = statics.serve(pathname).await? {
                return Ok(response.into());
            }
        }
        Err(not_found(request.url()))
    }
}

/// Record the request under the status the client will actually see.
fn record(method: &Method, status: StatusCode, signal: &AbortSignal, start: Instant) {
    let status = transmitted_status(status, signal);
    if let Some(reason) = signal.reason() {
        metrics::record_aborted(reason.name());
    }
    metrics::record_request(method.as_str(), status.as_u16(), start);
}

/// An aborted token replaces the response with its reason at transmission.
fn transmitted_status(status: StatusCode, signal: &AbortSignal) -> StatusCode {
    signal.reason().map_or(status, |reason| reason.status())
}

fn panicked(panic: Box<dyn Any + Send>) -> HttpError {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    HttpError::internal(format!("handler panicked: {detail}"))
}

fn not_found(url: &Url) -> HttpError {
    HttpError::not_found(format!("{url} not found."))
}

fn redirect(location: &Url) -> Response {
    match HeaderValue::from_str(location.as_str()) {
        Ok(value) => {
            let mut response = Response::with_status(StatusCode::FOUND);
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => HttpError::internal("invalid redirect target").to_response(),
    }
}
