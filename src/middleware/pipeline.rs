//! Preprocessor and postprocessor chains.
//!
//! # Design Decisions
//! - Preprocessors run concurrently and every failure is collected
//! - An abort on the request token outranks any individual failure
//! - Postprocessors run sequentially in registration order and are best-effort

use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::http::context::Context;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::middleware::transform::BodyTransform;

/// Runs before routing. May fail, abort the token, or settle the context directly.
pub trait Preprocessor: Send + Sync {
    fn preprocess<'a>(
        &'a self,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<(), HttpError>>;
}

impl<F> Preprocessor for F
where
    F: Fn(&Request, &Context) -> Result<(), HttpError> + Send + Sync,
{
    fn preprocess<'a>(
        &'a self,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        future::ready(self(request, context)).boxed()
    }
}

/// What a postprocessor hands back: optionally a transform for the outgoing body.
pub type PostprocessResult = Result<Option<Box<dyn BodyTransform>>, HttpError>;

/// Runs on a produced response before transmission. Never runs for redirects.
pub trait Postprocessor: Send + Sync {
    fn postprocess<'a>(
        &'a self,
        response: &'a mut Response,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, PostprocessResult>;
}

impl<F> Postprocessor for F
where
    F: Fn(&mut Response, &Request, &Context) -> PostprocessResult + Send + Sync,
{
    fn postprocess<'a>(
        &'a self,
        response: &'a mut Response,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, PostprocessResult> {
        future::ready(self(response, request, context)).boxed()
    }
}

/// The ordered middleware lists, built once at startup.
#[derive(Clone, Default)]
pub struct Pipeline {
    preprocessors: Vec<Arc<dyn Preprocessor>>,
    postprocessors: Vec<Arc<dyn Postprocessor>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_preprocessor(&mut self, preprocessor: Arc<dyn Preprocessor>) {
        self.preprocessors.push(preprocessor);
    }

    pub fn push_postprocessor(&mut self, postprocessor: Arc<dyn Postprocessor>) {
        self.postprocessors.push(postprocessor);
    }

    pub fn preprocessor_count(&self) -> usize {
        self.preprocessors.len()
    }

    pub fn postprocessor_count(&self) -> usize {
        self.postprocessors.len()
    }

    /// Run every preprocessor to completion, then decide the combined outcome.
    pub async fn preprocess(&self, request: &Request, context: &Context) -> Result<(), HttpError> {
        let results = future::join_all(
            self.preprocessors
                .iter()
                .map(|p| p.preprocess(request, context)),
        )
        .await;
        let mut errors: Vec<HttpError> = results.into_iter().filter_map(Result::err).collect();

        if let Some(reason) = context.signal().reason() {
            return Err(reason);
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(HttpError::aggregate(errors)),
        }
    }

    /// Run every postprocessor in order, collecting the transforms they return.
    pub async fn postprocess(
        &self,
        response: &mut Response,
        request: &Request,
        context: &Context,
    ) -> Vec<Box<dyn BodyTransform>> {
        let mut transforms = Vec::new();
        for postprocessor in &self.postprocessors {
            match postprocessor.postprocess(response, request, context).await {
                Ok(Some(transform)) => transforms.push(transform),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        url = %request.url(),
                        error = %err,
                        "Postprocessor failed"
                    );
                }
            }
        }
        transforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::abort::AbortController;
    use crate::http::context::tests::context;
    use crate::http::error::ErrorKind;
    use axum::http::{HeaderMap, Method, StatusCode};
    use url::Url;

    fn request() -> Request {
        Request::new(
            Method::GET,
            Url::parse("http://localhost/?secure=1").unwrap(),
            HeaderMap::new(),
            None,
            AbortController::new().signal(),
        )
    }

    #[tokio::test]
    async fn abort_reason_outranks_other_failures() {
        let mut pipeline = Pipeline::new();
        pipeline.push_preprocessor(Arc::new(|_: &Request, ctx: &Context| -> Result<(), HttpError> {
            ctx.abort(HttpError::new(StatusCode::UNAUTHORIZED, "Missing Authorization header"));
            Ok(())
        }));
        pipeline.push_preprocessor(Arc::new(|_: &Request, _: &Context| -> Result<(), HttpError> {
            Err(HttpError::bad_request("logger exploded"))
        }));

        let ctx = context("http://localhost/?secure=1");
        let err = pipeline.preprocess(&request(), &ctx).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn several_failures_aggregate() {
        let mut pipeline = Pipeline::new();
        for message in ["one", "two"] {
            pipeline.push_preprocessor(Arc::new(move |_: &Request, _: &Context| -> Result<(), HttpError> {
                Err(HttpError::bad_request(message))
            }));
        }
        let ctx = context("http://localhost/");
        let err = pipeline.preprocess(&request(), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Aggregate);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn postprocessor_failures_are_not_fatal() {
        let mut pipeline = Pipeline::new();
        pipeline.push_postprocessor(Arc::new(
            |_: &mut Response, _: &Request, _: &Context| -> PostprocessResult {
                Err(HttpError::internal("boom"))
            },
        ));
        pipeline.push_postprocessor(Arc::new(
            |response: &mut Response, _: &Request, _: &Context| -> PostprocessResult {
                response.headers_mut().insert("x-seen", "1".parse().unwrap());
                Ok(None)
            },
        ));
        let ctx = context("http://localhost/");
        let mut response = Response::text("ok");
        let transforms = pipeline.postprocess(&mut response, &request(), &ctx).await;
        assert!(transforms.is_empty());
        assert_eq!(response.headers()["x-seen"], "1");
    }
}
