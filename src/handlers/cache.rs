//! Cache inspection: `GET ?id=<key>` returns an entry, `DELETE` clears everything.

use axum::http::StatusCode;

use crate::cache::ResponseCache;
use crate::http::{Context, HttpError, Reply, Request, Response};
use crate::routing::Methods;

pub fn cache_admin(cache: ResponseCache) -> Methods {
    let entries = cache.clone();
    Methods::new()
        .get(move |_: &Request, context: &Context| -> Result<Reply, HttpError> {
            let Some(id) = context.search_param("id") else {
                return Err(HttpError::bad_request("Request does not have required id."));
            };
            entries
                .lookup(&id)
                .map(Reply::from)
                .ok_or_else(|| HttpError::not_found(format!("Cache item with id \"{id}\" not found.")))
        })
        .delete(move |_: &Request, _: &Context| -> Result<Reply, HttpError> {
            cache.clear();
            Ok(Response::with_status(StatusCode::NO_CONTENT).into())
        })
}
