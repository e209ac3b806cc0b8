//! Per-request context shared by middleware and handlers.
//!
//! # Responsibilities
//! - Hold derived request data (URL, search params, route params, cookies, client IP)
//! - Own the request's [`AbortController`]
//! - Settle the request exactly once (`resolve` / `reject`)
//! - Carry a typed state bag that is frozen once preprocessing ends

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use axum::http::Extensions;
use url::Url;

use crate::http::abort::{AbortController, AbortSignal};
use crate::http::cookies::CookieMap;
use crate::http::error::HttpError;
use crate::http::response::Response;

/// A successful settlement.
#[derive(Debug)]
pub enum Reply {
    Response(Response),
    Redirect(Url),
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<Url> for Reply {
    fn from(url: Url) -> Self {
        Reply::Redirect(url)
    }
}

pub type Outcome = Result<Reply, HttpError>;

#[derive(Default)]
struct Settlement {
    settled: AtomicBool,
    outcome: Mutex<Option<Outcome>>,
}

impl Settlement {
    /// Store `outcome` if nothing was stored before.
    fn settle(&self, outcome: Outcome) -> bool {
        if self.settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut slot = match self.outcome.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(outcome);
        true
    }

    fn take(&self) -> Option<Outcome> {
        match self.outcome.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

pub struct Context {
    url: Url,
    params: HashMap<String, String>,
    cookies: CookieMap,
    ip: IpAddr,
    controller: AbortController,
    settlement: Settlement,
    frozen: AtomicBool,
    state: RwLock<Extensions>,
}

impl Context {
    pub fn new(
        url: Url,
        params: HashMap<String, String>,
        cookies: CookieMap,
        ip: IpAddr,
        controller: AbortController,
    ) -> Self {
        Self {
            url,
            params,
            cookies,
            ip,
            controller,
            settlement: Settlement::default(),
            frozen: AtomicBool::new(false),
            state: RwLock::new(Extensions::new()),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// First value of a query parameter.
    pub fn search_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn search_params(&self) -> Vec<(String, String)> {
        self.url.query_pairs().into_owned().collect()
    }

    /// Parameters captured by the matched route pattern.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &CookieMap {
        &self.cookies
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn signal(&self) -> AbortSignal {
        self.controller.signal()
    }

    /// Abort the request token. The first reason wins.
    pub fn abort(&self, reason: HttpError) -> bool {
        self.controller.abort(reason)
    }

    /// Settle successfully. No effect if already settled.
    pub fn resolve(&self, reply: impl Into<Reply>) -> bool {
        self.settlement.settle(Ok(reply.into()))
    }

    /// Settle with an error and abort the token so in-flight work stops.
    /// No effect if already settled.
    pub fn reject(&self, err: HttpError) -> bool {
        if !self.settlement.settle(Err(err.clone())) {
            return false;
        }
        self.controller.abort(err);
        true
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.settled.load(Ordering::Acquire)
    }

    pub(crate) fn take_outcome(&self) -> Option<Outcome> {
        self.settlement.take()
    }

    /// Store a value for later middleware or the handler.
    pub fn insert<T>(&self, value: T) -> Result<(), HttpError>
    where
        T: Clone + Send + Sync + 'static,
    {
        if self.is_frozen() {
            return Err(HttpError::internal(
                "context state cannot change after preprocessing",
            ));
        }
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.insert(value);
        Ok(())
    }

    pub fn get<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let state = match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.get::<T>().cloned()
    }

    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("url", &self.url.as_str())
            .field("params", &self.params)
            .field("ip", &self.ip)
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}
