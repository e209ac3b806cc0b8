//! Route key → handler registry.
//!
//! Configuration refers to handlers by key (`"tasks"`, `"echo"`, …). The
//! registry maps each key to a lazily built handler shared by every route
//! that mounts it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::http::error::HttpError;
use crate::routing::handler::{Handler, HandlerRef};

#[derive(Clone, Default)]
pub struct Registry {
    handlers: HashMap<String, HandlerRef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory run on the first request that reaches `key`.
    pub fn register<F, Fut>(&mut self, key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Handler>, HttpError>> + Send + 'static,
    {
        self.handlers.insert(key.into(), HandlerRef::lazy(factory));
        self
    }

    /// Register an already constructed handler.
    pub fn register_handler(&mut self, key: impl Into<String>, handler: impl Handler + 'static) -> &mut Self {
        self.handlers.insert(key.into(), HandlerRef::direct(handler));
        self
    }

    pub fn get(&self, key: &str) -> Option<HandlerRef> {
        self.handlers.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}
