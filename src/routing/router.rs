//! Ordered route table.

use std::collections::HashMap;

use url::Url;

use crate::routing::handler::HandlerRef;
use crate::routing::pattern::{PatternError, RoutePattern};

#[derive(Debug, Clone)]
pub struct Route {
    pattern: RoutePattern,
    handler: HandlerRef,
}

impl Route {
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub pattern: &'a RoutePattern,
    pub handler: &'a HandlerRef,
    pub params: HashMap<String, String>,
}

/// Routes in insertion order. The first matching pattern wins; specificity is not considered.
#[derive(Debug, Clone)]
pub struct RouteTable {
    base: String,
    routes: Vec<Route>,
}

impl RouteTable {
    /// An empty table resolving relative patterns against `base` (a pathname).
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            routes: Vec::new(),
        }
    }

    pub fn insert(&mut self, pattern: &str, handler: HandlerRef) -> Result<(), PatternError> {
        let pattern = RoutePattern::parse(pattern, &self.base)?;
        tracing::debug!(pattern = %pattern, "Route registered");
        self.routes.push(Route { pattern, handler });
        Ok(())
    }

    pub fn find(&self, url: &Url) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            route.pattern.exec(url).map(|params| RouteMatch {
                pattern: &route.pattern,
                handler: &route.handler,
                params,
            })
        })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new("/")
    }
}
