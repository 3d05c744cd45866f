//! Method-aware request multiplexer.
//!
//! Each registered pattern holds a [`MethodsHandler`]: handlers keyed by
//! upper-cased HTTP method, with `""` standing for any method. A request is
//! resolved in two steps, path first through the routing tree and method
//! second, which keeps 404 and 405 distinguishable.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http_body_util::Full;
use hyper::{Method, Request, Response, StatusCode};
use pathmux_router::{InsertError, Params, Tree};
use thiserror::Error;

use crate::handler::Handler;

/// Errors returned by [`Mux::handle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    /// The method is already registered for this pattern.
    #[error("already registered: {} {pattern}", method_label(.method))]
    Conflict { method: String, pattern: String },

    #[error(transparent)]
    Insert(#[from] InsertError),
}

/// Display name for a registered method; the catch-all is shown as `*`.
pub fn method_label(method: &str) -> &str {
    if method.is_empty() {
        "*"
    } else {
        method
    }
}

/// Handlers for one pattern, keyed by method.
#[derive(Debug, Clone)]
pub struct MethodsHandler<H> {
    handlers: BTreeMap<String, H>,
}

impl<H> Default for MethodsHandler<H> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<H> MethodsHandler<H> {
    /// The handler for `method`, falling back to the catch-all.
    pub fn get(&self, method: &str) -> Option<&H> {
        self.handlers
            .get(method)
            .or_else(|| self.handlers.get(""))
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered methods in sorted order, catch-all excluded.
    pub fn allowed(&self) -> Vec<String> {
        self.handlers
            .keys()
            .filter(|m| !m.is_empty())
            .cloned()
            .collect()
    }

    /// Registered methods in sorted order; the catch-all comes first as `""`.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    fn insert(&mut self, method: String, handler: H) {
        self.handlers.insert(method, handler);
    }
}

/// Mux behavior switches.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Answer `OPTIONS` with `200` and an `Allow` header when no handler
    /// is registered for it (default: true).
    pub auto_options: bool,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self { auto_options: true }
    }
}

impl MuxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_options(mut self, enabled: bool) -> Self {
        self.auto_options = enabled;
        self
    }
}

/// Outcome of resolving a method and path.
#[derive(Debug)]
pub enum Dispatch<'a, H> {
    /// Matched a path and method.
    Found {
        handler: &'a H,
        pattern: &'a str,
        params: Params,
    },
    /// Path matched but method is not allowed.
    MethodNotAllowed { pattern: &'a str, allowed: Vec<String> },
    /// No path matched.
    NotFound,
}

/// Path variables of the matched route, stored in the request extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars(pub Params);

/// The pattern that handled a request, stored in the response extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPattern(pub String);

/// All path variables bound for this request.
pub fn path_vars<B>(req: &Request<B>) -> Option<&Params> {
    req.extensions().get::<PathVars>().map(|vars| &vars.0)
}

/// A single path variable bound for this request.
pub fn path_var<'r, B>(req: &'r Request<B>, name: &str) -> Option<&'r str> {
    path_vars(req)?.get(name)
}

/// Method-aware multiplexer over a routing [`Tree`].
#[derive(Debug)]
pub struct Mux<H> {
    tree: Tree<MethodsHandler<H>>,
    not_found: Option<H>,
    config: MuxConfig,
}

impl<H> Default for Mux<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Mux<H> {
    pub fn new() -> Self {
        Self::with_config(MuxConfig::default())
    }

    pub fn with_config(config: MuxConfig) -> Self {
        Self {
            tree: Tree::new(),
            not_found: None,
            config,
        }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Register `handler` for `method` on `pattern`.
    ///
    /// An empty method registers a catch-all. Methods are compared
    /// case-insensitively. Registering the same method twice on a pattern
    /// is an error and leaves the existing handler in place.
    pub fn handle(&mut self, method: &str, pattern: &str, handler: H) -> Result<(), MuxError> {
        let method = method.to_ascii_uppercase();
        let (_, methods) = self.tree.register_with(pattern, MethodsHandler::default)?;
        if methods.contains(&method) {
            return Err(MuxError::Conflict {
                method,
                pattern: pattern.to_string(),
            });
        }
        methods.insert(method, handler);
        Ok(())
    }

    /// Handler invoked when no pattern matches the path.
    pub fn set_not_found(&mut self, handler: H) {
        self.not_found = Some(handler);
    }

    /// Resolve a request method and path.
    pub fn dispatch(&self, method: &str, path: &str) -> Dispatch<'_, H> {
        let Some(m) = self.tree.lookup(path) else {
            return Dispatch::NotFound;
        };
        match m.value.get(&method.to_ascii_uppercase()) {
            Some(handler) => Dispatch::Found {
                handler,
                pattern: m.pattern,
                params: m.params,
            },
            None => Dispatch::MethodNotAllowed {
                pattern: m.pattern,
                allowed: m.value.allowed(),
            },
        }
    }

    /// Whether a [`Dispatch::MethodNotAllowed`] for `method` is answered
    /// with the automatic `OPTIONS` reply instead of a 405.
    pub fn answers_options(&self, method: &str) -> bool {
        self.config.auto_options && method.eq_ignore_ascii_case(Method::OPTIONS.as_str())
    }

    /// Registered patterns with their method tables, in match order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &MethodsHandler<H>)> {
        self.tree.routes()
    }
}

impl<H: Handler> Mux<H> {
    /// Dispatch a request and produce its response.
    ///
    /// Matched requests get their [`PathVars`] attached before the handler
    /// runs; the response carries the [`MatchedPattern`].
    pub async fn serve(&self, mut req: Request<Bytes>) -> Response<Full<Bytes>> {
        let path = req.uri().path().to_string();
        let auto_options = self.answers_options(req.method().as_str());

        match self.dispatch(req.method().as_str(), &path) {
            Dispatch::Found {
                handler,
                pattern,
                params,
            } => {
                let pattern = pattern.to_string();
                req.extensions_mut().insert(PathVars(params));
                let mut resp = handler.call(req).await;
                resp.extensions_mut().insert(MatchedPattern(pattern));
                resp
            }
            Dispatch::MethodNotAllowed { pattern, allowed } => {
                let mut resp = if auto_options {
                    options_response(&allowed)
                } else {
                    method_not_allowed_response(&allowed)
                };
                resp.extensions_mut()
                    .insert(MatchedPattern(pattern.to_string()));
                resp
            }
            Dispatch::NotFound => match &self.not_found {
                Some(handler) => handler.call(req).await,
                None => not_found_response(),
            },
        }
    }
}

/// Build a JSON response with the given status.
pub(crate) fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Build a 404 Not Found response.
fn not_found_response() -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, r#"{"error":"not found"}"#)
}

/// Build a 405 Method Not Allowed response.
fn method_not_allowed_response(allowed: &[String]) -> Response<Full<Bytes>> {
    let mut resp = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        r#"{"error":"method not allowed"}"#,
    );
    set_allow(&mut resp, allowed);
    resp
}

/// Build the automatic answer to an `OPTIONS` request.
fn options_response(allowed: &[String]) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    set_allow(&mut resp, allowed);
    resp
}

fn set_allow(resp: &mut Response<Full<Bytes>>, allowed: &[String]) {
    if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
        resp.headers_mut().insert(ALLOW, value);
    }
}
