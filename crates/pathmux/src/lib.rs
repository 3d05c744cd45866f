//! Method-aware HTTP multiplexer built on the `pathmux-router` trie.
//!
//! [`Mux`] maps method and path to handlers and answers 404/405 itself.
//! [`RouteTable`] builds a mux of canned responses from YAML, which the
//! `pathmux` binary serves.

pub mod config;
pub mod handler;
pub mod mux;
pub mod reload;
pub mod server;

pub use config::{ConfigError, RouteTable};
pub use handler::{handler_fn, BoxedHandler, Handler, HandlerFn};
pub use mux::{
    path_var, path_vars, Dispatch, MatchedPattern, MethodsHandler, Mux, MuxConfig, MuxError,
    PathVars,
};
pub use pathmux_router::Params;
pub use reload::{reload_routes, RouteWatcher, SharedMux};
