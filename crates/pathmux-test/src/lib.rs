//! Test harnesses for pathmux.
//!
//! Provides `TestServer`, which boots the `pathmux` binary on a free port,
//! and the CLI regression suite.

#[cfg(test)]
pub mod cli;
pub mod server;

pub use server::{fixture, fixtures, TestError, TestServer};
