//! schoold library target.
//!
//! Exposes the router, state and store for the binary and for the
//! integration tests under `tests/`.

pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod marks;
