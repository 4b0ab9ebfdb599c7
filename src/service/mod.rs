//! HTTP front door.
//!
//! `server.rs` owns the listener, static files and middleware; `api.rs`
//! owns the JSON routes and maps `BuildError`s to responses.

pub mod api;
pub mod server;
