//! Network acquisition primitives.
//!
//! The fetch client is the only path network source adapters use to reach
//! the outside world; it owns throttling, identity rotation, proxy choice and
//! the terminal-versus-transient failure split.

pub mod http_client;

pub use http_client::{FetchClient, FetchResponse, RequestOptions};
