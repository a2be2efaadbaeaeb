//! # Playvault
//!
//! Version control and offline sync for SQL playgrounds. A playground is a
//! hash-identified set of files whose history is a chain of immutable commits.
//! The server side exposes commits, diffs, forks and stars over HTTP; the
//! client side keeps a local offline queue and a hydration cache so a
//! workspace can be restored instantly and keep working without a network.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use playvault::server::{AppState, create_router};
//! use playvault::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/playvault.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), None));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): builds the `playvault` binary.
//! - `client` (default): the sync client (`client` module), built on reqwest.

pub mod auth;
#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
pub mod vcs;
