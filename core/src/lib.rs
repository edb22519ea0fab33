//! Root of the `vizor-core` library.
//!
//! Client-side state layer for the Vizor analysis service: session
//! lifecycle against the auth endpoints, the analysis request lifecycle
//! with durable caching, and broadcast of state changes to subscribers in
//! this process and in sibling processes sharing the same state directory.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the appropriate abstraction (e.g.,
// the CLI renderer or the tracing stack).
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod cancel;
pub mod client;
pub mod config;
pub mod session;
pub mod storage;
pub mod sync;
pub mod watcher;

pub use cancel::Cancelled;
pub use cancel::OrCancel;
pub use client::AnalysisError;
pub use client::ApiClient;
pub use client::AuthError;
pub use config::Config;
pub use config::vizor_home;
pub use session::SessionStore;
pub use storage::LocalStore;
pub use storage::StorageError;
pub use sync::AnalysisManager;
pub use watcher::StorageWatcher;

// Re-export the protocol crate so callers can name wire types without a
// separate dependency edge.
pub use vizor_protocol as protocol;
