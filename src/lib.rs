//! Jukebox Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod payment;
pub mod playout;
pub mod search;
pub mod server;
pub mod sqlite_persistence;
pub mod store;

// Re-export commonly used types for convenience
pub use playout::{PlayoutHandle, PlayoutScheduler};
pub use server::{make_app, run_server, RequestsLoggingLevel};
pub use store::{JukeboxStore, SqliteJukeboxStore};
