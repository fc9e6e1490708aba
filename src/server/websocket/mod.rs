//! WebSocket session broadcaster: connected displays, admins and viewers.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::{ConnectionManager, SessionRole};
pub use handler::ws_handler;
