//! Shared constants for end-to-end tests
//!
//! When test credentials or timings change, update only this file.
#![allow(dead_code)]

// ============================================================================
// Admin Credentials
// ============================================================================

pub const ADMIN_USER: &str = "dono";

pub const ADMIN_PASS: &str = "senha-do-bar";

// ============================================================================
// Playout
// ============================================================================

/// Inactivity delay the test scheduler uses before filling from the catalog.
pub const INACTIVITY_DELAY_MS: u64 = 300;

/// Items allowed in a single order.
pub const MAX_ITEMS_PER_ORDER: usize = 3;

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Default request timeout for HTTP client (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// How long to wait for a WebSocket message (milliseconds)
pub const WS_MESSAGE_TIMEOUT_MS: u64 = 3000;
