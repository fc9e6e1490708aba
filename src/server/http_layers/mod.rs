mod admin_auth;
mod requests_logging;

pub use admin_auth::{is_admin_authorized, require_admin, unauthorized_response};
pub use requests_logging::{log_requests, RequestsLoggingLevel};
