use super::RequestsLoggingLevel;
use crate::config::AdminCredentials;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub metrics_port: u16,
    pub frontend_dir_path: Option<String>,
    pub admin: AdminCredentials,
    /// Results returned to admins searching over the WebSocket.
    pub admin_results_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3000,
            metrics_port: 9091,
            frontend_dir_path: None,
            admin: AdminCredentials::default(),
            admin_results_limit: 5,
        }
    }
}
