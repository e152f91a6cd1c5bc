//! Centralized configuration constants for the surveyor service.

use std::time::Duration;

/// Datastore configuration.
pub struct DbConfig;

impl DbConfig {
    pub const DB_FILE_NAME: &'static str = "inventory.sqlite";
}

/// Background task executor configuration.
pub struct ExecutorConfig;

impl ExecutorConfig {
    /// Default number of crawl worker threads.
    pub const WORKER_THREADS: usize = 10;
}

/// Wire protocol configuration.
pub struct RpcConfig;

impl RpcConfig {
    /// Maximum size of a single length-prefixed frame.
    pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

    /// Timeout when a client connects to the server.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Notification method name used for streamed crawl progress.
    pub const PROGRESS_METHOD: &'static str = "inventory.progress";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_are_reasonable() {
        assert!(ExecutorConfig::WORKER_THREADS > 0);
        assert!(RpcConfig::MAX_FRAME_SIZE >= 1024);
        assert!(RpcConfig::CONNECT_TIMEOUT > Duration::ZERO);
    }
}
