use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behaviour for acknowledged COMMAND_LONG requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub request_timeout_ms: u64,
    pub max_retries: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout_ms: 1500,
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct VehicleConfig {
    pub system_id: u8,
    pub component_id: u8,
    pub retry_policy: RetryPolicy,
    pub heartbeat_interval: Duration,
    pub command_buffer_size: usize,
    pub connect_timeout: Duration,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            system_id: 1,
            // MAV_COMP_ID_ONBOARD_COMPUTER
            component_id: 191,
            retry_policy: RetryPolicy::default(),
            heartbeat_interval: Duration::from_secs(1),
            command_buffer_size: 32,
            connect_timeout: Duration::from_secs(30),
        }
    }
}
