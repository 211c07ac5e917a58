//! Proxy health state (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyStatus {
    pub url: String,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_unhealthy_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_unhealthy: bool,
}

impl ProxyStatus {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            consecutive_failures: 0,
            total_failures: 0,
            last_error: None,
            last_success_time: None,
            marked_unhealthy_time: None,
            is_unhealthy: false,
        }
    }
}
