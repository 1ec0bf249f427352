//! Response bodies.

use serde::{Deserialize, Serialize};

/// Acknowledgement for an accepted fragment.
///
/// Producers only look at the status code; the body is always `{"text": "none"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherResponse {
    pub text: String,
}

impl GatherResponse {
    pub fn accepted() -> Self {
        Self {
            text: "none".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
}
