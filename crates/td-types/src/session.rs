use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Explicit session settings handed to every orchestrator.
///
/// Credentials and bucket defaults live here rather than in any process-wide
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub region: Option<String>,
    /// Role used when a job spec names none.
    pub default_role: Option<String>,
    /// Bucket used to derive output locations when a job spec names none.
    pub default_bucket: Option<String>,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            region: None,
            default_role: None,
            default_bucket: None,
            poll_interval_secs: 30,
            timeout_secs: 24 * 60 * 60,
        }
    }
}

impl SessionConfig {
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.default_role = Some(role.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = Some(bucket.into());
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval_secs = poll_interval.as_secs();
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The role for a job: the job's own, else the session default.
    pub fn resolve_role(&self, requested: Option<&str>) -> Option<String> {
        requested
            .filter(|r| !r.trim().is_empty())
            .or(self.default_role.as_deref())
            .map(str::to_string)
    }

    /// Default output location for a job under the session bucket.
    pub fn output_location_for(&self, job_name: &str) -> Option<String> {
        self.default_bucket
            .as_deref()
            .map(|bucket| format!("s3://{}/{}/output", bucket.trim_end_matches('/'), job_name))
    }
}
