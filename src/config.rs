use std::time::Duration;

/// Run-wide settings shared by every probing unit. Built once from the CLI
/// and cloned into each unit; units never mutate it.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Optional bearer credential sent as `Authorization` on every request.
    pub token: Option<String>,
    /// Pacing sleep applied per task before each request in `request_many`.
    pub request_delay: Duration,
    /// Fallback wait for 429 responses without a `Retry-After` header, and
    /// for transport-level retries.
    pub retry_delay: Duration,
    /// Attempt budget per target. Rate-limit waits and transport failures
    /// consume the same budget.
    pub retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Concurrent in-flight requests per unit.
    pub workers: usize,
}

impl ProbeConfig {
    pub fn authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            token: None,
            request_delay: Duration::from_millis(500),
            retry_delay: Duration::from_secs(1),
            retries: 3,
            timeout: Duration::from_secs(10),
            workers: 10,
        }
    }
}
