use std::time::Duration;

/// Tunables for a running engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound on a single model call. Expiry abandons the cycle.
    pub invoke_timeout: Duration,
    /// Raw model responses larger than this are rejected unparsed.
    pub max_response_bytes: usize,
    /// Transcript entries kept per meeting.
    pub window_capacity: usize,
    /// Result ids, and separately content keys, remembered per meeting for dedup.
    pub dedup_id_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            invoke_timeout: Duration::from_secs(30),
            max_response_bytes: 64 * 1024,
            window_capacity: 5_000,
            dedup_id_capacity: 4_096,
        }
    }
}
