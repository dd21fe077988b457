use std::time::Duration;

/// Timing knobs for connection admission.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a connection may stay unbound after accept before it is
    /// closed. Default: 30 seconds.
    pub admission_timeout: Duration,

    /// Delay between sending a rejection and closing the transport, so
    /// the client gets to read the reason. Default: 1 second.
    pub rejection_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            admission_timeout: Duration::from_secs(30),
            rejection_grace: Duration::from_secs(1),
        }
    }
}
