use pwfft_core::EngineError;

/// Failures raised inside the host-emulated device.
#[derive(Debug, thiserror::Error)]
pub enum CpuDeviceError {
    #[error("failed to spawn stream worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("stream {0} has stopped accepting work")]
    StreamClosed(String),

    #[error("stream {stream} faulted: {message}")]
    Faulted { stream: String, message: String },

    #[error("buffer of {capacity} elements cannot hold {needed}")]
    Overflow { needed: usize, capacity: usize },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl CpuDeviceError {
    /// Wraps the failure as a primitive failure of `op`.
    #[track_caller]
    pub fn into_engine(self, op: &'static str) -> EngineError {
        EngineError::primitive(op, self)
    }
}
