use thiserror::Error;

/// Faults raised by the capture engine. Scoring and encoding never produce these.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone unavailable: {reason}")]
    DeviceUnavailable { reason: String },
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat { format: String },
    #[error("failed to open input stream: {message}")]
    StreamBuild { message: String },
    #[error("failed to start input stream: {message}")]
    StreamPlay { message: String },
    #[error("input stream fault: {message}")]
    StreamFault { message: String },
    #[error("capture engine has not been initialized")]
    NotInitialized,
    #[error("capture engine was torn down; construct a new one")]
    TornDown,
}

/// Failures while building the PCM container.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("source sample rate must be non-zero")]
    InvalidSourceRate,
    #[error("wav container write failed: {0}")]
    Container(#[from] hound::Error),
}
