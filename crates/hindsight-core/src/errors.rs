use thiserror::Error;

/// Failure classes of the desktop-duplication session.
///
/// `WaitTimeout` and `AccessLost` are first-class variants because the
/// capture worker dispatches on them: a timeout triggers the frame-repeat
/// fallback, access loss tears the session down and re-initializes it.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No new frame arrived within the acquisition timeout.
    #[error("no new frame within the acquisition timeout")]
    WaitTimeout,

    /// The duplication session must be rebuilt (desktop switch, secure
    /// attention sequence, display mode change).
    #[error("duplication access lost: {reason}")]
    AccessLost { reason: String },

    /// Session construction failed.
    #[error("capture initialization failed: {reason}")]
    Init { reason: String },

    /// Anything else the session reported; treated as recoverable.
    #[error("capture failed: {reason}")]
    Unexpected { reason: String },
}

/// Failure classes of the encoder stage. All of them latch the worker into
/// its terminal `Failed` state.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("segment sink configuration failed: {reason}")]
    Configure { reason: String },

    #[error("sample write failed: {reason}")]
    WriteSample { reason: String },

    #[error("segment finalize failed: {reason}")]
    Finalize { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classes of clip materialization. The ring buffer is unaffected
/// by any of these; the request is simply reported as failed.
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("segment file missing: {path}")]
    SegmentMissing { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
