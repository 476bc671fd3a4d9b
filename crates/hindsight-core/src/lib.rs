//! hindsight-core — shared vocabulary of the hindsight recorder.
//!
//! Every other crate in the workspace depends on this one. It holds the
//! frame and segment types that travel between pipeline stages, the
//! recorder configuration, the atomic control state the capture worker
//! reads on every iteration, the bounded drop-oldest queue that connects
//! the stages, and the shared pipeline counters.

pub mod config;
pub mod control;
pub mod errors;
pub mod queue;
pub mod stats;
pub mod time;
pub mod types;

pub use config::{DataDirs, RecorderConfig};
pub use control::{CaptureMode, ControlEvent, ControlState};
pub use errors::{CaptureError, ClipError, EncodeError};
pub use queue::{bounded, Push, QueueReceiver, QueueSender};
pub use stats::PipelineStats;
pub use types::*;
