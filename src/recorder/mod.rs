//! Recording system module
//!
//! A session is captured as one or more segments, each written by its own
//! encoder process:
//! - SessionManager drives the session state machine
//! - SegmentRecorder supervises one encoder process
//! - Finalizer joins the segments into the final file

pub mod coordinator;
pub mod events;
pub mod finalize;
pub mod options;
pub mod segment;
pub mod state;

pub use coordinator::{FinalizeResult, SessionManager, StartResult, StopResult};
pub use events::RecorderEvent;
pub use options::{Preset, RecordingOptions, SourceKind, WebcamOptions};
pub use state::{Segment, SegmentStatus, SessionSnapshot, SessionState};
