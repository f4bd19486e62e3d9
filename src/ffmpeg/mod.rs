//! FFmpeg planning
//!
//! Pure builders that turn recording options into encoder arguments: audio
//! routing, the video filter graph, encoder parameters and the final
//! command line. Nothing here spawns the capture process.

pub mod audio;
pub mod command;
pub mod filters;
pub mod planner;
pub mod progress;
pub mod types;

pub use audio::{AudioInput, AudioRole, AudioRoute};
pub use command::{capture_args, concat_args, SegmentInputs};
pub use filters::{build_video_graph, FilterContext, VideoGraph};
pub use planner::{EncoderPlan, EncoderPlanner, RateControl};
pub use progress::{ProgressParser, ProgressUpdate};
pub use types::{
    ColorGrade, CornerPosition, FrameSize, PreferredCodec, QualityTier, ResolutionTier, VideoEncoder,
};
