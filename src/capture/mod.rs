pub mod index_map;
pub mod orchestrator;
pub mod peak;
pub mod sampler;

pub use index_map::{build_index_map, IndexEntry, IndexMap};
pub use orchestrator::{CaptureOptions, CaptureOrchestrator, MultiViewPayload, ViewCapture, ViewInput};
pub use peak::{score_pose, PeakFinder, PeakMoment, PeakScoring};
pub use sampler::{
    encode_jpeg, sample_timestamps, EncodedImage, FrameCapture, FrameDecorator, FrameSampler, MultiFrameCaptureSet,
};
