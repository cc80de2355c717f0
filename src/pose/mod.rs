pub mod landmark;
pub mod object;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod source;

pub use landmark::{Landmark, LandmarkIndex, LandmarkRemap, PoseResult, Side, COCO17_TO_BODY33};
pub use object::{
    filter_static, score_candidate, select_object, BBox, ObjectCandidate, ObjectDetection, ObjectDetector,
    ObjectScoring, ObjectStatus, ObjectTracker, TrackedObject,
};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxObjectDetector, OnnxPoseLoader, OnnxPoseModel};
pub use source::{DisabledPose, PoseModel, PoseModelLoader, PoseService, PoseSource, RunningMode};
