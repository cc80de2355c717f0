pub mod skeleton;

pub use skeleton::{draw_skeleton, SKELETON_CONNECTIONS};
