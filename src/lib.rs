pub mod analysis;
pub mod blocking;
pub mod capture;
pub mod config;
pub mod error;
pub mod oracle;
pub mod pose;
pub mod render;
pub mod telemetry;
pub mod video;

#[cfg(test)]
mod testing;

pub use error::{AnalysisError, CaptureError, OracleError};
