//! Boundary to the external movement-analysis service.
//!
//! The request is built typed from a [`MultiViewPayload`] and serialized last. The only
//! contract with the service is ordering: image N of the flattened list is exactly the
//! frame the embedded index map says it is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureOptions, CaptureOrchestrator, MultiViewPayload, ViewInput};
use crate::error::{AnalysisError, OracleError};
use crate::pose::PoseSource;
use crate::video::SeekableSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleFrame {
    /// 1-based position in the flattened image list
    pub image: usize,
    /// 1-based position within the view
    pub local_frame: usize,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleView {
    pub label: String,
    /// 1-based global image number of the center frame
    pub center_image: Option<usize>,
    pub telemetry: Option<String>,
    pub frames: Vec<OracleFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_declared_skill: Option<String>,
    pub views: Vec<OracleView>,
    pub instructions: String,
}

impl OracleRequest {
    pub fn from_payload(payload: &MultiViewPayload) -> Self {
        Self::from_payload_at(payload, Utc::now())
    }

    pub fn from_payload_at(payload: &MultiViewPayload, created_at: DateTime<Utc>) -> Self {
        let mut image = 0;
        let views = payload
            .views
            .iter()
            .map(|view| {
                let first = image + 1;
                let frames = view
                    .frames
                    .iter()
                    .enumerate()
                    .map(|(local, frame)| {
                        image += 1;
                        OracleFrame {
                            image,
                            local_frame: local + 1,
                            timestamp: frame.timestamp,
                            width: frame.image.width,
                            height: frame.image.height,
                            data_url: frame.image.to_data_url(),
                        }
                    })
                    .collect::<Vec<_>>();
                OracleView {
                    label: view.label.clone(),
                    center_image: (!frames.is_empty()).then(|| first + view.center_frame_index),
                    telemetry: view.center_telemetry.clone(),
                    frames,
                }
            })
            .collect();

        Self {
            created_at,
            user_declared_skill: payload.user_declared_skill.clone(),
            views,
            instructions: build_instructions(payload),
        }
    }

    pub fn image_count(&self) -> usize {
        self.views.iter().map(|v| v.frames.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Prompt text: image order, center frames, telemetry and declared skill.
pub fn build_instructions(payload: &MultiViewPayload) -> String {
    let mut lines = vec![format!(
        "You will receive {} image(s) from {} view(s), in exactly this order:",
        payload.total_frames(),
        payload.views.len()
    )];
    lines.extend(payload.index_map.describe().into_iter().map(|line| format!("- {line}")));

    for (i, view) in payload.views.iter().enumerate() {
        let Some(center) = payload
            .index_map
            .entries()
            .iter()
            .filter(|e| e.view_index == i)
            .nth(view.center_frame_index)
        else {
            continue;
        };
        lines.push(String::new());
        lines.push(format!(
            "View \"{}\": the center (key) frame is Image {}.",
            view.label, center.image
        ));
        if let Some(telemetry) = &view.center_telemetry {
            lines.push(telemetry.clone());
        }
    }

    if let Some(skill) = &payload.user_declared_skill {
        lines.push(String::new());
        lines.push(format!("The athlete describes the movement as: {skill}"));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointJudgment {
    pub joint: String,
    pub angle: Option<f32>,
    pub assessment: String,
}

/// Structured feedback returned by the oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementFeedback {
    #[serde(alias = "movementName")]
    pub movement_name: String,
    pub confidence: f32,
    pub phase: Option<String>,
    #[serde(alias = "jointJudgments")]
    pub joint_judgments: Vec<JointJudgment>,
    pub steps: Vec<String>,
    #[serde(alias = "safetyRating")]
    pub safety_rating: Option<String>,
    pub corrections: Vec<String>,
    pub observations: Vec<String>,
}

impl MovementFeedback {
    /// Parses a feedback document, tolerating a surrounding Markdown code fence or prose.
    pub fn from_json(text: &str) -> Result<Self, OracleError> {
        let trimmed = text.trim();
        let body = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => trimmed,
        };
        Ok(serde_json::from_str(body)?)
    }
}

/// The external analysis service. Transport and retries are the implementor's concern.
#[async_trait]
pub trait MovementOracle: Send + Sync {
    async fn analyze(&self, request: &OracleRequest) -> Result<MovementFeedback, OracleError>;
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub request: OracleRequest,
    pub feedback: MovementFeedback,
}

/// Captures every view, then asks the oracle once.
pub async fn analyze_views<S, P>(
    orchestrator: &CaptureOrchestrator<'_, P>,
    views: &mut [ViewInput<S>],
    options: &CaptureOptions,
    cancel: &CancellationToken,
    oracle: &dyn MovementOracle,
) -> Result<Analysis, AnalysisError>
where
    S: SeekableSource,
    P: PoseSource + ?Sized,
{
    let payload = orchestrator.capture(views, options, cancel).await?;
    let request = OracleRequest::from_payload(&payload);
    tracing::info!("sending {} image(s) to the movement oracle", request.image_count());
    let feedback = oracle.analyze(&request).await?;
    Ok(Analysis { request, feedback })
}
