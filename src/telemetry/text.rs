//! Text rendition of center-frame measurements, embedded in the oracle request.

use serde::Serialize;

use crate::analysis::{JointAngle, SymmetryAssessment};

pub const HEADER: &str = "BIOMECHANICAL TELEMETRY (center frame)";
pub const INSTRUCTION: &str =
    "These measurements are authoritative, do not re-estimate them visually from the images.";

/// One bilateral joint, both sides side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AngleRow {
    pub joint: &'static str,
    pub left: Option<f32>,
    pub right: Option<f32>,
}

/// Groups `"Left X"` / `"Right X"` angles into rows, in first-appearance order.
pub fn angle_rows(angles: &[JointAngle]) -> Vec<AngleRow> {
    let mut rows: Vec<AngleRow> = Vec::new();
    for angle in angles {
        let (joint, left) = if let Some(j) = angle.joint.strip_prefix("Left ") {
            (j, true)
        } else if let Some(j) = angle.joint.strip_prefix("Right ") {
            (j, false)
        } else {
            continue;
        };

        let row = match rows.iter().position(|r| r.joint == joint) {
            Some(i) => &mut rows[i],
            None => {
                rows.push(AngleRow {
                    joint,
                    left: None,
                    right: None,
                });
                let last = rows.len() - 1;
                &mut rows[last]
            }
        };
        if left {
            row.left = Some(angle.degrees);
        } else {
            row.right = Some(angle.degrees);
        }
    }
    rows
}

/// `45°`, or `--` when the side was not measured.
pub fn format_degrees(value: Option<f32>) -> String {
    match value {
        Some(v) => format!("{:.0}°", v),
        None => "--".to_string(),
    }
}

fn level_word(level: bool, tilt: Option<f32>) -> String {
    match tilt {
        Some(t) => format!("{} ({:.1}%)", if level { "LEVEL" } else { "TILTED" }, t * 100.0),
        None => "--".to_string(),
    }
}

/// Telemetry block for one frame, or `None` when nothing was measured.
pub fn format_telemetry(angles: &[JointAngle], symmetry: Option<&SymmetryAssessment>) -> Option<String> {
    let symmetry = symmetry.filter(|s| !s.is_empty());
    if angles.is_empty() && symmetry.is_none() {
        return None;
    }

    let mut lines = vec![HEADER.to_string(), INSTRUCTION.to_string()];
    if let Some(s) = symmetry {
        lines.push(format!(
            "Symmetry: shoulders {}, hips {}",
            level_word(s.shoulders_level, s.shoulder_tilt),
            level_word(s.hips_level, s.hip_tilt)
        ));
    }
    lines.extend(angle_rows(angles).into_iter().map(|row| {
        format!(
            "{}: L={} | R={}",
            row.joint,
            format_degrees(row.left),
            format_degrees(row.right)
        )
    }));
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angle(joint: &'static str, degrees: f32) -> JointAngle {
        JointAngle { joint, degrees }
    }

    #[test]
    fn test_rows_pair_sides() {
        let rows = angle_rows(&[
            angle("Left Shoulder", 45.0),
            angle("Right Shoulder", 47.0),
            angle("Left Elbow", 170.0),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].joint, "Shoulder");
        assert_eq!((rows[0].left, rows[0].right), (Some(45.0), Some(47.0)));
        assert_eq!((rows[1].left, rows[1].right), (Some(170.0), None));
    }

    #[test]
    fn test_full_block() {
        let symmetry = SymmetryAssessment {
            shoulders_level: true,
            hips_level: false,
            shoulder_tilt: Some(0.02),
            hip_tilt: Some(0.08),
        };
        let text = format_telemetry(
            &[
                angle("Left Shoulder", 45.0),
                angle("Right Shoulder", 47.4),
                angle("Right Knee", 92.6),
            ],
            Some(&symmetry),
        )
        .unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].contains("authoritative, do not re-estimate"));
        assert_eq!(lines[2], "Symmetry: shoulders LEVEL (2.0%), hips TILTED (8.0%)");
        assert_eq!(lines[3], "Shoulder: L=45° | R=47°");
        assert_eq!(lines[4], "Knee: L=-- | R=93°");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_unmeasured_symmetry_pair() {
        let symmetry = SymmetryAssessment {
            shoulders_level: false,
            hips_level: false,
            shoulder_tilt: Some(0.1),
            hip_tilt: None,
        };
        let text = format_telemetry(&[], Some(&symmetry)).unwrap();
        assert!(text.ends_with("Symmetry: shoulders TILTED (10.0%), hips --"));
    }

    #[test]
    fn test_nothing_measured() {
        assert!(format_telemetry(&[], None).is_none());
        assert!(format_telemetry(&[], Some(&SymmetryAssessment::default())).is_none());
    }

    #[test]
    fn test_deterministic() {
        let angles = [angle("Left Hip", 120.0), angle("Right Hip", 118.0)];
        assert_eq!(format_telemetry(&angles, None), format_telemetry(&angles, None));
    }
}
