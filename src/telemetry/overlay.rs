//! On-frame telemetry: skeleton plus a translucent angle panel.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

use super::text::{angle_rows, format_degrees, AngleRow};
use crate::analysis::{JointAngle, LandmarkGate};
use crate::config::OverlayConfig;
use crate::pose::PoseResult;
use crate::render::draw_skeleton;
use crate::render::skeleton::{LEFT_COLOR, RIGHT_COLOR};

pub const PANEL_HEADER: &str = "JOINT ANGLES";
pub const NO_POSE_HEADER: &str = "NO POSE";

const MARGIN: u32 = 10;
const PADDING: u32 = 8;
const CORNER_RADIUS: u32 = 8;
const PANEL_COLOR: Rgb<u8> = Rgb([16, 16, 16]);
const TEXT_COLOR: Rgb<u8> = Rgb([240, 240, 240]);

/// Axis-aligned rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Text anchors of one table row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    pub row: AngleRow,
    pub y: i32,
    pub joint_x: i32,
    pub left_x: i32,
    pub right_x: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelLayout {
    pub rect: PanelRect,
    pub header_pos: (i32, i32),
    pub rows: Vec<RowLayout>,
}

/// Places the panel in the top-left corner with three aligned columns
/// (joint, L, R). Rows that do not fit the frame height are dropped.
/// `None` when the frame is too small for even the header.
pub fn panel_layout(rows: &[AngleRow], width: u32, height: u32, font_size: f32) -> Option<PanelLayout> {
    let line = (font_size * 1.4).ceil().max(1.0) as u32;
    let char_w = (font_size * 0.6).ceil().max(1.0) as u32;

    let joint_col = rows.iter().map(|r| r.joint.chars().count()).max().unwrap_or(0).max(8) as u32 * char_w;
    let value_col = 6 * char_w;
    let content_w = joint_col + 2 * value_col;

    let max_w = width.checked_sub(2 * MARGIN)?;
    let max_h = height.checked_sub(2 * MARGIN)?;
    if max_h < line + 2 * PADDING {
        return None;
    }
    let fitting = ((max_h - 2 * PADDING) / line).saturating_sub(1) as usize;
    let shown = rows.len().min(fitting);

    let rect = PanelRect {
        x: MARGIN,
        y: MARGIN,
        width: (content_w + 2 * PADDING).min(max_w),
        height: (line * (shown as u32 + 1) + 2 * PADDING).min(max_h),
    };
    let x0 = (rect.x + PADDING) as i32;
    let y0 = (rect.y + PADDING) as i32;

    let rows = rows
        .iter()
        .take(shown)
        .enumerate()
        .map(|(i, row)| RowLayout {
            row: row.clone(),
            y: y0 + ((i as u32 + 1) * line) as i32,
            joint_x: x0,
            left_x: x0 + joint_col as i32,
            right_x: x0 + (joint_col + value_col) as i32,
        })
        .collect();

    Some(PanelLayout {
        rect,
        header_pos: (x0, y0),
        rows,
    })
}

fn inside_rounded(rect: &PanelRect, x: u32, y: u32, radius: u32) -> bool {
    let r = radius.min(rect.width / 2).min(rect.height / 2) as i64;
    let (x, y) = (x as i64, y as i64);
    let left = rect.x as i64 + r;
    let right = (rect.x + rect.width) as i64 - 1 - r;
    let top = rect.y as i64 + r;
    let bottom = (rect.y + rect.height) as i64 - 1 - r;
    let cx = x.clamp(left, right.max(left));
    let cy = y.clamp(top, bottom.max(top));
    (x - cx).pow(2) + (y - cy).pow(2) <= r * r
}

/// Alpha-blends `color` over the rounded rectangle.
pub fn blend_rounded_rect(image: &mut RgbImage, rect: &PanelRect, color: Rgb<u8>, opacity: f32) {
    let a = opacity.clamp(0.0, 1.0);
    let x_end = (rect.x + rect.width).min(image.width());
    let y_end = (rect.y + rect.height).min(image.height());
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            if !inside_rounded(rect, x, y, CORNER_RADIUS) {
                continue;
            }
            let p = image.get_pixel_mut(x, y);
            for c in 0..3 {
                p[c] = (p[c] as f32 * (1.0 - a) + color[c] as f32 * a).round() as u8;
            }
        }
    }
}

/// Draws pose telemetry onto captured frames.
pub struct OverlayRenderer {
    font: Option<FontArc>,
    font_size: f32,
    panel_opacity: f32,
    gate: LandmarkGate,
}

impl OverlayRenderer {
    pub fn new(font: Option<FontArc>, font_size: f32, panel_opacity: f32, gate: LandmarkGate) -> Self {
        Self {
            font,
            font_size,
            panel_opacity,
            gate,
        }
    }

    pub fn from_config(config: &OverlayConfig, gate: LandmarkGate) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => Some(load_font(path)?),
            None => None,
        };
        Ok(Self::new(font, config.font_size, config.panel_opacity, gate))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Skeleton (when a pose is given) and the angle panel built from `angles`.
    pub fn draw(&self, image: &mut RgbImage, pose: Option<&PoseResult>, angles: &[JointAngle]) {
        if let Some(pose) = pose {
            draw_skeleton(image, pose, self.gate);
        }

        let rows = angle_rows(angles);
        let Some(layout) = panel_layout(&rows, image.width(), image.height(), self.font_size) else {
            return;
        };
        blend_rounded_rect(image, &layout.rect, PANEL_COLOR, self.panel_opacity);

        let Some(font) = &self.font else { return };
        let scale = PxScale::from(self.font_size);
        let header = if pose.is_some() { PANEL_HEADER } else { NO_POSE_HEADER };
        let (hx, hy) = layout.header_pos;
        draw_text_mut(image, TEXT_COLOR, hx, hy, scale, font, header);

        for r in &layout.rows {
            draw_text_mut(image, TEXT_COLOR, r.joint_x, r.y, scale, font, r.row.joint);
            let left = format!("L {}", format_degrees(r.row.left));
            let right = format!("R {}", format_degrees(r.row.right));
            draw_text_mut(image, LEFT_COLOR, r.left_x, r.y, scale, font, &left);
            draw_text_mut(image, RIGHT_COLOR, r.right_x, r.y, scale, font, &right);
        }
    }
}

fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontArc::try_from_vec(bytes).with_context(|| format!("invalid font file {}", path.display()))
}
