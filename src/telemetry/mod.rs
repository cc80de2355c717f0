//! Center-frame measurements rendered for the oracle (text) and for people (overlay).
//!
//! Both renditions are built from the same [`AngleRow`]s so they always agree.

pub mod overlay;
pub mod text;

pub use overlay::{panel_layout, OverlayRenderer, PanelLayout};
pub use text::{angle_rows, format_telemetry, AngleRow};
