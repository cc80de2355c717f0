//! Global image numbering across views.
//!
//! Images are numbered 1.. in payload order: every frame of view 0, then every frame of
//! view 1, and so on. The map is derived from the view list alone and is rebuilt rather
//! than stored.

use serde::Serialize;

use super::orchestrator::ViewCapture;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    /// 1-based position in the flattened payload
    pub image: usize,
    pub view_index: usize,
    pub view_label: String,
    /// 1-based position within the view
    pub local_frame: usize,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IndexMap {
    entries: Vec<IndexEntry>,
}

impl IndexMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Entry for a 1-based global image number.
    pub fn lookup(&self, image: usize) -> Option<&IndexEntry> {
        image.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// One line per image: `Image 4 = Side View, frame 1 @ 4.50s`.
    pub fn describe(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "Image {} = {}, frame {} @ {:.2}s",
                    e.image, e.view_label, e.local_frame, e.timestamp
                )
            })
            .collect()
    }
}

pub fn build_index_map(views: &[ViewCapture]) -> IndexMap {
    let entries = views
        .iter()
        .enumerate()
        .flat_map(|(view_index, view)| {
            view.frames.iter().enumerate().map(move |(local, frame)| (view_index, view, local, frame))
        })
        .enumerate()
        .map(|(global, (view_index, view, local, frame))| IndexEntry {
            image: global + 1,
            view_index,
            view_label: view.label.clone(),
            local_frame: local + 1,
            timestamp: frame.timestamp,
        })
        .collect();
    IndexMap { entries }
}
