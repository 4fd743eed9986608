use std::collections::HashMap;

use log::debug;
use serde::Serialize;

use crate::world::{ObjectId, Point};

pub type VisualId = usize;

/// Maps visual location descriptors to cache ids, assigning an id the
/// first time a location is requested.
#[derive(Debug, Default)]
pub struct ImageCache {
    ids: HashMap<String, usize>,
    next_id: usize,
}

impl ImageCache {
    pub fn new() -> Self {
        ImageCache {
            ids: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn add_image_from_location(&mut self, location: &str) -> Option<usize> {
        if location.is_empty() {
            return None;
        }
        if let Some(id) = self.ids.get(location) {
            return Some(*id);
        }
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        debug!(target: "image_cache", "loading {location} as image #{id}");
        self.ids.insert(location.to_string(), id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Visual {
    pub object: ObjectId,
    pub image: usize,
    pub location: String,
    pub elevation: usize,
    pub position: Point,
}

/// Rendering side that accepts visuals built from world objects.
pub trait View {
    fn add_visual(&mut self, visual: Visual) -> VisualId;
}

/// View that keeps every visual it was handed; used by the host binary and
/// in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingView {
    visuals: Vec<Visual>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visuals(&self) -> &[Visual] {
        &self.visuals
    }
}

impl View for RecordingView {
    fn add_visual(&mut self, visual: Visual) -> VisualId {
        self.visuals.push(visual);
        self.visuals.len()
    }
}
