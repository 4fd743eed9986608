//! Read-mostly map model owned by the simulation thread.
//!
//! The scripting thread never sees these types directly; it receives
//! [`ObjectInfo`] snapshots and refers back to objects by [`ObjectId`].

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ObjectId = u64;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("reading map {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing map {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("map has no elevations")]
    NoElevations,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub target: Point,
    pub speed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldObject {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub position: Point,
    /// Visual location descriptor resolved through the image cache.
    #[serde(default)]
    pub visual: Option<String>,
    #[serde(default)]
    pub visual_id: Option<usize>,
    #[serde(default)]
    pub movement: Option<Movement>,
    #[serde(default)]
    pub actions: VecDeque<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default)]
    pub objects: Vec<WorldObject>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Elevation {
    #[serde(default)]
    pub layers: Vec<Layer>,
}

/// Snapshot of a non-static object handed to the scripting thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub name: String,
    pub elevation: usize,
    pub layer: usize,
    pub position: Point,
    pub visual: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct World {
    #[serde(default)]
    pub elevations: Vec<Elevation>,
}

impl World {
    pub fn from_json_file(path: &Path) -> Result<Self, WorldError> {
        let text = fs::read_to_string(path).map_err(|source| WorldError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let world: World = serde_json::from_str(&text).map_err(|source| WorldError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        if world.elevations.is_empty() {
            return Err(WorldError::NoElevations);
        }
        Ok(world)
    }

    pub fn elevation_count(&self) -> usize {
        self.elevations.len()
    }

    /// Snapshots of every non-static object in traversal order
    /// (elevation, then layer, then position within the layer).
    pub fn dynamic_objects(&self) -> Vec<ObjectInfo> {
        let mut infos = Vec::new();
        for (elevation_index, elevation) in self.elevations.iter().enumerate() {
            for (layer_index, layer) in elevation.layers.iter().enumerate() {
                for object in layer.objects.iter().filter(|object| !object.is_static) {
                    infos.push(ObjectInfo {
                        id: object.id,
                        name: object.name.clone(),
                        elevation: elevation_index,
                        layer: layer_index,
                        position: object.position,
                        visual: object.visual.clone(),
                    });
                }
            }
        }
        infos
    }

    pub fn object(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects().find(|object| object.id == id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut WorldObject> {
        self.elevations
            .iter_mut()
            .flat_map(|elevation| elevation.layers.iter_mut())
            .flat_map(|layer| layer.objects.iter_mut())
            .find(|object| object.id == id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.elevations
            .iter()
            .flat_map(|elevation| elevation.layers.iter())
            .flat_map(|layer| layer.objects.iter())
    }

    /// Step every moving object one tick toward its target. Returns the
    /// number of objects that moved.
    pub fn advance(&mut self) -> usize {
        let mut moved = 0;
        for elevation in &mut self.elevations {
            for layer in &mut elevation.layers {
                for object in &mut layer.objects {
                    if object.step() {
                        moved += 1;
                    }
                }
            }
        }
        moved
    }
}

impl WorldObject {
    fn step(&mut self) -> bool {
        let Some(movement) = self.movement else {
            return false;
        };
        // Targets come straight from scripts, so the distance may not fit
        // in an i64; saturating keeps the sign and the step stays bounded.
        let speed = movement.speed.max(1);
        let dx = movement.target.x.saturating_sub(self.position.x);
        let dy = movement.target.y.saturating_sub(self.position.y);
        self.position.x = self.position.x.saturating_add(dx.clamp(-speed, speed));
        self.position.y = self.position.y.saturating_add(dy.clamp(-speed, speed));
        if self.position == movement.target {
            self.movement = None;
        }
        dx != 0 || dy != 0
    }
}
