use std::ops::Add;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transition::TransitionRequest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

/// Arrival marker inside a scene.
///
/// `prev_scene_name`/`prev_door_id` name the door the player must have left
/// through for this marker to apply. The player lands at `position + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub prev_scene_name: String,
    pub prev_door_id: String,
    pub position: Vec3,
    #[serde(default)]
    pub offset: Vec3,
}

impl SpawnPoint {
    pub fn arrival_position(&self) -> Vec3 {
        self.position + self.offset
    }

    fn matches(&self, request: &TransitionRequest) -> bool {
        self.prev_scene_name == request.from_scene && self.prev_door_id == request.from_door_id
    }
}

/// Returns the first spawn point, in enumeration order, that was authored for
/// the door described by `request`.
///
/// Several matches are a content-authoring mistake; the first one wins and the
/// rest are only reported at debug level.
pub fn resolve_spawn<'a>(
    request: &TransitionRequest,
    spawn_points: &'a [SpawnPoint],
) -> Option<&'a SpawnPoint> {
    let mut matches = spawn_points.iter().filter(|point| point.matches(request));
    let first = matches.next()?;
    let extra = matches.count();
    if extra > 0 {
        debug!(
            from_scene = %request.from_scene,
            from_door_id = %request.from_door_id,
            duplicate_count = extra,
            "spawn_point_duplicates_ignored"
        );
    }
    Some(first)
}
