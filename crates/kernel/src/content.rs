use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spawn::Vec3;

const DEFAULT_SPAWN_OFFSET: Vec3 = Vec3::new(2.0, 0.0, 0.0);

fn default_spawn_offset() -> Vec3 {
    DEFAULT_SPAWN_OFFSET
}

/// One end of a door connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDoor {
    pub scene_name: String,
    /// Unique within `scene_name`.
    pub door_id: String,
    #[serde(default = "default_spawn_offset")]
    pub spawn_offset: Vec3,
}

/// Static description of a door between two scenes.
///
/// `locked` is only the first-run default. Once the registry has a fact for
/// `door_id`, the fact wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorConnection {
    pub door_id: String,
    pub from_door: SceneDoor,
    pub to_door: SceneDoor,
    #[serde(default)]
    pub locked: bool,
}

impl DoorConnection {
    pub fn from_scene(&self) -> &str {
        &self.from_door.scene_name
    }

    pub fn to_scene(&self) -> &str {
        &self.to_door.scene_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DoorGraphError {
    #[error("door connection has an empty door_id (from scene '{from_scene}')")]
    EmptyDoorId { from_scene: String },
    #[error("door_id '{door_id}' is declared more than once")]
    DuplicateDoorId { door_id: String },
    #[error("door '{door_id}' has an empty {end} scene name")]
    EmptySceneName { door_id: String, end: &'static str },
}

/// Validated set of door connections, looked up by `door_id`.
#[derive(Debug, Clone, Default)]
pub struct DoorGraph {
    connections: Vec<DoorConnection>,
    index_by_id: HashMap<String, usize>,
}

impl DoorGraph {
    pub fn new(connections: Vec<DoorConnection>) -> Result<Self, DoorGraphError> {
        let mut index_by_id = HashMap::with_capacity(connections.len());
        for (index, connection) in connections.iter().enumerate() {
            if connection.door_id.is_empty() {
                return Err(DoorGraphError::EmptyDoorId {
                    from_scene: connection.from_door.scene_name.clone(),
                });
            }
            if connection.from_door.scene_name.is_empty() {
                return Err(DoorGraphError::EmptySceneName {
                    door_id: connection.door_id.clone(),
                    end: "from",
                });
            }
            if connection.to_door.scene_name.is_empty() {
                return Err(DoorGraphError::EmptySceneName {
                    door_id: connection.door_id.clone(),
                    end: "to",
                });
            }
            if index_by_id
                .insert(connection.door_id.clone(), index)
                .is_some()
            {
                return Err(DoorGraphError::DuplicateDoorId {
                    door_id: connection.door_id.clone(),
                });
            }
        }
        Ok(Self {
            connections,
            index_by_id,
        })
    }

    pub fn get(&self, door_id: &str) -> Option<&DoorConnection> {
        self.index_by_id
            .get(door_id)
            .and_then(|index| self.connections.get(*index))
    }

    pub fn connections(&self) -> &[DoorConnection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(door_id: &str, from: &str, to: &str) -> DoorConnection {
        DoorConnection {
            door_id: door_id.to_string(),
            from_door: SceneDoor {
                scene_name: from.to_string(),
                door_id: format!("{door_id}_out"),
                spawn_offset: DEFAULT_SPAWN_OFFSET,
            },
            to_door: SceneDoor {
                scene_name: to.to_string(),
                door_id: format!("{door_id}_in"),
                spawn_offset: DEFAULT_SPAWN_OFFSET,
            },
            locked: false,
        }
    }

    #[test]
    fn lookup_by_door_id() {
        let graph =
            DoorGraph::new(vec![connection("D1", "A", "B"), connection("D2", "B", "C")])
                .expect("graph");
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("D2").map(DoorConnection::to_scene), Some("C"));
        assert!(graph.get("missing").is_none());
    }

    #[test]
    fn duplicate_door_ids_are_rejected() {
        let error = DoorGraph::new(vec![connection("D1", "A", "B"), connection("D1", "B", "A")])
            .expect_err("duplicate");
        assert_eq!(
            error,
            DoorGraphError::DuplicateDoorId {
                door_id: "D1".to_string()
            }
        );
    }

    #[test]
    fn empty_ids_and_scene_names_are_rejected() {
        assert!(matches!(
            DoorGraph::new(vec![connection("", "A", "B")]),
            Err(DoorGraphError::EmptyDoorId { .. })
        ));
        assert!(matches!(
            DoorGraph::new(vec![connection("D1", "A", "")]),
            Err(DoorGraphError::EmptySceneName { end: "to", .. })
        ));
    }

    #[test]
    fn spawn_offset_defaults_to_two_units_right() {
        let raw = r#"{
            "door_id": "D1",
            "from_door": { "scene_name": "A", "door_id": "out" },
            "to_door": { "scene_name": "B", "door_id": "in", "spawn_offset": { "x": -1.0, "y": 0.5 } }
        }"#;
        let parsed: DoorConnection = serde_json::from_str(raw).expect("json");
        assert_eq!(parsed.from_door.spawn_offset, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(parsed.to_door.spawn_offset, Vec3::new(-1.0, 0.5, 0.0));
        assert!(!parsed.locked);
    }
}
