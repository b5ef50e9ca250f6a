//! World content: scenes, door graph, spawn points, objects and the demo script.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kernel::{
    DoorConfig, DoorConnection, DoorGraph, DoorGraphError, SpawnPoint, TransitionConfig, Vec3,
    DEFAULT_INVENTORY_SLOTS,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::gameplay::loop_puzzle::LoopPuzzleConfig;
use super::gameplay::narrative::NarrativeConfig;
use super::gameplay::pickup::PickupConfig;
use super::gameplay::script::ScriptStep;
use super::gameplay::stairs::StairsConfig;
use super::gameplay::strange_door::StrangeDoorConfig;

pub(crate) const WORLD_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum ContentError {
    #[error("failed to read world file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid world file {path} at {json_path}: {message}")]
    Parse {
        path: PathBuf,
        json_path: String,
        message: String,
    },
    #[error("world file has version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error(transparent)]
    DoorGraph(#[from] DoorGraphError),
    #[error("scene '{scene}' is declared more than once")]
    DuplicateScene { scene: String },
    #[error("start scene '{scene}' is not declared")]
    UnknownStartScene { scene: String },
    #[error("door '{door_id}' references undeclared scene '{scene}'")]
    UnknownDoorScene { door_id: String, scene: String },
    #[error("object '{object}' in scene '{scene}' references unknown door '{door_id}'")]
    UnknownDoor {
        scene: String,
        object: String,
        door_id: String,
    },
    #[error("object '{object}' in scene '{scene}' targets undeclared scene '{target}'")]
    UnknownTargetScene {
        scene: String,
        object: String,
        target: String,
    },
    #[error("object id '{object}' is used twice in scene '{scene}'")]
    DuplicateObject { scene: String, object: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct InventoryConfig {
    pub(crate) max_slots: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            max_slots: DEFAULT_INVENTORY_SLOTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ObjectDef {
    Door(DoorConfig),
    Stairs(StairsConfig),
    StrangeDoor(StrangeDoorConfig),
    Pickup(PickupConfig),
    LoopPuzzle(LoopPuzzleConfig),
    Narrative(NarrativeConfig),
}

impl ObjectDef {
    pub(crate) fn id(&self) -> &str {
        match self {
            ObjectDef::Door(config) => &config.door_id,
            ObjectDef::Stairs(config) => &config.loop_door_id,
            ObjectDef::StrangeDoor(config) => &config.door_id,
            ObjectDef::Pickup(config) => &config.item.id,
            ObjectDef::LoopPuzzle(config) => &config.id,
            ObjectDef::Narrative(config) => &config.id,
        }
    }
}

/// Spawn point as authored. A missing offset is taken from the arriving end
/// of the door it names.
#[derive(Debug, Clone, Deserialize)]
struct SpawnPointDef {
    prev_scene_name: String,
    prev_door_id: String,
    position: Vec3,
    #[serde(default)]
    offset: Option<Vec3>,
}

#[derive(Debug, Clone, Deserialize)]
struct SceneDef {
    name: String,
    #[serde(default)]
    spawn_points: Vec<SpawnPointDef>,
    #[serde(default)]
    objects: Vec<ObjectDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct WorldFile {
    version: u32,
    start_scene: String,
    #[serde(default)]
    player_start: Vec3,
    #[serde(default)]
    transition: TransitionConfig,
    #[serde(default)]
    inventory: InventoryConfig,
    #[serde(default)]
    doors: Vec<DoorConnection>,
    scenes: Vec<SceneDef>,
    #[serde(default)]
    script: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SceneContent {
    pub(crate) spawn_points: Vec<SpawnPoint>,
    pub(crate) objects: Vec<ObjectDef>,
}

/// Validated world content.
#[derive(Debug, Clone)]
pub(crate) struct World {
    pub(crate) start_scene: String,
    pub(crate) player_start: Vec3,
    pub(crate) transition: TransitionConfig,
    pub(crate) inventory: InventoryConfig,
    pub(crate) graph: DoorGraph,
    pub(crate) scenes: HashMap<String, SceneContent>,
    pub(crate) script: Vec<ScriptStep>,
}

pub(crate) fn load_world(path: &Path) -> Result<World, ContentError> {
    let raw = fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let world = parse_world(&raw, path)?;
    info!(
        path = %path.display(),
        scene_count = world.scenes.len(),
        door_count = world.graph.len(),
        script_steps = world.script.len(),
        "world_loaded"
    );
    Ok(world)
}

pub(crate) fn parse_world(raw: &str, path: &Path) -> Result<World, ContentError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let file: WorldFile =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| ContentError::Parse {
            path: path.to_path_buf(),
            json_path: error.path().to_string(),
            message: error.inner().to_string(),
        })?;
    World::from_file(file)
}

impl World {
    fn from_file(file: WorldFile) -> Result<Self, ContentError> {
        if file.version != WORLD_VERSION {
            return Err(ContentError::UnsupportedVersion {
                found: file.version,
                expected: WORLD_VERSION,
            });
        }

        let mut scene_names = HashSet::with_capacity(file.scenes.len());
        for scene in &file.scenes {
            if !scene_names.insert(scene.name.clone()) {
                return Err(ContentError::DuplicateScene {
                    scene: scene.name.clone(),
                });
            }
        }
        if !scene_names.contains(&file.start_scene) {
            return Err(ContentError::UnknownStartScene {
                scene: file.start_scene,
            });
        }

        let graph = DoorGraph::new(file.doors)?;
        for connection in graph.connections() {
            for scene in [connection.from_scene(), connection.to_scene()] {
                if !scene_names.contains(scene) {
                    return Err(ContentError::UnknownDoorScene {
                        door_id: connection.door_id.clone(),
                        scene: scene.to_string(),
                    });
                }
            }
        }

        let mut scenes = HashMap::with_capacity(file.scenes.len());
        for scene in file.scenes {
            validate_objects(&scene, &graph, &scene_names)?;
            let spawn_points = scene
                .spawn_points
                .into_iter()
                .map(|def| resolve_spawn_point(def, &graph))
                .collect();
            scenes.insert(
                scene.name,
                SceneContent {
                    spawn_points,
                    objects: scene.objects,
                },
            );
        }

        Ok(Self {
            start_scene: file.start_scene,
            player_start: file.player_start,
            transition: file.transition,
            inventory: file.inventory,
            graph,
            scenes,
            script: file.script,
        })
    }

    pub(crate) fn spawn_points_by_scene(&self) -> HashMap<String, Vec<SpawnPoint>> {
        self.scenes
            .iter()
            .map(|(name, content)| (name.clone(), content.spawn_points.clone()))
            .collect()
    }
}

fn validate_objects(
    scene: &SceneDef,
    graph: &DoorGraph,
    scene_names: &HashSet<String>,
) -> Result<(), ContentError> {
    let mut ids = HashSet::with_capacity(scene.objects.len());
    for object in &scene.objects {
        if !ids.insert(object.id()) {
            return Err(ContentError::DuplicateObject {
                scene: scene.name.clone(),
                object: object.id().to_string(),
            });
        }

        let unknown_door = |door_id: &str| ContentError::UnknownDoor {
            scene: scene.name.clone(),
            object: object.id().to_string(),
            door_id: door_id.to_string(),
        };
        match object {
            ObjectDef::Door(config) => {
                if graph.get(&config.door_id).is_none() {
                    return Err(unknown_door(&config.door_id));
                }
            }
            ObjectDef::Stairs(config) => {
                for door_id in [config.solved_door_id.as_str(), config.loop_door_id.as_str()] {
                    if graph.get(door_id).is_none() {
                        return Err(unknown_door(door_id));
                    }
                }
            }
            ObjectDef::StrangeDoor(config) => {
                if !scene_names.contains(&config.target_scene) {
                    return Err(ContentError::UnknownTargetScene {
                        scene: scene.name.clone(),
                        object: object.id().to_string(),
                        target: config.target_scene.clone(),
                    });
                }
            }
            ObjectDef::Pickup(_) | ObjectDef::LoopPuzzle(_) | ObjectDef::Narrative(_) => {}
        }
    }
    Ok(())
}

fn resolve_spawn_point(def: SpawnPointDef, graph: &DoorGraph) -> SpawnPoint {
    let offset = def.offset.unwrap_or_else(|| {
        graph
            .get(&def.prev_door_id)
            .filter(|connection| connection.from_scene() == def.prev_scene_name)
            .map(|connection| connection.to_door.spawn_offset)
            .unwrap_or(Vec3::ZERO)
    });
    SpawnPoint {
        prev_scene_name: def.prev_scene_name,
        prev_door_id: def.prev_door_id,
        position: def.position,
        offset,
    }
}
