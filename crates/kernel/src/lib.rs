use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod agent;
pub mod bus;
pub mod content;
pub mod context;
pub mod door;
pub mod inventory;
pub mod registry;
pub mod spawn;
pub mod transition;

pub use agent::{AgentDirectory, AgentLocator, CueSink, LocatorError, LogCueSink, Placeable};
pub use bus::{EventBus, Observer, Signal};
pub use content::{DoorConnection, DoorGraph, DoorGraphError, SceneDoor};
pub use context::KernelContext;
pub use door::{
    next_state, Door, DoorConfig, DoorEffect, DoorError, DoorInput, DoorOutcome, DoorState,
    TransitionAttempt, INTERACT_SIGNAL,
};
pub use inventory::{Inventory, InventoryError, InventoryItem, DEFAULT_INVENTORY_SLOTS};
pub use registry::{
    FactStore, JsonFileStore, NonRepeatingSelector, NullFactStore, RegistryError,
    RegistrySnapshot, StateRegistry, LOOP_SOLVED_COUNTER, LOOP_SOLVED_MAX, VOID_ENTRY_COUNTER,
};
pub use spawn::{resolve_spawn, SpawnPoint, Vec3};
pub use transition::{
    LoadProgress, Rgba, SceneLoadError, SceneLoader, SceneOp, SpawnOutcome, TransitionConfig,
    TransitionError, TransitionOrchestrator, TransitionPhase, TransitionReport,
    TransitionRequest, TransitionStatus, TransitionStyle,
};

pub const ROOT_ENV_VAR: &str = "ROOMKERNEL_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub save_dir: PathBuf,
}

impl AppPaths {
    pub fn world_file(&self) -> PathBuf {
        self.assets_dir.join("world.json")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.save_dir.join("registry.json")
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create save directory at {path}: {source}")]
    CreateSaveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "ROOMKERNEL_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/room-kernel\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_under(root)
}

/// Lays out asset and save directories under `root`, creating the save
/// directory if needed.
pub fn app_paths_under(root: PathBuf) -> Result<AppPaths, StartupError> {
    let assets_dir = root.join("assets");
    let save_dir = root.join("saves");

    fs::create_dir_all(&save_dir).map_err(|source| StartupError::CreateSaveDir {
        path: save_dir.clone(),
        source,
    })?;

    Ok(AppPaths {
        root,
        assets_dir,
        save_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("assets")).expect("assets");
        assert!(!is_repo_marker(dir.path()));

        fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").expect("cargo");
        assert!(is_repo_marker(dir.path()));
    }

    #[test]
    fn app_paths_create_save_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = app_paths_under(dir.path().to_path_buf()).expect("paths");
        assert!(paths.save_dir.is_dir());
        assert_eq!(paths.world_file(), dir.path().join("assets").join("world.json"));
        assert_eq!(paths.registry_file(), dir.path().join("saves").join("registry.json"));
    }
}
