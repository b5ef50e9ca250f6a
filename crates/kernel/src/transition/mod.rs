//! Single-flight scene transitions.
//!
//! A transition is an explicit step machine advanced by [`TransitionOrchestrator::tick`].
//! Each tick runs at most one step, so loads and fades spread across host
//! frames. While a run is being advanced it is moved out of the orchestrator,
//! which means an error or a panic inside a step can never leave the
//! orchestrator believing a transition is still in flight.

mod fade;
mod loader;
#[cfg(test)]
pub(crate) mod scripted;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::agent::Placeable;
use crate::spawn::{resolve_spawn, Vec3};

pub use fade::{ColorTrack, Rgba};
pub use loader::{LoadProgress, SceneLoadError, SceneLoader, SceneOp};

pub const DEFAULT_OVERLAY_SCENE: &str = "Transition";

/// Where the player left from and where they are headed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub from_scene: String,
    pub from_door_id: String,
    pub to_scene: String,
}

impl TransitionRequest {
    pub fn new(
        from_scene: impl Into<String>,
        from_door_id: impl Into<String>,
        to_scene: impl Into<String>,
    ) -> Self {
        Self {
            from_scene: from_scene.into(),
            from_door_id: from_door_id.into(),
            to_scene: to_scene.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    #[default]
    Standard,
    /// White flash after the fade in, used by the strange door.
    Flash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub overlay_scene: String,
    pub fade_millis: u64,
    pub flash_hold_millis: u64,
    pub flash_fade_millis: u64,
    /// Load progress at which the destination may activate.
    pub activation_threshold: f32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            overlay_scene: DEFAULT_OVERLAY_SCENE.to_string(),
            fade_millis: 1_000,
            flash_hold_millis: 150,
            flash_fade_millis: 200,
            activation_threshold: 0.9,
        }
    }
}

impl TransitionConfig {
    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_millis)
    }

    pub fn flash_hold(&self) -> Duration {
        Duration::from_millis(self.flash_hold_millis)
    }

    pub fn flash_fade(&self) -> Duration {
        Duration::from_millis(self.flash_fade_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    LoadingOverlay,
    ActivatingOverlayCamera,
    FadingToOpaque,
    Flashing,
    UnloadingPrevious,
    LoadingDestination,
    PositioningPlayer,
    ActivatingDestination,
    FadingToTransparent,
    UnloadingOverlay,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("transition to '{requested}' rejected: transition to '{in_flight}' is in progress")]
    AlreadyInProgress { requested: String, in_flight: String },
    #[error("transition destination is empty")]
    EmptyDestination,
    #[error("scene operation failed while {phase:?}: {source}")]
    SceneLoad {
        phase: TransitionPhase,
        #[source]
        source: SceneLoadError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnOutcome {
    Placed(Vec3),
    /// No spawn point matched; the player was left where it was.
    Missed,
    /// The transition was started without door data.
    NoRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionReport {
    pub request: Option<TransitionRequest>,
    pub to_scene: String,
    pub spawn: SpawnOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionStatus {
    Idle,
    InFlight(TransitionPhase),
    Completed(TransitionReport),
    Failed(TransitionError),
}

#[derive(Debug)]
enum Step {
    /// Finishes unloading an overlay left behind by an earlier run.
    ReleaseStaleOverlay,
    LoadOverlay { op: Option<SceneOp> },
    ActivateOverlayCamera,
    FadeToOpaque(ColorTrack),
    Flash(ColorTrack),
    UnloadPrevious { op: Option<SceneOp> },
    LoadDestination { op: Option<SceneOp>, activation_allowed: bool },
    PositionPlayer,
    ActivateDestination,
    FadeToTransparent(ColorTrack),
    UnloadOverlay,
}

impl Step {
    fn phase(&self) -> TransitionPhase {
        match self {
            Step::ReleaseStaleOverlay | Step::LoadOverlay { .. } => {
                TransitionPhase::LoadingOverlay
            }
            Step::ActivateOverlayCamera => TransitionPhase::ActivatingOverlayCamera,
            Step::FadeToOpaque(_) => TransitionPhase::FadingToOpaque,
            Step::Flash(_) => TransitionPhase::Flashing,
            Step::UnloadPrevious { .. } => TransitionPhase::UnloadingPrevious,
            Step::LoadDestination { .. } => TransitionPhase::LoadingDestination,
            Step::PositionPlayer => TransitionPhase::PositioningPlayer,
            Step::ActivateDestination => TransitionPhase::ActivatingDestination,
            Step::FadeToTransparent(_) => TransitionPhase::FadingToTransparent,
            Step::UnloadOverlay => TransitionPhase::UnloadingOverlay,
        }
    }
}

enum Advance {
    Pending,
    Finished,
}

/// Overlay bookkeeping kept on the orchestrator rather than on a run, so a run
/// dropped by a panic still leaves a record of the overlay scene it loaded.
#[derive(Debug)]
struct Overlay {
    color: Rgba,
    resident: bool,
    unloading: Option<SceneOp>,
}

impl Overlay {
    const fn new() -> Self {
        Self {
            color: Rgba::CLEAR,
            resident: false,
            unloading: None,
        }
    }

    /// Starts unloading the overlay scene if it is up and not already going.
    /// Returns `Ok(true)` once there is nothing left to wait for.
    fn begin_unload(
        &mut self,
        loader: &mut dyn SceneLoader,
        overlay_scene: &str,
    ) -> Result<bool, SceneLoadError> {
        if !self.resident {
            return Ok(true);
        }
        if self.unloading.is_some() {
            return Ok(false);
        }
        match loader.unload(overlay_scene) {
            Ok(op) => {
                self.unloading = Some(op);
                Ok(false)
            }
            Err(SceneLoadError::NotLoaded { .. }) => {
                debug!(overlay = overlay_scene, "overlay_already_unloaded");
                self.mark_unloaded();
                Ok(true)
            }
            Err(source) => Err(source),
        }
    }

    /// Polls the pending overlay unload. Returns `Ok(true)` once it is done.
    fn poll_unload(
        &mut self,
        loader: &mut dyn SceneLoader,
        overlay_scene: &str,
    ) -> Result<bool, SceneLoadError> {
        if self.begin_unload(loader, overlay_scene)? {
            return Ok(true);
        }
        let Some(op) = self.unloading else {
            return Ok(false);
        };
        match loader.poll(op) {
            Ok(progress) if progress.is_done => {
                self.mark_unloaded();
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(source) => {
                // Forget the handle so the next attempt issues a fresh unload.
                self.unloading = None;
                Err(source)
            }
        }
    }

    fn mark_unloaded(&mut self) {
        self.resident = false;
        self.unloading = None;
    }
}

#[derive(Debug)]
struct ActiveTransition {
    request: Option<TransitionRequest>,
    to_scene: String,
    style: TransitionStyle,
    previous_scene: Option<String>,
    spawn: SpawnOutcome,
    step: Step,
}

fn scene_error(phase: TransitionPhase) -> impl Fn(SceneLoadError) -> TransitionError {
    move |source| TransitionError::SceneLoad { phase, source }
}

fn poll_done(
    loader: &mut dyn SceneLoader,
    op: SceneOp,
    phase: TransitionPhase,
) -> Result<bool, TransitionError> {
    Ok(loader.poll(op).map_err(scene_error(phase))?.is_done)
}

impl ActiveTransition {
    fn advance(
        &mut self,
        dt: Duration,
        config: &TransitionConfig,
        loader: &mut dyn SceneLoader,
        player: &mut dyn Placeable,
        overlay: &mut Overlay,
    ) -> Result<Advance, TransitionError> {
        let phase = self.step.phase();
        let style = self.style;
        let next = match &mut self.step {
            Step::ReleaseStaleOverlay => overlay
                .poll_unload(loader, &config.overlay_scene)
                .map_err(scene_error(phase))?
                .then_some(Step::LoadOverlay { op: None }),
            Step::LoadOverlay { op } => {
                let handle = match *op {
                    Some(handle) => handle,
                    None => {
                        self.previous_scene = loader.active_scene();
                        let handle = loader
                            .load_additive(&config.overlay_scene, true)
                            .map_err(scene_error(phase))?;
                        overlay.resident = true;
                        *op = Some(handle);
                        handle
                    }
                };
                poll_done(loader, handle, phase)?.then_some(Step::ActivateOverlayCamera)
            }
            Step::ActivateOverlayCamera => {
                loader
                    .activate_overlay_camera(&config.overlay_scene)
                    .map_err(scene_error(phase))?;
                overlay.color = Rgba::CLEAR;
                Some(Step::FadeToOpaque(ColorTrack::fade_to_opaque(
                    config.fade_duration(),
                )))
            }
            Step::FadeToOpaque(track) => {
                overlay.color = track.advance(dt);
                track.is_finished().then(|| match style {
                    TransitionStyle::Standard => Step::UnloadPrevious { op: None },
                    TransitionStyle::Flash => {
                        Step::Flash(ColorTrack::flash(config.flash_hold(), config.flash_fade()))
                    }
                })
            }
            Step::Flash(track) => {
                overlay.color = track.advance(dt);
                track
                    .is_finished()
                    .then_some(Step::UnloadPrevious { op: None })
            }
            Step::UnloadPrevious { op } => {
                let previous = self
                    .previous_scene
                    .as_deref()
                    .filter(|scene| *scene != config.overlay_scene);
                match (previous, *op) {
                    (None, _) => Some(Step::LoadDestination {
                        op: None,
                        activation_allowed: false,
                    }),
                    (Some(_), Some(handle)) => {
                        poll_done(loader, handle, phase)?.then_some(Step::LoadDestination {
                            op: None,
                            activation_allowed: false,
                        })
                    }
                    (Some(scene), None) => {
                        *op = Some(loader.unload(scene).map_err(scene_error(phase))?);
                        None
                    }
                }
            }
            Step::LoadDestination {
                op,
                activation_allowed,
            } => {
                let handle = match *op {
                    Some(handle) => handle,
                    None => {
                        let handle = loader
                            .load_additive(&self.to_scene, false)
                            .map_err(scene_error(phase))?;
                        *op = Some(handle);
                        handle
                    }
                };
                let progress = loader.poll(handle).map_err(scene_error(phase))?;
                if !*activation_allowed
                    && (progress.is_done || progress.progress >= config.activation_threshold)
                {
                    loader.allow_activation(handle).map_err(scene_error(phase))?;
                    *activation_allowed = true;
                }
                (progress.is_done && *activation_allowed).then_some(Step::PositionPlayer)
            }
            Step::PositionPlayer => {
                self.spawn = place_player(self.request.as_ref(), &self.to_scene, loader, player);
                Some(Step::ActivateDestination)
            }
            Step::ActivateDestination => {
                loader
                    .set_active_scene(&self.to_scene)
                    .map_err(scene_error(phase))?;
                info!(scene = %self.to_scene, "scene_activated");
                Some(Step::FadeToTransparent(ColorTrack::fade_to_clear(
                    config.fade_duration(),
                )))
            }
            Step::FadeToTransparent(track) => {
                overlay.color = track.advance(dt);
                track
                    .is_finished()
                    .then_some(Step::UnloadOverlay)
            }
            Step::UnloadOverlay => {
                let done = if overlay.unloading.is_some() {
                    overlay.poll_unload(loader, &config.overlay_scene)
                } else {
                    overlay.begin_unload(loader, &config.overlay_scene)
                };
                if done.map_err(scene_error(phase))? {
                    return Ok(Advance::Finished);
                }
                None
            }
        };

        if let Some(step) = next {
            debug!(from = ?phase, to = ?step.phase(), "transition_step");
            self.step = step;
        }
        Ok(Advance::Pending)
    }
}

fn place_player(
    request: Option<&TransitionRequest>,
    to_scene: &str,
    loader: &dyn SceneLoader,
    player: &mut dyn Placeable,
) -> SpawnOutcome {
    let Some(request) = request else {
        debug!(to_scene, "transition_without_door_data");
        return SpawnOutcome::NoRequest;
    };
    let spawn_points = loader.spawn_points(to_scene);
    match resolve_spawn(request, &spawn_points) {
        Some(point) => {
            let position = point.arrival_position();
            player.place_at(position);
            info!(
                to_scene,
                x = position.x,
                y = position.y,
                z = position.z,
                "player_positioned"
            );
            SpawnOutcome::Placed(position)
        }
        None => {
            warn!(
                condition = "spawn_resolution_miss",
                from_scene = %request.from_scene,
                from_door_id = %request.from_door_id,
                to_scene,
                "spawn_point_not_found"
            );
            SpawnOutcome::Missed
        }
    }
}

/// Clears the overlay colour when a step panics. The run itself is already
/// out of the orchestrator, so the single-flight lock is free once the panic
/// unwinds. A resident overlay scene stays recorded and is released by the
/// next run before it loads its own.
struct UnwindGuard<'a> {
    overlay: &'a mut Overlay,
    to_scene: &'a str,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.overlay.color = Rgba::CLEAR;
            error!(
                to_scene = %self.to_scene,
                overlay_resident = self.overlay.resident,
                "transition_aborted_by_panic"
            );
        }
    }
}

#[derive(Debug)]
pub struct TransitionOrchestrator {
    config: TransitionConfig,
    pending_request: Option<TransitionRequest>,
    active: Option<ActiveTransition>,
    overlay: Overlay,
}

impl Default for TransitionOrchestrator {
    fn default() -> Self {
        Self::new(TransitionConfig::default())
    }
}

impl TransitionOrchestrator {
    pub fn new(config: TransitionConfig) -> Self {
        Self {
            config,
            pending_request: None,
            active: None,
            overlay: Overlay::new(),
        }
    }

    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    /// Stores door data for the next [`begin_transition`](Self::begin_transition).
    /// A later call overwrites an earlier one.
    pub fn set_transition_data(&mut self, request: TransitionRequest) {
        debug!(
            from_scene = %request.from_scene,
            from_door_id = %request.from_door_id,
            to_scene = %request.to_scene,
            "transition_data_set"
        );
        self.pending_request = Some(request);
    }

    pub fn pending_request(&self) -> Option<&TransitionRequest> {
        self.pending_request.as_ref()
    }

    pub fn begin_transition(
        &mut self,
        to_scene: &str,
        style: TransitionStyle,
    ) -> Result<(), TransitionError> {
        self.ensure_idle(to_scene)?;
        if to_scene.is_empty() {
            warn!("transition_destination_empty");
            return Err(TransitionError::EmptyDestination);
        }

        let request = self.pending_request.take();
        let step = if self.overlay.resident {
            debug!(overlay = %self.config.overlay_scene, "stale_overlay_pending_release");
            Step::ReleaseStaleOverlay
        } else {
            Step::LoadOverlay { op: None }
        };
        info!(
            from_scene = request.as_ref().map(|r| r.from_scene.as_str()).unwrap_or(""),
            from_door_id = request.as_ref().map(|r| r.from_door_id.as_str()).unwrap_or(""),
            to_scene,
            ?style,
            "transition_started"
        );
        self.active = Some(ActiveTransition {
            request,
            to_scene: to_scene.to_string(),
            style,
            previous_scene: None,
            spawn: SpawnOutcome::NoRequest,
            step,
        });
        Ok(())
    }

    /// Sets the door data and begins the transition it names. A rejected call
    /// leaves the pending door data untouched.
    pub fn request_transition(
        &mut self,
        request: TransitionRequest,
        style: TransitionStyle,
    ) -> Result<(), TransitionError> {
        self.ensure_idle(&request.to_scene)?;
        let to_scene = request.to_scene.clone();
        self.set_transition_data(request);
        self.begin_transition(&to_scene, style)
    }

    pub fn is_in_flight(&self) -> bool {
        self.active.is_some()
    }

    pub fn phase(&self) -> Option<TransitionPhase> {
        self.active.as_ref().map(|run| run.step.phase())
    }

    pub fn in_flight_request(&self) -> Option<&TransitionRequest> {
        self.active.as_ref().and_then(|run| run.request.as_ref())
    }

    pub fn overlay_color(&self) -> Rgba {
        self.overlay.color
    }

    /// Runs one step of the in-flight transition, if any.
    pub fn tick(
        &mut self,
        dt: Duration,
        loader: &mut dyn SceneLoader,
        player: &mut dyn Placeable,
    ) -> TransitionStatus {
        let Some(mut run) = self.active.take() else {
            return TransitionStatus::Idle;
        };

        let result = {
            let to_scene = run.to_scene.clone();
            let guard = UnwindGuard {
                overlay: &mut self.overlay,
                to_scene: &to_scene,
            };
            run.advance(dt, &self.config, loader, player, &mut *guard.overlay)
        };

        match result {
            Ok(Advance::Pending) => {
                let phase = run.step.phase();
                self.active = Some(run);
                TransitionStatus::InFlight(phase)
            }
            Ok(Advance::Finished) => {
                self.overlay.color = Rgba::CLEAR;
                info!(to_scene = %run.to_scene, spawn = ?run.spawn, "transition_completed");
                TransitionStatus::Completed(TransitionReport {
                    request: run.request,
                    to_scene: run.to_scene,
                    spawn: run.spawn,
                })
            }
            Err(failure) => self.fail(run, failure, loader),
        }
    }

    fn ensure_idle(&self, requested: &str) -> Result<(), TransitionError> {
        let Some(run) = self.active.as_ref() else {
            return Ok(());
        };
        warn!(
            condition = "transition_already_in_progress",
            requested,
            in_flight = %run.to_scene,
            "transition_rejected"
        );
        Err(TransitionError::AlreadyInProgress {
            requested: requested.to_string(),
            in_flight: run.to_scene.clone(),
        })
    }

    fn fail(
        &mut self,
        run: ActiveTransition,
        failure: TransitionError,
        loader: &mut dyn SceneLoader,
    ) -> TransitionStatus {
        if let Err(cleanup) = self
            .overlay
            .begin_unload(loader, &self.config.overlay_scene)
        {
            warn!(
                overlay = %self.config.overlay_scene,
                error = %cleanup,
                "transition_overlay_cleanup_failed"
            );
        }
        self.overlay.color = Rgba::CLEAR;
        error!(
            to_scene = %run.to_scene,
            phase = ?run.step.phase(),
            error = %failure,
            "transition_failed"
        );
        TransitionStatus::Failed(failure)
    }
}
