use std::env;
use std::process::ExitCode;
use std::time::Duration;

use kernel::{
    resolve_app_paths, FactStore, JsonFileStore, NullFactStore, StartupError,
    LOOP_SOLVED_COUNTER, VOID_ENTRY_COUNTER,
};
use thiserror::Error;
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;
use super::gameplay::{self, GameSession, SessionError};
use super::world::{load_world, ContentError};

pub(crate) const FRAME_MS_ENV_VAR: &str = "ROOMKERNEL_FRAME_MS";
const DEFAULT_MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub(crate) target_tps: u32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    /// Wall time each headless frame pretends to take. Zero means one tick.
    pub(crate) simulated_frame_ms: u64,
    /// Frames to run before giving up on the session settling.
    pub(crate) max_frames: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
            max_ticks_per_frame: 5,
            simulated_frame_ms: 16,
            max_frames: 100_000,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("session did not settle within {frames} frames")]
    NotSettled { frames: u64 },
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    if let Err(err) = run_session(app) {
        error!(error = %err, "session_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run_session(app: AppWiring) -> Result<(), AppError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        assets_dir = %app_paths.assets_dir.display(),
        save_dir = %app_paths.save_dir.display(),
        "startup"
    );

    let world = load_world(&app_paths.world_file())?;
    let ctx = gameplay::kernel_context(&world, app.seed);
    let store: Box<dyn FactStore> = if app.persist_registry {
        Box::new(JsonFileStore::new(app_paths.registry_file()))
    } else {
        Box::new(NullFactStore)
    };
    let mut session = GameSession::new(world, ctx, store, app.seed)?;
    drive(&mut session, &app.config)?;
    Ok(())
}

/// Runs fixed-step ticks until the session settles. Returns the frame count.
pub(crate) fn drive(session: &mut GameSession, config: &LoopConfig) -> Result<u64, AppError> {
    let fixed_dt = fixed_tick(config.target_tps);
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let frame_dt = simulated_frame(
        frame_ms_from_env(env::var(FRAME_MS_ENV_VAR), config.simulated_frame_ms),
        config.max_frame_delta,
        fixed_dt,
    );

    let mut accumulator = Duration::ZERO;
    let mut frames = 0u64;
    while !session.is_settled() {
        if frames >= config.max_frames {
            return Err(AppError::NotSettled { frames });
        }
        frames += 1;

        accumulator = accumulator.saturating_add(frame_dt);
        let plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            warn!(
                dropped_ms = plan.dropped_backlog.as_millis() as u64,
                "sim_backlog_dropped"
            );
        }

        for _ in 0..plan.ticks_to_run {
            session.tick(fixed_dt)?;
            if session.is_settled() {
                break;
            }
        }
    }

    let registry = &session.ctx().registry;
    info!(
        frames,
        ticks = session.ticks(),
        transitions = session.reports().len(),
        failed_transitions = session.failures().len(),
        active_scene = session.active_scene().as_deref().unwrap_or(""),
        player_position = ?session.player_position(),
        void_entries = registry.counter(VOID_ENTRY_COUNTER),
        loop_solved = registry.counter(LOOP_SOLVED_COUNTER),
        inventory_items = session.ctx().inventory.borrow().len(),
        "session_settled"
    );
    Ok(frames)
}

fn fixed_tick(target_tps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(target_tps.max(1)))
}

/// How much time one headless frame feeds the accumulator. The requested
/// frame time is capped at `max_frame_delta`. A zero request runs exactly one
/// tick per frame.
fn simulated_frame(requested: Duration, max_frame_delta: Duration, fixed_dt: Duration) -> Duration {
    let cap = if max_frame_delta.is_zero() {
        DEFAULT_MAX_FRAME_DELTA
    } else {
        max_frame_delta
    };
    match requested.min(cap) {
        frame if frame.is_zero() => fixed_dt,
        frame => frame,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

/// Splits the accumulated frame time into whole ticks. Time left over after
/// `max_ticks_per_frame` ticks is dropped once it amounts to a full tick, so a
/// stalled frame never snowballs into the next.
fn plan_sim_steps(accumulator: Duration, fixed_dt: Duration, max_ticks_per_frame: u32) -> StepPlan {
    let whole_ticks = accumulator.as_nanos() / fixed_dt.as_nanos().max(1);
    let ticks_to_run = whole_ticks.min(u128::from(max_ticks_per_frame)) as u32;
    let leftover = accumulator.saturating_sub(fixed_dt * ticks_to_run);

    if leftover >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: leftover,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: leftover,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn frame_ms_from_env(raw: Result<String, env::VarError>, config_frame_ms: u64) -> Duration {
    let fallback = Duration::from_millis(config_frame_ms);
    match raw {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = FRAME_MS_ENV_VAR,
                    value = value.as_str(),
                    fallback_ms = config_frame_ms,
                    "invalid frame-time env var value; using configured frame time"
                );
                fallback
            }
        },
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = FRAME_MS_ENV_VAR,
                error = %err,
                fallback_ms = config_frame_ms,
                "unable to read frame-time env var; using configured frame time"
            );
            fallback
        }
    }
}
