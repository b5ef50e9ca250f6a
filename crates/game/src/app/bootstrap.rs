use std::env;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::loop_runner::LoopConfig;

const SEED_ENV_VAR: &str = "ROOMKERNEL_SEED";
const SAVE_ENV_VAR: &str = "ROOMKERNEL_SAVE";
const DEFAULT_SEED: u64 = 0x5eed;

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) seed: u64,
    /// Restore the registry from, and save it to, the save directory.
    pub(crate) persist_registry: bool,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Room Kernel Startup ===");

    let seed = resolve_seed(DEFAULT_SEED);
    let persist_registry = parse_save_flag_from_env();
    info!(seed, persist_registry, "app_configured");

    AppWiring {
        config: LoopConfig::default(),
        seed,
        persist_registry,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn resolve_seed(default_seed: u64) -> u64 {
    match env::var(SEED_ENV_VAR) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(seed) => seed,
            Err(_) => {
                warn!(
                    env_var = SEED_ENV_VAR,
                    value = value.as_str(),
                    "invalid seed env var value; falling back to default"
                );
                default_seed
            }
        },
        Err(env::VarError::NotPresent) => default_seed,
        Err(err) => {
            warn!(
                env_var = SEED_ENV_VAR,
                error = %err,
                "unable to read seed env var; falling back to default"
            );
            default_seed
        }
    }
}

fn parse_save_flag_from_env() -> bool {
    env::var(SAVE_ENV_VAR)
        .map(|raw| is_enabled_flag(&raw))
        .unwrap_or(false)
}

fn is_enabled_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_flag_accepts_common_truthy_values() {
        for raw in ["1", "true", " TRUE ", "yes", "on"] {
            assert!(is_enabled_flag(raw), "{raw}");
        }
        for raw in ["", "0", "false", "no", "save"] {
            assert!(!is_enabled_flag(raw), "{raw}");
        }
    }
}
