use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hive_engine::{
    load_role_dir, resolve_app_paths, DispatchConfig, Memory, MemoryStore, RoleBook, RoleDefError,
    SimWorld, SnapshotError, SnapshotStore, StartupError,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::loop_runner::RunConfig;
use super::scenario;

pub(crate) const SLOW_TICK_ENV_VAR: &str = "COLONY_SLOW_TICK_MS";
const DEFAULT_TICKS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliOptions {
    pub(crate) ticks: u64,
    pub(crate) target_tps: u32,
    pub(crate) state_dir: Option<PathBuf>,
    pub(crate) roles_dir: Option<PathBuf>,
    pub(crate) fresh: bool,
    pub(crate) stats: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            ticks: DEFAULT_TICKS,
            target_tps: 0,
            state_dir: None,
            roles_dir: None,
            fresh: false,
            stats: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    Help,
    Run(CliOptions),
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to create state directory at {path}: {source}")]
    CreateStateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("role definitions failed to load: {0}")]
    Roles(#[from] RoleDefError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub(crate) struct AppWiring {
    pub(crate) run: RunConfig,
    pub(crate) dispatch: DispatchConfig,
    pub(crate) world: SimWorld,
    pub(crate) memory: Memory,
    pub(crate) store: SnapshotStore,
}

pub(crate) fn parse_cli_args(args: &[String]) -> Result<CliCommand, String> {
    let mut options = CliOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => return Ok(CliCommand::Help),
            "--ticks" => {
                let value = flag_value(args, index, "--ticks")?;
                options.ticks = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --ticks value '{value}' (expected u64)"))?;
                index += 1;
            }
            "--tps" => {
                let value = flag_value(args, index, "--tps")?;
                options.target_tps = value
                    .parse::<u32>()
                    .map_err(|_| format!("invalid --tps value '{value}' (expected u32)"))?;
                index += 1;
            }
            "--state-dir" => {
                options.state_dir = Some(PathBuf::from(flag_value(args, index, "--state-dir")?));
                index += 1;
            }
            "--roles" => {
                options.roles_dir = Some(PathBuf::from(flag_value(args, index, "--roles")?));
                index += 1;
            }
            "--fresh" => options.fresh = true,
            "--no-stats" => options.stats = false,
            other => return Err(format!("unknown argument '{other}'")),
        }
        index += 1;
    }
    Ok(CliCommand::Run(options))
}

fn flag_value<'a>(args: &'a [String], index: usize, flag: &str) -> Result<&'a str, String> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("missing value for {flag}"))
}

pub(crate) fn usage_text() -> String {
    [
        "colony - tick-driven job dispatcher over a simulated world",
        "",
        "Usage:",
        "  colony [--ticks <u64>] [--tps <u32>] [--state-dir <dir>] [--roles <dir>] [--fresh] [--no-stats]",
        "",
        "Defaults:",
        "  --ticks 300",
        "  --tps 0 (run ticks back to back)",
        "  --state-dir <root>/state",
        "  --roles <root>/assets/roles",
    ]
    .join("\n")
}

pub(crate) fn build_app(options: CliOptions) -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Colony Startup ===");

    let (roles_dir, state_dir) = resolve_dirs(&options)?;
    fs::create_dir_all(&state_dir).map_err(|source| BootstrapError::CreateStateDir {
        path: state_dir.clone(),
        source,
    })?;

    let roles = load_roles(&roles_dir)?;
    let dispatch = DispatchConfig {
        stats_enabled: options.stats,
        ..DispatchConfig::default()
    }
    .with_roles(roles);

    let mut store = SnapshotStore::new(state_dir);
    let memory = if options.fresh {
        info!(dir = %store.dir().display(), "memory_reset");
        Memory::default()
    } else {
        store.load()?
    };

    Ok(AppWiring {
        run: RunConfig {
            ticks: options.ticks,
            target_tps: options.target_tps,
            simulated_slow_tick: resolve_slow_tick_duration(),
            ..RunConfig::default()
        },
        dispatch,
        world: scenario::seed_world(),
        memory,
        store,
    })
}

fn resolve_dirs(options: &CliOptions) -> Result<(PathBuf, PathBuf), StartupError> {
    if let (Some(roles), Some(state)) = (&options.roles_dir, &options.state_dir) {
        return Ok((roles.clone(), state.clone()));
    }
    let paths = resolve_app_paths()?;
    Ok((
        options.roles_dir.clone().unwrap_or(paths.roles_dir),
        options.state_dir.clone().unwrap_or(paths.state_dir),
    ))
}

/// Files under `dir` override the builtin roles one role at a time. A missing
/// directory keeps the builtin book; a malformed file is fatal.
pub(crate) fn load_roles(dir: &Path) -> Result<RoleBook, RoleDefError> {
    let mut book = RoleBook::builtin();
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "role_dir_missing; using builtin roles");
        return Ok(book);
    }
    let overrides = load_role_dir(dir)?;
    info!(dir = %dir.display(), roles = overrides.len(), "role_defs_loaded");
    book.merge(overrides);
    Ok(book)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn resolve_slow_tick_duration() -> Duration {
    match env::var(SLOW_TICK_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_TICK_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-tick env var value; ignoring"
                );
                Duration::ZERO
            }
        },
        Err(env::VarError::NotPresent) => Duration::ZERO,
        Err(err) => {
            warn!(
                env_var = SLOW_TICK_ENV_VAR,
                error = %err,
                "unable to read slow-tick env var; ignoring"
            );
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use hive_engine::{JobCategory, UnitRole};
    use tempfile::TempDir;

    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_flags_over_defaults() {
        let command = parse_cli_args(&args(&[
            "--ticks",
            "50",
            "--tps",
            "20",
            "--state-dir",
            "/tmp/state",
            "--fresh",
        ]))
        .expect("parse");
        let CliCommand::Run(options) = command else {
            panic!("expected run command");
        };
        assert_eq!(options.ticks, 50);
        assert_eq!(options.target_tps, 20);
        assert_eq!(options.state_dir, Some(PathBuf::from("/tmp/state")));
        assert_eq!(options.roles_dir, None);
        assert!(options.fresh);
        assert!(options.stats);
    }

    #[test]
    fn rejects_missing_and_malformed_values() {
        assert_eq!(
            parse_cli_args(&args(&["--ticks"])),
            Err("missing value for --ticks".to_string())
        );
        assert!(parse_cli_args(&args(&["--tps", "fast"]))
            .expect_err("bad tps")
            .contains("expected u32"));
        assert!(parse_cli_args(&args(&["--bogus"])).is_err());
        assert_eq!(parse_cli_args(&args(&["-h"])), Ok(CliCommand::Help));
    }

    #[test]
    fn missing_role_dir_keeps_builtin_roles() {
        let temp = TempDir::new().expect("tempdir");
        let book = load_roles(&temp.path().join("absent")).expect("roles");
        assert_eq!(book, RoleBook::builtin());
    }

    #[test]
    fn role_files_override_builtin_roles() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(
            temp.path().join("haulers.xml"),
            r#"<Roles>
  <RoleDef>
    <role>transferring</role>
    <jobs>transferSource, transfer</jobs>
  </RoleDef>
</Roles>"#,
        )
        .expect("write roles");

        let book = load_roles(temp.path()).expect("roles");
        assert_eq!(
            book.jobs_for(UnitRole::Transferring),
            &[JobCategory::TransferSource, JobCategory::Transfer]
        );
        assert_eq!(
            book.jobs_for(UnitRole::Work),
            RoleBook::builtin().jobs_for(UnitRole::Work)
        );
    }

    #[test]
    fn malformed_role_file_is_fatal() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("broken.xml"), "<Roles><RoleDef>").expect("write");
        assert!(load_roles(temp.path()).is_err());
    }
}
