use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod codes;
pub mod config;
pub mod dispatch;
pub mod jobs;
pub mod memory;
pub mod telemetry;
pub mod world;

pub use codes::{DispatchError, ResultCode};
pub use config::{
    load_role_dir, load_role_file, DispatchConfig, RoleBook, RoleDef, RoleDefError,
    RoleDefErrorCode, SourceLocation, Throughput, UnitRole,
};
pub use dispatch::Dispatcher;
pub use jobs::{
    ActionKind, AgentRef, Assignment, Job, JobAction, JobBoard, JobCategory, JobId,
    TransferPurpose, WithdrawPurpose,
};
pub use memory::{
    InMemoryStore, Memory, MemoryStore, SnapshotError, SnapshotManifest, SnapshotStore,
};
pub use telemetry::{AveragedStats, Instrumented, Telemetry};
pub use world::{
    ActionOutcome, Body, EntityKind, EntityView, FacilityKind, FacilitySpec, ObjectId, Position,
    RoomName, SimWorld, UnitSpec, World,
};

pub const ROOT_ENV_VAR: &str = "COLONY_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub roles_dir: PathBuf,
    pub state_dir: PathBuf,
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
    #[error("failed to create state directory at {path}: {source}")]
    CreateStateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "COLONY_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/colony\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

/// Locates the project root and makes sure the state directory exists.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_at(root)
}

pub fn app_paths_at(root: PathBuf) -> Result<AppPaths, StartupError> {
    let roles_dir = root.join("assets").join("roles");
    let state_dir = root.join("state");

    fs::create_dir_all(&state_dir).map_err(|source| StartupError::CreateStateDir {
        path: state_dir.clone(),
        source,
    })?;

    Ok(AppPaths {
        root,
        roles_dir,
        state_dir,
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

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
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
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let temp = TempDir::new().expect("tempdir");
        assert!(!is_repo_marker(temp.path()));

        fs::write(temp.path().join("Cargo.toml"), "[workspace]\n").expect("write manifest");
        assert!(!is_repo_marker(temp.path()));

        fs::create_dir(temp.path().join("assets")).expect("assets dir");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn app_paths_create_state_dir_under_root() {
        let temp = TempDir::new().expect("tempdir");
        let paths = app_paths_at(temp.path().to_path_buf()).expect("paths");
        assert!(paths.state_dir.is_dir());
        assert_eq!(paths.roles_dir, temp.path().join("assets").join("roles"));
    }
}
