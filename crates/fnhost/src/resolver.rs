// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resolution of the application's launch target from its directory.
//!
//! The default resolver reads `worker.config.json` from the application
//! directory:
//!
//! ```json
//! {
//!   "description": {
//!     "defaultExecutablePath": "dotnet",
//!     "defaultWorkerPath": "App.dll",
//!     "arguments": ["--verbose"]
//!   }
//! }
//! ```
//!
//! `{WorkerRoot}` in any field expands to the application directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Name of the worker description file inside the application directory.
pub const WORKER_CONFIG_FILE: &str = "worker.config.json";

/// Environment variable naming the executable when no description file exists.
pub const EXECUTABLE_ENV: &str = "FUNCTIONS_APPLICATION_EXECUTABLE";

const WORKER_ROOT_TOKEN: &str = "{WorkerRoot}";

/// Errors from path resolution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("application directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no worker description in {} and {} is not set", .dir.display(), EXECUTABLE_ENV)]
    NothingToLaunch { dir: PathBuf },

    #[error("executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("{} names neither defaultExecutablePath nor defaultWorkerPath", .0.display())]
    MissingExecutable(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// What to start and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Program path, or a bare name left to `PATH` lookup.
    pub program: PathBuf,
    pub arguments: Vec<String>,
    /// Directory the application runs in.
    pub working_dir: PathBuf,
}

/// Maps an application directory to a [`LaunchTarget`].
pub trait PathResolver: Send + Sync {
    fn resolve(&self, application_dir: &Path) -> Result<LaunchTarget, ResolveError>;
}

#[derive(Debug, Deserialize)]
struct WorkerConfigFile {
    description: WorkerDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkerDescription {
    default_executable_path: Option<String>,
    default_worker_path: Option<String>,
    #[serde(default)]
    arguments: Vec<String>,
}

/// Resolver backed by `worker.config.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerConfigResolver;

impl WorkerConfigResolver {
    fn from_description(
        dir: &Path,
        description: WorkerDescription,
        config_path: &Path,
    ) -> Result<LaunchTarget, ResolveError> {
        let expand = |value: &str| value.replace(WORKER_ROOT_TOKEN, &dir.to_string_lossy());

        let worker_path = description
            .default_worker_path
            .as_deref()
            .map(|p| dir.join(expand(p)));

        let (program, mut arguments) = match (description.default_executable_path, worker_path) {
            (Some(exe), worker) => {
                let exe = PathBuf::from(expand(&exe));
                let program = if exe.is_relative() && dir.join(&exe).exists() {
                    dir.join(exe)
                } else {
                    exe
                };
                let arguments = worker
                    .map(|w| vec![w.to_string_lossy().into_owned()])
                    .unwrap_or_default();
                (program, arguments)
            }
            // A self-contained worker is its own executable
            (None, Some(worker)) => (worker, Vec::new()),
            (None, None) => return Err(ResolveError::MissingExecutable(config_path.to_path_buf())),
        };

        arguments.extend(description.arguments.iter().map(|a| expand(a)));

        Ok(LaunchTarget {
            program,
            arguments,
            working_dir: dir.to_path_buf(),
        })
    }

    fn from_env(dir: &Path) -> Result<LaunchTarget, ResolveError> {
        let name = std::env::var(EXECUTABLE_ENV)
            .ok()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ResolveError::NothingToLaunch {
                dir: dir.to_path_buf(),
            })?;
        let program = dir.join(name);
        if !program.is_file() {
            return Err(ResolveError::ExecutableNotFound(program));
        }
        Ok(LaunchTarget {
            program,
            arguments: Vec::new(),
            working_dir: dir.to_path_buf(),
        })
    }
}

impl PathResolver for WorkerConfigResolver {
    fn resolve(&self, application_dir: &Path) -> Result<LaunchTarget, ResolveError> {
        if !application_dir.is_dir() {
            return Err(ResolveError::DirectoryNotFound(application_dir.to_path_buf()));
        }

        let config_path = application_dir.join(WORKER_CONFIG_FILE);
        if !config_path.exists() {
            debug!(dir = %application_dir.display(), "No worker description, using {}", EXECUTABLE_ENV);
            return Self::from_env(application_dir);
        }

        let raw = std::fs::read_to_string(&config_path).map_err(|source| ResolveError::Read {
            path: config_path.clone(),
            source,
        })?;
        let parsed: WorkerConfigFile =
            serde_json::from_str(&raw).map_err(|source| ResolveError::Parse {
                path: config_path.clone(),
                source,
            })?;

        let target = Self::from_description(application_dir, parsed.description, &config_path)?;
        debug!(
            program = %target.program.display(),
            args = ?target.arguments,
            "Resolved launch target"
        );
        Ok(target)
    }
}

/// Resolver that always returns the same target.
#[derive(Debug, Clone)]
pub struct FixedResolver {
    target: LaunchTarget,
}

impl FixedResolver {
    pub fn new(target: LaunchTarget) -> Self {
        Self { target }
    }
}

impl PathResolver for FixedResolver {
    fn resolve(&self, _application_dir: &Path) -> Result<LaunchTarget, ResolveError> {
        Ok(self.target.clone())
    }
}
