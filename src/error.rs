//! Error types for launching catalog entries.
//!
//! Every variant is scoped to a single entry: the REPL reports it and keeps
//! going. Conditions that only warrant a warning (failed installs, readiness
//! timeouts, failed terminations) are not errors and live next to the code
//! that produces them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("unknown tool: {id}")]
    UnknownTool { id: String },

    /// The static file or dev-server directory does not exist.
    #[error("{kind} not found: {}", path.display())]
    NotFound { kind: &'static str, path: PathBuf },

    /// A Next.js tool has no environment file in its directory.
    #[error("{name} needs environment setup: copy .env.example to {} and fill in values", env_file.display())]
    MissingEnvSetup { name: String, env_file: PathBuf },

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    pub fn not_found_file(path: PathBuf) -> Self {
        Self::NotFound { kind: "file", path }
    }

    pub fn not_found_dir(path: PathBuf) -> Self {
        Self::NotFound {
            kind: "directory",
            path,
        }
    }
}
