//! Configuration management for Toolrack.
//!
//! This module defines the structure of the optional `toolrack.toml` file,
//! the runtime `LaunchConfig` derived from it, and functionality to load and
//! parse it.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::catalog::ToolKind;

/// Top-level configuration structure corresponding to `toolrack.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Directory the tool locations are resolved against (default: the
    /// directory containing the config file).
    pub root: Option<String>,
    /// Whether launches open the browser (default: true).
    pub auto_open_browser: Option<bool>,
    /// Delay between successive dev-server launches in a group, in seconds.
    pub stagger_delay_secs: Option<f64>,
    /// Whether to use Unicode symbols in messages (default: true).
    pub symbols: Option<bool>,
    /// Maximum number of captured output lines kept per dev server.
    pub max_lines: Option<usize>,
    /// Template for per-process log file paths (e.g., "logs/{id}.log").
    pub log_file: Option<String>,
    /// Time to wait for processes to exit after the terminate signal (ms).
    pub shutdown_grace_ms: Option<u64>,
    /// Directory whose presence means dependencies are installed.
    pub install_marker: Option<String>,
    /// Environment file required by Next.js tools.
    pub env_file: Option<String>,
    /// Ids launched by the production group.
    pub production: Option<Vec<String>>,
    pub commands: Option<CommandsConfig>,
    pub probe: Option<ProbeConfig>,
    /// Replaces the built-in catalog when present.
    #[serde(default, rename = "tool")]
    pub tools: Vec<ToolConfig>,
}

/// Commands used to install dependencies and start dev servers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandsConfig {
    pub install: Option<String>,
    /// Vite dev command; `--port <port>` is appended.
    pub vite: Option<String>,
    /// Next.js dev command; `PORT` is set in its environment.
    pub next: Option<String>,
}

/// Readiness probe timing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeConfig {
    pub vite_timeout_secs: Option<u64>,
    pub next_timeout_secs: Option<u64>,
    pub attempt_timeout_ms: Option<u64>,
    pub retry_interval_ms: Option<u64>,
}

/// Configuration for a single catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: ToolKind,
    /// File for static tools, directory for dev servers.
    pub path: String,
    pub port: Option<u16>,
}

/// A parsed command line: program plus leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts =
            shell_words::split(raw).with_context(|| format!("failed to parse command {:?}", raw))?;
        if parts.is_empty() {
            return Err(anyhow!("empty command"));
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.args.iter().map(|s| s.as_str()));
        shell_words::join(parts)
    }
}

/// Per-attempt timing used by the readiness prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub attempt_timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(1),
            retry_interval: Duration::from_millis(500),
        }
    }
}

/// Runtime launch settings, read on every launch.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub auto_open_browser: bool,
    pub stagger_delay: Duration,
    pub vite_timeout: Duration,
    pub next_timeout: Duration,
    pub probe: ProbeSettings,
    pub install_cmd: CommandLine,
    pub vite_cmd: CommandLine,
    pub next_cmd: CommandLine,
    pub install_marker: String,
    pub env_file: String,
    pub shutdown_grace: Duration,
    pub max_lines: usize,
    pub log_file: Option<String>,
}

pub const DEFAULT_INSTALL_CMD: &str = "npm install";
pub const DEFAULT_VITE_CMD: &str = "npm run dev --";
pub const DEFAULT_NEXT_CMD: &str = "npm run dev";

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            auto_open_browser: true,
            stagger_delay: Duration::from_secs(1),
            vite_timeout: Duration::from_secs(15),
            next_timeout: Duration::from_secs(45),
            probe: ProbeSettings::default(),
            install_cmd: default_command(DEFAULT_INSTALL_CMD),
            vite_cmd: default_command(DEFAULT_VITE_CMD),
            next_cmd: default_command(DEFAULT_NEXT_CMD),
            install_marker: "node_modules".to_string(),
            env_file: ".env".to_string(),
            shutdown_grace: Duration::from_secs(3),
            max_lines: 200,
            log_file: None,
        }
    }
}

/// Built-in commands go through the same quoting rules as configured ones.
fn default_command(raw: &str) -> CommandLine {
    CommandLine::parse(raw).unwrap_or_else(|_| CommandLine {
        program: raw.to_string(),
        args: Vec::new(),
    })
}

impl LaunchConfig {
    /// Applies file values on top of the defaults.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut launch = Self::default();
        if let Some(open) = config.auto_open_browser {
            launch.auto_open_browser = open;
        }
        if let Some(secs) = config.stagger_delay_secs {
            launch.stagger_delay = stagger_from_secs(secs)?;
        }
        if let Some(max_lines) = config.max_lines {
            launch.max_lines = max_lines.max(1);
        }
        if let Some(template) = &config.log_file {
            launch.log_file = Some(template.clone());
        }
        if let Some(ms) = config.shutdown_grace_ms {
            launch.shutdown_grace = Duration::from_millis(ms);
        }
        if let Some(marker) = &config.install_marker {
            launch.install_marker = marker.clone();
        }
        if let Some(env_file) = &config.env_file {
            launch.env_file = env_file.clone();
        }
        if let Some(commands) = &config.commands {
            if let Some(raw) = &commands.install {
                launch.install_cmd = CommandLine::parse(raw).context("commands.install")?;
            }
            if let Some(raw) = &commands.vite {
                launch.vite_cmd = CommandLine::parse(raw).context("commands.vite")?;
            }
            if let Some(raw) = &commands.next {
                launch.next_cmd = CommandLine::parse(raw).context("commands.next")?;
            }
        }
        if let Some(probe) = &config.probe {
            if let Some(secs) = probe.vite_timeout_secs {
                launch.vite_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = probe.next_timeout_secs {
                launch.next_timeout = Duration::from_secs(secs);
            }
            if let Some(ms) = probe.attempt_timeout_ms {
                launch.probe.attempt_timeout = Duration::from_millis(ms.max(1));
            }
            if let Some(ms) = probe.retry_interval_ms {
                launch.probe.retry_interval = Duration::from_millis(ms);
            }
        }
        Ok(launch)
    }

    /// Flips `auto_open_browser` and returns the new value.
    pub fn toggle_auto_open_browser(&mut self) -> bool {
        self.auto_open_browser = !self.auto_open_browser;
        self.auto_open_browser
    }

    pub fn probe_timeout(&self, kind: ToolKind) -> Duration {
        match kind {
            ToolKind::Next => self.next_timeout,
            ToolKind::Vite | ToolKind::Static => self.vite_timeout,
        }
    }

    pub fn dev_command(&self, kind: ToolKind) -> &CommandLine {
        match kind {
            ToolKind::Next => &self.next_cmd,
            ToolKind::Vite | ToolKind::Static => &self.vite_cmd,
        }
    }
}

pub fn stagger_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("stagger delay must be a non-negative number of seconds, got {}", secs))
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}
