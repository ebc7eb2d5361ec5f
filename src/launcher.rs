//! Launching a single catalog entry.
//!
//! Static pages are opened straight from disk. Dev servers go through the
//! pre-flight checks (directory, env file for Next.js), a one-time dependency
//! install when the install marker is missing, then a detached spawn whose
//! output is drained in the background. The handle is recorded before the
//! readiness probe runs, so a slow server stays tracked even when the probe
//! gives up.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;

use crate::catalog::{CatalogEntry, ToolKind};
use crate::config::CommandLine;
use crate::context::LauncherContext;
use crate::error::LaunchError;
use crate::output::{drain_stream, render_log_path, OutputSink, StreamKind};
use crate::probe::wait_for_port;
use crate::registry::{RunningHandle, TrackedProcess};

/// Why the dependency install step did not succeed. The launch carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallIssue {
    /// The install command could not be started.
    Spawn(String),
    /// The install command exited unsuccessfully.
    Exit(Option<i32>),
}

impl fmt::Display for InstallIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallIssue::Spawn(err) => write!(f, "install could not start: {}", err),
            InstallIssue::Exit(Some(code)) => write!(f, "install exited with code {}", code),
            InstallIssue::Exit(None) => write!(f, "install was terminated"),
        }
    }
}

/// Successful outcome of a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchReport {
    /// A static page was opened in the browser.
    Opened { name: String, url: String },
    /// A static page exists but the browser was not opened.
    OpenManually { name: String, path: PathBuf },
    /// A dev server was spawned and is tracked. `ready` is false when the
    /// port did not answer before the probe timeout.
    Started {
        name: String,
        url: String,
        pid: Option<u32>,
        ready: bool,
        install: Option<InstallIssue>,
        browser_opened: bool,
    },
    /// The dev server is already tracked and alive; nothing was spawned.
    AlreadyRunning { name: String, url: String },
}

impl LaunchReport {
    pub fn is_ready(&self) -> bool {
        match self {
            LaunchReport::Started { ready, .. } => *ready,
            _ => true,
        }
    }
}

impl fmt::Display for LaunchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchReport::Opened { name, url } => write!(f, "{} opened at {}", name, url),
            LaunchReport::OpenManually { name, path } => {
                write!(f, "{} ready, open manually: {}", name, path.display())
            }
            LaunchReport::Started {
                name,
                url,
                pid,
                ready,
                ..
            } => {
                if *ready {
                    write!(f, "{} ready at {}", name, url)?;
                } else {
                    write!(
                        f,
                        "{} not ready yet at {}; still starting in the background",
                        name, url
                    )?;
                }
                match pid {
                    Some(pid) => write!(f, " (pid {})", pid),
                    None => Ok(()),
                }
            }
            LaunchReport::AlreadyRunning { name, url } => {
                write!(f, "{} is already running at {}", name, url)
            }
        }
    }
}

/// Launches the entry `id`. `open_browser` overrides
/// `LaunchConfig::auto_open_browser` for this launch only.
pub async fn launch(
    ctx: &mut LauncherContext,
    id: &str,
    open_browser: Option<bool>,
) -> Result<LaunchReport, LaunchError> {
    let Some(entry) = ctx.catalog.get(id).cloned() else {
        return Err(LaunchError::UnknownTool { id: id.to_string() });
    };
    let open = open_browser.unwrap_or(ctx.config.auto_open_browser);
    tracing::info!(id = %entry.id, kind = %entry.kind, open, "launching");
    match entry.kind {
        ToolKind::Static => launch_static(ctx, &entry, open),
        ToolKind::Vite | ToolKind::Next => launch_dev_server(ctx, &entry, open).await,
    }
}

fn launch_static(
    ctx: &mut LauncherContext,
    entry: &CatalogEntry,
    open: bool,
) -> Result<LaunchReport, LaunchError> {
    let path = entry.resolve_location(&ctx.root);
    if !path.is_file() {
        return Err(LaunchError::not_found_file(path));
    }
    if open {
        let url = file_url(&path);
        ctx.console.info(format!("Opening {}...", entry.name));
        if ctx.open_browser(&url) {
            ctx.registry.record(entry.id.clone(), RunningHandle::browser_tab());
            return Ok(LaunchReport::Opened {
                name: entry.name.clone(),
                url,
            });
        }
    }
    Ok(LaunchReport::OpenManually {
        name: entry.name.clone(),
        path,
    })
}

async fn launch_dev_server(
    ctx: &mut LauncherContext,
    entry: &CatalogEntry,
    open: bool,
) -> Result<LaunchReport, LaunchError> {
    // Catalog validation guarantees dev servers carry a port.
    let port = entry.port.unwrap_or_default();
    let url = format!("http://localhost:{}", port);

    if ctx.registry.process_alive(&entry.id) {
        return Ok(LaunchReport::AlreadyRunning {
            name: entry.name.clone(),
            url,
        });
    }

    let dir = entry.resolve_location(&ctx.root);
    if !dir.is_dir() {
        return Err(LaunchError::not_found_dir(dir));
    }
    if entry.requires_env_file() {
        let env_file = dir.join(&ctx.config.env_file);
        if !env_file.exists() {
            return Err(LaunchError::MissingEnvSetup {
                name: entry.name.clone(),
                env_file,
            });
        }
    }

    let install = if dir.join(&ctx.config.install_marker).exists() {
        None
    } else {
        run_install(ctx, entry, &dir).await
    };

    let dev_cmd = ctx.config.dev_command(entry.kind).clone();
    let mut command = build_command(&dev_cmd);
    match entry.kind {
        ToolKind::Vite => {
            command.arg("--port").arg(port.to_string());
        }
        ToolKind::Next => {
            command.env("PORT", port.to_string());
        }
        ToolKind::Static => {}
    }
    command
        .current_dir(&dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    detach(&mut command);

    ctx.console
        .info(format!("Starting {} on port {}...", entry.name, port));
    let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
        name: entry.name.clone(),
        source,
    })?;
    let pid = child.id();
    tracing::info!(id = %entry.id, ?pid, port, cmd = %dev_cmd.display(), "dev server spawned");

    let output = output_sink(ctx, entry);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(drain_stream(StreamKind::Stdout, stdout, output.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(drain_stream(StreamKind::Stderr, stderr, output.clone()));
    }

    ctx.registry.record(
        entry.id.clone(),
        RunningHandle::Process(TrackedProcess {
            child,
            pid,
            port,
            started_at: Instant::now(),
            output,
        }),
    );

    let timeout = ctx.config.probe_timeout(entry.kind);
    ctx.console.info(format!(
        "Waiting for {} (up to {}s)...",
        url,
        timeout.as_secs_f32()
    ));
    let ready = wait_for_port(port, timeout, ctx.config.probe).await;
    if !ready {
        tracing::warn!(id = %entry.id, port, ?timeout, "readiness probe timed out");
    }

    let browser_opened = open && ctx.open_browser(&url);
    Ok(LaunchReport::Started {
        name: entry.name.clone(),
        url,
        pid,
        ready,
        install,
        browser_opened,
    })
}

// Blocking one-time dependency install; problems are reported, not fatal.
async fn run_install(
    ctx: &mut LauncherContext,
    entry: &CatalogEntry,
    dir: &Path,
) -> Option<InstallIssue> {
    let install_cmd = ctx.config.install_cmd.clone();
    ctx.console
        .info(format!("Installing dependencies for {}...", entry.name));
    tracing::info!(id = %entry.id, cmd = %install_cmd.display(), "installing dependencies");
    let mut command = build_command(&install_cmd);
    command
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    let issue = match command.status().await {
        Ok(status) if status.success() => None,
        Ok(status) => Some(InstallIssue::Exit(status.code())),
        Err(err) => Some(InstallIssue::Spawn(err.to_string())),
    };
    if let Some(issue) = &issue {
        tracing::warn!(id = %entry.id, %issue, "dependency install failed");
        ctx.console
            .warn(format!("{}: {}; starting anyway", entry.name, issue));
    }
    issue
}

fn output_sink(ctx: &mut LauncherContext, entry: &CatalogEntry) -> OutputSink {
    let sink = OutputSink::new(ctx.config.max_lines);
    let Some(template) = &ctx.config.log_file else {
        return sink;
    };
    let path = render_log_path(template, &entry.id, &entry.name);
    let path = if path.is_absolute() {
        path
    } else {
        ctx.root.join(path)
    };
    match sink.clone().with_log_file(&path) {
        Ok(sink) => sink,
        Err(err) => {
            tracing::warn!(id = %entry.id, error = %err, "log file unavailable");
            ctx.console.warn(format!("{:#}", err));
            sink
        }
    }
}

/// Builds a command from a configured command line. On Windows the package
/// manager shims are batch files, so the command goes through `cmd /C`.
pub fn build_command(line: &CommandLine) -> Command {
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(&line.program).args(&line.args);
        command
    }
    #[cfg(not(windows))]
    {
        let mut command = Command::new(&line.program);
        command.args(&line.args);
        command
    }
}

// Put the child in its own process group so terminal signals reach only the
// launcher and shutdown can signal the whole server tree.
fn detach(command: &mut Command) {
    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }
}

fn file_url(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = absolute.display().to_string();
    #[cfg(windows)]
    {
        let text = text.trim_start_matches(r"\\?\").replace('\\', "/");
        format!("file:///{}", text)
    }
    #[cfg(not(windows))]
    {
        format!("file://{}", text)
    }
}
