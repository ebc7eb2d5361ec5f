//! Stopping everything that was launched.
//!
//! Every tracked process gets a graceful terminate signal first (SIGTERM to
//! its process group on unix, CTRL_BREAK on Windows). All processes then
//! share one grace period to exit before stragglers, and anything left in
//! their process groups, are force-killed. A second interrupt cuts the grace
//! period short. Failures are logged and collected, never propagated, and the
//! registry is always left empty.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::context::LauncherContext;
use crate::registry::{RunningHandle, TrackedProcess};

/// A process that could not be terminated. It may already be gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ShutdownSummary {
    /// Processes confirmed stopped.
    pub stopped: Vec<String>,
    /// Processes that needed a force kill after the grace period.
    pub killed: Vec<String>,
    pub failures: Vec<TerminateFailure>,
    /// Browser tabs forgotten; there is nothing to stop for them.
    pub tabs: usize,
    /// The grace period was cut short.
    pub hurried: bool,
}

/// Terminates every tracked process and clears the registry. Safe to call
/// repeatedly.
pub async fn shutdown_all(ctx: &mut LauncherContext) -> ShutdownSummary {
    shutdown_with(ctx, std::future::pending()).await
}

/// Like `shutdown_all`, but once `hurry` completes the remaining grace period
/// is skipped and everything still running is killed.
pub async fn shutdown_with<F>(ctx: &mut LauncherContext, hurry: F) -> ShutdownSummary
where
    F: Future<Output = ()>,
{
    tokio::pin!(hurry);
    let mut summary = ShutdownSummary::default();
    tracing::info!(count = ctx.registry.len(), "shutting down tracked tools");
    let handles = ctx.registry.drain();
    if handles.is_empty() {
        return summary;
    }

    let mut pending: Vec<(String, TrackedProcess)> = Vec::new();
    for (id, handle) in handles {
        match handle {
            RunningHandle::BrowserTab { .. } => summary.tabs += 1,
            RunningHandle::Process(mut process) => {
                let leader_exited = matches!(process.child.try_wait(), Ok(Some(_)));
                // The group can outlive its leader; it still gets the signal.
                if let Some(pid) = process.pid {
                    match send_terminate(pid) {
                        Ok(()) => {}
                        Err(err) if leader_exited => {
                            tracing::debug!(id = %id, pid, error = %err, "group already gone");
                        }
                        Err(err) => {
                            tracing::warn!(id = %id, pid, error = %err, "terminate signal failed");
                        }
                    }
                }
                pending.push((id, process));
            }
        }
    }

    let deadline = Instant::now() + ctx.config.shutdown_grace;
    let mut leaders_stopped = Vec::new();
    for (id, mut process) in pending {
        let remaining = if summary.hurried {
            Duration::ZERO
        } else {
            deadline.saturating_duration_since(Instant::now())
        };
        let waited = tokio::select! {
            result = wait_for_exit(&mut process.child, remaining) => Some(result),
            _ = &mut hurry, if !summary.hurried => None,
        };
        let waited = match waited {
            Some(result) => result,
            None => {
                tracing::warn!("grace period cut short");
                summary.hurried = true;
                wait_for_exit(&mut process.child, Duration::ZERO).await
            }
        };
        match waited {
            Ok(true) => leaders_stopped.push((id, process)),
            Ok(false) => {
                if let Some(pid) = process.pid {
                    if let Err(err) = kill_group(pid) {
                        tracing::debug!(id = %id, pid, error = %err, "group kill failed");
                    }
                }
                match process.child.kill().await {
                    Ok(()) => {
                        tracing::warn!(id = %id, "process killed after grace period");
                        summary.killed.push(id);
                    }
                    Err(err) => {
                        tracing::warn!(id = %id, error = %err, "failed to kill process");
                        summary.failures.push(TerminateFailure {
                            id,
                            error: err.to_string(),
                        });
                    }
                }
            }
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "failed to wait for process");
                summary.failures.push(TerminateFailure {
                    id,
                    error: err.to_string(),
                });
            }
        }
    }

    // Leaders are gone; whatever else is left in their groups gets the rest
    // of the grace period, then SIGKILL.
    for (id, process) in leaders_stopped {
        if let Some(pid) = process.pid {
            let emptied = if summary.hurried {
                !group_alive(pid)
            } else {
                tokio::select! {
                    emptied = wait_for_group(pid, deadline) => emptied,
                    _ = &mut hurry => {
                        summary.hurried = true;
                        false
                    }
                }
            };
            if !emptied {
                tracing::warn!(id = %id, pid, "process group outlived its leader; killing");
                if let Err(err) = kill_group(pid) {
                    tracing::warn!(id = %id, pid, error = %err, "group kill failed");
                }
            }
        }
        tracing::info!(id = %id, "process stopped");
        summary.stopped.push(id);
    }

    for id in summary.stopped.iter().chain(summary.killed.iter()) {
        let name = ctx
            .catalog
            .get(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| id.clone());
        ctx.console.line(format!("   Stopped {}", name));
    }
    for failure in &summary.failures {
        ctx.console
            .warn(format!("could not stop {}: {}", failure.id, failure.error));
    }
    summary
}

// Waits up to `timeout` for the child to exit. `Ok(false)` means it is
// still running.
async fn wait_for_exit(child: &mut tokio::process::Child, timeout: Duration) -> std::io::Result<bool> {
    if timeout.is_zero() {
        return Ok(child.try_wait()?.is_some());
    }
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(_status)) => Ok(true),
        Ok(Err(err)) => Err(err),
        Err(_) => Ok(false),
    }
}

// Polls until the process group led by `pid` is empty or `deadline` passes.
async fn wait_for_group(pid: u32, deadline: Instant) -> bool {
    loop {
        if !group_alive(pid) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(GROUP_POLL.min(deadline - now)).await;
    }
}

const GROUP_POLL: Duration = Duration::from_millis(50);

#[cfg(unix)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    let pid = pid as i32;
    // The child leads its own process group; signal the group first so the
    // package manager's server child goes down with it.
    let group = unsafe { libc::kill(-pid, libc::SIGTERM) };
    if group == 0 {
        return Ok(());
    }
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        return Ok(());
    }
    Err(std::io::Error::last_os_error())
}

#[cfg(unix)]
fn kill_group(pid: u32) -> std::io::Result<()> {
    if unsafe { libc::kill(-(pid as i32), libc::SIGKILL) } == 0 {
        return Ok(());
    }
    Err(std::io::Error::last_os_error())
}

#[cfg(unix)]
fn group_alive(pid: u32) -> bool {
    unsafe { libc::kill(-(pid as i32), 0) == 0 }
}

#[cfg(windows)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    use windows_sys::Win32::System::Console::GenerateConsoleCtrlEvent;
    use windows_sys::Win32::System::Console::CTRL_BREAK_EVENT;
    // Windows has no SIGTERM; CTRL_BREAK is the closest console signal.
    let ok = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) };
    if ok == 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(not(unix), not(windows)))]
fn send_terminate(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no terminate signal on this platform",
    ))
}

// Without process groups, `Child::kill` on the leader is all there is.
#[cfg(not(unix))]
fn kill_group(_pid: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn group_alive(_pid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;
    use std::time::Instant as StdInstant;

    use super::*;
    use crate::catalog::tests::entry;
    use crate::catalog::ToolKind;
    use crate::context::testing::context;
    use crate::output::OutputSink;

    fn spawn_in(dir: &Path, script: &str) -> TrackedProcess {
        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(script).current_dir(dir);
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }
        let child = command.spawn().unwrap();
        TrackedProcess {
            pid: child.id(),
            child,
            port: 0,
            started_at: std::time::Instant::now(),
            output: OutputSink::new(10),
        }
    }

    fn spawn(script: &str) -> TrackedProcess {
        spawn_in(Path::new("."), script)
    }

    fn scratch() -> (tempfile::TempDir, LauncherContext) {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(
            dir.path(),
            vec![
                entry("x1", ToolKind::Vite, "x1", Some(40001)),
                entry("x2", ToolKind::Vite, "x2", Some(40002)),
                entry("x3", ToolKind::Static, "x3.html", None),
            ],
            vec![],
        );
        (dir, ctx)
    }

    // Reads the pid a script wrote to `file`, waiting for it to appear.
    #[cfg(target_os = "linux")]
    async fn read_pid(file: &Path) -> i32 {
        let deadline = StdInstant::now() + Duration::from_secs(5);
        loop {
            if let Ok(text) = std::fs::read_to_string(file) {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            assert!(StdInstant::now() < deadline, "no pid in {}", file.display());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    // Gone or a zombie waiting for its new parent to reap it.
    #[cfg(target_os = "linux")]
    fn process_gone(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map(|rest| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => unsafe { libc::kill(pid, 0) != 0 },
        }
    }

    #[cfg(target_os = "linux")]
    async fn wait_gone(pid: i32) -> bool {
        let deadline = StdInstant::now() + Duration::from_secs(3);
        while StdInstant::now() < deadline {
            if process_gone(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        process_gone(pid)
    }

    #[cfg(target_os = "linux")]
    const STUBBORN_CHILD: &str =
        "sh -c 'trap \"\" TERM; while true; do sleep 0.1; done' & echo $! > child.pid";

    #[tokio::test]
    async fn stops_processes_and_clears_registry() {
        let (_dir, mut ctx) = scratch();
        ctx.registry.record("x1", RunningHandle::Process(spawn("sleep 30")));
        ctx.registry.record("x3", RunningHandle::browser_tab());

        let summary = shutdown_all(&mut ctx).await;
        assert_eq!(summary.stopped, vec!["x1".to_string()]);
        assert_eq!(summary.tabs, 1);
        assert!(summary.failures.is_empty());
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn force_kills_processes_ignoring_sigterm() {
        let (_dir, mut ctx) = scratch();
        ctx.config.shutdown_grace = Duration::from_millis(300);
        ctx.registry.record(
            "x1",
            RunningHandle::Process(spawn("trap '' TERM; while true; do sleep 0.1; done")),
        );
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = StdInstant::now();
        let summary = shutdown_all(&mut ctx).await;
        assert_eq!(summary.killed, vec!["x1".to_string()]);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(ctx.registry.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn force_kill_takes_down_the_whole_group() {
        let (dir, mut ctx) = scratch();
        ctx.config.shutdown_grace = Duration::from_millis(300);
        let script = format!("trap '' TERM; {}; while true; do sleep 0.1; done", STUBBORN_CHILD);
        ctx.registry
            .record("x1", RunningHandle::Process(spawn_in(dir.path(), &script)));
        let grandchild = read_pid(&dir.path().join("child.pid")).await;

        let summary = shutdown_all(&mut ctx).await;
        assert_eq!(summary.killed, vec!["x1".to_string()]);
        assert!(wait_gone(grandchild).await, "pid {} survived shutdown", grandchild);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn group_is_killed_even_after_its_leader_exits() {
        let (dir, mut ctx) = scratch();
        ctx.config.shutdown_grace = Duration::from_millis(300);
        let script = format!("{}; exit 0", STUBBORN_CHILD);
        let mut process = spawn_in(dir.path(), &script);
        let grandchild = read_pid(&dir.path().join("child.pid")).await;
        let _ = process.child.wait().await;
        ctx.registry.record("x2", RunningHandle::Process(process));

        let summary = shutdown_all(&mut ctx).await;
        assert_eq!(summary.stopped, vec!["x2".to_string()]);
        assert!(wait_gone(grandchild).await, "pid {} survived shutdown", grandchild);
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn hurry_skips_the_rest_of_the_grace_period() {
        let (_dir, mut ctx) = scratch();
        ctx.config.shutdown_grace = Duration::from_secs(30);
        ctx.registry.record(
            "x1",
            RunningHandle::Process(spawn("trap '' TERM; while true; do sleep 0.1; done")),
        );
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = StdInstant::now();
        let hurry = tokio::time::sleep(Duration::from_millis(200));
        let summary = shutdown_with(&mut ctx, hurry).await;
        assert!(summary.hurried);
        assert_eq!(summary.killed, vec!["x1".to_string()]);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn already_exited_process_still_clears_registry() {
        let (_dir, mut ctx) = scratch();
        let mut process = spawn("exit 0");
        let _ = process.child.wait().await;
        ctx.registry.record("x2", RunningHandle::Process(process));

        let summary = shutdown_all(&mut ctx).await;
        assert!(summary.failures.is_empty());
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (_dir, mut ctx) = scratch();
        ctx.registry.record("x1", RunningHandle::Process(spawn("sleep 30")));
        shutdown_all(&mut ctx).await;
        let again = shutdown_all(&mut ctx).await;
        assert!(again.stopped.is_empty());
        assert!(again.failures.is_empty());
        assert!(ctx.registry.is_empty());
    }
}
