//! The session registry: what is currently running.

use std::time::Instant;

use tokio::process::Child;

use crate::output::OutputSink;

/// A dev-server child process owned by the registry.
#[derive(Debug)]
pub struct TrackedProcess {
    pub child: Child,
    pub pid: Option<u32>,
    pub port: u16,
    pub started_at: Instant,
    pub output: OutputSink,
}

/// Handle for a launched entry.
#[derive(Debug)]
pub enum RunningHandle {
    /// A static page opened in the browser; there is no process to stop.
    BrowserTab { opened_at: Instant },
    Process(TrackedProcess),
}

impl RunningHandle {
    pub fn browser_tab() -> Self {
        RunningHandle::BrowserTab {
            opened_at: Instant::now(),
        }
    }

    pub fn as_process(&self) -> Option<&TrackedProcess> {
        match self {
            RunningHandle::Process(process) => Some(process),
            RunningHandle::BrowserTab { .. } => None,
        }
    }
}

/// A tracked process that exited without being asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitedProcess {
    pub id: String,
    pub code: Option<i32>,
}

/// Maps catalog ids to running handles, in launch order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: Vec<(String, RunningHandle)>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handle` under `id`, replacing any previous handle in place.
    pub fn record(&mut self, id: impl Into<String>, handle: RunningHandle) {
        let id = id.into();
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == id) {
            slot.1 = handle;
        } else {
            self.entries.push((id, handle));
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<RunningHandle> {
        let idx = self.entries.iter().position(|(key, _)| key == id)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn get(&self, id: &str) -> Option<&RunningHandle> {
        self.entries
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, handle)| handle)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &RunningHandle)> {
        self.entries.iter().map(|(id, handle)| (id.as_str(), handle))
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every handle.
    pub fn drain(&mut self) -> Vec<(String, RunningHandle)> {
        std::mem::take(&mut self.entries)
    }

    /// Whether `id` is tracked as a process that has not exited. A process
    /// found to have exited is dropped from the registry.
    pub fn process_alive(&mut self, id: &str) -> bool {
        let alive = match self.entries.iter_mut().find(|(key, _)| key == id) {
            Some((_, RunningHandle::Process(process))) => {
                matches!(process.child.try_wait(), Ok(None))
            }
            _ => return false,
        };
        if !alive {
            self.remove(id);
        }
        alive
    }

    /// Drops processes that have exited on their own and reports them.
    /// Browser tabs are never reaped.
    pub fn reap_exited(&mut self) -> Vec<ExitedProcess> {
        let mut exited = Vec::new();
        self.entries.retain_mut(|(id, handle)| {
            let RunningHandle::Process(process) = handle else {
                return true;
            };
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::info!(id = %id, code = ?status.code(), "tracked process exited");
                    exited.push(ExitedProcess {
                        id: id.clone(),
                        code: status.code(),
                    });
                    false
                }
                Ok(None) => true,
                Err(err) => {
                    tracing::warn!(id = %id, error = %err, "failed to poll tracked process");
                    exited.push(ExitedProcess {
                        id: id.clone(),
                        code: None,
                    });
                    false
                }
            }
        });
        exited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_remove_and_lookup() {
        let mut registry = SessionRegistry::new();
        assert!(registry.is_empty());
        registry.record("1", RunningHandle::browser_tab());
        registry.record("2", RunningHandle::browser_tab());
        assert!(registry.is_running("1"));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove("1").is_some());
        assert!(!registry.is_running("1"));
        assert!(registry.remove("1").is_none());
        assert!(registry.remove("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn record_replaces_without_reordering() {
        let mut registry = SessionRegistry::new();
        registry.record("a", RunningHandle::browser_tab());
        registry.record("b", RunningHandle::browser_tab());
        registry.record("a", RunningHandle::browser_tab());
        let ids: Vec<&str> = registry.entries().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn drain_empties_registry() {
        let mut registry = SessionRegistry::new();
        registry.record("a", RunningHandle::browser_tab());
        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reap_exited_removes_finished_processes_only() {
        use std::time::Duration;

        let spawn = |script: &str| {
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(script)
                .spawn()
                .unwrap()
        };
        let track = |child: Child, port| {
            RunningHandle::Process(TrackedProcess {
                pid: child.id(),
                child,
                port,
                started_at: Instant::now(),
                output: OutputSink::new(10),
            })
        };

        let mut registry = SessionRegistry::new();
        registry.record("quick", track(spawn("exit 3"), 1));
        registry.record("slow", track(spawn("sleep 5"), 2));
        registry.record("tab", RunningHandle::browser_tab());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut exited = Vec::new();
        while exited.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
            exited = registry.reap_exited();
        }
        assert_eq!(
            exited,
            vec![ExitedProcess {
                id: "quick".to_string(),
                code: Some(3),
            }]
        );
        assert!(registry.is_running("slow"));
        assert!(registry.is_running("tab"));

        if let Some(RunningHandle::Process(mut process)) = registry.remove("slow") {
            let _ = process.child.kill().await;
        }
    }
}
