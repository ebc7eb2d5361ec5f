//! Captured output of dev-server processes.
//!
//! Child stdout/stderr are drained line by line into a bounded `LogBuffer`
//! (and optionally a log file) so a chatty server never blocks on a full
//! pipe. The `L` menu action prints the tail of each buffer.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use strip_ansi_escapes::strip;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Indicates the source stream of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard Output.
    Stdout,
    /// Standard Error.
    Stderr,
}

/// A single line of output from a process.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// The content of the line, ANSI codes stripped.
    pub text: String,
    /// The stream it originated from (stdout/stderr).
    pub stream: StreamKind,
}

/// A fixed-capacity ring buffer for storing `LogLine`s.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    /// Creates a new `LogBuffer` with the specified maximum capacity.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns `true` if an old line was dropped to make room.
    pub fn push(&mut self, line: LogLine) -> bool {
        let mut dropped = false;
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            dropped = true;
        }
        dropped
    }

    /// The last `count` lines, oldest first.
    pub fn tail(&self, count: usize) -> impl Iterator<Item = &LogLine> {
        self.lines.iter().skip(self.lines.len().saturating_sub(count))
    }
}

/// Where drained output goes. Cloned into each reader task.
#[derive(Debug, Clone)]
pub struct OutputSink {
    buffer: Arc<Mutex<LogBuffer>>,
    log: Option<Arc<Mutex<BufWriter<File>>>>,
}

impl OutputSink {
    pub fn new(max_lines: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(LogBuffer::new(max_lines))),
            log: None,
        }
    }

    /// Also appends every line to `path`, creating parent directories.
    pub fn with_log_file(mut self, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        self.log = Some(Arc::new(Mutex::new(BufWriter::new(file))));
        Ok(self)
    }

    pub fn push(&self, text: &str, stream: StreamKind) {
        let text = sanitize_text(text);
        if let Some(log) = &self.log {
            if let Ok(mut writer) = log.lock() {
                let _ = writeln!(writer, "{}", text);
                let _ = writer.flush();
            }
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(LogLine { text, stream });
        }
    }

    /// Copies out the last `count` lines.
    pub fn tail(&self, count: usize) -> Vec<LogLine> {
        match self.buffer.lock() {
            Ok(buffer) => buffer.tail(count).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Reads `reader` to EOF, pushing each line into `sink`.
pub async fn drain_stream<R>(stream: StreamKind, reader: R, sink: OutputSink)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.push(&line, stream);
    }
}

/// Strips ANSI escape codes. Invalid UTF-8 sequences are replaced.
pub fn sanitize_text(text: &str) -> String {
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

/// Expands `{id}` and `{name}` in a log file template.
pub fn render_log_path(template: &str, id: &str, name: &str) -> PathBuf {
    PathBuf::from(
        template
            .replace("{id}", &sanitize_name(id))
            .replace("{name}", &sanitize_name(name)),
    )
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> LogLine {
        LogLine {
            text: text.into(),
            stream: StreamKind::Stdout,
        }
    }

    #[test]
    fn log_buffer_drops_oldest() {
        let mut buffer = LogBuffer::new(2);
        buffer.push(line("a"));
        buffer.push(line("b"));
        let dropped = buffer.push(line("c"));
        assert!(dropped);
        let lines = buffer.tail(10).map(|l| l.text.clone()).collect::<Vec<_>>();
        assert_eq!(lines, vec!["b", "c"]);
    }

    #[test]
    fn tail_returns_most_recent_lines_in_order() {
        let mut buffer = LogBuffer::new(10);
        for text in ["1", "2", "3", "4"] {
            buffer.push(line(text));
        }
        let lines = buffer.tail(2).map(|l| l.text.as_str()).collect::<Vec<_>>();
        assert_eq!(lines, vec!["3", "4"]);
    }

    #[test]
    fn sink_strips_ansi() {
        let sink = OutputSink::new(5);
        sink.push("\u{1b}[32mVITE ready\u{1b}[0m", StreamKind::Stdout);
        assert_eq!(sink.tail(1)[0].text, "VITE ready");
    }

    #[test]
    fn renders_log_path_with_safe_names() {
        let path = render_log_path("logs/{id}-{name}.log", "4", "Review Generator");
        assert_eq!(path, PathBuf::from("logs/4-Review_Generator.log"));
    }

    #[tokio::test]
    async fn drains_reader_into_sink_and_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("nested/out.log");
        let sink = OutputSink::new(10).with_log_file(&log_path).unwrap();
        let input: &[u8] = b"first\nsecond\n";
        drain_stream(StreamKind::Stderr, input, sink.clone()).await;
        let tail = sink.tail(10);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].stream, StreamKind::Stderr);
        let written = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(written, "first\nsecond\n");
    }
}
