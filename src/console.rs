//! User-facing progress messages.

use std::io::{IsTerminal, Write};

use crossterm::style::Stylize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Ok,
    Warn,
    Error,
}

/// Prints tool messages, with or without symbols and color.
pub struct Console {
    out: Box<dyn Write + Send>,
    symbols: bool,
    color: bool,
}

impl Console {
    pub fn stdout(symbols: bool) -> Self {
        let color = std::io::stdout().is_terminal();
        Self {
            out: Box::new(std::io::stdout()),
            symbols,
            color,
        }
    }

    /// Discards everything.
    #[cfg(test)]
    pub fn sink() -> Self {
        Self {
            out: Box::new(std::io::sink()),
            symbols: false,
            color: false,
        }
    }

    pub fn symbols(&self) -> bool {
        self.symbols
    }

    pub fn color(&self) -> bool {
        self.color
    }

    pub fn info(&mut self, text: impl AsRef<str>) {
        self.message(Level::Info, text.as_ref());
    }

    pub fn ok(&mut self, text: impl AsRef<str>) {
        self.message(Level::Ok, text.as_ref());
    }

    pub fn warn(&mut self, text: impl AsRef<str>) {
        self.message(Level::Warn, text.as_ref());
    }

    pub fn error(&mut self, text: impl AsRef<str>) {
        self.message(Level::Error, text.as_ref());
    }

    pub fn message(&mut self, level: Level, text: &str) {
        let line = format_message(level, text, self.symbols, self.color);
        let _ = writeln!(self.out, "{}", line);
        let _ = self.out.flush();
    }

    /// Writes a line as-is.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.out, "{}", text.as_ref());
        let _ = self.out.flush();
    }

    /// Writes without a trailing newline (prompts).
    pub fn prompt(&mut self, text: &str) {
        let _ = write!(self.out, "{}", text);
        let _ = self.out.flush();
    }

    pub fn clear_screen(&mut self) {
        if !self.color {
            return;
        }
        let _ = crossterm::execute!(
            self.out,
            crossterm::terminal::Clear(crossterm::terminal::ClearType::All),
            crossterm::cursor::MoveTo(0, 0)
        );
    }
}

pub fn format_message(level: Level, text: &str, symbols: bool, color: bool) -> String {
    let marker = match (level, symbols) {
        (Level::Info, true) => "◆",
        (Level::Ok, true) => "✔",
        (Level::Warn, true) => "▲",
        (Level::Error, true) => "✖",
        (Level::Info, false) => "[info]",
        (Level::Ok, false) => "[ok]",
        (Level::Warn, false) => "[warn]",
        (Level::Error, false) => "[error]",
    };
    if !color {
        return format!("   {} {}", marker, text);
    }
    let marker = match level {
        Level::Info => marker.cyan(),
        Level::Ok => marker.green(),
        Level::Warn => marker.yellow(),
        Level::Error => marker.red(),
    };
    format!("   {} {}", marker, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_use_bracket_markers() {
        assert_eq!(
            format_message(Level::Warn, "port busy", false, false),
            "   [warn] port busy"
        );
        assert_eq!(format_message(Level::Ok, "ready", true, false), "   ✔ ready");
    }
}
