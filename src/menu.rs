//! Menu input parsing and rendering.

use crossterm::style::Stylize;

use crate::catalog::{Catalog, ToolKind};
use crate::group::GroupSelector;
use crate::output::StreamKind;
use crate::registry::{RunningHandle, SessionRegistry};

/// Single-letter menu commands. Catalog ids may not reuse these.
pub const COMMAND_KEYS: [&str; 8] = ["A", "P", "S", "R", "B", "K", "L", "Q"];

/// Number of captured output lines shown per server by `L`.
pub const LOG_TAIL_LINES: usize = 10;

/// An action chosen at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    Launch(String),
    Group(GroupSelector),
    ToggleBrowser,
    KillAll,
    ShowLogs,
    Quit,
    /// Blank input: just redraw.
    Redraw,
    Invalid(String),
}

pub fn is_command_key(input: &str) -> bool {
    COMMAND_KEYS
        .iter()
        .any(|key| key.eq_ignore_ascii_case(input))
}

/// Interprets one line of input. Command letters are case-insensitive;
/// anything else must be a catalog id.
pub fn parse_command(input: &str, catalog: &Catalog) -> MenuCommand {
    let input = input.trim();
    if input.is_empty() {
        return MenuCommand::Redraw;
    }
    match input.to_ascii_uppercase().as_str() {
        "A" => return MenuCommand::Group(GroupSelector::All),
        "P" => return MenuCommand::Group(GroupSelector::Production),
        "S" => return MenuCommand::Group(GroupSelector::StaticOnly),
        "R" => return MenuCommand::Group(GroupSelector::DevServersOnly),
        "B" => return MenuCommand::ToggleBrowser,
        "K" => return MenuCommand::KillAll,
        "L" => return MenuCommand::ShowLogs,
        "Q" => return MenuCommand::Quit,
        _ => {}
    }
    if catalog.get(input).is_some() {
        MenuCommand::Launch(input.to_string())
    } else {
        MenuCommand::Invalid(input.to_string())
    }
}

/// Parses a yes/no answer; anything but yes is no.
pub fn parse_confirmation(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub fn render_header() -> String {
    let rule = "=".repeat(60);
    format!("\n{}\n TOOLRACK: local tools launcher\n{}", rule, rule)
}

/// The full menu: catalog by kind with running marks, then the actions.
pub fn render_menu(
    catalog: &Catalog,
    registry: &SessionRegistry,
    auto_open_browser: bool,
    symbols: bool,
    color: bool,
) -> String {
    let mut out = String::from("\nAVAILABLE TOOLS:\n");
    let sections = [
        (ToolKind::Static, "STATIC (open directly in browser):"),
        (ToolKind::Vite, "VITE (dev server required):"),
        (ToolKind::Next, "NEXT.JS (needs environment setup):"),
    ];
    for (kind, title) in sections {
        if catalog.of_kind(kind).next().is_none() {
            continue;
        }
        out.push_str(&format!("\n   {}\n", title));
        for entry in catalog.of_kind(kind) {
            let mark = status_mark(registry.is_running(&entry.id), symbols, color);
            let port = entry
                .port
                .map(|p| format!(" (port {})", p))
                .unwrap_or_default();
            out.push_str(&format!("   [{}] {} {}{}\n", entry.id, mark, entry.name, port));
            if !entry.description.is_empty() {
                out.push_str(&format!("       {}\n", entry.description));
            }
        }
    }
    let rule = "-".repeat(60);
    let browser = if auto_open_browser { "on" } else { "off" };
    out.push_str(&format!("\n{}\n", rule));
    out.push_str("   [A] Launch ALL tools\n");
    out.push_str("   [P] Launch PRODUCTION tools\n");
    out.push_str("   [S] Launch STATIC tools only (no server needed)\n");
    out.push_str("   [R] Launch DEV SERVERS only\n");
    out.push_str(&format!("   [B] Toggle auto-open browser (currently {})\n", browser));
    out.push_str("   [K] Kill all running servers\n");
    out.push_str("   [L] Show recent dev server output\n");
    out.push_str("   [Q] Quit\n");
    out.push_str(&rule);
    out
}

/// What is running, with URLs for dev servers.
pub fn render_status(catalog: &Catalog, registry: &SessionRegistry) -> String {
    let mut out = String::from("\nRUNNING TOOLS:\n");
    if registry.is_empty() {
        out.push_str("   No tools currently running");
        return out;
    }
    let lines: Vec<String> = registry
        .entries()
        .map(|(id, handle)| {
            let name = catalog.get(id).map(|e| e.name.as_str()).unwrap_or(id);
            match handle {
                RunningHandle::BrowserTab { opened_at } => format!(
                    "   {} (browser, opened {} ago)",
                    name,
                    format_duration(opened_at.elapsed())
                ),
                RunningHandle::Process(process) => format!(
                    "   {} -> http://localhost:{} (up {})",
                    name,
                    process.port,
                    format_duration(process.started_at.elapsed())
                ),
            }
        })
        .collect();
    out.push_str(&lines.join("\n"));
    out
}

/// Recent captured output of every tracked dev server.
pub fn render_logs(catalog: &Catalog, registry: &SessionRegistry) -> String {
    let mut out = String::new();
    for (id, handle) in registry.entries() {
        let Some(process) = handle.as_process() else {
            continue;
        };
        let name = catalog.get(id).map(|e| e.name.as_str()).unwrap_or(id);
        out.push_str(&format!("\n--- {} ---\n", name));
        let tail = process.output.tail(LOG_TAIL_LINES);
        if tail.is_empty() {
            out.push_str("   (no output yet)\n");
        }
        for line in tail {
            let marker = match line.stream {
                StreamKind::Stdout => " ",
                StreamKind::Stderr => "!",
            };
            out.push_str(&format!("  {} {}\n", marker, line.text));
        }
    }
    if out.is_empty() {
        out.push_str("\n   No dev servers running");
    }
    out
}

fn status_mark(running: bool, symbols: bool, color: bool) -> String {
    let mark = match (running, symbols) {
        (true, true) => "●",
        (false, true) => "○",
        (true, false) => "*",
        (false, false) => " ",
    };
    if color && running {
        mark.green().to_string()
    } else {
        mark.to_string()
    }
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let minutes = secs / 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_case_insensitively() {
        let catalog = Catalog::builtin();
        assert_eq!(parse_command("a", &catalog), MenuCommand::Group(GroupSelector::All));
        assert_eq!(parse_command(" P ", &catalog), MenuCommand::Group(GroupSelector::Production));
        assert_eq!(parse_command("s", &catalog), MenuCommand::Group(GroupSelector::StaticOnly));
        assert_eq!(parse_command("R", &catalog), MenuCommand::Group(GroupSelector::DevServersOnly));
        assert_eq!(parse_command("b", &catalog), MenuCommand::ToggleBrowser);
        assert_eq!(parse_command("K", &catalog), MenuCommand::KillAll);
        assert_eq!(parse_command("l", &catalog), MenuCommand::ShowLogs);
        assert_eq!(parse_command("q", &catalog), MenuCommand::Quit);
        assert_eq!(parse_command("", &catalog), MenuCommand::Redraw);
    }

    #[test]
    fn parses_catalog_ids_and_rejects_unknown_input() {
        let catalog = Catalog::builtin();
        assert_eq!(parse_command("4", &catalog), MenuCommand::Launch("4".to_string()));
        assert_eq!(parse_command("42", &catalog), MenuCommand::Invalid("42".to_string()));
        assert_eq!(parse_command("launch", &catalog), MenuCommand::Invalid("launch".to_string()));
    }

    #[test]
    fn confirmation_defaults_to_no() {
        assert!(parse_confirmation("y"));
        assert!(parse_confirmation(" YES\n"));
        assert!(!parse_confirmation(""));
        assert!(!parse_confirmation("n"));
        assert!(!parse_confirmation("sure"));
    }

    #[test]
    fn menu_marks_running_entries() {
        let catalog = Catalog::builtin();
        let mut registry = SessionRegistry::new();
        registry.record("2", RunningHandle::browser_tab());
        let menu = render_menu(&catalog, &registry, false, false, false);
        assert!(menu.contains("[2] * Quote Calculator"));
        assert!(menu.contains("[1]   Dashboard"));
        assert!(menu.contains("[4]   Review Generator (port 5173)"));
        assert!(menu.contains("currently off"));

        let status = render_status(&catalog, &registry);
        assert!(status.contains("Quote Calculator (browser, opened 00:00 ago)"));
        assert!(render_status(&catalog, &SessionRegistry::new()).contains("No tools currently running"));
        assert!(render_logs(&catalog, &registry).contains("No dev servers running"));
    }
}
