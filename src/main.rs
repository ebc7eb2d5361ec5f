//! Toolrack: an interactive launcher for local web tools.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, loads the catalog and configuration, and runs the menu loop
//! that launches tools and tears them down on quit or interrupt.

mod browser;
mod catalog;
mod config;
mod console;
mod context;
mod error;
mod events;
mod group;
mod launcher;
mod logging;
mod menu;
mod output;
mod probe;
mod registry;
mod shutdown;

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::browser::SystemBrowser;
use crate::catalog::Catalog;
use crate::config::{Config, LaunchConfig};
use crate::console::Console;
use crate::context::LauncherContext;
use crate::events::{Event, InterruptSignal};
use crate::group::{launch_group, report_result, requires_confirmation, resolve, GroupOutcome};
use crate::launcher::launch;
use crate::menu::MenuCommand;
use crate::shutdown::shutdown_with;

const DEFAULT_CONFIG_FILE: &str = "toolrack.toml";

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "toolrack",
    version,
    about = "Interactive launcher for local web tools",
    styles = help_styles(),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to toolrack.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore any toolrack.toml in the current directory.
    #[arg(long)]
    no_config: bool,
    /// Directory tool paths are resolved against.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Start with auto-open browser turned off.
    #[arg(long)]
    no_browser: bool,
    /// Seconds to wait between dev-server launches in a group.
    #[arg(long, value_name = "SECS")]
    stagger: Option<f64>,
    /// Use plain ASCII markers instead of Unicode symbols.
    #[arg(long)]
    no_symbols: bool,
    /// Log file template for dev-server output (e.g. "logs/{id}.log").
    #[arg(long)]
    log_file: Option<String>,
    /// Increase diagnostic logging on stderr (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the tool catalog and exit.
    List {
        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show version information.
    Version,
}

/// Everything loaded before the menu starts.
struct Setup {
    catalog: Catalog,
    root: PathBuf,
    launch: LaunchConfig,
    symbols: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Some(Commands::Version) = &cli.command {
        println!("toolrack {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let setup = load_setup(&cli)?;
    if let Some(Commands::List { json }) = &cli.command {
        return print_catalog(&setup.catalog, *json);
    }

    let console = Console::stdout(setup.symbols);
    let mut ctx = LauncherContext::new(
        setup.catalog,
        setup.root,
        setup.launch,
        Box::new(SystemBrowser),
        console,
    );
    tracing::info!(root = %ctx.root.display(), tools = ctx.catalog.len(), "launcher ready");

    let (event_tx, mut event_rx) = mpsc::channel(64);
    spawn_stdin_listener(event_tx.clone());
    spawn_signal_listener(event_tx);

    run_menu(&mut ctx, &mut event_rx).await;
    Ok(())
}

/// Where the next event comes from: queued input first, then the channel.
struct EventSource<'a> {
    rx: &'a mut mpsc::Receiver<Event>,
    pending: VecDeque<Event>,
    open: bool,
}

impl<'a> EventSource<'a> {
    fn new(rx: &'a mut mpsc::Receiver<Event>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
            open: true,
        }
    }

    async fn next(&mut self) -> Event {
        if let Some(event) = self.pending.pop_front() {
            return event;
        }
        if !self.open {
            return Event::InputClosed;
        }
        match self.rx.recv().await {
            Some(event) => event,
            None => {
                self.open = false;
                Event::InputClosed
            }
        }
    }

    /// Resolves on the next interrupt, queueing any input that arrives first.
    /// Never resolves once the channel is closed.
    async fn next_interrupt(&mut self) -> InterruptSignal {
        loop {
            if !self.open {
                return std::future::pending().await;
            }
            match self.rx.recv().await {
                Some(Event::Interrupt { signal }) => return signal,
                Some(event) => self.pending.push_back(event),
                None => self.open = false,
            }
        }
    }

    /// Runs `action` to completion unless an interrupt arrives first. Input
    /// received meanwhile is kept for later prompts.
    async fn run_interruptible<F>(&mut self, action: F) -> Option<InterruptSignal>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(action);
        loop {
            tokio::select! {
                _ = &mut action => return None,
                event = self.rx.recv(), if self.open => match event {
                    Some(Event::Interrupt { signal }) => return Some(signal),
                    Some(event) => self.pending.push_back(event),
                    None => self.open = false,
                },
            }
        }
    }
}

async fn run_menu(ctx: &mut LauncherContext, rx: &mut mpsc::Receiver<Event>) {
    let mut events = EventSource::new(rx);
    ctx.console.clear_screen();
    ctx.console.line(menu::render_header());

    loop {
        for exited in ctx.registry.reap_exited() {
            let name = ctx
                .catalog
                .get(&exited.id)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| exited.id.clone());
            let code = exited
                .code
                .map(|c| format!("code {}", c))
                .unwrap_or_else(|| "a signal".to_string());
            ctx.console.warn(format!("{} exited on its own ({})", name, code));
        }

        let menu_text = menu::render_menu(
            &ctx.catalog,
            &ctx.registry,
            ctx.config.auto_open_browser,
            ctx.console.symbols(),
            ctx.console.color(),
        );
        ctx.console.line(menu_text);
        ctx.console
            .line(menu::render_status(&ctx.catalog, &ctx.registry));
        ctx.console.prompt("\nEnter choice: ");

        let line = match events.next().await {
            Event::Input(line) => line,
            Event::InputClosed => {
                quit(ctx, &mut events).await;
                return;
            }
            Event::Interrupt { signal } => {
                interrupted(ctx, signal, &mut events).await;
                return;
            }
        };

        let command = menu::parse_command(&line, &ctx.catalog);
        let confirmed = match &command {
            MenuCommand::Quit => {
                quit(ctx, &mut events).await;
                return;
            }
            // Not cancellable: dropping a shutdown midway would orphan the
            // processes it already took from the registry.
            MenuCommand::KillAll => {
                if stop_everything(ctx, &mut events).await {
                    farewell(ctx);
                    return;
                }
                continue;
            }
            MenuCommand::Group(selector) => {
                let entries = resolve(&ctx.catalog, *selector);
                if requires_confirmation(&ctx.catalog, &entries) {
                    let dev_servers = entries.iter().filter(|e| e.kind.is_dev_server()).count();
                    ctx.console.prompt(&format!(
                        "\nLaunch {} tools ({} dev servers)? [y/N] ",
                        entries.len(),
                        dev_servers
                    ));
                    match events.next().await {
                        Event::Input(answer) => menu::parse_confirmation(&answer),
                        Event::InputClosed => {
                            quit(ctx, &mut events).await;
                            return;
                        }
                        Event::Interrupt { signal } => {
                            interrupted(ctx, signal, &mut events).await;
                            return;
                        }
                    }
                } else {
                    true
                }
            }
            _ => true,
        };

        if let Some(signal) = events.run_interruptible(execute(ctx, command, confirmed)).await {
            interrupted(ctx, signal, &mut events).await;
            return;
        }
    }
}

async fn execute(ctx: &mut LauncherContext, command: MenuCommand, confirmed: bool) {
    match command {
        MenuCommand::Launch(id) => {
            let Some(entry) = ctx.catalog.get(&id).cloned() else {
                return;
            };
            ctx.console.line(format!("\nLaunching {}...", entry.name));
            let result = launch(ctx, &id, None).await;
            report_result(ctx, &entry, &result);
        }
        MenuCommand::Group(selector) => {
            ctx.console
                .line(format!("\nLAUNCHING {}...", selector.to_string().to_uppercase()));
            match launch_group(ctx, selector, confirmed).await {
                GroupOutcome::Aborted => ctx.console.warn("cancelled, nothing launched"),
                GroupOutcome::Completed(items) => {
                    let failed = items.iter().filter(|i| i.result.is_err()).count();
                    let message = format!("{} launched, {} failed", items.len() - failed, failed);
                    if failed == 0 {
                        ctx.console.ok(message);
                    } else {
                        ctx.console.warn(message);
                    }
                }
            }
        }
        MenuCommand::ToggleBrowser => {
            let on = ctx.config.toggle_auto_open_browser();
            ctx.console.info(format!(
                "auto-open browser {} for future launches",
                if on { "on" } else { "off" }
            ));
        }
        MenuCommand::ShowLogs => {
            let logs = menu::render_logs(&ctx.catalog, &ctx.registry);
            ctx.console.line(logs);
        }
        MenuCommand::Redraw => {}
        MenuCommand::Invalid(input) => ctx.console.error(format!("Invalid choice: {}", input)),
        // Handled by the menu loop before dispatch.
        MenuCommand::Quit | MenuCommand::KillAll => {}
    }
}

/// Stops everything; an interrupt meanwhile force-kills what is left.
/// Returns whether that happened.
async fn stop_everything(ctx: &mut LauncherContext, events: &mut EventSource<'_>) -> bool {
    ctx.console.line("\nStopping all servers...");
    let summary = shutdown_with(ctx, async {
        let signal = events.next_interrupt().await;
        tracing::info!(?signal, "interrupted during shutdown");
    })
    .await;
    tracing::debug!(
        stopped = summary.stopped.len(),
        killed = summary.killed.len(),
        tabs = summary.tabs,
        "shutdown finished"
    );
    if summary.failures.is_empty() {
        ctx.console.ok("All servers stopped");
    } else {
        ctx.console.warn(format!(
            "{} process(es) could not be stopped",
            summary.failures.len()
        ));
    }
    summary.hurried
}

async fn quit(ctx: &mut LauncherContext, events: &mut EventSource<'_>) {
    stop_everything(ctx, events).await;
    farewell(ctx);
}

async fn interrupted(ctx: &mut LauncherContext, signal: InterruptSignal, events: &mut EventSource<'_>) {
    tracing::info!(?signal, "interrupted");
    ctx.console.line("\n\nInterrupted!");
    quit(ctx, events).await;
}

fn farewell(ctx: &mut LauncherContext) {
    ctx.console.line("\nGoodbye!\n");
}

fn spawn_stdin_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || forward_lines(std::io::stdin().lock(), &tx));
}

/// Sends each line of `reader` as `Event::Input`, then `Event::InputClosed`
/// at EOF or on a read error. Bytes that are not UTF-8 are replaced rather
/// than ending input.
fn forward_lines<R: BufRead>(mut reader: R, tx: &mpsc::Sender<Event>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let event = match reader.read_until(b'\n', &mut buf) {
            Ok(0) => Event::InputClosed,
            Ok(_) => Event::Input(decode_line(&buf)),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(error = %err, "stdin read failed");
                Event::InputClosed
            }
        };
        let closed = event == Event::InputClosed;
        if tx.blocking_send(event).is_err() || closed {
            break;
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// Forwards every Ctrl-C and SIGTERM. The first starts a graceful shutdown;
/// a later one cuts its grace period short.
fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot listen for SIGTERM");
                    return;
                }
            };
            loop {
                let signal = tokio::select! {
                    result = tokio::signal::ctrl_c() => match result {
                        Ok(()) => InterruptSignal::SigInt,
                        Err(_) => return,
                    },
                    received = sigterm.recv() => match received {
                        Some(()) => InterruptSignal::SigTerm,
                        None => return,
                    },
                };
                if tx.send(Event::Interrupt { signal }).await.is_err() {
                    return;
                }
            }
        }
        #[cfg(not(unix))]
        {
            while tokio::signal::ctrl_c().await.is_ok() {
                let event = Event::Interrupt {
                    signal: InterruptSignal::SigInt,
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    });
}

fn load_setup(cli: &Cli) -> Result<Setup> {
    let mut config = Config::default();
    let mut config_dir = None;
    if !cli.no_config {
        let config_path = cli.config.clone().or_else(default_config_path);
        if let Some(path) = config_path {
            config = config::load_config(&path)?;
            config_dir = Some(
                path.parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            );
        }
    }

    let base = match &config_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
        _ => std::env::current_dir().context("failed to read current directory")?,
    };
    let root = match (&cli.root, &config.root) {
        (Some(root), _) => root.clone(),
        (None, Some(root)) => base.join(root),
        (None, None) => base,
    };

    let catalog = if config.tools.is_empty() {
        match config.production.clone() {
            Some(production) => Catalog::builtin().with_production(production),
            None => Ok(Catalog::builtin()),
        }
    } else {
        Catalog::from_config(config.tools.clone(), config.production.clone())
    }
    .context("invalid tool catalog")?;

    let mut launch = LaunchConfig::from_config(&config)?;
    if cli.no_browser {
        launch.auto_open_browser = false;
    }
    if let Some(secs) = cli.stagger {
        launch.stagger_delay = config::stagger_from_secs(secs)?;
    }
    if let Some(template) = &cli.log_file {
        launch.log_file = Some(template.clone());
    }
    let symbols = !cli.no_symbols && config.symbols.unwrap_or(true);

    Ok(Setup {
        catalog,
        root,
        launch,
        symbols,
    })
}

fn default_config_path() -> Option<PathBuf> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

fn print_catalog(catalog: &Catalog, json: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if json {
        let entries: Vec<_> = catalog.iter().collect();
        serde_json::to_writer_pretty(&mut stdout, &entries)?;
        writeln!(stdout)?;
        return Ok(());
    }
    for entry in catalog.iter() {
        let port = entry.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        writeln!(
            stdout,
            "{:>4}  {:<7} {:>5}  {:<24} {}",
            entry.id,
            entry.kind,
            port,
            entry.name,
            entry.location.display()
        )?;
    }
    Ok(())
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
}
