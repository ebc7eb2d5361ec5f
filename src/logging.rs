use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr so they never interleave with the menu on stdout.
pub fn init_logging(verbosity: u8) {
    // 0 = warnings only, 1 (-v) = launch lifecycle, 2+ (-vv) = everything
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr)
        .with_target(false)
        .with_level(true)
        .compact()
        .init();
}
