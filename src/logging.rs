use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

pub fn init_logging(verbosity: u8) {
    // 0 = warnings only (progress goes to stdout anyway)
    // 1 (-v) = info for this crate
    // 2+ (-vv) = debug for this crate, info for the HTTP stack
    let filter = match verbosity {
        0 => "warn",
        1 => "warn,pesu_fetch=info",
        _ => "info,pesu_fetch=debug",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

    // try_init so tests and embedders that already installed a subscriber keep theirs
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr)
        .with_target(true)
        .with_level(true)
        .compact()
        .try_init();
}
