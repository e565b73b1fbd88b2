// Tracing setup for the binary

use tracing::Level;

/// Map a settings/flag level name onto a tracing level
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
pub fn init_logging(level: &str, verbose: bool) {
    use tracing_subscriber::fmt;

    let level = if verbose { Level::DEBUG } else { parse_level(level) };

    // a second init (tests, embedding) keeps the first subscriber
    let _ = fmt()
        .with_max_level(level)
        .with_target(verbose)
        .with_thread_ids(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}
