//! Logging setup

use tracing::log::LevelFilter;

/// Crates pulled in by the HTTP client that are chatty at info level, with the
/// level they're held to unless debug logging is on.
const QUIET_MODULES: &[(&str, LevelFilter)] = &[
    ("tracing", LevelFilter::Warn),
    ("reqwest", LevelFilter::Warn),
    ("rustls", LevelFilter::Info),
    ("hyper_util", LevelFilter::Info),
    ("h2", LevelFilter::Info),
];

/// Level for this crate's own log lines.
pub fn log_level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Sets up logging based on the debug flag. With `debug` every module logs at
/// debug level, otherwise the HTTP stack is held to [`QUIET_MODULES`].
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let mut logger = simple_logger::SimpleLogger::new().with_level(log_level(debug));
    if !debug {
        for (module, level) in QUIET_MODULES {
            logger = logger.with_module_level(module, *level);
        }
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {err}");
        Box::new(std::io::Error::other(err))
    })
}
