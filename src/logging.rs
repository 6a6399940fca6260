use tracing::Level;

pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the fmt subscriber. `-v` shows motion changes, `-vv` every step.
pub fn init(verbosity: u8) {
    let result = tracing_subscriber::fmt()
        .with_max_level(level_for_verbosity(verbosity))
        .with_target(false)
        .try_init();
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}
