//! Logging helpers
//!
//! Initialises `env_logger` with the configured level. `RUST_LOG`, when set,
//! takes precedence.

/// Initialise the logging system
///
/// # Parameters
///
/// * `level` - Default log level filter (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) is not an error.
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_twice() {
        init_logger("debug");
        init_logger("trace");
    }
}
