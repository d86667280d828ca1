//! Logging bootstrap.
//!
//! Adapted from the teacher's `util::log_util::init`: initialize `log4rs`
//! from a YAML config file, falling back to a basic stdout appender at Trace
//! level if the file is missing or malformed. Every component in this crate
//! logs through the `log` facade; nothing owns its own logger instance.

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

const DEFAULT_CONFIG_PATH: &str = "config/logging.yaml";

/// Initializes logging from `path`, or [`DEFAULT_CONFIG_PATH`] if `path` is
/// `None`. Safe to call multiple times; only the first call takes effect.
pub fn init(path: Option<&str>) {
    LOGGER_INIT.call_once(|| {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        match log4rs::init_file(path, Default::default()) {
            Ok(_) => {
                log::info!("pbs logging initialized from {path}.");
            }
            Err(e) => {
                eprintln!("ERROR: failed to initialize logger from {path}: {e}");
                eprintln!("Falling back to basic stdout logging (Trace level).");
                init_fallback();
            }
        }
    });
}

fn init_fallback() {
    let stdout_appender = log4rs::append::console::ConsoleAppender::builder()
        .encoder(Box::new(log4rs::encode::pattern::PatternEncoder::new(
            "{h({d(%Y-%m-%d %H:%M:%S)(utc)} - {l}: {m}{n})}",
        )))
        .build();

    let config = log4rs::config::Config::builder()
        .appender(
            log4rs::config::Appender::builder()
                .build("stdout", Box::new(stdout_appender)),
        )
        .build(
            log4rs::config::Root::builder()
                .appender("stdout")
                .build(log::LevelFilter::Trace),
        );

    match config {
        Ok(config) => {
            if let Err(init_err) = log4rs::init_config(config) {
                eprintln!(
                    "ERROR: failed to initialize fallback logger: {init_err}. No logging will be available."
                );
            } else {
                log::warn!(
                    "pbs logging initialized using basic fallback (stdout, Trace level)."
                );
            }
        }
        Err(build_err) => {
            eprintln!(
                "ERROR: failed to build fallback logging configuration: {build_err}. No logging will be available."
            );
        }
    }
}
