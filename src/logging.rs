use crate::error::Error;
use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config as LogConfig, Deserializers, Root},
    encode::pattern::PatternEncoder,
};
use std::path::Path;

const FALLBACK_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {t} - {m}{n}";

/// Set up logging from a log4rs YAML file, or log `info` and above to stdout if the file does
/// not exist.
pub fn init_logging(config_file: &Path) -> Result<(), Error> {
    if config_file.exists() {
        log4rs::init_file(config_file, Deserializers::default())
            .map_err(|e| Error::Logging(e.to_string()))?;
        return Ok(());
    }

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FALLBACK_PATTERN)))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .map_err(|e| Error::Logging(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| Error::Logging(e.to_string()))?;
    Ok(())
}
