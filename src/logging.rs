use std::sync::Once;

use log::LevelFilter;

use crate::config::LogConfig;

static INIT: Once = Once::new();

/// Where the active filter came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
    Directives(String),
    Level(LevelFilter),
}

/// `logging.filter` wins, then `RUST_LOG`, then `logging.level`. An unknown
/// level name falls back to `info`.
fn select_filter(config: &LogConfig, env: Option<String>) -> (Filter, Option<String>) {
    if let Some(filter) = config.filter.clone().or(env) {
        return (Filter::Directives(filter), None);
    }
    match config.level.parse::<LevelFilter>() {
        Ok(level) => (Filter::Level(level), None),
        Err(_) => (Filter::Level(LevelFilter::Info), Some(config.level.clone())),
    }
}

/// Installs the global logger from the `logging` config section. Later calls
/// are ignored.
pub fn init_logging(config: &LogConfig) {
    INIT.call_once(|| {
        let (filter, rejected) = select_filter(config, std::env::var("RUST_LOG").ok());
        let mut builder = env_logger::Builder::new();
        match &filter {
            Filter::Directives(directives) => builder.parse_filters(directives),
            Filter::Level(level) => builder.filter_level(*level),
        };
        builder.write_style(if config.color { env_logger::WriteStyle::Auto } else { env_logger::WriteStyle::Never });
        if builder.try_init().is_err() {
            return;
        }
        if let Some(level) = rejected {
            log::warn!(target: "ember::engine", "unknown log level '{level}', using info");
        }
        log::debug!(target: "ember::engine", "logging initialized with {filter:?}");
    });
}
