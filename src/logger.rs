use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "RATEWRK_LOG";

/// Installs the global subscriber on stderr, keeping stdout for the summary.
pub fn init_logging(verbose: bool) {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .ok();

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter_for(directives.as_deref(), verbose))
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = result {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}

/// Explicit directives win; unparsable ones fall back to `info`. Verbose
/// raises only this crate to `debug` so hyper's connection chatter stays out.
fn filter_for(directives: Option<&str>, verbose: bool) -> EnvFilter {
    match directives {
        Some(value) => EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        None if verbose => EnvFilter::new("info,ratewrk=debug"),
        None => EnvFilter::new("info"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn default_filter_is_info() {
        assert_eq!(filter_for(None, false).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn verbose_raises_to_debug() {
        assert_eq!(filter_for(None, true).max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn directives_override_verbosity() {
        let filter = filter_for(Some("ratewrk=trace"), false);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));

        let filter = filter_for(Some("warn"), true);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn unparsable_directives_fall_back_to_info() {
        let filter = filter_for(Some("ratewrk=loud"), true);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }
}
