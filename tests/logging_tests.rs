use combined_energy::logging::{LogContext, get_logger_with_context, min_level, parse_log_level};
use tracing::Level;

#[test]
fn parse_accepts_common_spellings() {
    assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
    assert_eq!(parse_log_level("Warn").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("WARNING").unwrap(), Level::WARN);
    assert!(parse_log_level("loud").is_err());
}

#[test]
fn min_level_picks_more_verbose() {
    assert_eq!(min_level(Level::WARN, Level::TRACE), Level::TRACE);
    assert_eq!(min_level(Level::DEBUG, Level::INFO), Level::DEBUG);
}

#[test]
fn logger_keeps_context() {
    let logger = get_logger_with_context(
        LogContext::new("readings")
            .with_run_id("run-1".to_string())
            .with_installation_id(1234),
    );
    assert_eq!(logger.context().installation_id, Some(1234));
    assert_eq!(logger.context().run_id.as_deref(), Some("run-1"));

    // Emitting without an installed subscriber must not panic
    logger.info("fetched window");
    logger.debug("fetched window");
}
