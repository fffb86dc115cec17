pub mod token_counter;

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = tracing_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.trim().to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_directive_mapping() {
        assert_eq!(tracing_directive("warning").as_deref(), Some("WARN"));
        assert_eq!(tracing_directive("CRITICAL").as_deref(), Some("ERROR"));
        assert_eq!(tracing_directive("debug").as_deref(), Some("DEBUG"));
        assert!(tracing_directive("Disabled").is_none());
    }
}
