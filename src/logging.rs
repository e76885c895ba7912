//! Logging initialization built on tracing-subscriber.

use tracing_subscriber::EnvFilter;

/// Initialize logging with an env filter, console output, and an optional
/// daily-rolling file layer.
pub fn init() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,quorum=debug"));

    let log_dir = std::env::var("QUORUM_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .unwrap_or_else(|_| "/var/log/quorum".to_string());

    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial log file, so writability must be preflighted.
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".quorum_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, "quorum.log");
                let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the lifetime of the process
                Box::leak(Box::new(_guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            log_dir
        );
        None
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}

/// Minimal console-only logging for tests and short-lived tools.
pub fn init_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
