/// Environment variable holding the `tracing` filter directives.
pub const LOG_FILTER_ENV: &str = "SAFEKEEP_LOG";
pub const DEFAULT_LOG_FILTER: &str = "safekeep=info,sqlx=warn";

/// Install the JSON subscriber on stderr. Stdout is left for the
/// human-readable progress lines. Safe to call more than once.
pub fn init() {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var(LOG_FILTER_ENV).unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
}
