use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout carries the import report.
///
/// Defaults to info. Unless `RUST_LOG` is set, sqlx statement logging is
/// kept at warn.
pub fn init_tracing() {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        if let Ok(quiet_sqlx) = "sqlx=warn".parse() {
            filter = filter.add_directive(quiet_sqlx);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
