use tracing_subscriber::EnvFilter;

/// Installs the process-wide subscriber. `RUST_LOG`, when set, wins over
/// `level`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("opensplit_ledger={level},actix_web=info,warn")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
