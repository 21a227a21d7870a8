/// Initializes the tracing/logging infrastructure for applications using
/// the engine.
///
/// Filtering is environment-based: set `RUST_LOG` to control verbosity,
/// e.g. `RUST_LOG=rule_engine=debug` to see every lifecycle phase the
/// executors emit.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
