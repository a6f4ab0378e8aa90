/// Logging initialization for the core.
///
/// Hosts embedding the core call this once at the start of `App::new()`,
/// before anything else. Desktop / tests get tracing-subscriber::fmt on
/// stderr; `RUST_LOG` overrides the default filter.
pub fn init_logging(#[allow(unused)] data_dir: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_core=debug,info".into()),
        )
        .try_init();
}
