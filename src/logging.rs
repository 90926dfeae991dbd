use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber, filtered by `RUST_LOG` and falling
/// back to `default_directives` when it is unset or unparsable.
pub fn init(default_directives: &str) {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(from_env.as_deref(), default_directives))
        .init();
}

fn env_filter(from_env: Option<&str>, default_directives: &str) -> EnvFilter {
    from_env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives))
}
