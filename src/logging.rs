use tracing_subscriber::EnvFilter;

/// Console logging, filtered by `RUST_LOG` and `info` when unset.
pub fn init(verbose: bool) {
    let default = if verbose { "mapscout=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
