use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    EnvFilter,
};

/// Installs the global fmt subscriber. `RUST_LOG` directives are honoured on
/// top of the crate-level default.
pub fn init_tracing() {
    let default: Directive = "ingestion_service=info"
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let filter = EnvFilter::from_default_env().add_directive(default);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
