use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, once per
/// process. Without `RUST_LOG` nothing is installed.
///
/// `RUST_LOG=quill_lang::language::passes=trace` shows every diagnostic as
/// it is raised; `quill_lang::runtime=trace` follows calls and input.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
