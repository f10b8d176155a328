use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// JSON log lines on stdout; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into()));
    let initialized = tracing_subscriber::registry()
        .with(fmt::layer().json().with_current_span(false).without_time())
        .with(filter)
        .try_init();
    if initialized.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
