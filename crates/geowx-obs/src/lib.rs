use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
/// - JSON logs, one object per line
/// - RUST_LOG respected; default to "info,geowx=debug"
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init(service_name: &str) {
    let default_filter = "info,geowx=debug";
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    let installed = tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(service = %service_name, "Observability initialized");
    }
}
