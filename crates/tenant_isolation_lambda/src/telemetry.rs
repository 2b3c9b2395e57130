use tenant_isolation_core::config::LOG_FILTER_ENV;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize JSON tracing with the `TENANT_ISOLATION_LOG` environment variable.
///
/// Defaults to "info" if the variable is unset or unparsable. Timestamps are
/// left to CloudWatch. Calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_FILTER_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .without_time()
                .with_current_span(true)
                .with_target(false),
        )
        .try_init();
}
