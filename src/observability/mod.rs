//! Logging setup
//!
//! Events go to stdout through `tracing-subscriber`. `RUST_LOG` overrides
//! the default filter. Post-commit inconsistencies are emitted on the
//! [`ALERT_TARGET`] target so they can be routed separately.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target carrying events that need operator attention
pub const ALERT_TARGET: &str = "tenants::alert";

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "tenants=info,tower_http=info";

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init_tracing(DEFAULT_FILTER);
        init_tracing(DEFAULT_FILTER);
        tracing::info!(target: ALERT_TARGET, "subscriber installed");
    }
}
