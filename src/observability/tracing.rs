use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;
use crate::types::ids::{CorrelationId, UserId};

pub fn trace_transfer(correlation_id: &CorrelationId, sender: &UserId) -> Span {
    tracing::info_span!(
        "p2p_transfer",
        correlation_id = %correlation_id,
        sender = %sender,
    )
}

pub fn trace_withdrawal(correlation_id: &CorrelationId, user_id: &UserId) -> Span {
    tracing::info_span!(
        "withdrawal",
        correlation_id = %correlation_id,
        user_id = %user_id,
    )
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
