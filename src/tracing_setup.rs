use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper_util=warn";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. JSON output is meant for
/// service managers; the pretty format for interactive use.
pub fn init_tracing(default_filter: &str, json_format: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .wrap_err_with(|| format!("Invalid log filter: {default_filter}"))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .wrap_err("Failed to install JSON tracing subscriber")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install console tracing subscriber")?;
    }

    tracing::debug!(json = json_format, "Logging initialized");
    Ok(())
}

/// Span wrapping everything a listener task logs.
pub fn listener_span(name: &'static str, addr: &std::net::SocketAddr) -> tracing::Span {
    tracing::info_span!("listener", listener = name, addr = %addr)
}
