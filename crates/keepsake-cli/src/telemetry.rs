use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "keepsake=info";

/// Initialize tracing for the CLI.
///
/// `RUST_LOG` overrides the default filter. `log_format = "json"` switches to
/// line-delimited JSON events; anything else gets the compact console format.
pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        let console_fmt = tracing_subscriber::fmt::layer()
            .event_format(Format::default().compact().with_target(false))
            .with_writer(std::io::stderr);
        tracing_subscriber::registry()
            .with(filter)
            .with(console_fmt)
            .init();
    }
}
