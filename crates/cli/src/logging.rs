use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Logs go to stderr so stdout stays free
/// for rendered markdown.
///
/// `RUST_LOG` wins when set; otherwise gather crates log at `info`, or
/// `debug` with `debug`.
pub fn init_tracing(debug: bool) {
    let default = if debug {
        "gather_core=debug,gather_cli=debug,tower_http=debug"
    } else {
        "gather_core=info,gather_cli=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
