/// Logging setup.
///
/// Logs always go to stderr so the STDIO transport keeps stdout for JSON-RPC.
/// `RUST_LOG` selects the filter (default "info"); `LOG_FORMAT=json` switches
/// to structured JSON lines.

use tracing_subscriber::EnvFilter;

use crate::core::utils;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Ignore the error if a subscriber is already installed
    let _ = if utils::get_env_var("LOG_FORMAT", "text") == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
