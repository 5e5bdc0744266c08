//! Tracing subscriber setup for the `hdat` binary and embedders.

use hdat_error::{HdatError, Result};
use tracing_subscriber::EnvFilter;

/// Filter directives for hdat itself; takes priority over `RUST_LOG`.
pub const LOG_ENV: &str = "HDAT_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Install the global stderr subscriber.
///
/// Filter directives come from `HDAT_LOG`, else `RUST_LOG`, else `info`.
/// Fails if a global subscriber is already installed.
pub fn init_logging(format: LogFormat) -> Result<()> {
    let directives = filter_directives(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );
    let filter = EnvFilter::try_new(&directives).map_err(|err| HdatError::Config {
        detail: format!("invalid log filter \"{directives}\": {err}"),
    })?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| HdatError::Config {
        detail: format!("failed to install log subscriber: {err}"),
    })
}

fn filter_directives(hdat_log: Option<String>, rust_log: Option<String>) -> String {
    [hdat_log, rust_log]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_owned())
}
