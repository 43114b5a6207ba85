use eb_configs::{LogFormat, Settings};
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output stays clean on stdout.
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match settings.log_format {
        LogFormat::Json => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_target(false)
            .init(),
        LogFormat::Compact => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .init(),
    }
}
