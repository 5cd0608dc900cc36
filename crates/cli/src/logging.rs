use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Filter used when RUST_LOG is unset
fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,shipfront_deployer=info",
        1 => "warn,shipfront=debug,shipfront_deployer=debug,shipfront_artifacts=debug",
        _ => "info,shipfront=trace,shipfront_deployer=trace,shipfront_artifacts=trace",
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for `--json` output.
pub fn init(verbose: u8, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
}
