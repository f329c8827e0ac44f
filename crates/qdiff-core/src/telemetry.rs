//! Tracing setup shared by the qdiff binaries.
//!
//! Without `RUST_LOG`, qdiff's own crates log at the requested level and
//! everything else at `warn`. Output always goes to stderr; stdout is left
//! for command results.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const QDIFF_TARGETS: [&str; 3] = ["qdiff_core", "qdiff_cov", "qdiff"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    /// Newline-delimited JSON.
    Json,
}

/// `warn,qdiff_core=<level>,qdiff_cov=<level>,qdiff=<level>`
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in QDIFF_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber. Only the first call in a process has an
/// effect.
pub fn init_tracing(json: bool, level: Level) {
    let format = if json { LogFormat::Json } else { LogFormat::Text };
    init_tracing_with(format, level);
}

pub fn init_tracing_with(format: LogFormat, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));
    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
    result.ok();
}
