//! Process-wide log setup: console output plus an optional append-only file.

use std::path::{Path, PathBuf};

use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging options derived from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// `debug` level instead of `info`.
    pub debug: bool,
    /// File receiving a copy of every log line.
    pub file: Option<PathBuf>,
}

impl LogOptions {
    /// Default directive when `RUST_LOG` is unset.
    #[must_use]
    pub const fn level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the level.
///
/// Returns false if a subscriber was already installed (the existing one is
/// kept).
pub fn init(options: &LogOptions) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(options.level()));

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let file_layer = options.file.as_deref().map(|path| {
        let (dir, name) = split_path(path);
        fmt::layer()
            .with_writer(rolling::never(dir, name))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok()
}

fn split_path(path: &Path) -> (PathBuf, PathBuf) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let name = path
        .file_name()
        .map_or_else(|| PathBuf::from("solar-monitor.log"), PathBuf::from);
    (dir, name)
}
