//! Log setup for the command-line tool. Library code only emits `tracing`
//! events; installing a subscriber is left to the binary.
use std::fmt;

/// Environment variable holding an `EnvFilter` directive, e.g.
/// `crossbind=debug`.
pub const LOG_ENV: &str = "CROSSBIND_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(text)
    }
}

/// Filter directive: an explicit `--log-level` wins, then `CROSSBIND_LOG`,
/// then `warn`.
pub fn filter_directive(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    match (cli_level, env) {
        (Some(level), _) => level.to_string(),
        (None, Some(spec)) if !spec.trim().is_empty() => spec.trim().to_string(),
        _ => LogLevel::Warn.to_string(),
    }
}

/// Install the global stderr subscriber. Later calls are no-ops.
pub fn init(cli_level: Option<LogLevel>) {
    use std::io::IsTerminal;
    use std::sync::OnceLock;
    use tracing_subscriber::{EnvFilter, fmt};

    static INITIALISED: OnceLock<()> = OnceLock::new();

    let _ = INITIALISED.get_or_init(|| {
        let use_ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
        let env = std::env::var(LOG_ENV).ok();
        let directive = filter_directive(cli_level, env.as_deref());
        let filter = EnvFilter::try_new(&directive)
            .unwrap_or_else(|_| EnvFilter::new(LogLevel::Warn.to_string()));
        let subscriber = fmt::fmt()
            .with_env_filter(filter)
            .with_ansi(use_ansi)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .compact()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_render_as_filter_directives() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(filter_directive(Some(LogLevel::Error), None), "error");
        assert!(LogLevel::Error < LogLevel::Debug);
    }

    #[test]
    fn cli_level_overrides_the_environment() {
        assert_eq!(filter_directive(Some(LogLevel::Debug), Some("crossbind=trace")), "debug");
        assert_eq!(filter_directive(None, Some("crossbind=trace")), "crossbind=trace");
        assert_eq!(filter_directive(None, Some("  ")), "warn");
        assert_eq!(filter_directive(None, None), "warn");
    }
}
