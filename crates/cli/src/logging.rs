use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";
const LOG_FILE: &str = "client.log";

pub struct LoggingHandle {
    pub run_id: String,
    pub guard: WorkerGuard,
}

/// Log to `<log_dir>/client.log`. Terminal output belongs to the commands.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<LoggingHandle> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE);

    let directive = filter_directive(|key| std::env::var(key).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let format = std::env::var("CLOUDDEPLOY_LOG_FORMAT").unwrap_or_else(|_| "json".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    }

    let run_id = std::env::var("CLOUDDEPLOY_RUN_ID")
        .unwrap_or_else(|_| format!("pid-{}-{}", std::process::id(), clouddeploy_protocol::new_id()));

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        log_path = %log_path.display(),
        format = %format,
        filter = %directive,
    );

    Ok(LoggingHandle { run_id, guard })
}

/// `CLOUDDEPLOY_LOG_FILTER` > `RUST_LOG` > default
fn filter_directive(env: impl Fn(&str) -> Option<String>) -> String {
    env("CLOUDDEPLOY_LOG_FILTER")
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env("RUST_LOG").filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_prefers_dedicated_variable() {
        let env = |key: &str| match key {
            "CLOUDDEPLOY_LOG_FILTER" => Some("debug".to_string()),
            "RUST_LOG" => Some("warn".to_string()),
            _ => None,
        };
        assert_eq!(filter_directive(env), "debug");
    }

    #[test]
    fn filter_falls_back_to_rust_log_then_default() {
        let rust_log = |key: &str| (key == "RUST_LOG").then(|| "trace".to_string());
        assert_eq!(filter_directive(rust_log), "trace");

        let blank = |key: &str| (key == "CLOUDDEPLOY_LOG_FILTER").then(|| "  ".to_string());
        assert_eq!(filter_directive(blank), DEFAULT_FILTER);
    }
}
