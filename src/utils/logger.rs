use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATE_TARGET: &str = "price_estimator";

/// `RUST_LOG` wins; otherwise this crate at info (debug when verbose) and
/// dependencies such as reqwest and hyper at their info level only when verbose.
fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(format!("{}=debug,info", CRATE_TARGET))
        } else {
            EnvFilter::new(format!("{}=info", CRATE_TARGET))
        }
    })
}

// 日誌寫到 stderr，stdout 保留給 `urls` 等指令的輸出
pub fn init_cli_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// JSON lines on stderr for cron or CI runs whose logs are ingested elsewhere.
/// Event fields are flattened so `url`, `status` and similar keys sit at the top level.
pub fn init_json_logger() {
    tracing_subscriber::registry()
        .with(default_filter(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(true)
                .with_target(true),
        )
        .init();
}
