use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn default_directives(debug: bool) -> &'static str {
    if debug {
        "stream_sup=debug,zenoh=info"
    } else {
        "stream_sup=info,zenoh=warn"
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `debug`.
///
/// JSON output flattens event fields into the top-level object so report
/// lines can be filtered on `total_consumed` or `rate` directly.
pub fn init_logger(json_mode: bool, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    let output = if json_mode {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer().compact().with_target(debug).boxed()
    };

    tracing_subscriber::registry().with(filter).with(output).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_raises_both_directives() {
        assert!(default_directives(true).contains("stream_sup=debug"));
        assert!(default_directives(false).contains("zenoh=warn"));
        EnvFilter::try_new(default_directives(true)).unwrap();
        EnvFilter::try_new(default_directives(false)).unwrap();
    }
}
