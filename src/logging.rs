//! Tracing subscriber setup for the command-line binary.

use std::str::FromStr;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive applied when neither a filter nor `RUST_LOG` says otherwise.
pub const DEFAULT_DIRECTIVE: &str = "cloudwait=info";

/// Builds the filter for `filter`.
///
/// A bare level such as `debug` applies to this crate only; anything else is
/// parsed as a full `EnvFilter` directive list. Without a filter, `RUST_LOG`
/// is honoured.
#[must_use]
pub fn build_filter(filter: Option<&str>) -> EnvFilter {
    let default = DEFAULT_DIRECTIVE
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let builder = EnvFilter::builder().with_default_directive(default);

    match filter {
        Some(requested) => {
            let directives = match Level::from_str(requested) {
                Ok(level) => format!("cloudwait={level}"),
                Err(_) => requested.to_owned(),
            };
            builder.parse_lossy(directives)
        }
        None => builder.from_env_lossy(),
    }
}

/// Installs a global subscriber writing to stderr.
///
/// Calling it again is harmless; later calls keep the first subscriber.
pub fn setup_tracing(filter: Option<&str>) {
    tracing_subscriber::registry()
        .with(Layer::default().with_writer(std::io::stderr))
        .with(build_filter(filter))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Some("debug"), "cloudwait=debug")]
    #[case(Some("TRACE"), "cloudwait=trace")]
    #[case(Some("cloudwait::poll=trace"), "cloudwait::poll=trace")]
    fn bare_levels_scope_to_crate(#[case] input: Option<&str>, #[case] expected: &str) {
        let rendered = build_filter(input).to_string();
        assert!(rendered.contains(expected), "unexpected filter: {rendered}");
    }

    #[test]
    fn setup_tracing_can_run_twice() {
        setup_tracing(Some("warn"));
        setup_tracing(None);
    }
}
