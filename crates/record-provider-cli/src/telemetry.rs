//! Log setup for `recordctl`.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise dependencies log at `warn` and this
/// tool plus the provider library log at `info`, or `debug` with `--verbose`.
pub fn init(json: bool, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);
    let layer = if json {
        layer.json().boxed()
    } else {
        layer.compact().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .ok();
}

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,record_provider={level},recordctl={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_only_our_targets() {
        assert_eq!(
            default_directives(false),
            "warn,record_provider=info,recordctl=info"
        );
        assert_eq!(
            default_directives(true),
            "warn,record_provider=debug,recordctl=debug"
        );
        assert!(EnvFilter::try_new(default_directives(true)).is_ok());
    }
}
