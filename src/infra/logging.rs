//! Tracing subscriber setup: env-filtered, compact, on stderr so stdout
//! stays clean for `--json` output.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

/// Default directive when `RUST_LOG` is unset
fn default_directive(
    verbose: bool,
    quiet: bool,
) -> &'static str
{
    match (verbose, quiet)
    {
        (true, _) => "beatguard=debug,warn",
        (false, true) => "error",
        (false, false) => "warn",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the flags; a
/// second call is a no-op.
pub fn init(
    verbose: bool,
    quiet: bool,
    no_color: bool,
)
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .with_timer(ChronoLocal::rfc_3339())
        .compact()
        .try_init();
}
