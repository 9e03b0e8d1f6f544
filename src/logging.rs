use tracing_subscriber::EnvFilter;

/// Crate target that receives log output.
const CRATE_TARGET: &str = "reimbursement_estimator";

/// Map `-v` occurrences to a level name.
///
/// - 0 (none) -> warn
/// - 1 (-v)   -> info
/// - 2 (-vv)  -> debug
/// - 3+ (-vvv)-> trace
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize tracing on stderr based on CLI verbosity.
///
/// `RUST_LOG` overrides the CLI flag if set. Stdout is reserved for results.
pub fn init(verbosity: u8) {
    let default_filter = format!("{CRATE_TARGET}={}", level_for(verbosity));
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second init (e.g. from tests) is not an error worth reporting.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(9), "trace");
    }
}
