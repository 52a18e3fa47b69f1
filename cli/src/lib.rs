//! Command-line entry points layered on the blueprint engine.
//!
//! A typical binary resolves its root target, hands `std::env::args` to
//! [`make_from_argv`], and wraps the result in [`exit_on_error`] so `--help`
//! and diagnostics terminate the process with conventional exit codes.

use blueprint::{Blueprint, BlueprintError, Registry, Value};
use std::sync::Arc;

/// Build a blueprint for `target`, apply argv, and make it.
///
/// `target` is a `module:Name` reference or a unique bare name in the
/// registry. `--help` surfaces as [`BlueprintError::Help`] carrying the
/// rendered help text.
pub fn make_from_argv(
    registry: Arc<Registry>,
    target: &str,
    argv: &[impl AsRef<str>],
    allow_hyphens: bool,
) -> Result<Value, BlueprintError> {
    let mut bp = Blueprint::for_target(registry, target)?;
    bp.make_from_argv(argv, allow_hyphens)
}

/// Like [`make_from_argv`], with tokens taken from the process arguments.
pub fn make_from_env(
    registry: Arc<Registry>,
    target: &str,
    allow_hyphens: bool,
) -> Result<Value, BlueprintError> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    make_from_argv(registry, target, &argv, allow_hyphens)
}

/// Unwrap an entry-point result, terminating the process on error.
///
/// Help text goes to stdout with exit code 0; diagnostics go to stderr with
/// exit code 2.
pub fn exit_on_error<T>(result: Result<T, BlueprintError>) -> T {
    match result {
        Ok(value) => value,
        Err(BlueprintError::Help(text)) => {
            println!("{text}");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::debug!(error = %e, "entrypoint failed");
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    }
}

/// Initialize tracing for a command-line process, honoring `RUST_LOG`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
