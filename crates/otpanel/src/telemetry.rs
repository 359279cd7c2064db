use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr; stdout carries models and JSON.
pub fn init_cli_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .compact()
        .try_init();
}
