/// Install the `tracing` subscriber used by the binaries.
///
/// Events go to stderr, so stdout carries only experiment output. Verbosity comes from `RUST_LOG`
/// and defaults to `info`.
pub fn configure_logging() {
    let default_verbosity = tracing_subscriber::filter::LevelFilter::INFO;
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_verbosity.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::Uptime::default())
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_target(false)
        .init();
}
