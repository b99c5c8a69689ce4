#![forbid(unsafe_code)]

use env_logger::Env;

/// Installs the `env_logger` backend with an `info` default. `RUST_LOG`
/// overrides the filter. Calling this twice is harmless.
pub fn init_logging() {
    let env = Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_secs()
        .try_init();
}
