use chrono::Local;
use log::LevelFilter;

/// Target used by protocol client implementations for their own logs.
pub const CLIENT_TARGET: &str = "Client";

/// Installs the process logger. `RUST_LOG` takes precedence over the defaults.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(debug_client: bool) {
    let client_level = if debug_client {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module(CLIENT_TARGET, client_level)
        .parse_env(env_logger::Env::default())
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}
