use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::io::Write;

/// Install the process-wide logger.
///
/// `level` is the default filter; `RUST_LOG` still takes precedence when set.
pub fn setup_logging(level: LevelFilter) {
    let mut builder = Builder::new();

    builder
        .target(Target::Stdout)
        .filter_level(level)
        .parse_env(Env::default())
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

    // Tests and embedding callers may already have installed a logger.
    let _ = builder.try_init();
}
