//! Logging bootstrap. Mirrors the teacher's dual file+stdout writer, with
//! the log-file override renamed to this project's own environment
//! variable.

use std::io::{self, Write};

use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;

/// Writes every log record to both an open file and stdout.
struct DualWriter {
    file: std::fs::File,
    stdout: io::Stdout,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        self.stdout.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.stdout.flush()?;
        Ok(())
    }
}

/// Initialize logging. `log_file_override` takes precedence over the
/// `SDPLC_LOG_FILE` environment variable; with neither set, logs go to
/// stdout only via `env_logger`'s default behaviour.
pub fn init_logging(log_file_override: Option<&str>) {
    let log_file = log_file_override
        .map(str::to_string)
        .or_else(|| std::env::var("SDPLC_LOG_FILE").ok());

    match log_file {
        Some(path) => {
            if let Err(err) = init_dual_logger(&path) {
                eprintln!("Failed to initialize file logger at '{path}': {err}");
                env_logger::init();
            }
        }
        None => env_logger::init(),
    }
}

/// Dual file+stdout logger, used when `--log-file`/`SDPLC_LOG_FILE` is set.
fn init_dual_logger(path: &str) -> io::Result<()> {
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    let dual_writer = DualWriter { file, stdout: io::stdout() };

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(dual_writer)))
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("logging to file and terminal at {path}");
    Ok(())
}
