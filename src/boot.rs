use chrono::Local;
use log::LevelFilter;
use std::io::{self, Write};

use env_logger::{Builder, Target};

/// Environment variable naming an extra log file next to stdout.
pub const LOG_FILE_ENV: &str = "SCREEND_LOG_FILE";

/// Writes every record to both the log file and stdout.
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

/// Install the global logger. `info` unless `RUST_LOG` says otherwise.
pub fn init_logger() {
    let Some(path) = std::env::var(LOG_FILE_ENV).ok().filter(|p| !p.is_empty()) else {
        Builder::new()
            .filter_level(LevelFilter::Info)
            .parse_default_env()
            .init();
        return;
    };

    if let Err(err) = init_dual_logger(&path) {
        eprintln!("Failed to initialize file logger at '{path}': {err}");
        Builder::new()
            .filter_level(LevelFilter::Info)
            .parse_default_env()
            .init();
    }
}

fn init_dual_logger(path: &str) -> io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let dual_writer = DualWriter {
        file,
        stdout: io::stdout(),
    };

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(dual_writer)))
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("logging to {path} and stdout");

    Ok(())
}
