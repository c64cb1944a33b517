use std::fs::{File, OpenOptions};
use std::io::{self, Stderr};

use slog::{o, Drain, Logger};

use crate::settings::{Log, To};

/// Route the `log` facade, used throughout the library crates, into `logger`.
pub fn logger_init(logger: Logger, level: slog::Level) -> anyhow::Result<()> {
    log::set_boxed_logger(Box::new(LoggerEx(logger))).map_err(|e| anyhow::anyhow!("{e}"))?;
    log::set_max_level(slog_level_to_log(level).to_level_filter());
    Ok(())
}

struct LoggerEx(Logger);

impl log::Log for LoggerEx {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, r: &log::Record) {
        let level = log_level_to_slog(r.metadata().level());
        let args = r.args();
        let target = r.target();
        let location = &record_as_location(r);
        let s = slog::RecordStatic { location, level, tag: target };

        self.0.log(&slog::Record::new(&s, args, slog::b!()))
    }

    fn flush(&self) {}
}

fn log_level_to_slog(level: log::Level) -> slog::Level {
    match level {
        log::Level::Trace => slog::Level::Trace,
        log::Level::Debug => slog::Level::Debug,
        log::Level::Info => slog::Level::Info,
        log::Level::Warn => slog::Level::Warning,
        log::Level::Error => slog::Level::Error,
    }
}

fn slog_level_to_log(level: slog::Level) -> log::Level {
    match level {
        slog::Level::Trace => log::Level::Trace,
        slog::Level::Debug => log::Level::Debug,
        slog::Level::Info => log::Level::Info,
        slog::Level::Warning => log::Level::Warn,
        slog::Level::Error | slog::Level::Critical => log::Level::Error,
    }
}

fn record_as_location(r: &log::Record) -> slog::RecordLocation {
    let module = r.module_path_static().unwrap_or("<unknown>");
    let file = r.file_static().unwrap_or("<unknown>");
    let line = r.line().unwrap_or_default();

    slog::RecordLocation { file, line, column: 0, function: "", module }
}

/// Log lines go to stderr so `sub` output on stdout stays clean.
pub fn config_logger(cfg: &Log) -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(WriteFilter::new(cfg.file.clone(), cfg.to));
    let drain = slog_term::FullFormat::new(decorator)
        .use_custom_timestamp(|io: &mut dyn io::Write| {
            write!(io, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        })
        .build()
        .fuse();

    let drain = LevelFilter { drain, level: cfg.level.inner() }.fuse();

    let drain = slog_async::Async::new(drain)
        .chan_size(4096)
        .overflow_strategy(slog_async::OverflowStrategy::DropAndReport)
        .build()
        .fuse();

    Logger::root(drain, o!())
}

struct LevelFilter<D> {
    drain: D,
    level: slog::Level,
}

impl<D> Drain for LevelFilter<D>
where
    D: Drain,
{
    type Ok = Option<D::Ok>;
    type Err = Option<D::Err>;

    fn log(
        &self,
        record: &slog::Record,
        values: &slog::OwnedKVList,
    ) -> std::result::Result<Self::Ok, Self::Err> {
        if record.level().is_at_least(self.level) {
            self.drain.log(record, values).map(Some).map_err(Some)
        } else {
            Ok(None)
        }
    }
}

struct WriteFilter {
    filename: String,
    to: To,

    file: Option<File>,
    console: Stderr,
}

impl WriteFilter {
    fn new(filename: String, to: To) -> Self {
        Self { filename, to, file: None, console: io::stderr() }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            self.file = Some(OpenOptions::new().create(true).append(true).open(&self.filename).map_err(
                |e| io::Error::new(e.kind(), format!("logger file config error, filename: {}, {e}", self.filename)),
            )?);
        }
        self.file.as_mut().ok_or_else(|| io::Error::other("log file unavailable"))
    }
}

impl io::Write for WriteFilter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.to {
            To::Console => self.console.write(buf),
            To::File => self.file()?.write(buf),
            To::Both => {
                let _ = self.console.write(buf)?;
                self.file()?.write(buf)
            }
            To::Off => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.to {
            To::Console => self.console.flush(),
            To::File => self.file()?.flush(),
            To::Both => {
                self.console.flush()?;
                self.file()?.flush()
            }
            To::Off => Ok(()),
        }
    }
}
