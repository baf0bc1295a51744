use crate::{DiagnosticSink, write_fmt};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing into a [`DiagnosticSink`].
pub struct ConsoleLogger<S> {
    sink: S,
    max_level: LevelFilter,
}

impl<S> ConsoleLogger<S> {
    #[must_use]
    pub const fn new(sink: S, max_level: LevelFilter) -> Self {
        Self { sink, max_level }
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S> ConsoleLogger<S>
where
    S: DiagnosticSink + Send + Sync,
{
    /// Register as the global logger. Call this once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl<S> Log for ConsoleLogger<S>
where
    S: DiagnosticSink + Send + Sync,
{
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n"
        write_fmt(
            &self.sink,
            format_args!(
                "[{}] {}: {}\n",
                record.level(),
                record.target(),
                record.args()
            ),
        );
    }

    fn flush(&self) {}
}
