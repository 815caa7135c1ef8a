use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::sync::Arc;

use time::macros::format_description;

use crate::clock::local_now;
use crate::sink::{FileSink, RotatingSink};

/// A cloneable handle for writing log records.
///
/// Every clone writes to the same sink. A record is written with one call
/// into the sink, so records from concurrent callers never interleave and
/// never straddle a rotation.
#[derive(Debug, Clone)]
pub struct Logger {
    sink: Arc<FileSink>,
    log_to_terminal: bool,
}

impl Logger {
    /// Create a logger over `sink`, mirroring records to stdout if
    /// `log_to_terminal` is set.
    pub fn new(sink: Arc<FileSink>, log_to_terminal: bool) -> Self {
        Self {
            sink,
            log_to_terminal,
        }
    }

    /// Write `msg` as one record, prefixed with the local date and time.
    pub fn log(&self, msg: impl fmt::Display) -> io::Result<()> {
        self.log_fmt(format_args!("{}", msg))
    }

    /// Write pre-formatted arguments as one record. See [`daylog!`](crate::daylog).
    pub fn log_fmt(&self, args: fmt::Arguments<'_>) -> io::Result<()> {
        let record = format_record(args)?;
        self.emit(record.as_bytes())
    }

    /// Rotate the underlying file now.
    pub fn rotate(&self) -> io::Result<()> {
        self.sink.rotate()
    }

    /// Flush buffered output and sync the log file to disk.
    pub fn flush(&self) -> io::Result<()> {
        if self.log_to_terminal {
            io::stdout().lock().flush()?;
        }
        self.sink.sync()
    }

    /// The sink records are written to.
    pub fn sink(&self) -> &Arc<FileSink> {
        &self.sink
    }

    fn emit(&self, bytes: &[u8]) -> io::Result<()> {
        self.sink.write_all_bytes(bytes)?;
        if self.log_to_terminal {
            io::stdout().lock().write_all(bytes)?;
        }
        Ok(())
    }
}

/// Raw bytes, without a timestamp. Used by formatters that produce complete
/// lines themselves.
impl Write for Logger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.emit(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.log_to_terminal {
            io::stdout().lock().flush()?;
        }
        (&*self.sink).flush()
    }
}

/// `YYYY/MM/DD HH:MM:SS message\n`, with exactly one trailing newline.
fn format_record(args: fmt::Arguments<'_>) -> io::Result<String> {
    let mut record = local_now()
        .format(format_description!(
            "[year]/[month]/[day] [hour]:[minute]:[second] "
        ))
        .map_err(io::Error::other)?;
    record.write_fmt(args).map_err(io::Error::other)?;
    if !record.ends_with('\n') {
        record.push('\n');
    }
    Ok(record)
}

/// Log a formatted record through a [`Logger`].
///
/// ```rust,no_run
/// # fn demo(logger: &daylog::Logger) -> std::io::Result<()> {
/// daylog::daylog!(logger, "listening on port {}", 8080)?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! daylog {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log_fmt(::std::format_args!($($arg)+))
    };
}
