use std::sync::Arc;

use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::clock::{Clock, SystemClock};
use crate::scheduler::{DailyRotationScheduler, RotationEvent};
use crate::{Error, FileSink, Logger, LoggerConfig, Result};

/// Record written through the logger after each successful daily rotation.
pub const ROTATED_RECORD: &str = "| Log Rotated";

/// A running logging facility.
///
/// Owns the daily rotation scheduler (if enabled) and the tracing bridge
/// (if installed). Dropping it stops both; loggers handed out earlier keep
/// writing to the file.
#[derive(Debug)]
pub struct Logging {
    config: LoggerConfig,
    logger: Logger,
    scheduler: Option<DailyRotationScheduler>,
    tracing_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// Fails with [`Error::Config`] before touching the filesystem if the
/// configuration is invalid, and with [`Error::Io`] if the log directory or
/// file cannot be created.
pub fn init_logging(config: &LoggerConfig) -> Result<Logging> {
    init_logging_with_clock(config, SystemClock)
}

/// Initialize logging, letting the daily scheduler read dates from `clock`.
pub fn init_logging_with_clock<C>(config: &LoggerConfig, clock: C) -> Result<Logging>
where
    C: Clock + 'static,
{
    config.validate()?;

    let sink = Arc::new(FileSink::open(
        &config.path,
        config.compress,
        config.max_size,
    )?);
    let logger = Logger::new(Arc::clone(&sink), config.log_to_terminal);

    let scheduler = if config.daily_rotate {
        let reporter = logger.clone();
        let scheduler = DailyRotationScheduler::spawn_with_reporter(
            sink,
            clock,
            config.poll_interval(),
            move |event| report_rotation(&reporter, event),
        )
        .map_err(|e| Error::Init(format!("failed to start rotation scheduler: {}", e)))?;
        Some(scheduler)
    } else {
        None
    };

    tracing::debug!(
        "logging to {} (daily rotation: {}, compress: {})",
        config.path.display(),
        config.daily_rotate,
        config.compress
    );

    Ok(Logging {
        config: config.clone(),
        logger,
        scheduler,
        tracing_guard: None,
    })
}

impl Logging {
    /// A handle for writing records. Clone it freely.
    pub fn logger(&self) -> Logger {
        self.logger.clone()
    }

    /// The configuration this facility was started with.
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// The daily rotation scheduler, if `daily_rotate` was enabled.
    pub fn scheduler(&self) -> Option<&DailyRotationScheduler> {
        self.scheduler.as_ref()
    }

    /// Route `tracing` events into the log file as the global subscriber.
    ///
    /// Events are formatted by `tracing-subscriber` without ANSI colors and
    /// handed to a background writer that never drops lines. Fails if a
    /// global subscriber is already set.
    pub fn install_tracing(&mut self) -> Result<()> {
        let (non_blocking, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .thread_name("daylog-tracing")
            .finish(self.logger.clone());

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(false);

        tracing_subscriber::registry()
            .with(file_layer)
            .try_init()
            .map_err(|e| Error::Init(e.to_string()))?;

        self.tracing_guard = Some(guard);
        Ok(())
    }

    /// Stop the scheduler, drain the tracing bridge and sync the file.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        drop(self.tracing_guard.take());
        self.logger.flush()?;
        Ok(())
    }
}

fn report_rotation(logger: &Logger, event: RotationEvent<'_>) {
    let written = match event {
        RotationEvent::Rotated { .. } => logger.log(ROTATED_RECORD),
        RotationEvent::Failed { error, .. } => {
            crate::daylog!(logger, "| Log Rotation Failed: {}", error)
        }
    };
    if let Err(e) = written {
        tracing::warn!("could not write rotation record: {}", e);
    }
}
