//! Daily rotation against a simulated clock.
//!
//! Run with:
//! ```bash
//! cargo run --example daily
//! ```

use daylog::{LoggerConfig, ManualClock, init_logging_with_clock};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let log_path = temp_dir.path().join("server.log");

    let clock = ManualClock::new(time::macros::date!(2024 - 06 - 30));
    let config = LoggerConfig::new(&log_path)
        .with_daily_rotate(true)
        .with_compress(true)
        .with_log_to_terminal(true)
        .with_poll_interval(Duration::from_millis(20));

    let mut logging = init_logging_with_clock(&config, clock.clone())?;
    logging.install_tracing()?;
    let logger = logging.logger();

    for day in 0..3 {
        for i in 0..5 {
            daylog::daylog!(logger, "day {} request {}", day, i)?;
        }
        tracing::info!("day {} done", day);
        clock.advance_days(1);
        std::thread::sleep(Duration::from_millis(100));
    }

    logging.shutdown()?;

    for entry in std::fs::read_dir(temp_dir.path())? {
        println!("{}", entry?.path().display());
    }
    Ok(())
}
