use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default size limit before a write triggers rotation (100 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// Default interval between two date checks of the daily scheduler.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Configuration for the logging facility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Path to the log file
    pub path: PathBuf,
    /// Gzip rotated-out files
    #[serde(default)]
    pub compress: bool,
    /// Start the background task that rotates the file when the date changes
    #[serde(default)]
    pub daily_rotate: bool,
    /// Mirror every record to stdout
    #[serde(default)]
    pub log_to_terminal: bool,
    /// Rotate before a write would grow the file past this many bytes (0 disables).
    /// Can be specified as a number (defaults to KB) or string with units
    /// (B/K/M/G, case-insensitive).
    #[serde(
        default = "default_max_size",
        deserialize_with = "deserialize_size",
        serialize_with = "serialize_size"
    )]
    pub max_size: u64,
    /// How often the daily scheduler looks at the clock, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl LoggerConfig {
    /// Create a new LoggerConfig writing to `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            compress: false,
            daily_rotate: false,
            log_to_terminal: false,
            max_size: default_max_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    /// Set the log file path
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }

    /// Enable gzip compression of rotated files
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Enable daily rotation
    pub fn with_daily_rotate(mut self, daily_rotate: bool) -> Self {
        self.daily_rotate = daily_rotate;
        self
    }

    /// Mirror output to stdout
    pub fn with_log_to_terminal(mut self, log_to_terminal: bool) -> Self {
        self.log_to_terminal = log_to_terminal;
        self
    }

    /// Set the size threshold in bytes (0 disables size rotation)
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the scheduler's polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Polling interval of the daily scheduler.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check the configuration before anything is opened or spawned.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::Config(
                "a log file path is required but none was given".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.compress && !cfg!(feature = "compress") {
            return Err(Error::Config(
                "compression requires the `compress` feature".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggerConfig {
    /// An unset path; `validate` rejects it until one is given.
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Parse a size string with optional units (B/K/M/G, case-insensitive),
/// defaulting to KB if no unit.
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let Some(last) = s.chars().last() else {
        return Err("empty size string".to_string());
    };

    let (num_str, unit) = if last.is_alphabetic() {
        (&s[..s.len() - last.len_utf8()], last.to_ascii_uppercase())
    } else {
        (s, 'K') // Default to KB
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier = match unit {
        'B' => 1,
        'K' => 1024,
        'M' => 1024 * 1024,
        'G' => 1024 * 1024 * 1024,
        _ => return Err(format!("invalid unit: {}, supported: B/K/M/G", unit)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size too large".to_string())
}

/// Render a byte count with the largest unit that divides it exactly.
fn format_size(bytes: u64) -> String {
    const UNITS: [(u64, char); 3] = [(1024 * 1024 * 1024, 'G'), (1024 * 1024, 'M'), (1024, 'K')];
    if bytes == 0 {
        return "0B".to_string();
    }
    for (factor, unit) in UNITS {
        if bytes % factor == 0 {
            return format!("{}{}", bytes / factor, unit);
        }
    }
    format!("{}B", bytes)
}

/// Size value that can be a number or string with units.
#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Number(u64),
    String(String),
}

impl SizeValue {
    fn to_bytes(&self) -> std::result::Result<u64, String> {
        match self {
            SizeValue::Number(n) => parse_size(&n.to_string()),
            SizeValue::String(s) => parse_size(s),
        }
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    SizeValue::deserialize(deserializer)?
        .to_bytes()
        .map_err(serde::de::Error::custom)
}

fn serialize_size<S>(bytes: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_size(*bytes))
}
