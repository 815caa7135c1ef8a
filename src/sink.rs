use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use time::macros::format_description;

use crate::clock::local_now;
use crate::compress::compress_file;

/// Pause before the next size rotation after one failed.
const SIZE_ROTATION_RETRY: Duration = Duration::from_secs(60);

/// An output destination that can swap its file while others write to it.
pub trait RotatingSink: Send + Sync {
    /// Close the current file, move it aside and start a fresh one at the
    /// original path.
    ///
    /// Must be safe to call while other threads are writing: a concurrent
    /// write lands whole in either the old or the new file.
    fn rotate(&self) -> io::Result<()>;

    /// Whether an output file is currently open.
    fn is_ready(&self) -> bool {
        true
    }
}

/// State of the current log file.
#[derive(Debug)]
struct FileState {
    /// The open file handle.
    file: File,
    /// Current size of the file in bytes.
    size: u64,
    /// No size rotation before this instant.
    retry_size_rotation_at: Option<Instant>,
}

/// What a rotation under the lock left behind.
#[derive(Debug)]
struct Rotated {
    /// Where the old file went, if there was one to move.
    backup: Option<PathBuf>,
    /// First failure while renaming or reopening.
    error: Option<io::Error>,
}

/// A file sink that rotates by renaming the current file to a timestamped
/// backup, optionally gzipping the backup.
#[derive(Debug)]
pub struct FileSink {
    /// Path of the active log file.
    path: PathBuf,
    /// Gzip backups after rotation.
    compress: bool,
    /// Size threshold for rotation on write (0 disables it).
    max_size: u64,
    /// Current file state, protected by mutex. `None` after a failed reopen.
    state: Mutex<Option<FileState>>,
}

impl FileSink {
    /// Open `path` for appending, creating missing parent directories.
    pub fn open(path: &Path, compress: bool, max_size: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let sink = Self {
            path: path.to_path_buf(),
            compress,
            max_size,
            state: Mutex::new(None),
        };
        let state = sink.open_file()?;
        *sink.lock() = Some(state);

        Ok(sink)
    }

    /// Path of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the active file, including what it held when opened.
    pub fn current_size(&self) -> u64 {
        self.lock().as_ref().map(|state| state.size).unwrap_or(0)
    }

    /// Write `buf` as a single record.
    ///
    /// The whole buffer goes into one file: the size check, any rotation it
    /// triggers and the write itself happen under one lock. Failures of a
    /// size rotation are logged after the lock is released, since `tracing`
    /// output may be routed back into this sink.
    pub fn write_all_bytes(&self, buf: &[u8]) -> io::Result<()> {
        let mut guard = self.lock();

        let rotated = if self.needs_size_rotation(guard.as_ref(), buf.len()) {
            let rotated = self.rotate_locked(&mut guard);
            if rotated.error.is_some()
                && let Some(state) = guard.as_mut()
            {
                state.retry_size_rotation_at = Some(Instant::now() + SIZE_ROTATION_RETRY);
            }
            Some(rotated)
        } else {
            None
        };

        let written = self.write_locked(&mut guard, buf);
        drop(guard);

        if let Some(Rotated { backup, error }) = rotated {
            if let Some(e) = error {
                tracing::warn!("size rotation of {} failed: {}", self.path.display(), e);
            }
            if let Some(backup) = backup
                && self.compress
            {
                compress_in_background(backup);
            }
        }
        written
    }

    /// Flush and sync the active file to disk.
    pub fn sync(&self) -> io::Result<()> {
        match self.lock().as_ref() {
            Some(state) => state.file.sync_all(),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<FileState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_file(&self) -> io::Result<FileState> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(FileState {
            file,
            size,
            retry_size_rotation_at: None,
        })
    }

    fn write_locked(&self, guard: &mut Option<FileState>, buf: &[u8]) -> io::Result<()> {
        if guard.is_none() {
            *guard = Some(self.open_file()?);
        }
        let Some(state) = guard.as_mut() else {
            return Err(io::Error::other("log file is not open"));
        };
        state.file.write_all(buf)?;
        state.size += buf.len() as u64;
        Ok(())
    }

    fn needs_size_rotation(&self, state: Option<&FileState>, buf_len: usize) -> bool {
        match state {
            Some(state) if self.max_size > 0 => {
                state.size > 0
                    && state.size + buf_len as u64 > self.max_size
                    && state.retry_size_rotation_at.is_none_or(|at| Instant::now() >= at)
            }
            _ => false,
        }
    }

    /// Close, move aside and reopen while the caller holds the lock.
    ///
    /// If the rename fails the original file is reopened so writes keep
    /// going. A backup that was moved is reported even when the reopen
    /// fails.
    fn rotate_locked(&self, guard: &mut Option<FileState>) -> Rotated {
        if let Some(mut state) = guard.take() {
            let _ = state.file.flush();
        }

        let (backup, mut error) = match self.move_aside() {
            Ok(backup) => (backup, None),
            Err(e) => (None, Some(e)),
        };
        match self.open_file() {
            Ok(state) => *guard = Some(state),
            Err(e) => {
                error.get_or_insert(e);
            }
        }
        Rotated { backup, error }
    }

    /// Compress the backup, then report how the rotation itself went.
    ///
    /// A backup that cannot be compressed stays on disk as is. That is
    /// logged and does not fail the rotation.
    fn finish_rotation(&self, rotated: Rotated) -> io::Result<()> {
        if let Some(backup) = &rotated.backup
            && self.compress
            && let Err(e) = compress_file(backup)
        {
            tracing::warn!("failed to compress {}: {}", backup.display(), e);
        }
        match rotated.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn move_aside(&self) -> io::Result<Option<PathBuf>> {
        let backup = self.backup_path()?;
        match std::fs::rename(&self.path, &backup) {
            Ok(()) => Ok(Some(backup)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `<dir>/<stem>-<timestamp>[.N]<.ext>`, unused so far (also as `.gz`).
    fn backup_path(&self) -> io::Result<PathBuf> {
        let stamp = local_now()
            .format(format_description!(
                "[year]-[month]-[day]T[hour]-[minute]-[second].[subsecond digits:3]"
            ))
            .map_err(io::Error::other)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut candidate = dir.join(format!("{stem}-{stamp}{ext}"));
        let mut n = 1;
        while candidate.exists() || crate::compress::gz_path(&candidate).exists() {
            candidate = dir.join(format!("{stem}-{stamp}.{n}{ext}"));
            n += 1;
        }
        Ok(candidate)
    }
}

impl RotatingSink for FileSink {
    fn rotate(&self) -> io::Result<()> {
        let rotated = self.rotate_locked(&mut self.lock());
        self.finish_rotation(rotated)
    }

    fn is_ready(&self) -> bool {
        self.lock().is_some()
    }
}

impl Write for &FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(state) => state.file.flush(),
            None => Ok(()),
        }
    }
}

/// Hand compression of a size-rotated backup to its own thread so the
/// writer that triggered the rotation is not held up.
fn compress_in_background(backup: PathBuf) {
    let spawned = std::thread::Builder::new()
        .name("daylog-compress".to_string())
        .spawn(move || {
            if let Err(e) = compress_file(&backup) {
                tracing::warn!("failed to compress {}: {}", backup.display(), e);
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("could not start compression thread: {}", e);
    }
}
